//! Route handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router keeps handlers of many concrete types in one
//! `HashMap<Method, Tree>`. A collection holds a single concrete type, so
//! each handler is hidden behind a trait object (`dyn ErasedHandler`) and
//! stored uniformly:
//!
//! ```text
//! async fn home(req: Request) -> Response { … }       ← plain handler
//! Template::new("home.html", r)?.wrap(home)           ← or a dispatcher
//!        ↓ router.get("/", handler)
//! handler.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(handler))                        ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time                  ← one vtable dispatch
//!        ↓
//! Box::pin(async { handler(req).await.into_response() })  ← BoxFuture
//! ```
//!
//! Page dispatchers return closures, so they satisfy the same blanket impl as
//! any `async fn`. Their output is a `Result<Response, Error>`, which
//! [`IntoResponse`] turns into a status response when it is an error.
//!
//! The runtime cost per request is one `Arc` clone and one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls the future in place and it must
/// not move after the first poll. `Send + 'static` lets tokio move it across
/// worker threads. Dispatchers return this from the closures they build, so
/// their futures have one nameable type.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public [`Handler::into_boxed_handler`].
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response>;
}

/// A type-erased handler shared by every request routed to it.
///
/// `Arc` gives cheap thread-safe sharing: one atomic increment per request.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any function with the signature
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// and by the closures returned from
/// [`Template::wrap`](crate::Template::wrap),
/// [`ViewDispatcher::wrap`](crate::ViewDispatcher::wrap),
/// [`Fragment::route`](crate::Fragment::route) and
/// [`StaticFiles::handler`](crate::StaticFiles::handler).
///
/// The trait is **sealed** through the private `Sealed` supertrait: only the
/// blanket impl below satisfies it, which keeps the signature free to change.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Because `Sealed` is unreachable from outside the crate, nobody else can
/// implement it, and so nobody else can implement [`Handler`].
mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Adapts a closure or `async fn` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
