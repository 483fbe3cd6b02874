//! Fragment dispatcher.
//!
//! A fragment is an HTML snippet rendered to a `String` rather than a full
//! response: a header, a sidebar, a row swapped in by htmx. Page handlers
//! call fragments and drop the output into their own context.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::context::Context;
use crate::error::{Error, json_kind};
use crate::handler::BoxFuture;
use crate::render::{AppKey, Renderer};
use crate::request::Request;
use crate::response::Response;
use crate::template::template_name;

/// What a fragment handler produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Partial {
    /// Finished markup, returned byte for byte.
    Html(String),
    /// Variables for the configured template.
    Context(Context),
}

/// Conversion of a handler's return value into a [`Partial`].
pub trait IntoPartial {
    fn into_partial(self) -> Result<Partial, Error>;
}

impl IntoPartial for Partial {
    fn into_partial(self) -> Result<Partial, Error> { Ok(self) }
}

impl IntoPartial for String {
    fn into_partial(self) -> Result<Partial, Error> { Ok(Partial::Html(self)) }
}

impl IntoPartial for &'static str {
    fn into_partial(self) -> Result<Partial, Error> { Ok(Partial::Html(self.to_owned())) }
}

impl IntoPartial for Context {
    fn into_partial(self) -> Result<Partial, Error> { Ok(Partial::Context(self)) }
}

/// Strings pass through, objects become a context, anything else is a
/// [`Error::TypeMismatch`].
impl IntoPartial for Value {
    fn into_partial(self) -> Result<Partial, Error> {
        match self {
            Value::String(html) => Ok(Partial::Html(html)),
            Value::Object(map) => Ok(Partial::Context(map.into())),
            other => Err(Error::TypeMismatch {
                expected: "string or object",
                found: json_kind(&other),
            }),
        }
    }
}

impl<T: IntoPartial, E: Into<Error>> IntoPartial for Result<T, E> {
    fn into_partial(self) -> Result<Partial, Error> {
        self.map_err(Into::into)?.into_partial()
    }
}

/// Wraps fragment handlers with string rendering.
///
/// ```rust
/// use std::sync::Arc;
/// use minijinja::Environment;
/// use tsu_page::{Context, Fragment, Request, Templates};
///
/// # async fn demo() -> Result<(), tsu_page::Error> {
/// let mut env = Environment::new();
/// env.add_template_owned("header.html", "<header>{{ title }}</header>").unwrap();
/// let templates = Arc::new(Templates::new().with_default(env));
///
/// let header = Fragment::with_template("header.html", templates)?
///     .wrap(|_req| async { Context::from_iter([("title", "Blog")]) });
///
/// let html = header(Request::builder().build()).await?;
/// assert_eq!(html, "<header>Blog</header>");
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Fragment {
    name: Option<String>,
    renderer: Arc<dyn Renderer>,
    app_key: AppKey,
}

impl Fragment {
    /// A fragment with no template. Its handler must return markup.
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { name: None, renderer, app_key: AppKey::default() }
    }

    /// A fragment rendered from `name` when its handler returns a context.
    ///
    /// A blank `name` is [`Error::InvalidArgument`].
    pub fn with_template(name: impl Into<String>, renderer: Arc<dyn Renderer>) -> Result<Self, Error> {
        let name = template_name(name.into())?;
        Ok(Self { name: Some(name), ..Self::new(renderer) })
    }

    pub fn app_key(mut self, app_key: impl Into<AppKey>) -> Self {
        self.app_key = app_key.into();
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns a function that runs `handler` and renders its result to a string.
    pub fn wrap<H, Fut, R>(
        self,
        handler: H,
    ) -> impl Fn(Request) -> BoxFuture<Result<String, Error>> + Send + Sync + 'static
    where
        H: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoPartial + Send + 'static,
    {
        let shared = Arc::new((self, handler));
        move |req| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                let (fragment, handler) = &*shared;
                fragment.dispatch(handler, req).await
            })
        }
    }

    /// Like [`wrap`](Fragment::wrap), but returns a route handler that sends
    /// the snippet as `text/html`, for fragments fetched directly (htmx swaps).
    pub fn route<H, Fut, R>(
        self,
        handler: H,
    ) -> impl Fn(Request) -> BoxFuture<Result<Response, Error>> + Send + Sync + 'static
    where
        H: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoPartial + Send + 'static,
    {
        let shared = Arc::new((self, handler));
        move |req| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                let (fragment, handler) = &*shared;
                fragment.dispatch(handler, req).await.map(Response::html)
            })
        }
    }

    async fn dispatch<H, Fut, R>(&self, handler: &H, req: Request) -> Result<String, Error>
    where
        H: Fn(Request) -> Fut,
        Fut: Future<Output = R>,
        R: IntoPartial,
    {
        let handler_name = std::any::type_name::<H>();
        let partial = handler(req.clone()).await.into_partial().inspect_err(|e| {
            error!(handler = handler_name, error = %e, "fragment handler failed");
        })?;

        let context = match partial {
            Partial::Html(html) => return Ok(html),
            Partial::Context(context) => context,
        };

        let Some(name) = &self.name else {
            let err = Error::TemplateMissing { handler: handler_name.to_owned() };
            error!(handler = handler_name, error = %err, "fragment has no template");
            return Err(err);
        };

        self.renderer
            .render_string(name, &req, &context, &self.app_key)
            .inspect_err(|e| error!(template = %name, error = %e, "fragment render failed"))
    }
}
