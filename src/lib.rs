//! # tsu-page
//!
//! Template pages, HTML fragments and class-based views for the tsu HTTP
//! framework.
//!
//! tsu routes requests and sends bytes. tsu-page adds the small layer between
//! a handler and a template engine:
//!
//! - [`Template`] wraps a handler. It renders a template with the
//!   [`Context`] the handler returns, or passes a ready [`Response`] through.
//! - [`Fragment`] wraps a handler and renders a snippet to a `String`, or
//!   passes through markup the handler already built. `route` serves the
//!   same snippet as an HTML response.
//! - [`View`] and [`FormView`] give per-request state and a fixed
//!   request → success | error lifecycle via [`Respond`].
//! - [`StaticFiles`] serves files, streaming the large ones.
//!
//! Templates render through the [`Renderer`] capability. [`Templates`], a
//! registry of [`minijinja`] environments keyed by [`AppKey`], implements
//! it. The registry is passed to each dispatcher explicitly; there is no
//! global state.
//!
//! Every failure is logged through `tracing` and returned unchanged. The
//! host turns it into a status response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsu_page::{Context, Error, Request, Router, Server, Template, Templates};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let templates = Arc::new(Templates::from_dir("templates"));
//!
//!     let app = Router::new()
//!         .get("/", Template::new("index.html", templates.clone())?.wrap(home));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn home(_req: Request) -> Context {
//!     Context::from_iter([("title", "Home")])
//! }
//! ```

mod context;
mod error;
mod form;
mod fragment;
mod handler;
mod render;
mod request;
mod response;
mod router;
mod server;
mod static_files;
mod template;
mod view;

#[cfg(test)]
mod testing;

pub use context::Context;
pub use error::{BoxError, Error};
pub use form::{FieldErrors, Form, FormOutcome, FormView};
pub use fragment::{Fragment, IntoPartial, Partial};
pub use handler::{BoxFuture, Handler};
pub use render::{AppKey, Encoding, Renderer, Templates};
pub use request::{FormData, Request, RequestBuilder};
pub use response::{ByteStream, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use static_files::StaticFiles;
pub use template::{IntoPage, Page, Template};
pub use view::{Phase, Respond, View, ViewDispatcher};

pub use http::{Method, StatusCode};
