//! Template dispatcher.
//!
//! [`Template`] wraps a handler and turns whatever it returns into a page.
//! A handler that already built a [`Response`] gets it sent as-is. A handler
//! that returned a [`Context`] gets the configured template rendered with it.
//!
//! ```rust
//! use std::sync::Arc;
//! use minijinja::Environment;
//! use tsu_page::{Context, Request, Router, Template, Templates};
//!
//! async fn home(_req: Request) -> Context {
//!     Context::from_iter([("title", "Home")])
//! }
//!
//! # fn main() -> Result<(), tsu_page::Error> {
//! let mut env = Environment::new();
//! env.add_template_owned("index.html", "<h1>{{ title }}</h1>").unwrap();
//! let templates = Arc::new(Templates::new().with_default(env));
//!
//! let app = Router::new().get("/", Template::new("index.html", templates)?.wrap(home));
//! # Ok(()) }
//! ```

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;
use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::render::{AppKey, Encoding, Renderer};
use crate::request::Request;
use crate::response::Response;

/// What a template handler produced.
#[derive(Debug)]
pub enum Page {
    /// A finished response, sent without rendering.
    Response(Response),
    /// Variables for the configured template.
    Context(Context),
}

/// Conversion of a handler's return value into a [`Page`].
///
/// Implemented for [`Page`], [`Response`], [`Context`], JSON objects, and
/// `Result`s of any of those, so handlers can use `?` freely.
pub trait IntoPage {
    fn into_page(self) -> Result<Page, Error>;
}

impl IntoPage for Page {
    fn into_page(self) -> Result<Page, Error> { Ok(self) }
}

impl IntoPage for Response {
    fn into_page(self) -> Result<Page, Error> { Ok(Page::Response(self)) }
}

impl IntoPage for Context {
    fn into_page(self) -> Result<Page, Error> { Ok(Page::Context(self)) }
}

impl IntoPage for Value {
    fn into_page(self) -> Result<Page, Error> {
        Context::try_from(self).map(Page::Context)
    }
}

impl<T: IntoPage, E: Into<Error>> IntoPage for Result<T, E> {
    fn into_page(self) -> Result<Page, Error> {
        self.map_err(Into::into)?.into_page()
    }
}

/// Wraps page handlers with template rendering.
///
/// Configure once, then [`wrap`](Template::wrap) as many handlers as share
/// the template.
#[derive(Clone)]
pub struct Template {
    name: String,
    renderer: Arc<dyn Renderer>,
    app_key: AppKey,
    encoding: Encoding,
    status: StatusCode,
}

impl Template {
    /// Renders `name` through `renderer` with a `200 OK`, UTF-8 and the
    /// default app key unless told otherwise.
    ///
    /// A blank `name` is [`Error::InvalidArgument`].
    pub fn new(name: impl Into<String>, renderer: Arc<dyn Renderer>) -> Result<Self, Error> {
        let name = template_name(name.into())?;
        Ok(Self {
            name,
            renderer,
            app_key: AppKey::default(),
            encoding: Encoding::default(),
            status: StatusCode::OK,
        })
    }

    pub fn app_key(mut self, app_key: impl Into<AppKey>) -> Self {
        self.app_key = app_key.into();
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Status forced onto every rendered page.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a route handler that runs `handler` and renders its result.
    pub fn wrap<H, Fut, R>(
        self,
        handler: H,
    ) -> impl Fn(Request) -> BoxFuture<Result<Response, Error>> + Send + Sync + 'static
    where
        H: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoPage + Send + 'static,
    {
        let shared = Arc::new((self, handler));
        move |req| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                let (template, handler) = &*shared;
                template.dispatch(handler, req).await
            })
        }
    }

    async fn dispatch<H, Fut, R>(&self, handler: &H, req: Request) -> Result<Response, Error>
    where
        H: Fn(Request) -> Fut,
        Fut: Future<Output = R>,
        R: IntoPage,
    {
        let page = handler(req.clone()).await.into_page().inspect_err(|e| {
            error!(handler = std::any::type_name::<H>(), error = %e, "template handler failed");
        })?;

        let context = match page {
            Page::Response(response) => return Ok(response),
            Page::Context(context) => context,
        };

        let mut response = self
            .renderer
            .render_template(&self.name, &req, &context, &self.app_key, self.encoding)
            .inspect_err(|e| error!(template = %self.name, error = %e, "template render failed"))?;
        response.set_status(self.status);
        Ok(response)
    }
}

/// Validates a configured template name.
pub(crate) fn template_name(name: String) -> Result<String, Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument("a template name is required".to_owned()));
    }
    Ok(name)
}
