//! Class-based views.
//!
//! A [`View`] carries everything needed to answer one request with a
//! template: the request, template name, app key, encoding, status and a
//! context that handlers fill in. [`Respond`] drives it through a fixed
//! lifecycle:
//!
//! ```text
//! Created → HandlingRequest ─ok──→ HandlingSuccess ─ok──→ Done
//!                 │                       │
//!                 └──err──→ HandlingError ←──err┘ → Done
//! ```
//!
//! Types that need more than rendering (see [`FormView`](crate::FormView))
//! wrap a `View` and override individual phases.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::render::{AppKey, Encoding, Renderer};
use crate::request::Request;
use crate::response::Response;
use crate::template::template_name;

/// Where a view is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Created,
    HandlingRequest,
    HandlingSuccess,
    HandlingError,
    Done,
}

/// Per-request rendering state.
pub struct View {
    request: Request,
    template: Option<String>,
    app_key: AppKey,
    encoding: Encoding,
    status: StatusCode,
    context: Context,
    responder: Arc<dyn Renderer>,
    phase: Phase,
}

impl View {
    /// A view with no template, an empty context and a `200 OK` status.
    pub fn new(request: Request, responder: Arc<dyn Renderer>) -> Self {
        Self {
            request,
            template: None,
            app_key: AppKey::default(),
            encoding: Encoding::default(),
            status: StatusCode::OK,
            context: Context::new(),
            responder,
            phase: Phase::Created,
        }
    }

    pub fn request(&self) -> &Request { &self.request }

    pub fn template(&self) -> Option<&str> { self.template.as_deref() }

    pub fn set_template(&mut self, name: impl Into<String>) {
        self.template = Some(name.into());
    }

    pub fn app_key(&self) -> &AppKey { &self.app_key }

    pub fn set_app_key(&mut self, app_key: impl Into<AppKey>) {
        self.app_key = app_key.into();
    }

    pub fn encoding(&self) -> Encoding { self.encoding }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub fn status(&self) -> StatusCode { self.status }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn context(&self) -> &Context { &self.context }

    pub fn context_mut(&mut self) -> &mut Context { &mut self.context }

    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    /// Merges `extra` into the context; incoming keys win.
    pub fn update_context(&mut self, extra: Context) {
        self.context.update(extra);
    }

    pub fn responder(&self) -> &Arc<dyn Renderer> { &self.responder }

    /// Swaps the capability used by [`render`](Self::render).
    pub fn set_responder(&mut self, responder: Arc<dyn Renderer>) {
        self.responder = responder;
    }

    pub fn phase(&self) -> Phase { self.phase }

    /// Renders the current template with the current context and forces the
    /// view's status onto the result.
    pub fn render(&self) -> Result<Response, Error> {
        let Some(template) = &self.template else {
            return Err(Error::TemplateMissing { handler: std::any::type_name::<Self>().to_owned() });
        };
        let mut response = self.responder.render_template(
            template,
            &self.request,
            &self.context,
            &self.app_key,
            self.encoding,
        )?;
        response.set_status(self.status);
        Ok(response)
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("request", &self.request)
            .field("template", &self.template)
            .field("status", &self.status)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// The view lifecycle.
///
/// Implementors expose their [`View`] and override whichever phases they
/// need. [`respond`](Respond::respond) is the entry point and should not be
/// overridden.
#[async_trait]
pub trait Respond: Send {
    fn view(&self) -> &View;
    fn view_mut(&mut self) -> &mut View;

    /// Runs request-specific work before rendering. No-op by default.
    async fn handle_request(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Builds the response once the request was handled.
    async fn handle_success(&mut self) -> Result<Response, Error> {
        self.view().render()
    }

    /// Last stop for any error from the other phases. The default logs and
    /// returns it unchanged; the host turns it into an error response.
    async fn handle_error(&mut self, err: Error) -> Result<Response, Error> {
        error!(view = ?self.view(), error = %err, "view failed");
        Err(err)
    }

    /// Merges `extra` into the context and runs the lifecycle once.
    async fn respond(mut self, extra: Context) -> Result<Response, Error>
    where
        Self: Sized,
    {
        self.view_mut().update_context(extra);

        self.view_mut().phase = Phase::HandlingRequest;
        let outcome = match self.handle_request().await {
            Ok(()) => {
                self.view_mut().phase = Phase::HandlingSuccess;
                self.handle_success().await
            }
            Err(err) => Err(err),
        };

        let result = match outcome {
            Ok(response) => Ok(response),
            Err(err) => {
                self.view_mut().phase = Phase::HandlingError;
                self.handle_error(err).await
            }
        };
        self.view_mut().phase = Phase::Done;
        result
    }
}

impl Respond for View {
    fn view(&self) -> &View { self }
    fn view_mut(&mut self) -> &mut View { self }
}

// ── ViewDispatcher ────────────────────────────────────────────────────────────

/// Builds one [`View`] per request and hands it to a handler.
///
/// ```rust
/// use std::sync::Arc;
/// use tsu_page::{Context, Respond, Router, Templates, View, ViewDispatcher};
///
/// async fn profile(view: View) -> Result<tsu_page::Response, tsu_page::Error> {
///     let name = view.request().param("name").unwrap_or("anonymous").to_owned();
///     view.respond(Context::from_iter([("name", name)])).await
/// }
///
/// # fn main() -> Result<(), tsu_page::Error> {
/// let templates = Arc::new(Templates::from_dir("templates"));
/// let app = Router::new()
///     .get("/u/{name}", ViewDispatcher::new("profile.html", templates)?.wrap(profile));
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct ViewDispatcher {
    template: String,
    renderer: Arc<dyn Renderer>,
    app_key: AppKey,
    encoding: Encoding,
    status: StatusCode,
}

impl ViewDispatcher {
    /// A blank `template` is [`Error::InvalidArgument`].
    pub fn new(template: impl Into<String>, renderer: Arc<dyn Renderer>) -> Result<Self, Error> {
        Ok(Self {
            template: template_name(template.into())?,
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

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn build(&self, request: Request) -> View {
        let mut view = View::new(request, Arc::clone(&self.renderer));
        view.template = Some(self.template.clone());
        view.app_key = self.app_key.clone();
        view.encoding = self.encoding;
        view.status = self.status;
        view
    }

    /// Returns a route handler that builds a [`View`] and passes it to `handler`.
    pub fn wrap<H, Fut>(
        self,
        handler: H,
    ) -> impl Fn(Request) -> BoxFuture<Result<Response, Error>> + Send + Sync + 'static
    where
        H: Fn(View) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Error>> + Send + 'static,
    {
        let shared = Arc::new((self, handler));
        move |req| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                let (dispatcher, handler) = &*shared;
                // Failures inside `respond` were logged by `handle_error`.
                handler(dispatcher.build(req)).await
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRenderer;
    use serde_json::json;
    use std::sync::Mutex;

    fn view(renderer: Arc<RecordingRenderer>) -> View {
        let mut view = View::new(Request::builder().uri("/v").build(), renderer);
        view.set_template("page.html");
        view
    }

    #[tokio::test]
    async fn respond_merges_context_and_renders() {
        let renderer = RecordingRenderer::new();
        let mut v = view(renderer.clone());
        v.context_mut().insert("a", 1);
        v.set_status(StatusCode::ACCEPTED);

        let res = v.respond(Context::from_iter([("b", 2)])).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        let calls = renderer.calls();
        assert_eq!(calls[0].name, "page.html");
        assert_eq!(calls[0].context, Context::from_iter([("a", 1), ("b", 2)]));
        assert_eq!(calls[0].path, "/v");
    }

    #[tokio::test]
    async fn missing_template_routes_to_error() {
        let renderer = RecordingRenderer::new();
        let v = View::new(Request::builder().build(), renderer.clone());
        let err = v.respond(Context::new()).await.unwrap_err();
        assert!(matches!(err, Error::TemplateMissing { .. }));
        assert!(renderer.calls().is_empty());
    }

    #[tokio::test]
    async fn render_failures_are_returned_unchanged() {
        let v = view(RecordingRenderer::failing());
        let err = v.respond(Context::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownApp(_)));
    }

    #[derive(Default)]
    struct Trace {
        seen: Vec<Phase>,
        errors_handled: usize,
    }

    /// Records each phase it passes through, and the phase it is dropped in.
    struct Traced {
        view: View,
        trace: Arc<Mutex<Trace>>,
        fail_request: bool,
        fail_success: bool,
    }

    impl Traced {
        fn new(fail_request: bool, fail_success: bool) -> (Self, Arc<Mutex<Trace>>) {
            let trace = Arc::new(Mutex::new(Trace::default()));
            let traced = Traced {
                view: view(RecordingRenderer::new()),
                trace: Arc::clone(&trace),
                fail_request,
                fail_success,
            };
            (traced, trace)
        }

        fn record(&self) {
            self.trace.lock().unwrap().seen.push(self.view.phase());
        }
    }

    impl Drop for Traced {
        fn drop(&mut self) {
            self.record();
        }
    }

    #[async_trait]
    impl Respond for Traced {
        fn view(&self) -> &View { &self.view }
        fn view_mut(&mut self) -> &mut View { &mut self.view }

        async fn handle_request(&mut self) -> Result<(), Error> {
            self.record();
            if self.fail_request {
                return Err(Error::handler("rejected"));
            }
            Ok(())
        }

        async fn handle_success(&mut self) -> Result<Response, Error> {
            self.record();
            if self.fail_success {
                return Err(Error::handler("render blew up"));
            }
            Ok(Response::text("ok"))
        }

        async fn handle_error(&mut self, err: Error) -> Result<Response, Error> {
            self.record();
            self.trace.lock().unwrap().errors_handled += 1;
            Err(err)
        }
    }

    #[tokio::test]
    async fn lifecycle_runs_request_then_success() {
        let (traced, trace) = Traced::new(false, false);

        let res = traced.respond(Context::new()).await.unwrap();

        assert_eq!(res.body_bytes(), Some(&b"ok"[..]));
        let trace = trace.lock().unwrap();
        assert_eq!(trace.seen, [Phase::HandlingRequest, Phase::HandlingSuccess, Phase::Done]);
        assert_eq!(trace.errors_handled, 0);
    }

    #[tokio::test]
    async fn request_errors_skip_success() {
        let (traced, trace) = Traced::new(true, false);

        let err = traced.respond(Context::new()).await.unwrap_err();

        assert!(matches!(err, Error::Handler(ref e) if e.to_string() == "rejected"));
        let trace = trace.lock().unwrap();
        assert_eq!(trace.seen, [Phase::HandlingRequest, Phase::HandlingError, Phase::Done]);
        assert_eq!(trace.errors_handled, 1);
    }

    #[tokio::test]
    async fn success_errors_are_handled_once() {
        let (traced, trace) = Traced::new(false, true);

        let err = traced.respond(Context::new()).await.unwrap_err();

        assert!(matches!(err, Error::Handler(ref e) if e.to_string() == "render blew up"));
        let trace = trace.lock().unwrap();
        assert_eq!(
            trace.seen,
            [Phase::HandlingRequest, Phase::HandlingSuccess, Phase::HandlingError, Phase::Done]
        );
        assert_eq!(trace.errors_handled, 1);
    }

    #[tokio::test]
    async fn dispatcher_configures_each_view() {
        let renderer = RecordingRenderer::new();
        let handler = ViewDispatcher::new("item.html", renderer.clone())
            .unwrap()
            .app_key("shop")
            .status(StatusCode::CREATED)
            .wrap(|view: View| async move {
                assert_eq!(view.phase(), Phase::Created);
                assert_eq!(view.template(), Some("item.html"));
                let id = view.request().param("id").unwrap_or_default().to_owned();
                view.respond(Context::from_iter([("id", id)])).await
            });

        let res = handler(Request::builder().param("id", "9").build()).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::CREATED);
        let calls = renderer.calls();
        assert_eq!(calls[0].app_key, AppKey::new("shop"));
        assert_eq!(calls[0].context.get("id"), Some(&json!("9")));
    }

    #[test]
    fn dispatcher_rejects_blank_template() {
        let err = ViewDispatcher::new("", RecordingRenderer::new()).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
