//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex, PoisonError};

use crate::context::Context;
use crate::error::Error;
use crate::render::{AppKey, Renderer};
use crate::request::Request;

/// One call into [`RecordingRenderer`].
#[derive(Clone, Debug)]
pub(crate) struct RenderCall {
    pub name: String,
    pub context: Context,
    pub app_key: AppKey,
    pub path: String,
}

/// Records every render call. Output is `name` followed by the context as JSON.
pub(crate) struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
    fail: bool,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: Mutex::default(), fail: false })
    }

    /// Records the call, then fails with [`Error::UnknownApp`].
    pub fn failing() -> Arc<Self> {
        Arc::new(Self { calls: Mutex::default(), fail: true })
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render_string(
        &self,
        name: &str,
        request: &Request,
        context: &Context,
        app_key: &AppKey,
    ) -> Result<String, Error> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(RenderCall {
            name: name.to_owned(),
            context: context.clone(),
            app_key: app_key.clone(),
            path: request.path().to_owned(),
        });
        if self.fail {
            return Err(Error::UnknownApp(app_key.clone()));
        }
        Ok(format!("{name}:{}", serde_json::to_string(context)?))
    }
}
