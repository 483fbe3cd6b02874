//! The template-rendering capability.
//!
//! Dispatchers and views never talk to a template engine directly. They hold
//! an `Arc<dyn Renderer>` and ask it for a page or a string. [`Templates`] is
//! the implementation backed by [`minijinja`]. It keeps one environment per
//! [`AppKey`], so a single process can serve several template configurations
//! side by side.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use minijinja::Environment;
use serde_json::{Value, json};

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

// ── AppKey ────────────────────────────────────────────────────────────────────

/// Selects one template environment inside a [`Templates`] registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppKey(Cow<'static, str>);

impl AppKey {
    pub const DEFAULT: AppKey = AppKey(Cow::Borrowed("default"));

    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AppKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for AppKey {
    fn from(key: &'static str) -> Self {
        Self::new(key)
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Text encoding of rendered pages, advertised as the `charset`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum Encoding {
    #[default]
    Utf8,
}

impl Encoding {
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self, Error> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(Error::InvalidArgument(format!("unsupported encoding `{other}`"))),
        }
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

/// Turns a template name, a request and a context into output.
pub trait Renderer: Send + Sync {
    /// Renders `name` to a string using the environment under `app_key`.
    fn render_string(
        &self,
        name: &str,
        request: &Request,
        context: &Context,
        app_key: &AppKey,
    ) -> Result<String, Error>;

    /// Renders `name` into a `200 OK` HTML response.
    fn render_template(
        &self,
        name: &str,
        request: &Request,
        context: &Context,
        app_key: &AppKey,
        encoding: Encoding,
    ) -> Result<Response, Error> {
        let html = self.render_string(name, request, context, app_key)?;
        Ok(Response::builder().html(html, encoding))
    }
}

// ── Templates ─────────────────────────────────────────────────────────────────

/// Registry of minijinja environments keyed by [`AppKey`].
///
/// Build it once at startup, wrap it in an `Arc` and hand clones to every
/// dispatcher.
///
/// ```rust
/// use std::sync::Arc;
/// use minijinja::Environment;
/// use tsu_page::Templates;
///
/// let mut env = Environment::new();
/// env.add_template_owned("index.html", "<h1>{{ title }}</h1>").unwrap();
/// let templates = Arc::new(Templates::new().with_default(env));
/// ```
#[derive(Default)]
pub struct Templates {
    envs: HashMap<AppKey, Environment<'static>>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose default environment loads templates from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(dir.as_ref().to_path_buf()));
        Self::new().with_default(env)
    }

    /// Registers `env` under `key`, replacing any previous environment.
    pub fn with_app(mut self, key: impl Into<AppKey>, env: Environment<'static>) -> Self {
        self.envs.insert(key.into(), env);
        self
    }

    pub fn with_default(self, env: Environment<'static>) -> Self {
        self.with_app(AppKey::DEFAULT, env)
    }

    pub fn environment(&self, key: &AppKey) -> Option<&Environment<'static>> {
        self.envs.get(key)
    }
}

impl Renderer for Templates {
    fn render_string(
        &self,
        name: &str,
        request: &Request,
        context: &Context,
        app_key: &AppKey,
    ) -> Result<String, Error> {
        let env = self
            .envs
            .get(app_key)
            .ok_or_else(|| Error::UnknownApp(app_key.clone()))?;
        let render_err = |source| Error::Render { name: name.to_owned(), source };
        let template = env.get_template(name).map_err(render_err)?;

        let mut vars = context.clone().into_inner();
        vars.entry("request").or_insert_with(|| request_vars(request));
        template.render(&vars).map_err(render_err)
    }
}

/// What templates see as `request`.
fn request_vars(request: &Request) -> Value {
    json!({
        "method": request.method().as_str(),
        "path": request.path(),
        "query": request.query().unwrap_or_default(),
        "params": request.params(),
    })
}
