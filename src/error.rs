//! Unified error type.

use http::StatusCode;

use crate::render::AppKey;

/// A boxed error returned by application handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by the page layer and the server.
///
/// Dispatchers never recover from an error: they log it and hand it back
/// unchanged. Turning it into an HTTP response is the host's job, done by the
/// [`IntoResponse`](crate::IntoResponse) impl for `Result<T, Error>`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dispatcher or view was configured or called with a malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A context needs rendering but no template was configured.
    #[error("`{handler}` should specify a template or return a string")]
    TemplateMissing { handler: String },

    /// A handler produced a value of the wrong shape.
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// No template environment is registered under the requested key.
    #[error("no template environment registered for app key `{0}`")]
    UnknownApp(AppKey),

    /// The template engine failed to load or render a template.
    #[error("template `{name}`: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// The request body could not be decoded as form data.
    #[error("form: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    /// A request body was submitted with a content type the form layer does
    /// not decode.
    #[error("unsupported content type `{content_type}`, expected application/x-www-form-urlencoded")]
    UnsupportedMediaType { content_type: String },

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An error raised by application code, passed through as-is.
    #[error(transparent)]
    Handler(BoxError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an application error.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// The status code the host answers with when this error escapes a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Form(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self {
        Self::Handler(err)
    }
}

/// Names the JSON kind of `value` for [`Error::TypeMismatch`].
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
