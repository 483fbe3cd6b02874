//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] either carries its whole body in memory or streams it.
//! Templates, fragments and redirects use the former. Large static files use
//! the latter.

use std::io;

use bytes::Bytes;
use futures_util::stream::{BoxStream, TryStreamExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;

use crate::error::Error;
use crate::render::Encoding;

/// A boxed stream of body chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// The body type handed to hyper.
pub(crate) type HyperBody = UnsyncBoxBody<Bytes, io::Error>;

pub(crate) enum Body {
    Full(Bytes),
    Stream(ByteStream),
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts
///
/// ```rust
/// use tsu_page::Response;
/// use tsu_page::StatusCode;
///
/// Response::html("<h1>hi</h1>");
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::redirect("/done");
/// ```
///
/// # Builder
///
/// ```rust
/// use tsu_page::Response;
/// use tsu_page::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .bytes("application/json", br#"{"id":42}"#.to_vec());
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body, Encoding::Utf8)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION.as_str(), location)
            .no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }

    /// Overwrites the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The in-memory body, or `None` for a streamed response.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Full(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    /// Whether the body is sent with chunked transfer.
    pub fn is_streamed(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Drains the body, streamed or not, into one buffer.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self.body {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(chunks.concat().into())
            }
        }
    }

    pub(crate) fn into_inner(self) -> http::Response<HyperBody> {
        let body: HyperBody = match self.body {
            Body::Full(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
            Body::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
        };
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("streamed", &self.is_streamed())
            .finish()
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Terminate with an HTML body declared in `encoding`.
    pub fn html(self, body: impl Into<String>, encoding: Encoding) -> Response {
        let content_type = format!("text/html; charset={}", encoding.label());
        self.bytes(&content_type, body.into().into_bytes())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with an in-memory body and an explicit `Content-Length`.
    pub fn bytes(mut self, content_type: &str, body: impl Into<Bytes>) -> Response {
        let body = body.into();
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.content_type(content_type);
        Response { body: Body::Full(body), headers: self.headers, status: self.status }
    }

    /// Terminate with a streamed body. No length is sent, so HTTP/1.1 peers
    /// receive chunked transfer.
    pub fn stream(mut self, content_type: &str, stream: ByteStream) -> Response {
        self.content_type(content_type);
        Response { body: Body::Stream(stream), headers: self.headers, status: self.status }
    }

    /// Terminate with no body (e.g. `204 No Content`, `302 Found`).
    pub fn no_body(self) -> Response {
        Response { body: Body::Full(Bytes::new()), headers: self.headers, status: self.status }
    }

    fn content_type(&mut self, value: &str) {
        if let Ok(value) = HeaderValue::try_from(value) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Everything a route handler returns goes through this trait.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Errors that escape a handler become a bare status response. The detail
/// has already been logged by whichever dispatcher raised it.
impl<T: IntoResponse> IntoResponse for Result<T, Error> {
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(err) => {
                let status = err.status_code();
                Response::builder()
                    .status(status)
                    .text(status.canonical_reason().unwrap_or_default())
            }
        }
    }
}
