//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header};
use serde::de::DeserializeOwned;

use crate::error::Error;

/// An incoming HTTP request.
///
/// Cloning is one `Arc` increment. Dispatchers keep a clone so the request
/// is still available to the template engine after the handler has run.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Parts>,
}

struct Parts {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self { inner: Arc::new(Parts { method, uri, headers, body, params }) }
    }

    /// Builder for requests assembled outside the server, e.g. in tests.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.inner.method }
    pub fn uri(&self) -> &Uri { &self.inner.uri }
    pub fn path(&self) -> &str { self.inner.uri.path() }
    pub fn query(&self) -> Option<&str> { self.inner.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }
    pub fn body(&self) -> &[u8] { &self.inner.body }

    /// Header lookup. Values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.inner.params }

    /// Whether the body is declared as `application/x-www-form-urlencoded`.
    pub fn is_form(&self) -> bool {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
    }

    /// Submitted form fields, in body order.
    ///
    /// Returns empty data for anything other than a `POST`. A non-empty body
    /// that is not declared urlencoded is [`Error::UnsupportedMediaType`].
    pub fn post(&self) -> Result<FormData, Error> {
        if self.inner.method != Method::POST || self.inner.body.is_empty() {
            return Ok(FormData::default());
        }
        self.require_form()?;
        let pairs = serde_urlencoded::from_bytes(&self.inner.body)?;
        Ok(FormData(pairs))
    }

    /// Decodes the urlencoded body into `T`.
    ///
    /// An empty body decodes as no fields. Any other body must be declared
    /// `application/x-www-form-urlencoded`.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.inner.body.is_empty() {
            self.require_form()?;
        }
        Ok(serde_urlencoded::from_bytes(&self.inner.body)?)
    }

    fn require_form(&self) -> Result<(), Error> {
        if self.is_form() {
            return Ok(());
        }
        Err(Error::UnsupportedMediaType {
            content_type: self.header(header::CONTENT_TYPE.as_str()).unwrap_or_default().to_owned(),
        })
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .finish_non_exhaustive()
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Defaults to `GET /` with no body.
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request target.
    ///
    /// # Panics
    ///
    /// Panics if `uri` is not a valid request target.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.parse().unwrap_or_else(|e| panic!("invalid uri `{uri}`: {e}"));
        self
    }

    /// Appends a header.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` are not valid header text.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::try_from(name).unwrap_or_else(|e| panic!("invalid header `{name}`: {e}"));
        let value = HeaderValue::try_from(value).unwrap_or_else(|e| panic!("invalid header value: {e}"));
        self.headers.append(name, value);
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// `POST` with a urlencoded body built from `fields`.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let body = serde_urlencoded::to_string(fields).unwrap_or_default();
        self.method(Method::POST)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
    }

    pub fn build(self) -> Request {
        Request::new(self.method, self.uri, self.headers, self.body, self.params)
    }
}

// ── FormData ──────────────────────────────────────────────────────────────────

/// Decoded `application/x-www-form-urlencoded` fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData(Vec<(String, String)>);

impl FormData {
    /// First value submitted for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Every value submitted for `name`, e.g. from a multi-select.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter(move |(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_get_root() {
        let req = Request::builder().build();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.path(), "/");
        assert!(req.body().is_empty());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::builder().header("X-Request-Id", "abc").build();
        assert_eq!(req.header("x-request-id"), Some("abc"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn post_decodes_fields_in_order() {
        let req = Request::builder()
            .uri("/signup")
            .form(&[("name", "alice"), ("tag", "a"), ("tag", "b")])
            .build();
        assert!(req.is_form());
        let data = req.post().unwrap();
        assert_eq!(data.get("name"), Some("alice"));
        assert_eq!(data.get_all("tag").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(data.len(), 3);
    }

    #[test]
    fn post_is_empty_for_get() {
        let req = Request::builder().body("name=alice").build();
        assert!(req.post().unwrap().is_empty());
    }

    #[test]
    fn post_rejects_bodies_that_are_not_urlencoded() {
        let req = Request::builder()
            .method(Method::POST)
            .header("content-type", "application/json")
            .body(r#"{"email":"a@b.c"}"#)
            .build();
        assert!(!req.is_form());

        let err = req.post().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType { ref content_type } if content_type == "application/json"));
        assert_eq!(err.status_code(), http::StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let untyped = Request::builder().method(Method::POST).body("email=a@b.c").build();
        assert!(matches!(untyped.post(), Err(Error::UnsupportedMediaType { .. })));
        assert!(matches!(untyped.form::<Vec<(String, String)>>(), Err(Error::UnsupportedMediaType { .. })));
    }

    #[test]
    fn post_accepts_charset_parameters() {
        let req = Request::builder()
            .method(Method::POST)
            .header("content-type", "application/x-www-form-urlencoded; charset=UTF-8")
            .body("email=a%40b.c")
            .build();
        assert_eq!(req.post().unwrap().get("email"), Some("a@b.c"));
    }

    #[test]
    fn empty_post_is_empty_data_whatever_the_type() {
        let req = Request::builder().method(Method::POST).header("content-type", "application/json").build();
        assert!(req.post().unwrap().is_empty());
    }

    #[test]
    fn form_deserializes_typed_struct() {
        #[derive(serde::Deserialize)]
        struct Login {
            user: String,
            remember: bool,
        }

        let req = Request::builder().form(&[("user", "bob"), ("remember", "true")]).build();
        let login: Login = req.form().unwrap();
        assert_eq!(login.user, "bob");
        assert!(login.remember);
    }

    #[test]
    fn query_and_params_are_exposed() {
        let req = Request::builder().uri("/users/7?tab=posts").param("id", "7").build();
        assert_eq!(req.path(), "/users/7");
        assert_eq!(req.query(), Some("tab=posts"));
        assert_eq!(req.param("id"), Some("7"));
    }
}
