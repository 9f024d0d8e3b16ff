//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Route handlers return whatever is natural (a view, a JSON value, a
//! string, nothing) and the router turns it into a [`Response`]. Handlers
//! that need a custom status or headers build one directly.

use bytes::Bytes;
use http_body_util::Full;

use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

pub enum ContentType {
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A response as a handler or the router produced it.
///
/// ```rust
/// use trellis::{Response, Status};
///
/// let page = Response::html("<h1>Posts</h1>");
/// assert_eq!(page.header("content-type"), Some("text/html; charset=utf-8"));
///
/// let stored = Response::builder()
///     .status(Status::Created)
///     .header("location", "/posts/7")
///     .json(serde_json::to_vec(&serde_json::json!({ "id": 7 })).unwrap());
/// assert_eq!(stored.status_code(), 201);
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: u16,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body)
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code.into() }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.into() }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// The body as UTF-8 text, lossily decoded.
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` type hyper writes to the wire.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Full::new(Bytes::from(self.body))).unwrap_or_else(|_| {
            // Only reachable with a header name or value hyper rejects.
            let mut fallback = http::Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: Status) -> Self {
        self.status = code.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: Vec<u8>) -> Response {
        self.bytes(ContentType::Json, body)
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes(ContentType::Text, body.into().into_bytes())
    }

    pub fn html(self, body: impl Into<String>) -> Response {
        self.bytes(ContentType::Html, body.into().into_bytes())
    }

    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.as_str().to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }

    pub fn no_body(self) -> Response {
        Response { body: Vec::new(), headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
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

impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Arrays and objects are sent as JSON.
impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self) {
            Ok(bytes) => Response::json(bytes),
            Err(_) => Response::status(Status::InternalServerError),
        }
    }
}

/// Nothing to send.
impl IntoResponse for () {
    fn into_response(self) -> Response { Response::status(Status::NoContent) }
}
