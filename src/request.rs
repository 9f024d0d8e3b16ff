//! Incoming HTTP request type.

use crate::method::Method;

/// An incoming request, detached from the wire.
///
/// The query string is split off the path at construction, so
/// [`path`](Request::path) is exactly what the route table is keyed on.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (uri, None),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First raw value of a query-string key. No percent-decoding.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query()?
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_from_path() {
        let req = Request::get("/users?page=2&sort");
        assert_eq!(req.path(), "/users");
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("sort"), Some(""));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn empty_path_is_root() {
        assert_eq!(Request::get("?x=1").path(), "/");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::get("/").with_header("Content-Type", "text/html");
        assert_eq!(req.header("content-type"), Some("text/html"));
    }
}
