//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Why a buffer could not be turned into a [`Request`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request head not yet complete")]
    Incomplete,

    #[error("malformed request: {0}")]
    Parse(#[from] httparse::Error),

    #[error("request line has no {field}")]
    MissingField { field: &'static str },
}

/// One parsed request.
///
/// Built by [`Request::parse`]. Before dispatch the server stamps it with
/// the peer's socket address, which address-bound validators are tied to.
///
/// # Examples
///
/// ```
/// use http304::http::request::Request;
///
/// let raw = b"GET /articles/7?lang=de HTTP/1.1\r\nHost: localhost\r\nIf-None-Match: \"x\"\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/articles/7");
/// assert_eq!(request.query_param("lang"), Some("de"));
/// assert_eq!(request.headers().get("if-none-match"), Some("\"x\""));
/// assert!(request.remote_addr().is_none());
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    params: HashMap<String, String>,
    /// Minor version of HTTP/1.x.
    minor_version: u8,
    headers: Headers,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses the request at the front of `buf`.
    ///
    /// On success, also returns where the body starts in `buf`. The body
    /// holds at most `Content-Length` bytes of whatever follows; bytes past
    /// that belong to the next pipelined request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] when the head is still partial,
    /// [`RequestError::Parse`] for malformed input, and
    /// [`RequestError::MissingField`] when the request line lacks a part.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut head = httparse::Request::new(&mut slots);

        let httparse::Status::Complete(body_offset) = head.parse(buf)? else {
            return Err(RequestError::Incomplete);
        };

        let token = head.method.ok_or(RequestError::MissingField { field: "method" })?;
        let target = head.path.ok_or(RequestError::MissingField { field: "path" })?;
        let minor_version = head
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        // A validator sent as non-UTF-8 is treated as absent.
        let headers: Headers = head
            .headers
            .iter()
            .filter_map(|h| Some((h.name, std::str::from_utf8(h.value).ok()?)))
            .collect();

        let (path, query) = split_target(target);
        let params = query.map(parse_query_string).unwrap_or_default();

        let declared = headers
            .get("content-length")
            .and_then(|len| len.parse::<usize>().ok());
        let body_end = declared.map_or(buf.len(), |len| {
            body_offset.saturating_add(len).min(buf.len())
        });

        let request = Self {
            method: Method::from_token(token),
            path: path.to_owned(),
            query: query.map(str::to_owned),
            params,
            minor_version,
            headers,
            body: Bytes::copy_from_slice(&buf[body_offset..body_end]),
            remote_addr: None,
        };
        Ok((request, body_offset))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path component of the request target.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 0 for HTTP/1.0, 1 for HTTP/1.1.
    pub fn version(&self) -> u8 {
        self.minor_version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Query component of the request target, without `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Where the request came from, once the server has recorded it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.set_remote_addr(addr);
        self
    }

    /// Whether the connection may be reused after this exchange.
    ///
    /// An explicit `Connection` header decides; otherwise HTTP/1.1 stays
    /// open and HTTP/1.0 closes.
    pub fn is_keep_alive(&self) -> bool {
        self.headers
            .get("connection")
            .map_or(self.minor_version == 1, |value| {
                value.eq_ignore_ascii_case("keep-alive")
            })
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

/// `a=1&b=two+words` into pairs. `+` becomes a space; percent escapes are
/// left alone.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.replace('+', " "), value.replace('+', " "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_request_without_body() {
        let raw = b"HEAD /feed HTTP/1.1\r\nHost: cache.test\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Head);
        assert_eq!(req.path(), "/feed");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("HOST"), Some("cache.test"));
        assert!(req.body().is_empty());
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn non_utf8_header_is_dropped() {
        let raw = b"GET / HTTP/1.1\r\nIf-None-Match: \xff\xfe\r\nHost: a\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.headers().contains("if-none-match"));
        assert_eq!(req.headers().get("host"), Some("a"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            Request::parse(b"\x01\x02 nonsense\r\n\r\n"),
            Err(RequestError::Parse(_))
        ));
    }

    #[test]
    fn parse_query_string() {
        let raw = b"GET /search?q=rust+lang&page=2&flag HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust+lang&page=2&flag"));
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("flag"), Some(""));
    }

    #[test]
    fn repeated_validator_headers_are_kept() {
        let raw = b"GET / HTTP/1.1\r\nIf-None-Match: \"a\"\r\nIf-None-Match: \"b\"\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.headers().count("if-none-match"), 2);
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_rules() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());

        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());

        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\nHost: a\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
        assert_eq!(req.body().as_ref(), b"hello");
    }

    #[test]
    fn body_stops_at_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\nokGET / HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.body().as_ref(), b"ok");
    }

    #[test]
    fn remote_addr_is_recorded() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let addr: SocketAddr = "192.0.2.1:4000".parse().unwrap();
        let req = req.with_remote_addr(addr);
        assert_eq!(req.remote_addr(), Some(addr));
    }
}
