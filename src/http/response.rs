//! Outgoing responses.
//!
//! Handlers build a response with the chained setters; middleware then
//! edits it in place (validator headers, a 304 rewrite) before the server
//! serializes it.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// Status, header fields, and body of one reply.
///
/// # Examples
///
/// ```
/// use http304::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Adds a header field; earlier fields with the same name stay.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Like [`add_header`](Self::add_header), but drops earlier fields with
    /// the same name first.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    #[must_use]
    pub fn body(self, body: impl Into<String>) -> Self {
        self.body_bytes(body.into())
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// `false` makes the serialized response announce `Connection: close`.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Discards everything written so far: headers, body, and status (back
    /// to `200 OK`). The connection disposition is kept.
    pub fn clear(&mut self) {
        self.status = StatusCode::Ok;
        self.headers.clear();
        self.body.clear();
    }

    /// Encodes the response for the wire.
    ///
    /// A non-empty body without a `Content-Type` is labelled as UTF-8 text.
    /// `Content-Length` is computed here, except for 204 and 304, which are
    /// sent with neither a body nor a length.
    pub fn into_bytes(self) -> BytesMut {
        let Self {
            status,
            mut headers,
            mut body,
            keep_alive,
        } = self;

        let framed = status.allows_body();
        if !framed {
            body.clear();
        }
        if !body.is_empty() && !headers.contains("content-type") {
            headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        headers.insert("Connection", if keep_alive { "keep-alive" } else { "close" });
        if framed {
            headers.insert("Content-Length", body.len().to_string());
        }

        let head = format!("HTTP/1.1 {status}\r\n{headers}\r\n");
        let mut buf = BytesMut::with_capacity(head.len() + body.len());
        buf.put(head.as_bytes());
        buf.put(body.as_slice());
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
