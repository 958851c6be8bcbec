//! The response sink.
//!
//! Handlers write through [`ResponseWriter`]: headers first, then a status,
//! then body bytes. The server hands the root handler a [`Response`], which
//! buffers everything and becomes an `http::Response` once the handler chain
//! returns. Middleware may wrap the sink in its own writer; wrappers expose
//! the writer they wrap through [`ResponseWriter::inner`] so capabilities
//! further down (the recorder's [`LogEntry`]) stay reachable.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;

use crate::recorder::LogEntry;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values written by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Json,        // application/json; charset=UTF-8
    ProblemJson, // application/problem+json; charset=UTF-8
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json        => "application/json; charset=UTF-8",
            Self::ProblemJson => "application/problem+json; charset=UTF-8",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }

    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The outgoing side of one request/response cycle.
///
/// The first status written is the one that counts. Writing body bytes
/// before any status commits `200 OK`.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status code. Calls after the first are ignored.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, committing `200 OK` first if nothing was committed.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes the whole buffer or fails.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// The writer this one wraps, if it is a wrapper.
    fn inner(&self) -> Option<&dyn ResponseWriter> {
        None
    }

    fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
        None
    }

    /// The recorded entry, if this writer is the recorder.
    fn log_entry(&self) -> Option<&LogEntry> {
        None
    }

    fn log_entry_mut(&mut self) -> Option<&mut LogEntry> {
        None
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A buffered [`ResponseWriter`].
///
/// Nothing reaches the network until the handler chain returns and the
/// server calls [`Response::into_http`], so headers added after the status
/// (for example by a middleware unwinding) are still sent.
///
/// It is also the in-memory recorder for tests:
///
/// ```rust
/// use httpkit::{Response, ResponseWriter};
/// use http::StatusCode;
///
/// let mut res = Response::new();
/// res.write_all(b"hello").unwrap();
/// res.write_header(StatusCode::BAD_REQUEST); // ignored, 200 was committed
///
/// assert_eq!(res.status(), StatusCode::OK);
/// assert_eq!(res.body(), b"hello");
/// ```
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, `200 OK` when nothing was committed.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Converts the buffered response into what hyper sends.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for Response {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}
