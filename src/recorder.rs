//! Request/response recording.
//!
//! [`record`] installs a [`Recorder`] between the server and the rest of the
//! chain. The recorder stands in for both the response sink and the request
//! body, so it sees exactly what the handler reads and writes, when it
//! happens, without changing either:
//!
//! - request bytes are copied as the handler reads them, never ahead;
//! - the first status write commits the status code and the response time;
//! - response bytes are copied as they are forwarded to the real sink.
//!
//! Anything holding the sink can find the [`LogEntry`] with [`log_entry`],
//! even through writers other middleware wrapped around the recorder.
//!
//! Entries and their buffers are pooled. [`Recorder::checkout`] resets an
//! entry before a request sees it; [`Recorder::finish`] hands the buffers
//! back and detaches the entry from the request before returning it.

use std::io;
use std::mem;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use parking_lot::{Mutex, MutexGuard};
use tokio::io::{AsyncRead, ReadBuf};

use crate::body::{Body, BodyRead};
use crate::handler::{BoxFuture, BoxNetHandler, NetHandler};
use crate::middleware::NetMiddleware;
use crate::pool::{BufferPool, Pool};
use crate::request::Request;
use crate::response::ResponseWriter;

static ENTRIES: Pool<Box<LogEntry>> = Pool::new(LogEntry::idle, 1024);

/// Capture buffers above 64 KiB are freed rather than pooled.
static BUFFERS: BufferPool = BufferPool::new(2048, 64 * 1024);

// ── LogEntry ──────────────────────────────────────────────────────────────────

/// What the recorder observed for one request.
pub struct LogEntry {
    status: Option<StatusCode>,
    requested_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    discard_res_body: bool,
    res_body: BytesMut,
    // Shared with the substituted request body, which appends as it is read.
    req: Arc<Mutex<Capture>>,
}

#[derive(Default)]
struct Capture {
    body: BytesMut,
    discard: bool,
}

impl LogEntry {
    fn idle() -> Box<Self> {
        Box::new(Self {
            status: None,
            requested_at: DateTime::default(),
            responded_at: None,
            discard_res_body: false,
            res_body: BytesMut::new(),
            req: Arc::default(),
        })
    }

    /// Zeroes every field and draws fresh buffers.
    fn reset(&mut self) {
        self.status = None;
        self.responded_at = None;
        self.discard_res_body = false;
        self.res_body = BUFFERS.get();

        let capture = Capture { body: BUFFERS.get(), discard: false };
        match Arc::get_mut(&mut self.req) {
            Some(req) => *req.get_mut() = capture,
            None => self.req = Arc::new(Mutex::new(capture)),
        }

        self.requested_at = Utc::now();
    }

    /// Returns the buffers to the pool.
    fn release(&mut self) {
        BUFFERS.put(mem::take(&mut self.res_body));
        match Arc::get_mut(&mut self.req) {
            Some(req) => BUFFERS.put(mem::take(&mut req.get_mut().body)),
            // Someone kept the recording body alive; never share it with the
            // next request.
            None => self.req = Arc::default(),
        }
    }

    /// The committed status, `None` until the first write.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// When the status was committed, `None` until the first write.
    pub fn responded_at(&self) -> Option<DateTime<Utc>> {
        self.responded_at
    }

    /// Time from request entry to status commit.
    pub fn latency(&self) -> Option<chrono::Duration> {
        self.responded_at.map(|at| at - self.requested_at)
    }

    /// The request bytes the handler has read so far.
    ///
    /// The returned guard locks the capture; drop it before the next read of
    /// the request body and never hold it across an `.await`.
    pub fn req_body(&self) -> impl Deref<Target = [u8]> + '_ {
        MutexGuard::map(self.req.lock(), |c| &mut c.body[..])
    }

    /// The response bytes written so far.
    pub fn res_body(&self) -> &[u8] {
        &self.res_body
    }

    pub fn discards_req_body(&self) -> bool {
        self.req.lock().discard
    }

    pub fn discards_res_body(&self) -> bool {
        self.discard_res_body
    }

    /// Stops (or resumes) copying request bytes. Bytes already captured stay.
    pub fn set_discard_req_body(&mut self, discard: bool) {
        self.req.lock().discard = discard;
    }

    /// Stops (or resumes) copying response bytes. Bytes already captured stay.
    pub fn set_discard_res_body(&mut self, discard: bool) {
        self.discard_res_body = discard;
    }
}

// ── Recorder ──────────────────────────────────────────────────────────────────

/// The recording [`ResponseWriter`] wrapped around one request's sink.
pub struct Recorder<'w> {
    inner: &'w mut dyn ResponseWriter,
    entry: Box<LogEntry>,
}

impl<'w> Recorder<'w> {
    /// Draws a reset entry from the pool, wraps `w`, and substitutes the
    /// recording reader for the request body.
    pub fn checkout(w: &'w mut dyn ResponseWriter, r: &mut Request) -> Self {
        let mut entry = ENTRIES.get();
        entry.reset();

        let original = r.replace_body(Body::empty());
        r.replace_body(Body::new(RecordingBody {
            inner: original,
            capture: Arc::clone(&entry.req),
        }));

        Self { inner: w, entry }
    }

    pub fn entry(&self) -> &LogEntry {
        &self.entry
    }

    /// Detaches the request body, returns the buffers and the entry to their
    /// pools, and releases the sink.
    pub fn finish(self, r: &mut Request) {
        let Self { inner: _, mut entry } = self;
        drop(r.replace_body(Body::empty()));
        entry.release();
        ENTRIES.put(entry);
    }
}

impl ResponseWriter for Recorder<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.entry.responded_at.is_some() {
            return;
        }

        self.inner.write_header(status);
        self.entry.status = Some(status);
        self.entry.responded_at = Some(Utc::now());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.entry.responded_at.is_none() {
            self.write_header(StatusCode::OK);
        }

        let n = self.inner.write(buf)?;
        if !self.entry.discard_res_body {
            self.entry.res_body.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    fn inner(&self) -> Option<&dyn ResponseWriter> {
        Some(&*self.inner)
    }

    fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
        Some(&mut *self.inner)
    }

    fn log_entry(&self) -> Option<&LogEntry> {
        Some(&self.entry)
    }

    fn log_entry_mut(&mut self) -> Option<&mut LogEntry> {
        Some(&mut self.entry)
    }
}

/// The request body the handler sees while a recorder is installed.
struct RecordingBody {
    inner: Body,
    capture: Arc<Mutex<Capture>>,
}

impl AsyncRead for RecordingBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;

        let read = &buf.filled()[before..];
        if !read.is_empty() {
            let mut capture = self.capture.lock();
            if !capture.discard {
                capture.body.extend_from_slice(read);
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl BodyRead for RecordingBody {
    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

/// Finds the [`LogEntry`] behind `w`, unwrapping writers until the recorder
/// turns up or no writer is left.
pub fn log_entry(mut w: &dyn ResponseWriter) -> Option<&LogEntry> {
    loop {
        if let Some(entry) = w.log_entry() {
            return Some(entry);
        }
        w = w.inner()?;
    }
}

/// Mutable variant of [`log_entry`], used to flip the discard flags.
pub fn log_entry_mut(mut w: &mut dyn ResponseWriter) -> Option<&mut LogEntry> {
    loop {
        if w.log_entry().is_some() {
            return w.log_entry_mut();
        }
        w = w.inner_mut()?;
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// A net middleware that records every request passing through it.
///
/// Place it outermost so the timestamps cover the whole chain:
///
/// ```rust
/// use httpkit::{NetHandler, NetMiddleware, Router, middleware, record};
///
/// let root = NetMiddleware::reduce([record(), middleware::cors(Default::default())])
///     .then(Router::new().into_boxed_net_handler());
/// # let _ = root;
/// ```
pub fn record() -> NetMiddleware {
    NetMiddleware::new(|next| Arc::new(RecordLogEntry { next }))
}

struct RecordLogEntry {
    next: BoxNetHandler,
}

impl NetHandler for RecordLogEntry {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut rec = Recorder::checkout(w, r);
            self.next.serve_http(&mut rec, r).await;
            rec.finish(r);
        })
    }
}
