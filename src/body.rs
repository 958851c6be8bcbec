//! Incoming request body.
//!
//! [`Body`] is an [`AsyncRead`] over whatever produces the bytes: an
//! in-memory buffer, hyper's streaming [`Incoming`], or a wrapper installed by
//! middleware (the recorder substitutes one that copies what the handler
//! reads). Nothing is buffered ahead of the handler's reads.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use hyper::body::{Body as _, Incoming};
use tokio::io::{AsyncRead, ReadBuf};

/// A readable body source that can be type-erased inside a [`Body`].
pub trait BodyRead: AsyncRead + Send + Unpin {
    /// Releases the underlying source. Reads after `close` yield EOF or an
    /// error, depending on the source.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodyRead for io::Cursor<Bytes> {}

/// The body of a [`Request`](crate::Request).
///
/// Read it with [`tokio::io::AsyncReadExt`]:
///
/// ```rust
/// use httpkit::Body;
/// use tokio::io::AsyncReadExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let mut body = Body::from("hello");
/// let mut text = String::new();
/// body.read_to_string(&mut text).await?;
/// assert_eq!(text, "hello");
/// # Ok(())
/// # }
/// ```
pub struct Body {
    inner: Option<Box<dyn BodyRead>>,
}

impl Body {
    /// A body with no bytes.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Wraps any [`BodyRead`] source.
    pub fn new(source: impl BodyRead + 'static) -> Self {
        Self { inner: Some(Box::new(source)) }
    }

    /// Wraps hyper's streaming request body.
    pub fn from_incoming(incoming: Incoming) -> Self {
        Self::new(IncomingReader { body: incoming, chunk: Bytes::new() })
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Closes the underlying source. Closing an empty body is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(source) => source.close(),
            None => Ok(()),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("empty", &self.is_empty()).finish()
    }
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(source) => Pin::new(source.as_mut()).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl BodyRead for Body {
    fn close(&mut self) -> io::Result<()> {
        Body::close(self)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::new(io::Cursor::new(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

// ── hyper adapter ─────────────────────────────────────────────────────────────

/// Turns hyper's frame stream into a byte reader. Trailers are skipped.
struct IncomingReader {
    body: Incoming,
    chunk: Bytes,
}

impl AsyncRead for IncomingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if !self.chunk.is_empty() {
                let n = self.chunk.len().min(buf.remaining());
                buf.put_slice(&self.chunk[..n]);
                self.chunk.advance(n);
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut self.body).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.chunk = data;
                    }
                }
                Some(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl BodyRead for IncomingReader {}
