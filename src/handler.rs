//! Handler contracts and type erasure.
//!
//! Two handler kinds exist:
//!
//! - [`Handler`] is the error-aware contract used behind the router. It
//!   returns `Result<(), Error>` so a single place (middleware or the
//!   router's last-resort handler) decides how failures are rendered.
//! - [`NetHandler`] is the raw contract the server talks to. It has no error
//!   channel; the [`Router`](crate::Router) itself is one.
//!
//! # How async handlers are stored
//!
//! Both traits return a [`BoxFuture`] that borrows the response sink and the
//! request for the duration of one call:
//!
//! ```text
//! handler_fn(|w, r| Box::pin(async move { … }))   ← user writes this
//!        ↓
//! HandlerFn(closure)                              ← implements Handler
//!        ↓  into_boxed_handler()
//! Arc<dyn Handler>                                ← stored in the route table
//!        ↓
//! handler.serve(w, r)  at request time            ← one vtable dispatch
//! ```
//!
//! A closure cannot lend its own captures to the future it returns, so
//! closures that hold an `Arc` (typically `next` in a middleware) clone it
//! before `Box::pin`. Struct handlers can borrow `self` instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::ResponseWriter;

/// A heap-allocated, type-erased future borrowing its inputs for `'a`.
///
/// `Send` lets tokio move the request task across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared, type-erased error-aware handler.
pub type BoxHandler = Arc<dyn Handler>;

/// A shared, type-erased raw handler.
pub type BoxNetHandler = Arc<dyn NetHandler>;

// ── Error-aware handler ───────────────────────────────────────────────────────

/// Handles one request and reports failure through its return value.
///
/// Headers, status and body may already have been written when an error is
/// returned (a failed write, for instance); whoever renders the error must
/// not assume the response is untouched.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, Result<(), Error>>;

    /// Moves the handler behind an `Arc<dyn Handler>`.
    fn into_boxed_handler(self) -> BoxHandler
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (**self).serve(w, r)
    }
}

/// Adapts a closure into a [`Handler`].
///
/// ```rust
/// use httpkit::{handler_fn, ResponseWriter};
/// use http::StatusCode;
///
/// let created = handler_fn(|w, _r| {
///     Box::pin(async move {
///         w.write_header(StatusCode::CREATED);
///         Ok(())
///     })
/// });
/// # let _ = created;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a mut Request) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

/// A [`Handler`] built from a closure by [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a mut Request) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (self.0)(w, r)
    }
}

// ── Raw handler ───────────────────────────────────────────────────────────────

/// Handles one request without an error channel.
pub trait NetHandler: Send + Sync + 'static {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, ()>;

    /// Moves the handler behind an `Arc<dyn NetHandler>`.
    fn into_boxed_net_handler(self) -> BoxNetHandler
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

impl<H: NetHandler + ?Sized> NetHandler for Arc<H> {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, ()> {
        (**self).serve_http(w, r)
    }
}

/// Adapts a closure into a [`NetHandler`].
pub fn net_handler_fn<F>(f: F) -> NetHandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a mut Request) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    NetHandlerFn(f)
}

/// A [`NetHandler`] built from a closure by [`net_handler_fn`].
#[derive(Clone, Copy)]
pub struct NetHandlerFn<F>(F);

impl<F> NetHandler for NetHandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a mut Request) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, ()> {
        (self.0)(w, r)
    }
}
