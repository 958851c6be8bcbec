//! Middleware composition.
//!
//! A middleware turns one handler into another. Two kinds exist and they do
//! not mix:
//!
//! - [`NetMiddleware`] wraps [`NetHandler`]s. It runs before the router and
//!   never sees handler errors (CORS, the recorder).
//! - [`MuxMiddleware`] wraps [`Handler`]s behind the router. It sees the
//!   error a handler returns and may map it (access logging, error
//!   rendering).
//!
//! [`Middleware::reduce`] nests a list so the first one listed is the
//! outermost: `reduce([m1, m2, m3]).then(h)` is `m1(m2(m3(h)))`.

use std::fmt;
use std::sync::Arc;

use crate::handler::{Handler, NetHandler};

mod access_log;
mod cors;

pub use access_log::access_log;
pub use cors::{AllowedOrigins, CorsConfig, cors};

/// Middleware over error-aware handlers.
pub type MuxMiddleware = Middleware<dyn Handler>;

/// Middleware over raw handlers.
pub type NetMiddleware = Middleware<dyn NetHandler>;

type Wrap<H> = dyn Fn(Arc<H>) -> Arc<H> + Send + Sync;

/// A transformation from one handler to another.
///
/// ```rust
/// use std::sync::Arc;
/// use httpkit::{Handler, MuxMiddleware, handler_fn};
///
/// let timing = MuxMiddleware::new(|next| {
///     handler_fn(move |w, r| {
///         let next = Arc::clone(&next);
///         Box::pin(async move {
///             let started = std::time::Instant::now();
///             let result = next.serve(w, r).await;
///             tracing::debug!(elapsed = ?started.elapsed(), "handled");
///             result
///         })
///     })
///     .into_boxed_handler()
/// });
/// # let _ = timing;
/// ```
pub struct Middleware<H: ?Sized> {
    wrap: Arc<Wrap<H>>,
}

impl<H: ?Sized + 'static> Middleware<H> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Arc<H>) -> Arc<H> + Send + Sync + 'static,
    {
        Self { wrap: Arc::new(f) }
    }

    /// Returns the handler it is given.
    pub fn identity() -> Self {
        Self::new(|next| next)
    }

    /// Applies the middleware to `next`.
    pub fn then(&self, next: Arc<H>) -> Arc<H> {
        (self.wrap)(next)
    }

    /// Nests `middlewares` in listed order, first listed outermost.
    ///
    /// An empty list is the identity. Each [`then`](Self::then) call on the
    /// result builds a fresh chain; chains share no mutable state.
    pub fn reduce<I>(middlewares: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let chain: Vec<Self> = middlewares.into_iter().collect();
        Self::new(move |mut next| {
            for m in chain.iter().rev() {
                next = m.then(next);
            }
            next
        })
    }
}

impl<H: ?Sized> Clone for Middleware<H> {
    fn clone(&self) -> Self {
        Self { wrap: Arc::clone(&self.wrap) }
    }
}

impl<H: ?Sized + 'static> Default for Middleware<H> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<H: ?Sized> fmt::Debug for Middleware<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}
