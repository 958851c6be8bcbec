//! Handler error type and the resolved-error marker.
//!
//! Handlers return [`Error`] instead of rendering failures themselves. An
//! error travels back up through the mux middleware chain and, if it is still
//! there when the chain returns, reaches the router's last-resort handler.
//!
//! The marker is part of the type: an error is either [`Error::Unresolved`]
//! (nobody has turned it into a response yet) or [`Error::Resolved`]
//! (a response describing it has already been written). Logging layers branch
//! on that variant to pick a severity.

use std::error::Error as StdError;
use std::fmt;

/// A type-erased error that can cross task boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The error returned by [`Handler`](crate::Handler)s.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into an
/// unresolved `Error`, so handlers can use `?` freely:
///
/// ```rust
/// use httpkit::Error;
///
/// fn parse(raw: &str) -> Result<u32, Error> {
///     Ok(raw.parse::<u32>()?)
/// }
///
/// let err = parse("x").unwrap_err();
/// assert!(!err.is_resolved());
/// assert!(err.resolve().is_resolved());
/// ```
///
/// `Error` does not implement [`std::error::Error`] (it would overlap the
/// blanket `From`). Reach the wrapped error with [`Error::get_ref`],
/// [`Error::downcast_ref`] or [`Error::into_inner`].
pub enum Error {
    /// Not yet rendered to the client.
    Unresolved(BoxError),
    /// Already mapped to a client-visible response.
    Resolved(BoxError),
}

impl Error {
    /// Wraps `err` as an unresolved error.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Unresolved(Box::new(err))
    }

    /// Wraps an already boxed error as an unresolved error.
    pub fn from_boxed(err: BoxError) -> Self {
        Self::Unresolved(err)
    }

    /// Builds an unresolved error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    /// Marks the error as resolved. Resolving twice is a no-op.
    #[must_use]
    pub fn resolve(self) -> Self {
        Self::Resolved(self.into_inner())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The wrapped error, regardless of the marker.
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        match self {
            Self::Unresolved(err) | Self::Resolved(err) => err.as_ref(),
        }
    }

    pub fn into_inner(self) -> BoxError {
        match self {
            Self::Unresolved(err) | Self::Resolved(err) => err,
        }
    }

    /// The wrapped error's own source, i.e. the next link of the chain.
    pub fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.get_ref().source()
    }

    /// Looks for a `T` anywhere in the wrapped error's chain, starting with
    /// the wrapped error itself.
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        let mut next: Option<&(dyn StdError + 'static)> = Some(self.get_ref());
        while let Some(err) = next {
            if let Some(found) = err.downcast_ref::<T>() {
                return Some(found);
            }
            next = err.source();
        }
        None
    }

    /// `true` when a `T` appears in the wrapped error's chain.
    pub fn is<T: StdError + 'static>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

/// Marks `err` as resolved: the response describing it has been written.
pub fn resolve(err: impl Into<Error>) -> Error {
    err.into().resolve()
}

impl<E> From<E> for Error
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.get_ref(), f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(err) => f.debug_tuple("Unresolved").field(err).finish(),
            Self::Resolved(err) => f.debug_tuple("Resolved").field(err).finish(),
        }
    }
}

impl From<Error> for BoxError {
    fn from(err: Error) -> Self {
        err.into_inner()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);
