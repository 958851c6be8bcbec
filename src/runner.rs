//! Process lifecycle: start, graceful stop, forced close.
//!
//! [`Runner`] is anything that serves until told to stop. [`GracefulRunner`]
//! drives one through a deploy-friendly shutdown:
//!
//! 1. serve until the trigger fires (SIGINT or SIGTERM by default);
//! 2. stop accepting and give in-flight requests `wait_timeout` to finish;
//! 3. if they do not, close every connection.
//!
//! When Kubernetes terminates a pod it sends SIGTERM and waits
//! `terminationGracePeriodSeconds` (30 s by default) before SIGKILL. Keep
//! `wait_timeout` below that.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::handler::BoxFuture;

/// Failures of the serving infrastructure, as opposed to handler errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// `listen_and_serve` was called after the server was shut down.
    #[error("server closed")]
    Closed,

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("server failed to start: {0}")]
    Start(#[source] Box<RunError>),

    #[error("deadline exceeded, forced close failed: {0}")]
    ForceClose(#[source] Box<RunError>),
}

/// A server that can be started, stopped gracefully and closed.
pub trait Runner: Send + Sync {
    /// Serves until stopped (`Ok`) or until it fails to start.
    fn listen_and_serve(&self) -> BoxFuture<'_, Result<(), RunError>>;

    /// Stops accepting and waits up to `timeout` for in-flight requests.
    /// Returns [`RunError::ShutdownTimeout`] when they did not finish.
    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Result<(), RunError>>;

    /// Drops every connection now.
    fn close(&self) -> Result<(), RunError>;
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn listen_and_serve(&self) -> BoxFuture<'_, Result<(), RunError>> {
        (**self).listen_and_serve()
    }

    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Result<(), RunError>> {
        (**self).shutdown(timeout)
    }

    fn close(&self) -> Result<(), RunError> {
        (**self).close()
    }
}

/// Wraps a [`Runner`] with signal-driven graceful shutdown.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use httpkit::{GracefulRunner, NetHandler, Router, Server, ServerConfig};
///
/// # async fn run() -> Result<(), httpkit::RunError> {
/// let server = Server::new(ServerConfig::default(), Router::new().into_boxed_net_handler());
/// GracefulRunner::new(server)
///     .wait_timeout(Duration::from_secs(10))
///     .run()
///     .await
/// # }
/// ```
pub struct GracefulRunner<R> {
    runner: R,
    trigger: Option<BoxFuture<'static, ()>>,
    wait_timeout: Duration,
}

impl<R: Runner> GracefulRunner<R> {
    pub fn new(runner: R) -> Self {
        Self { runner, trigger: None, wait_timeout: Duration::from_secs(5) }
    }

    /// How long in-flight requests get before connections are closed.
    /// Zero keeps the five-second default.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.wait_timeout = timeout;
        }
        self
    }

    /// Starts the shutdown when `trigger` completes instead of on a signal.
    #[must_use]
    pub fn shutdown_on<F>(mut self, trigger: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.trigger = Some(Box::pin(trigger));
        self
    }

    /// Serves until the trigger fires, then shuts down.
    ///
    /// Returns `Ok` after a graceful or forced shutdown, and an error when
    /// the server failed to start or could not be stopped.
    pub async fn run(self) -> Result<(), RunError> {
        let Self { runner, trigger, wait_timeout } = self;
        let trigger = trigger.unwrap_or_else(|| Box::pin(shutdown_signal()));

        let mut serve = runner.listen_and_serve();
        tokio::select! {
            biased;

            result = &mut serve => {
                return match result {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        error!(error = %e, "server failed");
                        Err(RunError::Start(Box::new(e)))
                    }
                };
            }
            () = trigger => info!("graceful shutdown initiated"),
        }

        let stop = async {
            match runner.shutdown(wait_timeout).await {
                Err(RunError::ShutdownTimeout(waited)) => {
                    warn!(waited = ?waited, "forced shutdown initiated");
                    match runner.close() {
                        Ok(()) => {
                            info!("forced shutdown completed");
                            Ok(())
                        }
                        Err(e) => {
                            error!(error = %e, "forced shutdown failed");
                            Err(RunError::ForceClose(Box::new(e)))
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "graceful shutdown failed");
                    Err(e)
                }
                Ok(()) => {
                    info!("graceful shutdown completed");
                    Ok(())
                }
            }
        };

        let (stopped, served) = tokio::join!(stop, serve);
        stopped?;
        served
    }
}

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM the process receives.
///
/// On non-Unix platforms only Ctrl-C is available. A signal that cannot be
/// installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(signal = "SIGINT", "signal received"),
        () = sigterm => info!(signal = "SIGTERM", "signal received"),
    }
}
