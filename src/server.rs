//! HTTP server.
//!
//! Accepts TCP connections, serves each on its own task through hyper's auto
//! (HTTP/1.1 + HTTP/2) connection builder and hands every request to one root
//! [`NetHandler`], usually a [`Router`](crate::Router) wrapped in net
//! middleware. Each request gets a fresh buffered [`Response`]; it is sent
//! once the handler chain returns.
//!
//! Stopping happens in two stages, both driven by [`Runner`]:
//!
//! 1. [`shutdown`](Runner::shutdown) stops `accept()`, asks every connection
//!    to finish its in-flight request and close, and waits for them;
//! 2. [`close`](Runner::close) drops whatever is still open.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::body::Body;
use crate::handler::{BoxFuture, BoxNetHandler};
use crate::request::Request;
use crate::response::Response;
use crate::runner::{RunError, Runner};

/// Where and how to serve.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address. Default `0.0.0.0:8080`.
    pub addr: SocketAddr,
    /// Time allowed to receive the request headers on HTTP/1 connections.
    /// `None` leaves hyper's behaviour.
    pub read_header_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_header_timeout: None,
        }
    }
}

/// The HTTP server.
pub struct Server {
    config: ServerConfig,
    handler: BoxNetHandler,
    local_addr: Mutex<Option<SocketAddr>>,
    serving: AtomicBool,
    // graceful: stop accepting, let connections finish
    stop: CancellationToken,
    // forced: drop connections
    force: CancellationToken,
    // fired by the serve loop once every connection task is gone
    drained: CancellationToken,
}

impl Server {
    pub fn new(config: ServerConfig, handler: BoxNetHandler) -> Self {
        Self {
            config,
            handler,
            local_addr: Mutex::new(None),
            serving: AtomicBool::new(false),
            stop: CancellationToken::new(),
            force: CancellationToken::new(),
            drained: CancellationToken::new(),
        }
    }

    /// A server for `handler` on `addr` with the other options at their
    /// defaults.
    pub fn bind(addr: SocketAddr, handler: BoxNetHandler) -> Self {
        Self::new(ServerConfig { addr, ..ServerConfig::default() }, handler)
    }

    /// The address actually bound, once serving started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Serves on an already bound listener until shut down or closed.
    ///
    /// Returns [`RunError::Closed`] if the server was stopped before it
    /// started.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RunError> {
        self.serving.store(true, Ordering::SeqCst);
        if self.stop.is_cancelled() {
            self.drained.cancel();
            return Err(RunError::Closed);
        }

        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);
        info!(addr = %addr, "listening");

        let mut tasks = JoinSet::new();
        let stop = self.stop.cancelled();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                // Check the stop signal first so a shutdown stops accepting
                // even while connections are queued.
                biased;

                () = &mut stop => {
                    info!(in_flight = tasks.len(), "shutdown initiated, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    tasks.spawn(serve_connection(
                        TokioIo::new(stream),
                        peer,
                        Arc::clone(&self.handler),
                        self.config.read_header_timeout,
                        self.stop.clone(),
                        self.force.clone(),
                    ));
                }

                // Reap finished connection tasks so the set does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        tokio::select! {
            () = async { while tasks.join_next().await.is_some() {} } => {}
            () = self.force.cancelled() => {
                info!(in_flight = tasks.len(), "closing remaining connections");
                tasks.shutdown().await;
            }
        }

        self.drained.cancel();
        info!("stopped");
        Ok(())
    }
}

impl Runner for Server {
    fn listen_and_serve(&self) -> BoxFuture<'_, Result<(), RunError>> {
        Box::pin(async move {
            let addr = self.config.addr;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| RunError::Bind { addr, source })?;
            self.serve(listener).await
        })
    }

    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Result<(), RunError>> {
        Box::pin(async move {
            self.stop.cancel();
            if !self.serving.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::time::timeout(timeout, self.drained.cancelled())
                .await
                .map_err(|_| RunError::ShutdownTimeout(timeout))
        })
    }

    fn close(&self) -> Result<(), RunError> {
        self.stop.cancel();
        self.force.cancel();
        Ok(())
    }
}

/// Serves one connection until it ends, honouring the stop and force tokens.
async fn serve_connection(
    io: TokioIo<tokio::net::TcpStream>,
    peer: SocketAddr,
    handler: BoxNetHandler,
    read_header_timeout: Option<Duration>,
    stop: CancellationToken,
    force: CancellationToken,
) {
    // `service_fn` is called once per request on the connection.
    let svc = service_fn(move |req| dispatch(Arc::clone(&handler), req));

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    if let Some(timeout) = read_header_timeout {
        builder.http1().timer(TokioTimer::new()).header_read_timeout(timeout);
    }

    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        () = stop.cancelled() => {
            conn.as_mut().graceful_shutdown();
            tokio::select! {
                res = conn.as_mut() => res,
                () = force.cancelled() => Ok(()),
            }
        }
    };

    if let Err(e) = result {
        error!(peer = %peer, "connection error: {e}");
    }
}

/// Runs the root handler for one request and converts the buffered response.
///
/// The root handler reports nothing back, so hyper never sees an error.
async fn dispatch(
    handler: BoxNetHandler,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let mut req = Request::from(req.map(Body::from_incoming));
    let mut res = Response::new();
    handler.serve_http(&mut res, &mut req).await;
    Ok(res.into_http())
}
