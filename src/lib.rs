//! # httpkit
//!
//! Error-aware routing, middleware composition and request/response
//! recording on top of hyper.
//!
//! ## The model
//!
//! Handlers behind the router return `Result<(), Error>`. An error travels
//! back up through the middleware chain, where any layer can log it, render
//! it or mark it [resolved](Error::resolve). Whatever is still an error when
//! the chain unwinds reaches the router's single last-resort handler, so a
//! failure always ends up as exactly one response.
//!
//! ```text
//! Server
//!   └─ record()               net middleware: capture status, bodies, timing
//!       └─ cors(..)           net middleware
//!           └─ Router         method + path lookup, redirects, 404/405, panics
//!               └─ access_log()   mux middleware: one log line per request
//!                   └─ route middleware
//!                       └─ handler -> Result<(), Error>
//! ```
//!
//! - [`NetHandler`] / [`NetMiddleware`] sit between the server and the
//!   router and have no error channel.
//! - [`Handler`] / [`MuxMiddleware`] sit behind the router.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use httpkit::{
//!     GracefulRunner, NetHandler, NetMiddleware, Router, RouterConfig, Server, ServerConfig,
//!     handler_fn, middleware, record, write_json,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), httpkit::RunError> {
//!     let router = RouterConfig::new()
//!         .middleware(middleware::access_log())
//!         .build()
//!         .handle(Method::GET, "/users/{id}", handler_fn(|w, r| {
//!             Box::pin(async move {
//!                 let id = r.param("id").unwrap_or_default().to_owned();
//!                 write_json(w, &serde_json::json!({ "id": id }), StatusCode::OK)
//!             })
//!         }));
//!
//!     let root = NetMiddleware::reduce([record()]).then(router.into_boxed_net_handler());
//!     GracefulRunner::new(Server::new(ServerConfig::default(), root)).run().await
//! }
//! ```

mod body;
mod encode;
mod error;
mod handler;
mod path;
mod pool;
mod recorder;
mod request;
mod response;
mod runner;
mod server;

pub mod middleware;
pub mod router;

pub use body::{Body, BodyRead};
pub use encode::{InvalidProblem, Problem, UnknownField, read_json, write_json, write_problem};
pub use error::{BoxError, Error, resolve};
pub use handler::{
    BoxFuture, BoxHandler, BoxNetHandler, Handler, HandlerFn, NetHandler, NetHandlerFn,
    handler_fn, net_handler_fn,
};
pub use middleware::{Middleware, MuxMiddleware, NetMiddleware};
pub use path::clean_path;
pub use pool::{BufferPool, Pool};
pub use recorder::{LogEntry, Recorder, log_entry, log_entry_mut, record};
pub use request::{Params, Request, path_params};
pub use response::{ContentType, Response, ResponseWriter};
pub use router::{LastResortErrorHandler, PanicHandler, Route, Router, RouterConfig};
pub use runner::{GracefulRunner, RunError, Runner, shutdown_signal};
pub use server::{Server, ServerConfig};
