use std::sync::Arc;

use tracing::{error, info};

use super::MuxMiddleware;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxHandler, Handler};
use crate::recorder::{LogEntry, log_entry};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Logs one line per request from the recorder's [`LogEntry`].
///
/// | outcome                       | level   | message            |
/// |-------------------------------|---------|--------------------|
/// | `Ok(())`                      | `INFO`  | `completed`        |
/// | [`Error::Resolved`]           | `INFO`  | `resolved_error`   |
/// | [`Error::Unresolved`]         | `ERROR` | `unresolved_error` |
///
/// The error is handed back untouched, so the router's last-resort handler
/// still runs for it. [`record`](crate::record) must be installed in front of
/// the router; without it every request fails with `missing log entry`.
pub fn access_log() -> MuxMiddleware {
    MuxMiddleware::new(|next| Arc::new(AccessLog { next }))
}

struct AccessLog {
    next: BoxHandler,
}

impl Handler for AccessLog {
    fn serve<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if log_entry(w).is_none() {
                return Err(Error::msg(format!(
                    "missing log entry: method={} path={}",
                    r.method(),
                    r.path()
                )));
            }

            let result = self.next.serve(w, r).await;
            if let Some(entry) = log_entry(w) {
                emit(r, entry, &result);
            }
            result
        })
    }
}

fn emit(r: &Request, entry: &LogEntry, result: &Result<(), Error>) {
    let method = r.method().as_str();
    let path = r.path();
    let uri = r.request_uri();
    let status = entry.status_code().map_or(0, |s| s.as_u16());
    let latency_us = entry.latency().and_then(|d| d.num_microseconds()).unwrap_or(0);

    match result {
        Ok(()) => info!(path, method, uri, status, latency_us, "completed"),
        Err(e) if e.is_resolved() => {
            info!(path, method, uri, status, latency_us, error = %e, "resolved_error");
        }
        Err(e) => {
            error!(path, method, uri, status, latency_us, error = %e, "unresolved_error");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use http::{Method, StatusCode, Uri};
    use parking_lot::Mutex;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{Layer, Registry};

    use super::*;
    use crate::handler::{BoxNetHandler, NetHandler, handler_fn, net_handler_fn};
    use crate::recorder::record;
    use crate::response::Response;

    /// Keeps `(level, message)` for every event.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(Level, String)>>>);

    struct MessageVisitor(String);

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.0.lock().push((*event.metadata().level(), visitor.0));
        }
    }

    /// Runs `outcome` behind `record()` and `access_log()`, returning what
    /// the chain returned and the captured events.
    async fn run(
        outcome: fn() -> Result<(), Error>,
    ) -> (Result<(), Error>, Vec<(Level, String)>) {
        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(Registry::default().with(captured.clone()));

        let handler = access_log().then(
            handler_fn(move |w, _r| {
                Box::pin(async move {
                    w.write_header(StatusCode::BAD_REQUEST);
                    w.write_all(b"X")?;
                    outcome()
                })
            })
            .into_boxed_handler(),
        );

        let returned = Arc::new(Mutex::new(None));
        let root: BoxNetHandler = {
            let returned = Arc::clone(&returned);
            net_handler_fn(move |w, r| {
                let handler = Arc::clone(&handler);
                let returned = Arc::clone(&returned);
                Box::pin(async move {
                    let result = handler.serve(w, r).await;
                    *returned.lock() = Some(result);
                })
            })
            .into_boxed_net_handler()
        };

        let root = record().then(root);
        let mut res = Response::new();
        let mut req = Request::new(Method::GET, Uri::from_static("/items?page=2"));
        root.serve_http(&mut res, &mut req).await;

        let result = returned.lock().take().unwrap();
        let events = captured.0.lock().clone();
        (result, events)
    }

    #[tokio::test]
    async fn success_logs_completed_at_info() {
        let (result, events) = run(|| Ok(())).await;
        assert!(result.is_ok());
        assert_eq!(events, [(Level::INFO, "completed".to_owned())]);
    }

    #[tokio::test]
    async fn resolved_errors_log_at_info_and_are_returned() {
        let (result, events) = run(|| Err(Error::msg("bad input").resolve())).await;
        let err = result.unwrap_err();
        assert!(err.is_resolved());
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(events, [(Level::INFO, "resolved_error".to_owned())]);
    }

    #[tokio::test]
    async fn unresolved_errors_log_at_error() {
        let (result, events) = run(|| Err(Error::msg("db down"))).await;
        assert!(!result.unwrap_err().is_resolved());
        assert_eq!(events, [(Level::ERROR, "unresolved_error".to_owned())]);
    }

    #[tokio::test]
    async fn fails_without_a_recorder() {
        let handler = access_log().then(handler_fn(|_w, _r| Box::pin(async move { Ok(()) })).into_boxed_handler());
        let mut res = Response::new();
        let mut req = Request::new(Method::POST, Uri::from_static("/data"));

        let err = handler.serve(&mut res, &mut req).await.unwrap_err();
        assert_eq!(err.to_string(), "missing log entry: method=POST path=/data");
        assert!(!res.is_committed());
    }
}
