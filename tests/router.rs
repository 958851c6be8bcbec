use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode, Uri};
use httpkit::{
    BoxNetHandler, Error, Handler, MuxMiddleware, NetHandler, NetMiddleware, Request, Response,
    ResponseWriter, Route, Router, RouterConfig, handler_fn, log_entry, middleware, read_json,
    record, resolve, write_json,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

async fn send(root: &BoxNetHandler, method: Method, uri: &'static str, body: &'static str) -> Response {
    let mut req = Request::new(method, Uri::from_static(uri)).with_body(body);
    let mut res = Response::new();
    root.serve_http(&mut res, &mut req).await;
    res
}

fn created() -> impl Handler {
    handler_fn(|w, _r| {
        Box::pin(async move {
            w.write_header(StatusCode::CREATED);
            Ok(())
        })
    })
}

/// Appends `{name}-start` and `{name}-end` to `x-trace` around the chain.
fn tracer(name: &'static str) -> MuxMiddleware {
    MuxMiddleware::new(move |next| {
        handler_fn(move |w, r| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                trace(w, &format!("{name}-start"));
                let result = next.serve(w, r).await;
                trace(w, &format!("{name}-end"));
                result
            })
        })
        .into_boxed_handler()
    })
}

fn trace(w: &mut dyn ResponseWriter, step: &str) {
    if let Ok(value) = HeaderValue::from_str(step) {
        w.headers_mut().append("x-trace", value);
    }
}

type Observed = Arc<Mutex<Option<(Option<StatusCode>, DateTime<Utc>, Option<DateTime<Utc>>)>>>;

/// A global middleware that copies the recorder's view after the chain ran.
fn observe(into: Observed) -> MuxMiddleware {
    MuxMiddleware::new(move |next| {
        let into = Arc::clone(&into);
        handler_fn(move |w, r| {
            let next = Arc::clone(&next);
            let into = Arc::clone(&into);
            Box::pin(async move {
                let result = next.serve(w, r).await;
                if let Some(entry) = log_entry(w) {
                    *into.lock() = Some((entry.status_code(), entry.requested_at(), entry.responded_at()));
                }
                result
            })
        })
        .into_boxed_handler()
    })
}

#[tokio::test]
async fn recorded_status_and_timestamps_reach_global_middleware() {
    let observed: Observed = Arc::default();
    let router = RouterConfig::new()
        .middleware(observe(Arc::clone(&observed)))
        .build()
        .handle(
            Method::POST,
            "/data",
            handler_fn(|w, _r| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    w.write_header(StatusCode::CREATED);
                    Ok(())
                })
            }),
        );
    let root = record().then(router.into_boxed_net_handler());

    let res = send(&root, Method::POST, "/data", "").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let (status, requested_at, responded_at) = observed.lock().take().expect("entry observed");
    assert_eq!(status, Some(StatusCode::CREATED));
    assert!(responded_at.expect("responded") > requested_at);
}

#[tokio::test]
async fn wrong_method_is_405_with_allow() {
    let root = Router::new().handle(Method::POST, "/data", created()).into_boxed_net_handler();

    let res = send(&root, Method::GET, "/data", "").await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[ALLOW], "OPTIONS, POST");
    assert_eq!(res.text(), "default method not allowed handler: method: GET, path: /data");
}

#[tokio::test]
async fn options_falls_through_to_405_when_not_handled() {
    let root = RouterConfig::new()
        .handle_options(false)
        .build()
        .handle(Method::GET, "/data", created())
        .into_boxed_net_handler();

    let res = send(&root, Method::OPTIONS, "/data", "").await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[ALLOW], "GET");
    assert_eq!(res.text(), "default method not allowed handler: method: OPTIONS, path: /data");
}

#[tokio::test]
async fn unknown_path_is_404() {
    let root = Router::new().handle(Method::POST, "/data", created()).into_boxed_net_handler();

    let res = send(&root, Method::POST, "/data/1", "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(res.text(), "default not found handler: method: POST, path: /data/1");
}

#[tokio::test]
async fn global_middleware_wraps_route_middleware() {
    let handler = handler_fn(|w, _r| {
        Box::pin(async move {
            trace(w, "handler");
            Ok(())
        })
    });
    let root = RouterConfig::new()
        .middleware(tracer("global"))
        .build()
        .route_with(Route::new(Method::GET, "/traced", handler), [tracer("local")])
        .into_boxed_net_handler();

    let res = send(&root, Method::GET, "/traced", "").await;
    let steps: Vec<_> = res.headers().get_all("x-trace").iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(steps, ["global-start", "local-start", "handler", "local-end", "global-end"]);
}

#[tokio::test]
async fn route_middleware_stays_on_its_route() {
    let handler = || {
        handler_fn(|w, _r| {
            Box::pin(async move {
                trace(w, "handler");
                Ok(())
            })
        })
    };
    let root = RouterConfig::new()
        .middleware(tracer("global"))
        .build()
        .route_with(Route::new(Method::GET, "/traced", handler()), [tracer("local")])
        .handle(Method::GET, "/plain", handler())
        .into_boxed_net_handler();

    let res = send(&root, Method::GET, "/plain", "").await;
    let steps: Vec<_> = res.headers().get_all("x-trace").iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(steps, ["global-start", "handler", "global-end"]);

    let res = send(&root, Method::GET, "/traced", "").await;
    let steps: Vec<_> = res.headers().get_all("x-trace").iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(steps, ["global-start", "local-start", "handler", "local-end", "global-end"]);
}

#[tokio::test]
async fn resolved_errors_still_reach_the_last_resort_handler() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let router = RouterConfig::new()
        .middleware(middleware::access_log())
        .last_resort_error_handler({
            let seen = Arc::clone(&seen);
            move |_w: &mut dyn ResponseWriter, _r: &Request, err: Error| {
                seen.lock().push((err.is_resolved(), err.to_string()));
            }
        })
        .build()
        .handle(
            Method::GET,
            "/bad",
            handler_fn(|w, _r| {
                Box::pin(async move {
                    w.write_header(StatusCode::BAD_REQUEST);
                    w.write_all(b"X")?;
                    Err(resolve(Error::msg("bad input")))
                })
            }),
        );
    let root = record().then(router.into_boxed_net_handler());

    let res = send(&root, Method::GET, "/bad", "").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text(), "X");
    assert_eq!(*seen.lock(), [(true, "bad input".to_owned())]);
}

#[tokio::test]
async fn unhandled_errors_become_500() {
    let root = Router::new()
        .handle(
            Method::GET,
            "/boom",
            handler_fn(|_w, _r| Box::pin(async move { Err(Error::msg("boom")) })),
        )
        .into_boxed_net_handler();

    let res = send(&root, Method::GET, "/boom", "").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.text(),
        "default last resort error handler: method: GET, path: /boom, error: boom"
    );
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct Echo {
    message: String,
}

#[tokio::test]
async fn recorder_captures_json_bodies_and_is_reused_cleanly() {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let capture = {
        let bodies = Arc::clone(&bodies);
        MuxMiddleware::new(move |next| {
            let bodies = Arc::clone(&bodies);
            handler_fn(move |w, r| {
                let next = Arc::clone(&next);
                let bodies = Arc::clone(&bodies);
                Box::pin(async move {
                    let result = next.serve(w, r).await;
                    if let Some(entry) = log_entry(w) {
                        bodies.lock().push((entry.req_body().to_vec(), entry.res_body().to_vec()));
                    }
                    result
                })
            })
            .into_boxed_handler()
        })
    };

    let echo = handler_fn(|w, r| {
        Box::pin(async move {
            let echo: Echo = read_json(r.body_mut()).await?;
            write_json(w, &echo, StatusCode::OK)
        })
    });
    let router = RouterConfig::new().middleware(capture).build().handle(Method::POST, "/echo", echo);
    let root = NetMiddleware::reduce([record()]).then(router.into_boxed_net_handler());

    let first = send(&root, Method::POST, "/echo", r#"{"message":"one"}"#).await;
    let second = send(&root, Method::POST, "/echo", r#"{"message":"two"}"#).await;
    assert_eq!(first.text(), "{\"message\":\"one\"}\n");
    assert_eq!(second.text(), "{\"message\":\"two\"}\n");

    let bodies = bodies.lock();
    assert_eq!(bodies[0].0, br#"{"message":"one"}"#);
    assert_eq!(bodies[0].1, b"{\"message\":\"one\"}\n");
    assert_eq!(bodies[1].0, br#"{"message":"two"}"#);
    assert_eq!(bodies[1].1, b"{\"message\":\"two\"}\n");
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_entries() {
    let mismatches = Arc::new(AtomicUsize::new(0));
    let check = {
        let mismatches = Arc::clone(&mismatches);
        MuxMiddleware::new(move |next| {
            let mismatches = Arc::clone(&mismatches);
            handler_fn(move |w, r| {
                let next = Arc::clone(&next);
                let mismatches = Arc::clone(&mismatches);
                Box::pin(async move {
                    let id = r.param("id").unwrap_or_default().to_owned();
                    let result = next.serve(w, r).await;
                    let ok = log_entry(w).is_some_and(|e| e.res_body() == id.as_bytes());
                    if !ok {
                        mismatches.fetch_add(1, Ordering::SeqCst);
                    }
                    result
                })
            })
            .into_boxed_handler()
        })
    };

    let handler = handler_fn(|w, r| {
        Box::pin(async move {
            let id = r.param("id").unwrap_or_default().to_owned();
            tokio::task::yield_now().await;
            w.write_all(id.as_bytes())?;
            Ok(())
        })
    });
    let router = RouterConfig::new().middleware(check).build().handle(Method::GET, "/items/{id}", handler);
    let root = record().then(router.into_boxed_net_handler());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..64 {
        let root = Arc::clone(&root);
        tasks.spawn(async move {
            let uri: Uri = format!("/items/{i}").parse().unwrap();
            let mut req = Request::new(Method::GET, uri);
            let mut res = Response::new();
            root.serve_http(&mut res, &mut req).await;
            assert_eq!(res.text(), i.to_string());
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cors_and_router_compose() {
    let router = Router::new().handle(Method::GET, "/data", created());
    let root = NetMiddleware::reduce([record(), middleware::cors(Default::default())])
        .then(router.into_boxed_net_handler());

    let mut req = Request::new(Method::GET, Uri::from_static("/data"));
    req.headers_mut().insert("origin", HeaderValue::from_static("https://example.com"));
    let mut res = Response::new();
    root.serve_http(&mut res, &mut req).await;

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}
