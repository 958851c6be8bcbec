//! Minimal httpkit service: JSON endpoints, CORS, access logs and graceful
//! shutdown.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/users/42
//!   curl -X POST http://localhost:8080/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:8080/users -d 'not json'
//!   curl -X DELETE http://localhost:8080/users/42

use std::time::Duration;

use http::{Method, StatusCode};
use httpkit::router::defaults;
use httpkit::{
    Error, GracefulRunner, NetHandler, NetMiddleware, Problem, Request, ResponseWriter, Route,
    RouterConfig, Server, ServerConfig, handler_fn, middleware, read_json, record, resolve,
    write_json, write_problem,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), httpkit::RunError> {
    tracing_subscriber::fmt::init();

    let router = RouterConfig::new()
        .middleware(middleware::access_log())
        .last_resort_error_handler(|w: &mut dyn ResponseWriter, r: &Request, err: Error| {
            // resolved errors have already been answered
            if !err.is_resolved() {
                defaults::last_resort_error(w, r, err);
            }
        })
        .build()
        .handle(Method::GET, "/users/:id", handler_fn(|w, r| Box::pin(get_user(w, r))))
        .handle(Method::POST, "/users", handler_fn(|w, r| Box::pin(create_user(w, r))))
        .route(Route::new(
            Method::DELETE,
            "/users/:id",
            handler_fn(|w, _r| {
                Box::pin(async move {
                    w.write_header(StatusCode::NO_CONTENT);
                    Ok(())
                })
            }),
        ));

    let cors = middleware::CorsConfig::default()
        .allow_methods([Method::GET, Method::POST, Method::DELETE]);
    let root = NetMiddleware::reduce([record(), middleware::cors(cors)])
        .then(router.into_boxed_net_handler());

    let server = Server::new(ServerConfig::default(), root);
    GracefulRunner::new(server)
        .wait_timeout(Duration::from_secs(10))
        .run()
        .await
}

// GET /users/:id
async fn get_user(w: &mut dyn ResponseWriter, r: &mut Request) -> Result<(), Error> {
    let id = r.param("id").unwrap_or_default().to_owned();
    write_json(w, &User { id, name: "alice".into() }, StatusCode::OK)
}

// POST /users
//
// A malformed body is answered here with 400 and the error is marked
// resolved, so the access log records it at INFO and the last-resort handler
// installed in `main` leaves the response alone.
async fn create_user(w: &mut dyn ResponseWriter, r: &mut Request) -> Result<(), Error> {
    let new: NewUser = match read_json(r.body_mut()).await {
        Ok(new) => new,
        Err(err) => {
            let problem = Problem::new(StatusCode::BAD_REQUEST).detail(err.to_string());
            write_problem(w, &problem)?;
            return Err(resolve(err));
        }
    };
    write_json(w, &User { id: "99".into(), name: new.name }, StatusCode::CREATED)
}
