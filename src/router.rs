//! The mux: method + path dispatch over error-aware handlers.
//!
//! One radix tree per HTTP method, delegated to [`matchit`]. The router adds
//! what sits around the lookup:
//!
//! - global middleware wrapped around every route, outside any route-specific
//!   middleware;
//! - a single last-resort handler for errors that survive the whole chain;
//! - trailing-slash and fixed-path redirects, automatic `OPTIONS` replies and
//!   `405 Method Not Allowed` with an `Allow` header;
//! - panic recovery, so a panicking handler costs one `500`, not the process.
//!
//! Build it once at startup. The route table is read-only afterwards.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::header::{ALLOW, LOCATION};
use http::{HeaderValue, Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxHandler, BoxNetHandler, Handler, NetHandler};
use crate::middleware::MuxMiddleware;
use crate::path::clean_path;
use crate::request::{Params, Request};
use crate::response::ResponseWriter;

/// Renders a recovered panic. Receives the panic payload.
pub type PanicHandler =
    Arc<dyn Fn(&mut dyn ResponseWriter, &Request, &(dyn Any + Send)) + Send + Sync>;

/// Renders an error that no middleware took care of. Must always write a
/// response and never fail.
pub type LastResortErrorHandler = Arc<dyn Fn(&mut dyn ResponseWriter, &Request, Error) + Send + Sync>;

// ── Route ─────────────────────────────────────────────────────────────────────

/// A method, path pattern and handler bound together.
///
/// Patterns take matchit's `{name}` / `{*rest}` segments or the equivalent
/// `:name` / `*rest` form.
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    handler: BoxHandler,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        Self { method, path: path.into(), handler: handler.into_boxed_handler() }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ── RouterConfig ──────────────────────────────────────────────────────────────

/// Router options. Unset handlers fall back to [`defaults`] in
/// [`build`](Self::build).
///
/// ```rust
/// use httpkit::{RouterConfig, ResponseWriter};
/// use http::StatusCode;
///
/// let router = RouterConfig::new()
///     .redirect_fixed_path(false)
///     .last_resort_error_handler(|w, _r, _err| {
///         w.write_header(StatusCode::SERVICE_UNAVAILABLE);
///     })
///     .build();
/// # let _ = router;
/// ```
pub struct RouterConfig {
    redirect_trailing_slash: bool,
    redirect_fixed_path: bool,
    handle_method_not_allowed: bool,
    handle_options: bool,
    global_options: Option<BoxNetHandler>,
    not_found: Option<BoxNetHandler>,
    method_not_allowed: Option<BoxNetHandler>,
    panic_handler: Option<PanicHandler>,
    last_resort: Option<LastResortErrorHandler>,
    middleware: Option<MuxMiddleware>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            handle_method_not_allowed: true,
            handle_options: true,
            global_options: None,
            not_found: None,
            method_not_allowed: None,
            panic_handler: None,
            last_resort: None,
            middleware: None,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirects `/foo/` to `/foo` (or the reverse) when only the other one is
    /// registered. On by default.
    #[must_use]
    pub fn redirect_trailing_slash(mut self, enabled: bool) -> Self {
        self.redirect_trailing_slash = enabled;
        self
    }

    /// Cleans the path (`..`, `.`, doubled slashes) and retries the lookup
    /// case-insensitively, redirecting on a hit. On by default.
    #[must_use]
    pub fn redirect_fixed_path(mut self, enabled: bool) -> Self {
        self.redirect_fixed_path = enabled;
        self
    }

    /// Answers with `405` when the path exists under other methods. Off means
    /// such requests are not found. On by default.
    #[must_use]
    pub fn handle_method_not_allowed(mut self, enabled: bool) -> Self {
        self.handle_method_not_allowed = enabled;
        self
    }

    /// Answers `OPTIONS` automatically when no `OPTIONS` route matches. On by
    /// default.
    #[must_use]
    pub fn handle_options(mut self, enabled: bool) -> Self {
        self.handle_options = enabled;
        self
    }

    /// Runs on automatic `OPTIONS` replies, after `Allow` is set.
    #[must_use]
    pub fn global_options_handler(mut self, handler: impl NetHandler) -> Self {
        self.global_options = Some(handler.into_boxed_net_handler());
        self
    }

    #[must_use]
    pub fn not_found_handler(mut self, handler: impl NetHandler) -> Self {
        self.not_found = Some(handler.into_boxed_net_handler());
        self
    }

    /// Runs on `405` replies, after `Allow` is set.
    #[must_use]
    pub fn method_not_allowed_handler(mut self, handler: impl NetHandler) -> Self {
        self.method_not_allowed = Some(handler.into_boxed_net_handler());
        self
    }

    #[must_use]
    pub fn panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut dyn ResponseWriter, &Request, &(dyn Any + Send)) + Send + Sync + 'static,
    {
        self.panic_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn last_resort_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut dyn ResponseWriter, &Request, Error) + Send + Sync + 'static,
    {
        self.last_resort = Some(Arc::new(handler));
        self
    }

    /// Middleware wrapped around every route, outside route-specific
    /// middleware.
    #[must_use]
    pub fn middleware(mut self, middleware: MuxMiddleware) -> Self {
        self.middleware = Some(middleware);
        self
    }

    /// Fills the unset options with [`defaults`] and returns an empty router.
    pub fn build(self) -> Router {
        Router {
            trees: HashMap::new(),
            patterns: HashMap::new(),
            redirect_trailing_slash: self.redirect_trailing_slash,
            redirect_fixed_path: self.redirect_fixed_path,
            handle_method_not_allowed: self.handle_method_not_allowed,
            handle_options: self.handle_options,
            global_options: self.global_options,
            not_found: self.not_found.unwrap_or_else(defaults::not_found),
            method_not_allowed: self.method_not_allowed.unwrap_or_else(defaults::method_not_allowed),
            panic_handler: self.panic_handler.unwrap_or_else(|| Arc::new(defaults::panic)),
            last_resort: self.last_resort.unwrap_or_else(|| Arc::new(defaults::last_resort_error)),
            middleware: self.middleware.unwrap_or_default(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Each registration returns `self` so they chain:
///
/// ```rust
/// use httpkit::{Route, Router, handler_fn};
/// use http::Method;
///
/// let ok = || handler_fn(|_w, _r| Box::pin(async move { Ok(()) }));
///
/// let router = Router::new()
///     .handle(Method::GET, "/users/{id}", ok())
///     .route(Route::new(Method::DELETE, "/users/:id", ok()));
/// # let _ = router;
/// ```
pub struct Router {
    trees: HashMap<Method, MatchitRouter<BoxHandler>>,
    // matchit patterns per method, for case-insensitive lookups
    patterns: HashMap<Method, Vec<String>>,
    redirect_trailing_slash: bool,
    redirect_fixed_path: bool,
    handle_method_not_allowed: bool,
    handle_options: bool,
    global_options: Option<BoxNetHandler>,
    not_found: BoxNetHandler,
    method_not_allowed: BoxNetHandler,
    panic_handler: PanicHandler,
    last_resort: LastResortErrorHandler,
    middleware: MuxMiddleware,
}

impl Router {
    /// A router with every option at its default.
    pub fn new() -> Self {
        RouterConfig::default().build()
    }

    /// Registers `handler` for `method` and `path`, wrapped in the global
    /// middleware.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is invalid or conflicts with one already
    /// registered for the same method.
    pub fn handle(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler())
    }

    /// Registers a [`Route`].
    pub fn route(self, route: Route) -> Self {
        self.add(route.method, &route.path, route.handler)
    }

    /// Registers a [`Route`] with middleware that applies to it alone, nested
    /// inside the global middleware. The first one listed runs first.
    pub fn route_with<I>(self, route: Route, middleware: I) -> Self
    where
        I: IntoIterator<Item = MuxMiddleware>,
    {
        let handler = MuxMiddleware::reduce(middleware).then(route.handler);
        self.add(route.method, &route.path, handler)
    }

    fn add(mut self, method: Method, path: &str, handler: BoxHandler) -> Self {
        let pattern = to_matchit(path);
        let handler = self.middleware.then(handler);
        self.trees
            .entry(method.clone())
            .or_default()
            .insert(pattern.as_str(), handler)
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self.patterns.entry(method).or_default().push(pattern);
        self
    }

    async fn dispatch(&self, w: &mut dyn ResponseWriter, r: &mut Request) {
        let path = decode_path(r.path());

        if let Some(tree) = self.trees.get(r.method()) {
            if let Ok(matched) = tree.at(&path) {
                r.set_params(Params::from(matched.params));
                if let Err(err) = matched.value.serve(w, r).await {
                    (self.last_resort)(w, r, err);
                }
                return;
            }

            if *r.method() != Method::CONNECT && path != "/" {
                if let Some(target) = self.redirect_target(r.method(), tree, &path) {
                    redirect(w, r, &target);
                    return;
                }
            }
        }

        if *r.method() == Method::OPTIONS && self.handle_options {
            if let Some(allow) = self.allowed(&path, r.method()) {
                w.headers_mut().insert(ALLOW, allow);
                if let Some(handler) = &self.global_options {
                    handler.serve_http(w, r).await;
                }
                return;
            }
        } else if self.handle_method_not_allowed {
            if let Some(allow) = self.allowed(&path, r.method()) {
                w.headers_mut().insert(ALLOW, allow);
                self.method_not_allowed.serve_http(w, r).await;
                return;
            }
        }

        self.not_found.serve_http(w, r).await;
    }

    /// The path a miss should be redirected to, if any.
    fn redirect_target(
        &self,
        method: &Method,
        tree: &MatchitRouter<BoxHandler>,
        path: &str,
    ) -> Option<String> {
        if self.redirect_trailing_slash {
            let toggled = toggle_trailing_slash(path);
            if tree.at(&toggled).is_ok() {
                return Some(toggled);
            }
        }

        if self.redirect_fixed_path {
            let cleaned = clean_path(path);
            let mut candidates = vec![cleaned.clone()];
            if self.redirect_trailing_slash {
                candidates.push(toggle_trailing_slash(&cleaned));
            }

            let patterns = self.patterns.get(method)?;
            for candidate in &candidates {
                for pattern in patterns {
                    if let Some(fixed) = fold_case(pattern, candidate) {
                        if tree.at(&fixed).is_ok() {
                            return Some(fixed);
                        }
                    }
                }
            }
        }

        None
    }

    /// The `Allow` value for `path`, or `None` when no other method serves it.
    fn allowed(&self, path: &str, method: &Method) -> Option<HeaderValue> {
        let mut allow: Vec<&str> = if path == "*" {
            self.trees
                .keys()
                .filter(|m| **m != Method::OPTIONS)
                .map(Method::as_str)
                .collect()
        } else {
            self.trees
                .iter()
                .filter(|(m, _)| *m != method && **m != Method::OPTIONS)
                .filter(|(_, tree)| tree.at(path).is_ok())
                .map(|(m, _)| m.as_str())
                .collect()
        };

        if allow.is_empty() {
            return None;
        }
        if self.handle_options {
            allow.push(Method::OPTIONS.as_str());
        }
        allow.sort_unstable();
        HeaderValue::from_str(&allow.join(", ")).ok()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl NetHandler for Router {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let served = AssertUnwindSafe(self.dispatch(w, r)).catch_unwind().await;
            if let Err(payload) = served {
                error!(
                    method = %r.method(),
                    path = r.path(),
                    panic = defaults::panic_message(&*payload),
                    "recovered from handler panic"
                );
                (self.panic_handler)(w, r, &*payload);
            }
        })
    }
}

fn redirect(w: &mut dyn ResponseWriter, r: &Request, target: &str) {
    let target = encode_path(target);
    let location = match r.uri().query() {
        Some(query) => format!("{target}?{query}"),
        None => target,
    };
    let status = if r.method().is_safe() {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::TEMPORARY_REDIRECT
    };

    match HeaderValue::from_str(&location) {
        Ok(location) => {
            w.headers_mut().insert(LOCATION, location);
            w.write_header(status);
        }
        Err(_) => w.write_header(StatusCode::BAD_REQUEST),
    }
}

/// Percent-decodes a request path for matching. Paths that do not decode to
/// UTF-8 are matched as received.
fn decode_path(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_owned(),
    }
}

/// Percent-encodes each segment of a decoded path, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/').map(urlencoding::encode).collect::<Vec<_>>().join("/")
}

/// Rewrites `:name` and `*rest` segments into matchit's `{name}` / `{*rest}`.
fn to_matchit(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.as_bytes().first() {
            Some(b':') => format!("{{{}}}", &segment[1..]),
            Some(b'*') => format!("{{*{}}}", &segment[1..]),
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn toggle_trailing_slash(path: &str) -> String {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_owned(),
        Some(_) => path.to_owned(),
        None => format!("{path}/"),
    }
}

/// Matches `path` against `pattern` ignoring ASCII case in static segments
/// and returns the path spelled the way the pattern spells it.
fn fold_case(pattern: &str, path: &str) -> Option<String> {
    let mut fixed: Vec<&str> = Vec::new();
    let mut segments = path.split('/');

    for p in pattern.split('/') {
        if p.starts_with("{*") {
            fixed.extend(segments);
            return Some(fixed.join("/"));
        }

        let s = segments.next()?;
        if p.starts_with('{') && p.ends_with('}') {
            if s.is_empty() {
                return None;
            }
            fixed.push(s);
        } else if p.eq_ignore_ascii_case(s) {
            fixed.push(p);
        } else {
            return None;
        }
    }

    segments.next().is_none().then(|| fixed.join("/"))
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// The handlers [`RouterConfig::build`] installs for unset options.
///
/// All of them answer in plain text with the request method and path.
pub mod defaults {
    use std::any::Any;

    use http::StatusCode;
    use http::header::CONTENT_TYPE;

    use crate::error::Error;
    use crate::handler::{BoxNetHandler, NetHandler, net_handler_fn};
    use crate::request::Request;
    use crate::response::{ContentType, ResponseWriter};

    /// `500` with the error text.
    pub fn last_resort_error(w: &mut dyn ResponseWriter, r: &Request, err: Error) {
        let body = format!(
            "default last resort error handler: method: {}, path: {}, error: {err}",
            r.method(),
            r.path()
        );
        write_text(w, StatusCode::INTERNAL_SERVER_ERROR, &body);
    }

    /// `404`.
    pub fn not_found() -> BoxNetHandler {
        net_handler_fn(|w, r| {
            Box::pin(async move {
                let body = format!(
                    "default not found handler: method: {}, path: {}",
                    r.method(),
                    r.path()
                );
                write_text(w, StatusCode::NOT_FOUND, &body);
            })
        })
        .into_boxed_net_handler()
    }

    /// `405`.
    pub fn method_not_allowed() -> BoxNetHandler {
        net_handler_fn(|w, r| {
            Box::pin(async move {
                let body = format!(
                    "default method not allowed handler: method: {}, path: {}",
                    r.method(),
                    r.path()
                );
                write_text(w, StatusCode::METHOD_NOT_ALLOWED, &body);
            })
        })
        .into_boxed_net_handler()
    }

    /// `500` echoing the panic message.
    pub fn panic(w: &mut dyn ResponseWriter, r: &Request, payload: &(dyn Any + Send)) {
        let body = format!(
            "default panic handler: method: {}, path: {}, error: {}",
            r.method(),
            r.path(),
            panic_message(payload)
        );
        write_text(w, StatusCode::INTERNAL_SERVER_ERROR, &body);
    }

    /// The message of a panic payload raised by `panic!`, or a placeholder
    /// for payloads that are not strings.
    pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s
        } else {
            "Box<dyn Any>"
        }
    }

    fn write_text(w: &mut dyn ResponseWriter, status: StatusCode, body: &str) {
        w.headers_mut().insert(CONTENT_TYPE, ContentType::Text.header_value());
        w.write_header(status);
        // The client may be gone; there is no one left to tell.
        let _ = w.write_all(body.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use http::Uri;

    use super::*;
    use crate::handler::handler_fn;
    use crate::response::Response;

    fn ok() -> impl Handler {
        handler_fn(|w, r| {
            Box::pin(async move {
                let body = r.params().iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
                w.write_all(body.as_bytes())?;
                Ok(())
            })
        })
    }

    async fn send(router: &Router, method: Method, uri: &'static str) -> Response {
        let mut res = Response::new();
        let mut req = Request::new(method, Uri::from_static(uri));
        router.serve_http(&mut res, &mut req).await;
        res
    }

    #[test]
    fn rewrites_marker_segments() {
        assert_eq!(to_matchit("/users/:id"), "/users/{id}");
        assert_eq!(to_matchit("/files/*path"), "/files/{*path}");
        assert_eq!(to_matchit("/users/{id}/posts"), "/users/{id}/posts");
        assert_eq!(to_matchit("/"), "/");
    }

    #[test]
    fn folds_case_onto_the_pattern() {
        assert_eq!(fold_case("/users/{id}", "/USERS/AbC").as_deref(), Some("/users/AbC"));
        assert_eq!(fold_case("/files/{*p}", "/FILES/a/B").as_deref(), Some("/files/a/B"));
        assert_eq!(fold_case("/users/{id}", "/users"), None);
        assert_eq!(fold_case("/users", "/users/1"), None);
        assert_eq!(fold_case("/users/{id}", "/users/"), None);
    }

    #[test]
    fn toggles_trailing_slash() {
        assert_eq!(toggle_trailing_slash("/a"), "/a/");
        assert_eq!(toggle_trailing_slash("/a/"), "/a");
        assert_eq!(toggle_trailing_slash("/"), "/");
    }

    #[tokio::test]
    async fn matched_routes_receive_params() {
        let router = Router::new().handle(Method::GET, "/orgs/:org/users/{id}", ok());
        let res = send(&router, Method::GET, "/orgs/acme/users/7").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text(), "org=acme&id=7");
    }

    #[tokio::test]
    async fn allow_header_lists_other_methods_sorted() {
        let router = Router::new()
            .handle(Method::PUT, "/data", ok())
            .handle(Method::POST, "/data", ok())
            .handle(Method::DELETE, "/other", ok());

        let res = send(&router, Method::GET, "/data").await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[ALLOW], "OPTIONS, POST, PUT");
        assert_eq!(res.text(), "default method not allowed handler: method: GET, path: /data");

        let res = send(&router, Method::OPTIONS, "*").await;
        assert_eq!(res.headers()[ALLOW], "DELETE, OPTIONS, POST, PUT");
    }

    #[tokio::test]
    async fn method_not_allowed_can_be_disabled() {
        let router = RouterConfig::new()
            .handle_method_not_allowed(false)
            .build()
            .handle(Method::POST, "/data", ok());

        let res = send(&router, Method::GET, "/data").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(res.headers().get(ALLOW).is_none());
    }

    #[tokio::test]
    async fn automatic_options_runs_the_global_handler() {
        let router = RouterConfig::new()
            .global_options_handler(crate::handler::net_handler_fn(|w, _r| {
                Box::pin(async move {
                    w.write_header(StatusCode::NO_CONTENT);
                })
            }))
            .build()
            .handle(Method::GET, "/data", ok());

        let res = send(&router, Method::OPTIONS, "/data").await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(res.headers()[ALLOW], "GET, OPTIONS");

        let res = send(&router, Method::OPTIONS, "/missing").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn explicit_options_routes_win() {
        let router = Router::new()
            .handle(Method::GET, "/data", ok())
            .handle(Method::OPTIONS, "/data", handler_fn(|w, _r| {
                Box::pin(async move {
                    w.write_header(StatusCode::IM_A_TEAPOT);
                    Ok(())
                })
            }));

        let res = send(&router, Method::OPTIONS, "/data").await;
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert!(res.headers().get(ALLOW).is_none());
    }

    #[tokio::test]
    async fn redirects_trailing_slash_and_fixed_paths() {
        let router = Router::new()
            .handle(Method::GET, "/users", ok())
            .handle(Method::POST, "/users/{id}/", ok());

        let res = send(&router, Method::GET, "/users/?page=2").await;
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers()[LOCATION], "/users?page=2");

        let res = send(&router, Method::POST, "/users/9").await;
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.headers()[LOCATION], "/users/9/");

        let res = send(&router, Method::GET, "/../USERS").await;
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers()[LOCATION], "/users");

        let res = send(&router, Method::POST, "/x/../Users/9").await;
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.headers()[LOCATION], "/users/9/");
    }

    #[tokio::test]
    async fn percent_encoded_paths_are_matched_decoded() {
        let router = Router::new()
            .handle(Method::GET, "/users/{name}", ok())
            .handle(Method::GET, "/café", ok());

        let res = send(&router, Method::GET, "/users/a%20b").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text(), "name=a b");

        let res = send(&router, Method::GET, "/caf%C3%A9").await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&router, Method::GET, "/caf%C3%A9/?x=1").await;
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers()[LOCATION], "/caf%C3%A9?x=1");
    }

    #[tokio::test]
    async fn undecodable_paths_are_matched_as_received() {
        let router = Router::new().handle(Method::GET, "/raw/{v}", ok());

        let res = send(&router, Method::GET, "/raw/%FF").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text(), "v=%FF");
    }

    #[tokio::test]
    async fn redirects_can_be_disabled() {
        let router = RouterConfig::new()
            .redirect_trailing_slash(false)
            .redirect_fixed_path(false)
            .build()
            .handle(Method::GET, "/users", ok());

        assert_eq!(send(&router, Method::GET, "/users/").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&router, Method::GET, "/USERS").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_and_connect_are_never_redirected() {
        let router = Router::new()
            .handle(Method::GET, "/index", ok())
            .handle(Method::CONNECT, "/tunnel", ok());

        assert_eq!(send(&router, Method::GET, "/").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&router, Method::CONNECT, "/tunnel/").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn panics_become_500() {
        let router = Router::new().handle(
            Method::GET,
            "/boom",
            handler_fn(|_w, r| {
                Box::pin(async move {
                    if r.path() == "/boom" {
                        panic!("kaboom");
                    }
                    Ok(())
                })
            }),
        );

        let res = send(&router, Method::GET, "/boom").await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.text(), "default panic handler: method: GET, path: /boom, error: kaboom");
    }

    #[test]
    fn panic_message_reads_string_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let fixed: Box<dyn Any + Send> = Box::new("fixed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(defaults::panic_message(&*owned), "owned");
        assert_eq!(defaults::panic_message(&*fixed), "fixed");
        assert_eq!(defaults::panic_message(&*other), "Box<dyn Any>");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic_at_registration() {
        let _ = Router::new()
            .handle(Method::GET, "/users/{id}", ok())
            .handle(Method::GET, "/users/:id", ok());
    }
}
