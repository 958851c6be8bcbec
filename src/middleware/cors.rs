//! Cross-origin resource sharing.
//!
//! Runs in front of the router as a [`NetMiddleware`]. Preflight requests
//! (`OPTIONS` carrying `Origin` and `Access-Control-Request-Method`) are
//! answered here and never reach the routes; every other request gets the
//! allow-origin headers and continues.

use std::sync::Arc;
use std::time::Duration;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_TYPE, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::debug;

use super::NetMiddleware;
use crate::handler::{BoxFuture, BoxNetHandler, NetHandler};
use crate::request::Request;
use crate::response::{ContentType, ResponseWriter};

/// Origins a [`CorsConfig`] accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin, answered with `*`.
    Any,
    /// Exactly these origins, echoed back when they match.
    List(Vec<String>),
}

impl AllowedOrigins {
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.iter().any(|o| o == origin),
        }
    }

    /// The `Access-Control-Allow-Origin` value for `origin`, if allowed.
    fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(_) if self.is_allowed(origin) => HeaderValue::from_str(origin).ok(),
            Self::List(_) => None,
        }
    }
}

/// CORS policy.
///
/// The default accepts any origin for `GET`, `HEAD` and `POST` with the
/// headers `Origin`, `Accept`, `Content-Type` and `X-Requested-With`, and
/// lets browsers cache preflights for a day.
///
/// ```rust
/// use std::time::Duration;
/// use http::Method;
/// use httpkit::middleware::{CorsConfig, cors};
///
/// let cors = cors(
///     CorsConfig::default()
///         .allow_origins(["https://app.example.com"])
///         .allow_methods([Method::GET, Method::POST, Method::DELETE])
///         .allow_credentials(true)
///         .max_age(Duration::from_secs(600)),
/// );
/// # let _ = cors;
/// ```
#[derive(Clone, Debug)]
pub struct CorsConfig {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    headers: Vec<String>,
    expose: Vec<String>,
    credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: vec![Method::GET, Method::HEAD, Method::POST],
            headers: ["origin", "accept", "content-type", "x-requested-with"]
                .map(String::from)
                .to_vec(),
            expose: Vec::new(),
            credentials: false,
            max_age: Some(Duration::from_secs(86_400)),
        }
    }
}

impl CorsConfig {
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.origins = AllowedOrigins::Any;
        self
    }

    /// Restricts to these origins. `"*"` anywhere in the list means any.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: Vec<String> = origins.into_iter().map(Into::into).collect();
        self.origins = if origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        };
        self
    }

    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.methods.clear();
        for method in methods {
            if !self.methods.contains(&method) {
                self.methods.push(method);
            }
        }
        self
    }

    /// Request headers a preflight may ask for. `"*"` allows any.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(|h| h.into().to_ascii_lowercase()).collect();
        self
    }

    /// Response headers scripts may read.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose = headers.into_iter().map(|h| h.into().to_ascii_lowercase()).collect();
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    #[must_use]
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    #[must_use]
    pub fn no_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    fn allows_header(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == "*" || h.eq_ignore_ascii_case(header))
    }
}

/// Builds the CORS [`NetMiddleware`] for `config`.
pub fn cors(config: CorsConfig) -> NetMiddleware {
    let config = Arc::new(config);
    NetMiddleware::new(move |next| {
        Arc::new(Cors { config: Arc::clone(&config), next })
    })
}

struct Cors {
    config: Arc<CorsConfig>,
    next: BoxNetHandler,
}

impl NetHandler for Cors {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        r: &'a mut Request,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if is_preflight(r) {
                self.preflight(w, r);
                return;
            }

            self.actual(w.headers_mut(), r);
            self.next.serve_http(w, r).await;
        })
    }
}

impl Cors {
    fn preflight(&self, w: &mut dyn ResponseWriter, r: &Request) {
        let headers = w.headers_mut();
        for vary in ["Origin", "Access-Control-Request-Method", "Access-Control-Request-Headers"] {
            headers.append(VARY, HeaderValue::from_static(vary));
        }

        let origin = r.header(ORIGIN.as_str()).unwrap_or_default();
        let Some(allow_origin) = self.config.origins.header_value(origin) else {
            return self.reject(w, "origin not allowed");
        };

        let requested = r
            .header(ACCESS_CONTROL_REQUEST_METHOD.as_str())
            .and_then(|m| m.parse::<Method>().ok());
        match requested {
            Some(m) if m == Method::OPTIONS || self.config.methods.contains(&m) => {}
            _ => return self.reject(w, "method not allowed"),
        }

        let asked = r.header(ACCESS_CONTROL_REQUEST_HEADERS.as_str()).unwrap_or_default();
        let asked: Vec<&str> = asked.split(',').map(str::trim).filter(|h| !h.is_empty()).collect();
        if let Some(denied) = asked.iter().find(|h| !self.config.allows_header(h)) {
            debug!(header = %denied, "cors preflight rejected");
            return self.reject(w, "header not allowed");
        }

        let headers = w.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        let methods: Vec<&str> = self.config.methods.iter().map(Method::as_str).collect();
        if let Ok(v) = HeaderValue::from_str(&methods.join(", ")) {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, v);
        }
        if !asked.is_empty() {
            if let Ok(v) = HeaderValue::from_str(&asked.join(", ")) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, v);
            }
        }
        if self.config.credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(age) = self.config.max_age {
            headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(age.as_secs()));
        }
        w.write_header(StatusCode::NO_CONTENT);
    }

    fn actual(&self, headers: &mut HeaderMap, r: &Request) {
        headers.append(VARY, HeaderValue::from_static("Origin"));

        let Some(origin) = r.header(ORIGIN.as_str()) else {
            return;
        };
        let Some(allow_origin) = self.config.origins.header_value(origin) else {
            return;
        };

        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if self.config.credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if !self.config.expose.is_empty() {
            if let Ok(v) = HeaderValue::from_str(&self.config.expose.join(", ")) {
                headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, v);
            }
        }
    }

    fn reject(&self, w: &mut dyn ResponseWriter, reason: &str) {
        w.headers_mut().insert(CONTENT_TYPE, ContentType::Text.header_value());
        w.write_header(StatusCode::FORBIDDEN);
        // Nothing useful to do if the client went away.
        let _ = w.write_all(format!("cors preflight rejected: {reason}").as_bytes());
    }
}

fn is_preflight(r: &Request) -> bool {
    r.method() == Method::OPTIONS
        && r.headers().contains_key(ORIGIN)
        && r.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}
