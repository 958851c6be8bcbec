//! JSON request and response bodies.

use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::io::AsyncReadExt;

use crate::body::Body;
use crate::error::Error;
use crate::response::{ContentType, ResponseWriter};

/// A JSON body carried a field the target type does not declare.
#[derive(Debug, thiserror::Error)]
#[error("json: unknown field `{0}`")]
pub struct UnknownField(pub String);

/// A [`Problem`] that cannot be written as problem details.
#[derive(Debug, thiserror::Error)]
#[error("invalid problem: {0}")]
pub struct InvalidProblem(&'static str);

/// Reads `body` to the end and decodes it as JSON.
///
/// Fields `T` does not declare are rejected with [`UnknownField`], naming the
/// first one found. Trailing data after the value is an error too.
pub async fn read_json<T: DeserializeOwned>(body: &mut Body) -> Result<T, Error> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf).await?;

    let mut unknown = None;
    let mut de = serde_json::Deserializer::from_slice(&buf);
    let value: T = serde_ignored::deserialize(&mut de, |path| {
        unknown.get_or_insert_with(|| path.to_string());
    })?;
    de.end()?;

    match unknown {
        Some(field) => Err(UnknownField(field).into()),
        None => Ok(value),
    }
}

/// Encodes `value` and writes it with `status` and
/// `Content-Type: application/json; charset=UTF-8`.
///
/// The value is encoded before anything is written, so an encoding failure
/// leaves the response untouched. The body ends with a newline.
///
/// ```rust
/// use http::StatusCode;
/// use httpkit::{Response, write_json};
///
/// let mut res = Response::new();
/// write_json(&mut res, &serde_json::json!({"id": 7}), StatusCode::CREATED).unwrap();
/// assert_eq!(res.text(), "{\"id\":7}\n");
/// ```
pub fn write_json<T>(w: &mut dyn ResponseWriter, value: &T, status: StatusCode) -> Result<(), Error>
where
    T: Serialize + ?Sized,
{
    let mut encoded = serde_json::to_vec(value)?;
    encoded.push(b'\n');

    w.headers_mut().append(CONTENT_TYPE, ContentType::Json.header_value());
    w.write_header(status);
    w.write_all(&encoded)?;
    Ok(())
}

/// An RFC 7807 problem details body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// URI reference identifying the problem type.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// URI reference identifying this occurrence.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
}

impl Problem {
    /// A problem of type `about:blank` titled with the status reason.
    pub fn new(status: StatusCode) -> Self {
        Self {
            kind: "about:blank".to_owned(),
            title: status.canonical_reason().unwrap_or_default().to_owned(),
            status: status.as_u16(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    #[must_use]
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    fn validate(&self) -> Result<StatusCode, InvalidProblem> {
        if self.kind.is_empty() {
            return Err(InvalidProblem("missing type"));
        }
        if self.title.is_empty() {
            return Err(InvalidProblem("missing title"));
        }
        if !(100..=599).contains(&self.status) {
            return Err(InvalidProblem("status out of range"));
        }
        StatusCode::from_u16(self.status).map_err(|_| InvalidProblem("status out of range"))
    }
}

/// Writes `problem` as `application/problem+json` with its own status.
///
/// A problem without a `type` or `title`, or whose status is not in
/// `100..=599`, is rejected with [`InvalidProblem`] and nothing is written.
pub fn write_problem(w: &mut dyn ResponseWriter, problem: &Problem) -> Result<(), Error> {
    let status = problem.validate()?;
    let encoded = serde_json::to_vec(problem)?;

    w.headers_mut().insert(CONTENT_TYPE, ContentType::ProblemJson.header_value());
    w.write_header(status);
    w.write_all(&encoded)?;
    Ok(())
}
