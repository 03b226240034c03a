//! Request and attempt-outcome types shared by the client, the retry policy
//! and the transport.
//!
//! # Design
//! Requests and responses are plain owned data, the same way the transport
//! layer sees them. A `RequestConfig` is built by the caller, resolved once by
//! the client (default timeout and headers filled in) and then only borrowed
//! by each attempt, so it cannot change between retries.
//!
//! `AttemptOutcome` is what one exchange produced: either a response with a
//! status code (any status, including 4xx/5xx) or a transport-level failure
//! that never reached a status line.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shape::Shape;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request with this method may be repeated by the retry policy.
    ///
    /// PATCH is treated as idempotent here even though HTTP does not
    /// guarantee it. Only POST is excluded.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, HttpMethod::Post)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name one of the supported methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseMethodError(pub String);

impl FromStr for HttpMethod {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseMethodError(s.to_string()))
    }
}

/// Everything needed to issue one logical request.
///
/// Built with [`RequestConfig::new`] and the chained setters. Fields left as
/// `None` fall back to the client's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    pub response_shape: Option<Shape>,
}

impl RequestConfig {
    /// A `GET` request for `url` with no headers, body or shape.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            response_shape: None,
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets a header, replacing any existing header with the same name
    /// (compared case-insensitively).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the body and sets `content-type: application/json`.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declares the shape the decoded response body must have.
    pub fn shape(mut self, shape: Shape) -> Self {
        self.response_shape = Some(shape);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response as returned by one exchange, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Why an exchange produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Connection refused, reset, DNS failure and similar.
    Network,
    /// The per-request timeout elapsed before the exchange completed.
    Timeout,
    /// The caller cancelled the request.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Result of exactly one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A status line was received. The status may still be an error.
    Success(HttpResponse),
    /// No status was received.
    TransportFailure { kind: FailureKind, underlying: String },
}

impl AttemptOutcome {
    pub fn network(underlying: impl Into<String>) -> Self {
        AttemptOutcome::TransportFailure {
            kind: FailureKind::Network,
            underlying: underlying.into(),
        }
    }

    pub fn timeout(underlying: impl Into<String>) -> Self {
        AttemptOutcome::TransportFailure {
            kind: FailureKind::Timeout,
            underlying: underlying.into(),
        }
    }

    pub fn aborted() -> Self {
        AttemptOutcome::TransportFailure {
            kind: FailureKind::Aborted,
            underlying: "request was cancelled".to_string(),
        }
    }

    /// Status code, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptOutcome::Success(response) => Some(response.status),
            AttemptOutcome::TransportFailure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::TransportFailure { kind, .. } => Some(*kind),
        }
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
