//! The single error type returned by `HttpClient`.
//!
//! # Design
//! Callers only ever see `HttpError`. Transport failures, non-retried error
//! statuses and shape mismatches are all translated into it, tagged with an
//! [`ErrorKind`], so a route handler can map it to a protocol response
//! without knowing which layer failed. The serialized form
//! (`{statusCode, message, errorKind, details}`) is what such a handler would
//! put on the wire.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::http::FailureKind;
use crate::shape::ValidationIssue;

/// Status code reported for responses that arrived but could not be used.
pub const VALIDATION_STATUS: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Connection-level failure, including cancellation.
    Transport,
    /// The exchange exceeded its timeout.
    Timeout,
    /// The server answered with a status that was not retried away.
    HttpStatus,
    /// The body could not be decoded or did not match the declared shape.
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::HttpStatus => "HTTP_STATUS",
            ErrorKind::Validation => "VALIDATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// Unset for failures that never produced a status.
    pub status_code: Option<u16>,
    pub message: String,
    #[serde(rename = "errorKind")]
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip)]
    failure: Option<FailureKind>,
}

impl HttpError {
    pub fn new(kind: ErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            kind,
            details: None,
            failure: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Builds the error for a terminal transport failure.
    pub fn from_failure(
        kind: FailureKind,
        underlying: &str,
        url: &str,
        timeout: Option<Duration>,
    ) -> Self {
        let (error_kind, message) = match kind {
            FailureKind::Network => (ErrorKind::Transport, format!("Request to {url} failed: {underlying}")),
            FailureKind::Timeout => {
                let message = match timeout {
                    Some(timeout) => format!("Request to {url} timed out after {}ms", timeout.as_millis()),
                    None => format!("Request to {url} timed out"),
                };
                (ErrorKind::Timeout, message)
            }
            FailureKind::Aborted => (ErrorKind::Transport, format!("Request to {url} was aborted")),
        };
        let mut error = Self::new(error_kind, None, message).with_details(json!({
            "url": url,
            "failure": kind,
            "underlying": underlying,
        }));
        error.failure = Some(kind);
        error
    }

    /// Builds the error for a terminal non-2xx response. `body` is the
    /// decoded response body, kept for diagnostics.
    pub fn status(url: &str, status: u16, body: Value) -> Self {
        Self::new(
            ErrorKind::HttpStatus,
            Some(status),
            format!("Request to {url} failed with status code {status}"),
        )
        .with_details(json!({ "url": url, "body": body }))
    }

    pub fn validation(url: &str, issues: &[ValidationIssue]) -> Self {
        Self::new(
            ErrorKind::Validation,
            Some(VALIDATION_STATUS),
            format!("Response from {url} was not in the expected shape"),
        )
        .with_details(json!({ "url": url, "issues": issues }))
    }

    /// Body bytes that could not be turned into a value at all.
    pub fn undecodable(url: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Validation,
            Some(VALIDATION_STATUS),
            format!("Response from {url} could not be decoded"),
        )
        .with_details(json!({ "url": url, "reason": reason.to_string() }))
    }

    /// The transport failure behind this error, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn is_aborted(&self) -> bool {
        self.failure == Some(FailureKind::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_field_names() {
        let error = HttpError::status("http://api/todos/1", 404, json!({"error": "missing"}));
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["statusCode"], 404);
        assert_eq!(value["errorKind"], "HTTP_STATUS");
        assert_eq!(value["message"], "Request to http://api/todos/1 failed with status code 404");
        assert_eq!(value["details"]["body"]["error"], "missing");
        assert!(value.get("failure").is_none());
    }

    #[test]
    fn transport_errors_have_no_status() {
        let error = HttpError::from_failure(FailureKind::Network, "connection refused", "http://api", None);
        assert_eq!(error.kind, ErrorKind::Transport);
        assert_eq!(error.status_code, None);
        assert_eq!(error.failure_kind(), Some(FailureKind::Network));
        assert_eq!(error.to_string(), "Request to http://api failed: connection refused");
        let value = serde_json::to_value(&error).unwrap();
        assert!(value["statusCode"].is_null());
        assert_eq!(value["details"]["failure"], "network");
    }

    #[test]
    fn timeout_message_mentions_duration() {
        let error = HttpError::from_failure(
            FailureKind::Timeout,
            "operation timed out",
            "http://api",
            Some(Duration::from_millis(1500)),
        );
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.to_string(), "Request to http://api timed out after 1500ms");
    }

    #[test]
    fn aborted_is_a_transport_error() {
        let error = HttpError::from_failure(FailureKind::Aborted, "request was cancelled", "http://api", None);
        assert_eq!(error.kind, ErrorKind::Transport);
        assert!(error.is_aborted());
    }

    #[test]
    fn validation_error_is_500_with_issues() {
        let issues = vec![ValidationIssue {
            path: "$.id".to_string(),
            expected: "integer".to_string(),
            found: "string".to_string(),
        }];
        let error = HttpError::validation("http://api", &issues);
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.status_code, Some(500));
        let details = error.details.unwrap();
        assert_eq!(details["issues"][0]["path"], "$.id");
        assert_eq!(details["issues"][0]["found"], "string");
    }

    #[test]
    fn kind_display_matches_wire_form() {
        for kind in [ErrorKind::Transport, ErrorKind::Timeout, ErrorKind::HttpStatus, ErrorKind::Validation] {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, kind.to_string());
        }
    }
}
