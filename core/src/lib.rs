//! Outbound HTTP client with retry-with-backoff and response shape
//! validation.
//!
//! # Overview
//! Callers describe a request with [`RequestConfig`], optionally attaching a
//! [`Shape`] the response body must match. [`HttpClient`] sends it through a
//! [`Transport`], retries transient failures according to a [`RetryPolicy`],
//! and returns either the validated body or a single [`HttpError`].
//!
//! # Design
//! - The retry policy and the schema validator are pure and hold no I/O, so
//!   they are tested without a network.
//! - The transport performs exactly one exchange per call and never retries.
//! - `HttpClient` holds only immutable collaborators; calls are independent
//!   and may run concurrently.
//! - `HttpError` is the only error type a request returns.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;
pub mod shape;
pub mod transport;

pub use client::HttpClient;
pub use config::{BackoffStrategy, ClientConfig, ConfigError, RetryConfig};
pub use error::{ErrorKind, HttpError};
pub use http::{AttemptOutcome, FailureKind, HttpMethod, HttpResponse, ParseMethodError, RequestConfig};
pub use retry::{Backoff, RetryDecision, RetryPolicy};
pub use shape::{validate, SchemaValidator, Shape, StructuralValidator, UnknownKeys, ValidationIssue, ValidationResult};
pub use transport::{ReqwestTransport, Transport};

pub use tokio_util::sync::CancellationToken;
