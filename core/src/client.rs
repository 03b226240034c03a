//! Retrying, validating HTTP client.
//!
//! # Design
//! `HttpClient` holds only immutable collaborators: a [`Transport`], a
//! [`RetryPolicy`], a [`SchemaValidator`] and request defaults. Each call
//! resolves its `RequestConfig` once, then runs attempts strictly in
//! sequence: send, ask the policy, sleep, repeat. The only state carried
//! between attempts is the attempt counter and the start time used for
//! logging, so concurrent calls on one client never interact.
//!
//! The terminal outcome is interpreted in one place (`finish`): transport
//! failures, non-2xx statuses and shape mismatches all become `HttpError`.
//!
//! Cancellation races the token against both suspension points (the
//! exchange and the backoff sleep). A cancelled call ends with an `Aborted`
//! outcome and the policy never retries it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError, DEFAULT_TIMEOUT};
use crate::error::HttpError;
use crate::http::{AttemptOutcome, FailureKind, HttpMethod, RequestConfig};
use crate::retry::{is_retryable, RetryPolicy};
use crate::shape::{SchemaValidator, StructuralValidator};
use crate::transport::{ReqwestTransport, Transport};

pub struct HttpClient<T = ReqwestTransport> {
    transport: T,
    policy: RetryPolicy,
    validator: Arc<dyn SchemaValidator>,
    default_timeout: Duration,
    default_headers: Vec<(String, String)>,
}

impl HttpClient<ReqwestTransport> {
    /// A reqwest-backed client with default configuration.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(&ClientConfig::default())
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(transport)
            .with_retry_policy(config.retry_policy())
            .with_default_timeout(config.timeout())
            .with_default_headers(config.default_headers()))
    }
}

impl<T: Transport> HttpClient<T> {
    /// Default policy, structural validation and a 15 second timeout.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            validator: Arc::new(StructuralValidator),
            default_timeout: DEFAULT_TIMEOUT,
            default_headers: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_default_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issues `config` and returns the validated body.
    pub async fn request(&self, config: RequestConfig) -> Result<Value, HttpError> {
        self.request_with_cancel(config, &CancellationToken::new()).await
    }

    /// Like [`request`](Self::request), but gives up as soon as `cancel` fires.
    pub async fn request_with_cancel(
        &self,
        config: RequestConfig,
        cancel: &CancellationToken,
    ) -> Result<Value, HttpError> {
        let request = self.resolve(config);
        let span = info_span!(
            "http_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            url = %request.url,
        );
        async {
            let outcome = self.execute(&request, cancel).await;
            self.finish(&request, outcome)
        }
        .instrument(span)
        .await
    }

    /// Issues `config` and deserializes the validated body into `R`.
    ///
    /// A body that passes the shape but does not fit `R` is a validation
    /// error.
    pub async fn request_as<R: DeserializeOwned>(&self, config: RequestConfig) -> Result<R, HttpError> {
        let url = config.url.clone();
        let value = self.request(config).await?;
        serde_json::from_value(value).map_err(|e| HttpError::undecodable(&url, e))
    }

    pub async fn get(&self, config: RequestConfig) -> Result<Value, HttpError> {
        self.request(config.method(HttpMethod::Get)).await
    }

    pub async fn post(&self, config: RequestConfig) -> Result<Value, HttpError> {
        self.request(config.method(HttpMethod::Post)).await
    }

    pub async fn put(&self, config: RequestConfig) -> Result<Value, HttpError> {
        self.request(config.method(HttpMethod::Put)).await
    }

    pub async fn patch(&self, config: RequestConfig) -> Result<Value, HttpError> {
        self.request(config.method(HttpMethod::Patch)).await
    }

    pub async fn delete(&self, config: RequestConfig) -> Result<Value, HttpError> {
        self.request(config.method(HttpMethod::Delete)).await
    }

    /// Fills in the client defaults. The result is not modified afterwards.
    fn resolve(&self, mut config: RequestConfig) -> RequestConfig {
        if config.timeout.is_none() {
            config.timeout = Some(self.default_timeout);
        }
        for (name, value) in &self.default_headers {
            if config.header_value(name).is_none() {
                config.headers.push((name.clone(), value.clone()));
            }
        }
        config
    }

    /// Runs attempts until the policy stops or the call is cancelled, and
    /// returns the last outcome.
    async fn execute(&self, request: &RequestConfig, cancel: &CancellationToken) -> AttemptOutcome {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => AttemptOutcome::aborted(),
                outcome = self.transport.send(request) => outcome,
            };
            debug!(
                attempt,
                status = ?outcome.status(),
                failure = ?outcome.failure_kind(),
                "attempt finished"
            );

            let decision = self.policy.decide(&outcome, attempt, request.method);
            if !decision.should_retry {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if outcome.failure_kind() == Some(FailureKind::Aborted) {
                    warn!(attempts = attempt + 1, elapsed_ms, "request aborted");
                } else if attempt >= self.policy.max_retries() && is_retryable(&outcome, request.method) {
                    warn!(attempts = attempt + 1, elapsed_ms, "retry budget exhausted");
                }
                return outcome;
            }

            debug!(
                attempt,
                delay_ms = decision.delay.as_millis() as u64,
                "scheduling retry"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(attempts = attempt + 1, "request aborted during backoff");
                    return AttemptOutcome::aborted();
                }
                _ = tokio::time::sleep(decision.delay) => {}
            }
            attempt += 1;
        }
    }

    fn finish(&self, request: &RequestConfig, outcome: AttemptOutcome) -> Result<Value, HttpError> {
        let response = match outcome {
            AttemptOutcome::TransportFailure { kind, underlying } => {
                return Err(HttpError::from_failure(kind, &underlying, &request.url, request.timeout));
            }
            AttemptOutcome::Success(response) => response,
        };

        if !response.is_success() {
            let body = decode_body(&response.body).unwrap_or(Value::Null);
            return Err(HttpError::status(&request.url, response.status, body));
        }

        let body = decode_body(&response.body).map_err(|e| HttpError::undecodable(&request.url, e))?;
        self.validator
            .validate(&body, request.response_shape.as_ref())
            .into_result()
            .map_err(|issues| HttpError::validation(&request.url, &issues))
    }
}

/// Empty bodies decode to `null`, JSON text to its value and any other UTF-8
/// text to a JSON string.
fn decode_body(body: &[u8]) -> Result<Value, std::str::Utf8Error> {
    let text = std::str::from_utf8(body)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}
