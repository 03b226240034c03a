//! One HTTP exchange per call.
//!
//! # Design
//! A [`Transport`] turns a resolved [`RequestConfig`] into an
//! [`AttemptOutcome`]. It never retries and never interprets the status:
//! a 503 is a `Success` outcome as far as the transport is concerned. Errors
//! are folded into `TransportFailure` rather than returned, so the client's
//! retry loop has a single value to hand to the policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ClientConfig, ConfigError, DEFAULT_TIMEOUT};
use crate::http::{AttemptOutcome, HttpMethod, HttpResponse, RequestConfig};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs exactly one exchange. Implementations must honor
    /// `request.timeout` by returning a `Timeout` failure.
    async fn send(&self, request: &RequestConfig) -> AttemptOutcome;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &RequestConfig) -> AttemptOutcome {
        (**self).send(request).await
    }
}

/// Production transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);
        if let Some(connect_timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(connect_timeout);
        }
        let client = builder.build().map_err(ConfigError::ClientBuild)?;
        Ok(Self {
            client,
            default_timeout: config.timeout(),
        })
    }

    /// Wraps an existing client. Requests without a timeout use 15 seconds.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestConfig) -> AttemptOutcome {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return failure_from(&e),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        match response.bytes().await {
            Ok(body) => AttemptOutcome::Success(HttpResponse {
                status,
                headers,
                body: body.to_vec(),
            }),
            Err(e) => failure_from(&e),
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn failure_from(error: &reqwest::Error) -> AttemptOutcome {
    if error.is_timeout() {
        AttemptOutcome::timeout(error.to_string())
    } else {
        AttemptOutcome::network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_map_one_to_one() {
        for method in HttpMethod::ALL {
            assert_eq!(to_reqwest_method(method).as_str(), method.as_str());
        }
    }

    #[test]
    fn transport_builds_from_default_config() {
        let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
        assert_eq!(transport.default_timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
        let outcome = transport
            .send(&RequestConfig::new(format!("http://{addr}/status")))
            .await;
        assert_eq!(outcome.failure_kind(), Some(crate::http::FailureKind::Network));
    }
}
