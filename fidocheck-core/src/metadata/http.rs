//! HTTP transport for the metadata BLOB.
//!
//! A transport failure (nothing came back) is a [`TransportError`]; a response
//! with any status is an [`HttpResponse`] and the caller judges the status.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait MetadataHttpClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Statuses worth retrying: throttling and gateway hiccups.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

#[cfg(feature = "network")]
pub use self::reqwest_client::{ReqwestHttpClient, RetryConfig};

#[cfg(feature = "network")]
mod reqwest_client {
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use backoff::{future::retry_notify, ExponentialBackoff};
    use reqwest::Client;
    use tracing::{debug, instrument, warn};

    use super::{is_transient_status, HttpResponse, MetadataHttpClient, TransportError};

    /// Timeout and retry policy for [`ReqwestHttpClient`].
    #[derive(Debug, Clone)]
    pub struct RetryConfig {
        /// Per-request timeout.
        pub timeout: Duration,
        /// Maximum retry attempts for transient errors.
        pub max_retries: u32,
        /// Initial retry interval.
        pub initial_interval: Duration,
        /// Maximum retry interval.
        pub max_interval: Duration,
    }

    impl Default for RetryConfig {
        fn default() -> Self {
            Self {
                timeout: Duration::from_secs(30),
                max_retries: 3,
                initial_interval: Duration::from_millis(500),
                max_interval: Duration::from_secs(5),
            }
        }
    }

    enum Attempt {
        Transport(TransportError),
        Status(HttpResponse),
    }

    /// `reqwest` client with exponential backoff on transient failures.
    pub struct ReqwestHttpClient {
        client: Client,
        config: RetryConfig,
    }

    impl ReqwestHttpClient {
        pub fn new(config: RetryConfig) -> Result<Self, TransportError> {
            let client = Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {e}")))?;
            Ok(Self { client, config })
        }

        async fn fetch_once(&self, url: &str) -> Result<HttpResponse, backoff::Error<Attempt>> {
            let start = Instant::now();

            let response = self.client.get(url).send().await.map_err(|e| {
                let latency_ms = start.elapsed().as_millis() as u64;
                let err = classify(&e);
                if is_transient_error(&e) {
                    warn!(error = %e, latency_ms, "Transient error, will retry");
                    backoff::Error::transient(Attempt::Transport(err))
                } else {
                    warn!(error = %e, latency_ms, "Permanent error, aborting");
                    backoff::Error::permanent(Attempt::Transport(err))
                }
            })?;

            let status = response.status().as_u16();
            debug!(status, "Received HTTP response");

            let body = response
                .bytes()
                .await
                .map_err(|e| backoff::Error::transient(Attempt::Transport(classify(&e))))?
                .to_vec();
            let response = HttpResponse { status, body };

            if is_transient_status(status) {
                warn!(status, "Transient HTTP status, will retry");
                return Err(backoff::Error::transient(Attempt::Status(response)));
            }

            debug!(
                latency_ms = start.elapsed().as_millis() as u64,
                bytes = response.body.len(),
                "Request completed"
            );
            Ok(response)
        }

        fn build_backoff(&self) -> ExponentialBackoff {
            ExponentialBackoff {
                initial_interval: self.config.initial_interval,
                max_interval: self.config.max_interval,
                max_elapsed_time: Some(self.config.timeout * self.config.max_retries.max(1)),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MetadataHttpClient for ReqwestHttpClient {
        #[instrument(skip(self))]
        async fn fetch(&self, url: &str) -> Result<HttpResponse, TransportError> {
            let result = retry_notify(
                self.build_backoff(),
                || async move { self.fetch_once(url).await },
                |_, duration: Duration| {
                    warn!(retry_after_ms = duration.as_millis() as u64, "Retry scheduled");
                },
            )
            .await;

            match result {
                Ok(response) => Ok(response),
                // Retries exhausted on a status: hand the last response back.
                Err(Attempt::Status(response)) => Ok(response),
                Err(Attempt::Transport(err)) => Err(err),
            }
        }
    }

    fn classify(error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(error.to_string())
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error.to_string())
        }
    }

    /// Only timeouts and connection failures are retried; request build and
    /// body errors repeat identically on every attempt.
    fn is_transient_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }

}
