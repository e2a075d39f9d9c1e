//! HTTP sink for shipping log batches to a collector endpoint.
//!
//! Batches are POSTed as JSON over a pooled connection. Transient failures
//! are retried a bounded number of times with exponential backoff inside a
//! single `send`; anything still failing is reported to the engine, which
//! requeues the batch for the next flush.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::Config;
use crate::entry::LogBatch;
use crate::sink::{Sink, SinkError};

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Errors that can occur while delivering a batch over HTTP.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed
    Request(reqwest::Error),

    /// Server returned an error status code
    Status { code: StatusCode, message: String },

    /// All retry attempts exhausted
    RetriesExhausted { attempts: u32, last_error: String },

    /// Request timeout
    Timeout,

    /// Client configuration error
    Config(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Request(e) => write!(f, "HTTP request failed: {}", e),
            ClientError::Status { code, message } => {
                write!(f, "Server error ({}): {}", code, message)
            }
            ClientError::RetriesExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "All {} attempts exhausted. Last error: {}",
                attempts, last_error
            ),
            ClientError::Timeout => write!(f, "Request timed out"),
            ClientError::Config(e) => write!(f, "Client configuration error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Request(err)
        }
    }
}

/// Sink that POSTs each batch to an HTTP endpoint.
pub struct HttpSink {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    endpoint: String,

    /// Retries after the first attempt, per batch
    max_retries: u32,

    timeout: Duration,

    base_delay: Duration,
}

impl HttpSink {
    /// Create a sink from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_settings(
            config.http_endpoint.clone(),
            config.request_timeout,
            config.max_retries,
        )
    }

    /// Create a sink with explicit settings.
    pub fn with_settings(
        endpoint: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_retries,
            timeout,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        })
    }

    /// Override the first retry delay. Later retries double it.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Deliver a batch, retrying transient failures.
    ///
    /// Connection errors, timeouts, 5xx and 429 responses are retried up to
    /// `max_retries` times. Other 4xx responses fail immediately.
    pub async fn post_batch(&self, batch: &LogBatch) -> Result<(), ClientError> {
        debug!(
            batch_size = batch.len(),
            batch_id = %batch.batch_id,
            endpoint = %self.endpoint,
            "Posting log batch"
        );

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.calculate_backoff_delay(attempt - 1);
                debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }

            let error = match self.send_request(batch).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !self.is_retryable_error(&error) {
                return Err(error);
            }

            if attempt >= self.max_retries {
                if self.max_retries == 0 {
                    return Err(error);
                }
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt + 1,
                    last_error: error.to_string(),
                });
            }

            warn!(
                error = %error,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                "Request failed, will retry"
            );
            attempt += 1;
        }
    }

    /// Send a single HTTP request without retry logic.
    async fn send_request(&self, batch: &LogBatch) -> Result<(), ClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(ClientError::Status {
            code: status,
            message,
        })
    }

    /// Exponential backoff with up to 25% jitter, capped at `MAX_RETRY_DELAY_MS`.
    fn calculate_backoff_delay(&self, retry: u32) -> Duration {
        let base_delay = self.base_delay.as_millis() as u64;
        let exponential_delay = base_delay.saturating_mul(1 << retry.min(10));
        let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);
        let total_delay = exponential_delay
            .saturating_add(jitter)
            .min(MAX_RETRY_DELAY_MS);

        Duration::from_millis(total_delay)
    }

    fn is_retryable_error(&self, error: &ClientError) -> bool {
        match error {
            ClientError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ClientError::Timeout => true,
            ClientError::Status { code, .. } => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::RetriesExhausted { .. } => false,
            ClientError::Config(_) => false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Sink for HttpSink {
    async fn send(&self, batch: &LogBatch) -> Result<(), SinkError> {
        self.post_batch(batch).await.map_err(SinkError::from)
    }
}
