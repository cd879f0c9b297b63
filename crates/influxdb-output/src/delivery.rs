// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batch delivery with retry.
//!
//! A flush is serialized once; [`deliver`] then replays exactly those bytes
//! until the transport accepts them or the retry budget runs out. The body
//! is never rebuilt from the live buffer, so a retried batch can neither
//! pick up points from the next cycle nor lose any of its own.

use crate::config::{BackoffKind, ConfigError, InfluxDbConfig, RetryConfig};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single send attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InfluxDB returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Errors from delivering one batch.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },
}

impl DeliveryError {
    /// Send attempts made before failing.
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryError::Encode(_) => 0,
            DeliveryError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Sends serialized batches to the store.
pub trait Transport: Send + Sync + 'static {
    /// Send one body. Called again with the same bytes on retry.
    fn send(&self, body: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// HTTP transport for the InfluxDB series endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
}

impl HttpTransport {
    /// Create a transport for the configured server.
    pub fn new(config: &InfluxDbConfig) -> Result<Self, ConfigError> {
        let url = series_url(config)?;
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    /// Endpoint the transport posts to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for HttpTransport {
    async fn send(&self, body: &[u8]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Build `/db/<db>/series?time_precision=..&u=..&p=..` for a server.
pub fn series_url(config: &InfluxDbConfig) -> Result<Url, ConfigError> {
    let scheme = if config.ssl { "https" } else { "http" };
    let mut url = Url::parse(&format!("{}://{}:{}/", scheme, config.host, config.port))
        .map_err(|e| {
            ConfigError::Invalid(format!("invalid InfluxDB host '{}': {}", config.host, e))
        })?;

    url.path_segments_mut()
        .map_err(|_| ConfigError::Invalid(format!("invalid InfluxDB host '{}'", config.host)))?
        .pop_if_empty()
        .extend(["db", config.db.as_str(), "series"]);

    url.query_pairs_mut()
        .append_pair("time_precision", config.time_precision.as_str())
        .append_pair("u", &config.user)
        .append_pair("p", &config.password);

    Ok(url)
}

/// Wait between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `initial * 2^(failures - 1)`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given number of failed attempts (>= 1).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let exponent = failures.saturating_sub(1);
                initial
                    .saturating_mul(2u32.saturating_pow(exponent))
                    .min(max)
            }
        }
    }
}

/// Retry budget for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. `None` retries until success.
    pub max_attempts: Option<u32>,
    /// Wait between attempts.
    pub backoff: Backoff,
    /// Timeout of a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Give up after `max_attempts` attempts.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            ..Default::default()
        }
    }

    /// Retry until the store accepts the batch.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Default::default()
        }
    }

    /// Set the backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(initial),
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(config.max_delay_ms),
            },
        };
        Self {
            max_attempts: config.max_attempts,
            backoff,
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }

    /// True when no attempt is left after `attempts` failures.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Send `body` until it is accepted or the policy gives up.
///
/// Returns the number of attempts made.
pub async fn deliver<T: Transport>(
    transport: &T,
    body: &[u8],
    policy: &RetryPolicy,
) -> Result<u32, DeliveryError> {
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);

        let error = match tokio::time::timeout(policy.attempt_timeout, transport.send(body)).await
        {
            Ok(Ok(())) => {
                tracing::debug!("Delivered {} bytes in {} attempt(s)", body.len(), attempts);
                return Ok(attempts);
            }
            Ok(Err(e)) => e,
            Err(_) => TransportError::Timeout(policy.attempt_timeout),
        };

        if policy.is_exhausted(attempts) {
            return Err(DeliveryError::Exhausted {
                attempts,
                last: error,
            });
        }

        let delay = policy.backoff.delay(attempts);
        tracing::warn!(
            "Delivery attempt {} failed: {}; retrying in {:?}",
            attempts,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}
