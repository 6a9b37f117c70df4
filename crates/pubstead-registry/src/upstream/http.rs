//! HTTP layer: status mapping and retry for upstream requests.
//!
//! This is the ONLY place for status code handling. upstream/mod.rs never
//! interprets status codes.

use std::time::Duration;

use reqwest::StatusCode;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Collaborator, RegistryError, RegistryResult};

/// Outcome of a single GET against the upstream.
#[derive(Debug)]
pub(crate) enum Fetched {
    Found(reqwest::Response),
    Missing,
}

/// Failure of one attempt, classified for the retry loop.
#[derive(Debug)]
enum AttemptError {
    Transient {
        error: RegistryError,
        retry_after: Option<Duration>,
    },
    Fatal(RegistryError),
}

/// HTTP backend for upstream requests (holds reqwest client and retry budget).
///
/// `budget` is the time one logical request may take across all attempts.
/// Each attempt is bounded by an equal share of it (never more than what is
/// left), and a backoff that would overrun the budget ends the loop.
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) max_retries: u32,
    pub(crate) budget: Duration,
}

impl HttpBackend {
    /// GET with retries on 429, 5xx and transport errors. 404 => Missing.
    pub(crate) async fn get(&self, url: &Url) -> RegistryResult<Fetched> {
        use rand::Rng;

        let started = Instant::now();
        let mut retries = 0;

        loop {
            let remaining = self.budget.saturating_sub(started.elapsed());
            match self.get_once(url, self.attempt_timeout().min(remaining)).await {
                Ok(fetched) => return Ok(fetched),
                Err(AttemptError::Transient { error, retry_after }) if retries < self.max_retries => {
                    retries += 1;

                    let backoff = match retry_after {
                        Some(retry_after) => retry_after.min(Duration::from_secs(30)),
                        None => {
                            let base_backoff = Duration::from_millis(100_u64 << retries.min(8))
                                .min(Duration::from_secs(30));
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    if started.elapsed() + backoff >= self.budget {
                        warn!(
                            error = %error,
                            retry = retries,
                            backoff_ms = backoff.as_millis() as u64,
                            "upstream retry budget exhausted"
                        );
                        return Err(error);
                    }

                    warn!(
                        error = %error,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying upstream request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(AttemptError::Transient { error, .. }) | Err(AttemptError::Fatal(error)) => {
                    return Err(error)
                }
            }
        }
    }

    fn attempt_timeout(&self) -> Duration {
        self.budget / self.max_retries.saturating_add(1)
    }

    async fn get_once(&self, url: &Url, timeout: Duration) -> Result<Fetched, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AttemptError::Transient {
                error: RegistryError::infra(Collaborator::Upstream, e.to_string()),
                retry_after: None,
            })?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "upstream response");

        match status {
            s if s.is_success() => Ok(Fetched::Found(response)),

            StatusCode::NOT_FOUND => Ok(Fetched::Missing),

            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(AttemptError::Transient {
                    error: RegistryError::infra(Collaborator::Upstream, "rate limited"),
                    retry_after,
                })
            }

            s if s.is_server_error() => {
                let message = response.text().await.unwrap_or_else(|_| s.to_string());
                Err(AttemptError::Transient {
                    error: RegistryError::infra(
                        Collaborator::Upstream,
                        format!("HTTP {}: {}", s.as_u16(), message),
                    ),
                    retry_after: None,
                })
            }

            s => Err(AttemptError::Fatal(RegistryError::infra(
                Collaborator::Upstream,
                format!("unexpected HTTP {} from {}", s.as_u16(), url),
            ))),
        }
    }
}
