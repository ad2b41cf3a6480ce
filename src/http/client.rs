//! Outbound HTTP with retry, rate-limit backoff and an in-flight cap.
//!
//! Every request made by the crawler goes through `RateLimitedClient::fetch`.
//! The client owns the single `RetryPolicy` used for all endpoints, a
//! semaphore shared by every clone (so nested project/paper fan-out cannot
//! oversubscribe the provider), and the run's cancellation token.

use crate::config::HttpConfig;
use crate::error::{CrawlError, Result};
use crate::http::pagination::parse_next_link;
use crate::logger;
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Retry budget shared by every endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts for transient failures and non-2xx statuses. Rate-limit
    /// waits are not counted.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Slack added to the provider's reset time.
    pub rate_limit_margin: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            rate_limit_margin: Duration::from_millis(config.rate_limit_margin_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

/// Parsed body plus the response metadata callers need for pagination and
/// total-count telemetry.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

impl FetchResponse {
    /// Deserialize the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.body)
            .map_err(|e| CrawlError::Parse(format!("unexpected body from {}: {}", self.url, e)))
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.header_str(name).and_then(|v| v.trim().parse().ok())
    }

    /// `rel="next"` target of the `Link` header, if any.
    pub fn next_link(&self) -> Option<String> {
        self.header_str("link").and_then(parse_next_link)
    }
}

/// Raw outcome of one network round trip.
struct Attempt {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

#[derive(Clone)]
pub struct RateLimitedClient {
    client: Client,
    policy: RetryPolicy,
    in_flight: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl RateLimitedClient {
    /// Build a client from configuration. `token` becomes a bearer
    /// `Authorization` header on every request.
    pub fn new(config: &HttpConfig, token: Option<&str>, cancel: CancellationToken) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| CrawlError::Config(format!("invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| CrawlError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            policy: RetryPolicy::from_config(config),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            cancel,
        })
    }

    /// Replace the retry policy; used by tests to shrink delays.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// GET `url` with optional query parameters and parse the JSON body.
    ///
    /// # Errors
    /// - `Transport` when the network keeps failing for `max_attempts` tries
    /// - `Http` when the provider keeps answering non-2xx
    /// - `Parse` when a 2xx body is not JSON (not retried)
    /// - `Cancelled` when the run's token fires during a request or a wait
    pub async fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<FetchResponse> {
        let mut failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            logger::trace(&format!("GET {} (failures so far: {})", url, failures));

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CrawlError::Cancelled),
                result = self.send_once(url, params) => result,
            };

            let attempt = match attempt {
                Ok(a) => a,
                Err(e) => {
                    failures += 1;
                    logger::error(&format!(
                        "Request to {} failed (attempt {}/{}): {}",
                        url, failures, self.policy.max_attempts, e
                    ));
                    if failures >= self.policy.max_attempts {
                        return Err(CrawlError::Transport {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                    self.pause(self.policy.retry_delay).await?;
                    continue;
                }
            };

            if attempt.status.is_success() {
                let body = if attempt.body.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&attempt.body).map_err(|e| {
                        CrawlError::Parse(format!("invalid JSON from {}: {}", url, e))
                    })?
                };
                return Ok(FetchResponse {
                    url: url.to_string(),
                    status: attempt.status.as_u16(),
                    headers: attempt.headers,
                    body,
                });
            }

            if let Some(wait) = self.rate_limit_wait(attempt.status, &attempt.headers) {
                logger::warn(&format!(
                    "Rate limit exceeded for {}. Sleeping for {:?}.",
                    url, wait
                ));
                self.pause(wait).await?;
                continue;
            }

            failures += 1;
            let reason = attempt
                .status
                .canonical_reason()
                .unwrap_or("unknown")
                .to_string();
            logger::error(&format!(
                "Error: {} - {} for {} (attempt {}/{})",
                attempt.status.as_u16(),
                reason,
                url,
                failures,
                self.policy.max_attempts
            ));
            if failures >= self.policy.max_attempts {
                return Err(CrawlError::Http {
                    url: url.to_string(),
                    status: attempt.status.as_u16(),
                    reason,
                });
            }
            self.pause(self.policy.retry_delay).await?;
        }
    }

    /// One request/response round trip while holding an in-flight permit.
    async fn send_once(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Attempt, reqwest::Error> {
        // The semaphore is never closed, so acquire only fails if it were.
        let _permit = self.in_flight.acquire().await.ok();

        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(Attempt {
            status,
            headers,
            body,
        })
    }

    /// Wait required by an exhausted quota, or `None` when the response is
    /// not a quota rejection.
    fn rate_limit_wait(&self, status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
        if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
            return None;
        }
        let remaining = headers.get(RATE_LIMIT_REMAINING)?.to_str().ok()?.trim();
        if remaining != "0" {
            return None;
        }
        let reset: i64 = headers.get(RATE_LIMIT_RESET)?.to_str().ok()?.trim().parse().ok()?;
        Some(reset_delay(reset, Utc::now().timestamp(), self.policy.rate_limit_margin))
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Seconds until `reset_epoch` (never negative) plus `margin`.
pub fn reset_delay(reset_epoch: i64, now_epoch: i64, margin: Duration) -> Duration {
    let seconds = (reset_epoch - now_epoch).max(0) as u64;
    Duration::from_secs(seconds) + margin
}
