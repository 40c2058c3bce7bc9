use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, Response, StatusCode};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Time source for quota waits, swappable in tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Last quota reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_value(headers, REMAINING_HEADER)?.parse().ok()?;
        let reset: i64 = header_value(headers, RESET_HEADER)?.parse().ok()?;
        let reset_at = Utc.timestamp_opt(reset, 0).single()?;
        Some(Self {
            remaining,
            reset_at,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub threshold: u32,
    pub buffer: Duration,
    pub cooldown: Duration,
}

impl From<&GitHubConfig> for RateLimitPolicy {
    fn from(config: &GitHubConfig) -> Self {
        Self {
            threshold: config.quota_threshold,
            buffer: config.quota_buffer(),
            cooldown: config.cooldown(),
        }
    }
}

/// How long to wait before the next call, if at all.
pub fn quota_wait(
    snapshot: &QuotaSnapshot,
    now: DateTime<Utc>,
    policy: &RateLimitPolicy,
) -> Option<Duration> {
    if snapshot.remaining >= policy.threshold {
        return None;
    }
    let buffer = chrono::Duration::milliseconds(policy.buffer.as_millis() as i64);
    let wake_at = snapshot.reset_at + buffer;
    (wake_at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// HTTP client for the source host that tracks quota headers, sleeps
/// until reset when quota is low, and retries once after a rate-limit
/// response.
pub struct RateLimitedClient {
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
    quota: Mutex<Option<QuotaSnapshot>>,
}

impl RateLimitedClient {
    pub fn new(http: reqwest::Client, clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            http,
            clock,
            policy,
            quota: Mutex::new(None),
        }
    }

    pub fn quota(&self) -> Option<QuotaSnapshot> {
        *self.quota.lock()
    }

    /// Block until the last observed quota allows another call.
    pub async fn await_quota(&self) {
        let wait = {
            let quota = self.quota.lock();
            quota
                .as_ref()
                .and_then(|q| quota_wait(q, self.clock.now(), &self.policy))
        };
        if let Some(wait) = wait {
            tracing::warn!(
                "GitHub quota nearly exhausted, sleeping {}s until reset",
                wait.as_secs()
            );
            self.clock.sleep(wait).await;
            // The window has rolled over; the next response reports fresh numbers
            *self.quota.lock() = None;
        }
    }

    /// Issue a request. Only successful responses are returned; other
    /// statuses become `Error::Upstream`, repeated rate limiting becomes
    /// `Error::RateLimited`.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        credential: Option<&str>,
    ) -> Result<Response> {
        let mut retried = false;
        loop {
            self.await_quota().await;

            let mut req = self
                .http
                .request(method.clone(), url)
                .header(USER_AGENT, "repo-qa")
                .header(ACCEPT, "application/vnd.github+json");
            if let Some(token) = credential {
                req = req.bearer_auth(token);
            }

            let resp = req.send().await?;
            self.observe(resp.headers());

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            let limited = match status {
                StatusCode::TOO_MANY_REQUESTS => true,
                StatusCode::FORBIDDEN => {
                    has_rate_limit_headers(resp.headers()) || body_mentions_rate_limit(resp).await
                }
                _ => {
                    return Err(Error::Upstream {
                        endpoint: url.to_string(),
                        status: status.as_u16(),
                    })
                }
            };

            if !limited {
                return Err(Error::Upstream {
                    endpoint: url.to_string(),
                    status: status.as_u16(),
                });
            }
            if retried {
                return Err(Error::RateLimited {
                    endpoint: url.to_string(),
                });
            }
            retried = true;
            tracing::warn!(
                "Rate limited on {url}, retrying once in {}s",
                self.policy.cooldown.as_secs()
            );
            self.clock.sleep(self.policy.cooldown).await;
        }
    }

    fn observe(&self, headers: &HeaderMap) {
        let Some(snapshot) = QuotaSnapshot::from_headers(headers) else {
            return;
        };
        if snapshot.remaining < self.policy.threshold {
            tracing::info!(
                "GitHub quota low: {} remaining, resets at {}",
                snapshot.remaining,
                snapshot.reset_at
            );
        } else {
            tracing::debug!("GitHub quota: {} remaining", snapshot.remaining);
        }
        *self.quota.lock() = Some(snapshot);
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn has_rate_limit_headers(headers: &HeaderMap) -> bool {
    header_value(headers, REMAINING_HEADER) == Some("0") || headers.contains_key(RETRY_AFTER)
}

async fn body_mentions_rate_limit(resp: Response) -> bool {
    resp.text()
        .await
        .map(|body| body.to_ascii_lowercase().contains("rate limit"))
        .unwrap_or(false)
}
