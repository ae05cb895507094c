//! HTTP client with uniform outbound pacing
//!
//! Every outbound request, listing or detail alike, passes through one
//! direct rate limiter whose quota is derived from the configured
//! inter-request delay. The remote site sees at most one request per delay
//! interval no matter which part of the pipeline asked for it.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::infrastructure::errors::FetchError;

/// Fetch seam consumed by the listing and detail fetchers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Minimum spacing between any two outbound requests.
    pub request_delay: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("catalog-harvester/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_secs(3),
        }
    }
}

/// Rate-limited HTTP client for respectful crawling.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to build HTTP client")?;

        let quota = if config.request_delay.is_zero() {
            // No pacing requested; an effectively unbounded quota.
            Quota::per_second(NonZeroU32::MAX)
        } else {
            Quota::with_period(config.request_delay)
                .context("request delay does not form a valid rate-limit period")?
        };

        Ok(Self { client, rate_limiter: RateLimiter::direct(quota) })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.rate_limiter.until_ready().await;
        debug!("fetching {url}");

        let response = self.client.get(url).send().await.map_err(classify_request_error)?;

        if let Some(err) = classify_status(response.status(), url) {
            return Err(err);
        }

        response.text().await.map_err(classify_request_error)
    }
}

/// Map a transport-level failure onto the retry taxonomy. Timeouts,
/// connection failures and mid-body resets are worth retrying; anything
/// else (bad URL, decode failure) is permanent.
fn classify_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_body() {
        FetchError::transient(err.to_string())
    } else {
        FetchError::permanent(err.to_string())
    }
}

/// Map an HTTP status onto the retry taxonomy. 429 gets its own class so it
/// can take the longer backoff and distinct logging.
fn classify_status(status: StatusCode, url: &str) -> Option<FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchError::RateLimited)
    } else if status.is_server_error() {
        Some(FetchError::transient(format!("HTTP {status} from {url}")))
    } else if status.is_client_error() {
        Some(FetchError::permanent(format!("HTTP {status} from {url}")))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "u"),
            Some(FetchError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "u"),
            Some(FetchError::Transient { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "u"),
            Some(FetchError::Permanent { .. })
        ));
        assert!(classify_status(StatusCode::OK, "u").is_none());
    }

    #[test]
    fn client_builds_with_defaults() {
        assert!(HttpClient::new(HttpClientConfig::default()).is_ok());
    }

    #[test]
    fn zero_delay_is_accepted() {
        let config = HttpClientConfig { request_delay: Duration::ZERO, ..Default::default() };
        assert!(HttpClient::new(config).is_ok());
    }
}
