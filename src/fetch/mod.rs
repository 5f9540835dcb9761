//! Chart page fetching
//!
//! Pages are fetched with browser-like headers and a bounded exponential
//! backoff: `retry_attempts` tries with `base_delay * 2^(n-1)` between them.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of raw chart pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page body, retrying transient failures
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP fetcher backed by reqwest
pub struct HttpFetcher {
    client: Client,
    attempts: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    /// Create a new fetcher
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Delay before retry number `attempt` (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            debug!(attempt, "Fetching: {}", url);
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt < self.attempts {
                        let delay = self.backoff(attempt);
                        warn!(
                            "Fetch attempt {}/{} failed for {}: {}; retrying in {:?}",
                            attempt, self.attempts, url, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Fetch {
            url: url.to_string(),
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}
