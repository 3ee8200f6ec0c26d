// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use rand::seq::SliceRandom;

use crate::error::Result;
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .build()?;
    Ok(client)
}

/// Page fetcher with User-Agent rotation and bounded retries.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
    retries: u32,
    backoff_base: Duration,
}

impl PageFetcher {
    pub fn new(client: reqwest::Client, config: &HttpConfig) -> Self {
        Self {
            client,
            user_agents: config
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
            retries: config.retries,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Override the first retry delay (doubles per attempt).
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    /// Delay before retry `attempt` (0-based): base, 2x base, 4x base, ...
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Fetch a page body. Non-2xx responses are errors.
    ///
    /// Failed attempts are retried `retries` times with exponential back-off.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retries => {
                    let delay = self.backoff_delay(attempt);
                    log::debug!(
                        "GET {} failed (attempt {}): {}; retrying in {:?}",
                        url,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(ua) = self.pick_user_agent() {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_agents_are_dropped() {
        let config = HttpConfig {
            user_agents: vec!["  ".into(), "agent/1.0".into()],
            ..HttpConfig::default()
        };
        let client = create_async_client(&config).unwrap();
        let fetcher = PageFetcher::new(client, &config);

        for _ in 0..10 {
            assert_eq!(fetcher.pick_user_agent(), Some("agent/1.0"));
        }
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let config = HttpConfig::default();
        let fetcher = PageFetcher::new(create_async_client(&config).unwrap(), &config)
            .with_backoff(Duration::from_millis(100));

        assert_eq!(fetcher.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(fetcher.backoff_delay(3), Duration::from_millis(800));
        // the multiplier saturates at u32::MAX instead of overflowing
        assert_eq!(fetcher.backoff_delay(40), fetcher.backoff_delay(32));
    }
}
