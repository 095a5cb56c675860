use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;

use crate::config::MirrorConfig;

/// One fetched HTTP body. Non-2xx responses carry an empty body; transport
/// failures surface as errors from `fetch`.
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// HTTP fetcher for one run: browser-profile headers, rustls TLS with
/// certificate validation on, bounded pool, gzip, and a bounded retry loop
/// honoring the run's politeness delay.
#[derive(Clone)]
pub struct ResourceFetcher {
    client: Client,
    retry_count: u64,
    retry_delay: Duration,
}

impl ResourceFetcher {
    pub fn new(config: &MirrorConfig, retry_count: u64, delay_ms: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
                 image/apng,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert(
            "Upgrade-Insecure-Requests",
            HeaderValue::from_static("1"),
        );

        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(10)
            .cookie_store(true)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retry_count,
            retry_delay: Duration::from_millis(delay_ms),
        })
    }

    /// Fetches one URL, retrying transport errors and 5xx responses up to
    /// the configured count. Other statuses are returned to the caller to
    /// judge; only the final transport failure becomes an error.
    pub async fn fetch(&self, url: &str) -> Result<Fetched> {
        let mut last_error = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() && attempt < self.retry_count {
                continue;
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();

            if !status.is_success() {
                return Ok(Fetched {
                    status,
                    content_type,
                    bytes: Vec::new(),
                });
            }

            match response.bytes().await {
                Ok(bytes) => {
                    return Ok(Fetched {
                        status,
                        content_type,
                        bytes: bytes.to_vec(),
                    })
                }
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }
        }

        Err(last_error
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow::anyhow!("Fetch failed: {}", url))
            .context(format!("Failed to fetch after retries: {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_builds_with_defaults() {
        let config = MirrorConfig::default();
        assert!(ResourceFetcher::new(&config, 3, 100).is_ok());
        assert!(ResourceFetcher::new(&config, 0, 0).is_ok());
    }
}
