use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;

use crate::atomic_write;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch {url} after {attempts} attempts")]
    Exhausted {
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write downloaded body to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Retry behavior shared by every download in the pipeline. Callers inject
/// their own configuration, so tests can run with zero delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, not additional retries.
    pub max_retries: usize,
    /// Fixed wait between attempts. The final failed attempt does not wait.
    pub retry_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP fetcher that retries every request with a fixed delay.
///
/// Any transport failure or non-2xx status counts as retryable; after the
/// attempt budget is spent the last underlying error is surfaced in
/// [`FetchError::Exhausted`].
pub struct Fetcher {
    client: Client,
    config: RetryConfig,
}

impl Fetcher {
    pub fn new(config: RetryConfig) -> Self {
        static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .expect("failed to create reqwest Client");

        Self { client, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// GET `url` and return the full body.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    tracing::warn!(
                        "download attempt {attempt}/{} for {url} failed: {err}",
                        self.config.max_retries
                    );
                    if attempt >= self.config.max_retries {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::info!("retrying after {:?}", self.config.retry_delay);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// GET `url` and persist the body at `dest`. The body is staged in a
    /// sibling temp file, so no partial file is ever visible under the
    /// final name.
    pub async fn fetch_and_save(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let body = self.fetch(url).await?;
        atomic_write(dest, body)
            .await
            .map_err(|source| FetchError::Write {
                path: dest.to_path_buf(),
                source,
            })
    }

    async fn try_fetch(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        response.bytes().await
    }
}
