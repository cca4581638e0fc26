//! Bounded-retry retrieval of remote component and BIRD sources.
//!
//! Remote targets are downloaded into the first stage's staging directory so a
//! failed rebuild never leaves partial downloads in the committed tree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::{IndexBuildConfig, SourceLocation};
use crate::maintainer::LocalSources;
use crate::IndexError;

/// Retry behaviour for source fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound on a single attempt.
    pub attempt_timeout_secs: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            attempt_timeout_secs: 300,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
            attempt_timeout_secs: 5,
            jitter: false,
        }
    }

    /// Exponential backoff capped at `max_delay_ms`, plus up to 50% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let delay = exponential.min(self.max_delay_ms);
        if self.jitter && delay > 0 {
            Duration::from_millis(delay + fastrand::u64(0..=delay / 2))
        } else {
            Duration::from_millis(delay)
        }
    }

    fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }
}

/// A single failed fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// Whether another attempt could succeed.
    pub retryable: bool,
    pub reason: String,
}

impl FetchFailure {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            retryable: true,
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            retryable: false,
            reason: reason.into(),
        }
    }
}

/// Downloads a remote source to a local file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchFailure>;
}

/// [`SourceFetcher`] over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchFailure> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {status}");
            let retryable = status.is_server_error()
                || status == reqwest::StatusCode::REQUEST_TIMEOUT
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
            return Err(FetchFailure { retryable, reason });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchFailure::permanent(format!("{}: {e}", dest.display())))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchFailure::transient(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchFailure::permanent(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchFailure::permanent(e.to_string()))?;
        Ok(written)
    }
}

/// Fetch `url` into `dest`, retrying transient failures per `policy`.
pub(crate) async fn fetch_with_retry(
    fetcher: &dyn SourceFetcher,
    policy: &RetryPolicy,
    url: &str,
    dest: &Path,
) -> Result<u64, IndexError> {
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout(), fetcher.fetch(url, dest))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::transient(format!(
                "attempt timed out after {}s",
                policy.attempt_timeout().as_secs()
            ))),
        };

        match result {
            Ok(bytes) => {
                tracing::info!(url, bytes, attempts = attempt + 1, "fetched source");
                return Ok(bytes);
            }
            Err(failure) if failure.retryable && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    url,
                    attempt = attempt + 1,
                    reason = %failure.reason,
                    delay_ms = delay.as_millis() as u64,
                    "source fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => {
                return Err(IndexError::Fetch {
                    target: url.to_string(),
                    attempts: attempt + 1,
                    reason: failure.reason,
                });
            }
        }
    }
}

fn local_file_name(url: &str, fallback: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|s| s.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

async fn resolve_one(
    label: &str,
    target: &str,
    download_dir: &Path,
    fetcher: &dyn SourceFetcher,
    policy: &RetryPolicy,
) -> Result<PathBuf, IndexError> {
    match SourceLocation::classify(target) {
        SourceLocation::Local(path) => {
            if path.is_file() {
                Ok(path)
            } else {
                Err(IndexError::config(format!(
                    "{label} source {} does not exist",
                    path.display()
                )))
            }
        }
        SourceLocation::Remote(url) => {
            let dest = download_dir.join(format!("{label}-{}", local_file_name(&url, "source")));
            fetch_with_retry(fetcher, policy, &url, &dest).await?;
            Ok(dest)
        }
    }
}

/// Materialize the configured sources as local files.
///
/// Returns `None` for a full-prefix build, which reads the production feed.
pub(crate) async fn resolve_sources(
    config: &IndexBuildConfig,
    download_dir: &Path,
    fetcher: &dyn SourceFetcher,
    policy: &RetryPolicy,
) -> Result<Option<LocalSources>, IndexError> {
    let Some(targets) = config.sources() else {
        return Ok(None);
    };
    let download_dir = download_dir.join("sources");
    tokio::fs::create_dir_all(&download_dir).await?;

    let chem_comp = resolve_one("cc", &targets.chem_comp, &download_dir, fetcher, policy).await?;
    let bird = resolve_one("bird", &targets.bird, &download_dir, fetcher, policy).await?;
    Ok(Some(LocalSources { chem_comp, bird }))
}
