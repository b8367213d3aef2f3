//! HTTP transport for artifact downloads and metadata probes.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};

use super::retry::{MAX_RETRIES, RETRY_DELAY_MS, check_retryable, is_retryable};

/// HTTP client with bounded retry for transfer operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

/// What a metadata probe learned about a remote resource without
/// downloading its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

impl HttpClient {
    /// Wrap an existing reqwest client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with this crate's user agent.
    pub fn default_client() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("stockpile/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Download a URL to a local path, retrying transient failures.
    /// Returns the number of bytes written.
    #[tracing::instrument(skip(self, dest))]
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        timeout: Option<Duration>,
        quiet: bool,
    ) -> Result<u64> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.download_once(url, dest, timeout, quiet).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        warn!(
                            "Download attempt {}/{} failed ({}), retrying...",
                            attempt, MAX_RETRIES, e
                        );
                        last_error = Some(e);
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Download failed after {} attempts", MAX_RETRIES)))
    }

    async fn download_once(
        &self,
        url: &str,
        dest: &Path,
        timeout: Option<Duration>,
        quiet: bool,
    ) -> Result<u64> {
        if !quiet {
            info!("Downloading {}...", url);
        }

        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .context("Failed to start download request")?;
        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut file = File::create(dest)
            .with_context(|| format!("Failed to create download file at {dest:?}"))?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read from download stream")?
        {
            file.write_all(&chunk)
                .context("Failed to write to download file")?;
            written += chunk.len() as u64;
        }
        file.flush().context("Failed to flush download file")?;

        if !quiet {
            info!("Downloaded {:.2} MB", written as f64 / (1024.0 * 1024.0));
        }

        Ok(written)
    }

    /// Query a resource's last-modified time and size via a HEAD request,
    /// without downloading the body.
    #[tracing::instrument(skip(self))]
    pub async fn probe(&self, url: &str, timeout: Option<Duration>) -> Result<RemoteMetadata> {
        debug!("Probing {}...", url);

        let mut request = self.client.head(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .context("Failed to send probe request")?;
        let response = response.error_for_status().map_err(check_retryable)?;

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|value| value.with_timezone(&Utc));
        // content_length() reports the body size hint, which is zero for a
        // HEAD response; read the header itself instead.
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(RemoteMetadata {
            last_modified,
            size,
        })
    }
}
