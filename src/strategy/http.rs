//! HTTP fetch strategy.
//!
//! Cache entries are content-addressed by the SHA-256 of the primary URL,
//! so distinct sources can never collide on a shared download name.
//! Transfers stream into a `.incomplete` sidecar and are renamed into
//! place only after the whole body arrived; a crashed transfer never
//! leaves a plausible-looking cache entry behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};

use super::{FetchStrategy, ProbeInfo, StrategyKind};
use crate::checksum::sha256_hex;
use crate::http::HttpClient;
use crate::url::SourceUrl;

pub struct HttpFetchStrategy {
    url: SourceUrl,
    mirrors: Vec<String>,
    cached_path: PathBuf,
    client: HttpClient,
}

impl HttpFetchStrategy {
    pub fn new(
        url: SourceUrl,
        download_name: &str,
        mirrors: Vec<String>,
        cache_root: &Path,
        client: HttpClient,
    ) -> Self {
        let cached_path = cache_root.join(format!(
            "{}--{}",
            sha256_hex(url.as_str().as_bytes()),
            download_name
        ));
        Self {
            url,
            mirrors,
            cached_path,
            client,
        }
    }

    fn incomplete_path(&self) -> PathBuf {
        let mut name = self
            .cached_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".incomplete");
        self.cached_path.with_file_name(name)
    }
}

#[async_trait]
impl FetchStrategy for HttpFetchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Http
    }

    fn cached_location(&self) -> PathBuf {
        self.cached_path.clone()
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, timeout: Option<Duration>, quiet: bool) -> Result<()> {
        if self.cached_path.is_file() {
            debug!("Already downloaded: {:?}", self.cached_path);
            return Ok(());
        }

        let incomplete = self.incomplete_path();
        let candidates: Vec<&str> = std::iter::once(self.url.as_str())
            .chain(self.mirrors.iter().map(String::as_str))
            .collect();

        let mut last_error = None;
        for (i, candidate) in candidates.iter().enumerate() {
            match self
                .client
                .download_to(candidate, &incomplete, timeout, quiet)
                .await
            {
                Ok(_) => {
                    fs::rename(&incomplete, &self.cached_path).with_context(|| {
                        format!("Failed to move download into place at {:?}", self.cached_path)
                    })?;
                    return Ok(());
                }
                Err(e) => {
                    if i + 1 < candidates.len() {
                        warn!("Download of {} failed ({}); trying a mirror...", candidate, e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("No download candidates for {}", self.url)))
    }

    fn clear_cache(&self) -> Result<()> {
        for path in [&self.cached_path, &self.incomplete_path()] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove cached download at {path:?}"))?;
            }
        }
        Ok(())
    }

    async fn probe(&self, timeout: Option<Duration>) -> Result<ProbeInfo> {
        let metadata = self.client.probe(self.url.as_str(), timeout).await?;
        Ok(ProbeInfo {
            last_modified: metadata.last_modified,
            size: metadata.size,
        })
    }
}
