//! Fetch strategies and structural strategy selection.
//!
//! A strategy is the transport responsible for materializing a source URL
//! into the local cache. Selection is structural: the shape of the URL
//! (plus an optional `using` spec) decides the strategy once, when the
//! owning [`Downloadable`](crate::downloadable::Downloadable) first needs
//! it. Nothing is configurable per fetch call.

mod git;
mod http;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::http::HttpClient;
use crate::url::{SourceUrl, Version};

pub use git::GitFetchStrategy;
pub use http::HttpFetchStrategy;

/// The supported strategy kinds, resolved from URL shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Http,
    Git,
}

impl StrategyKind {
    /// Pick a strategy for a URL. A `using` spec naming a strategy wins;
    /// otherwise a `git` scheme or a `.git` path suffix selects Git, and
    /// everything else falls back to Http.
    pub fn for_url(url: &SourceUrl) -> StrategyKind {
        match url.get_spec("using") {
            Some("git") => return StrategyKind::Git,
            Some("http") | Some("curl") => return StrategyKind::Http,
            _ => {}
        }

        match url.scheme() {
            Some("git") => StrategyKind::Git,
            _ if url.as_str().ends_with(".git") => StrategyKind::Git,
            _ => StrategyKind::Http,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Http => write!(f, "http"),
            StrategyKind::Git => write!(f, "git"),
        }
    }
}

/// Remote metadata learned from a probe, without downloading the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

/// A capability was invoked on a strategy that does not support it.
#[derive(Debug)]
pub struct UnsupportedOperationError {
    pub operation: &'static str,
    pub strategy: StrategyKind,
}

impl fmt::Display for UnsupportedOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is not supported by the {} fetch strategy",
            self.operation, self.strategy
        )
    }
}

impl std::error::Error for UnsupportedOperationError {}

/// A pluggable transport that retrieves one download into the cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Where a successful fetch lands. Stable for the strategy's lifetime.
    fn cached_location(&self) -> PathBuf;

    /// Retrieve the download into [`cached_location`](Self::cached_location).
    /// `quiet` suppresses progress output.
    async fn fetch(&self, timeout: Option<Duration>, quiet: bool) -> Result<()>;

    /// Drop the cached download, forcing the next fetch to transfer again.
    fn clear_cache(&self) -> Result<()>;

    /// Query the remote's last-modified time and size without downloading.
    /// Only range-capable transports override this.
    async fn probe(&self, timeout: Option<Duration>) -> Result<ProbeInfo> {
        let _ = timeout;
        Err(UnsupportedOperationError {
            operation: "metadata probe",
            strategy: self.kind(),
        }
        .into())
    }
}

/// Construct the concrete strategy for a resolved URL.
pub fn build_strategy(
    url: &SourceUrl,
    download_name: &str,
    version: Option<&Version>,
    mirrors: &[String],
    cache_root: &Path,
    client: HttpClient,
) -> Arc<dyn FetchStrategy> {
    match StrategyKind::for_url(url) {
        StrategyKind::Http => Arc::new(HttpFetchStrategy::new(
            url.clone(),
            download_name,
            mirrors.to_vec(),
            cache_root,
            client,
        )),
        StrategyKind::Git => Arc::new(GitFetchStrategy::new(
            url.clone(),
            download_name,
            version.cloned(),
            cache_root,
        )),
    }
}
