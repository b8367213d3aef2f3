//! The downloadable capability.
//!
//! A [`Downloadable`] owns everything needed to materialize one remote
//! artifact in the local cache: the primary URL and its mirrors, the
//! checksum declaration, an optional version, and the cache root. The
//! fetch strategy is derived from the URL shape exactly once and memoized;
//! repeated `fetch`/`cached_download` calls always address the same cache
//! entry. New URL data requires a new instance.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};

use crate::artifact::ChecksumSpec;
use crate::checksum;
use crate::http::HttpClient;
use crate::strategy::{self, FetchStrategy};
use crate::url::{SourceUrl, Version};

/// A `Downloadable` was used without a resolvable URL. This is a
/// declaration error, not a transient fault: it is surfaced immediately
/// and never retried.
#[derive(Debug)]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    fn no_url() -> Self {
        Self {
            message: "attempted to use a downloadable without a URL".to_string(),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// A transfer failed. The underlying cause is preserved, never swallowed.
#[derive(Debug)]
pub struct DownloadError {
    name: String,
    cause: anyhow::Error,
}

impl DownloadError {
    pub fn new(name: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            name: name.into(),
            cause,
        }
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to download '{}': {}", self.name, self.cause)
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// The default cache root for this user, when the platform has one.
pub fn default_cache_root() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("stockpile"))
        .ok_or_else(|| anyhow!("Could not determine a cache directory for this platform"))
}

pub struct Downloadable {
    url: Option<SourceUrl>,
    mirrors: Vec<String>,
    checksum: ChecksumSpec,
    version: Option<Version>,
    download_name: Option<String>,
    cache_root: PathBuf,
    silence_missing_checksum: bool,
    client: HttpClient,
    strategy: OnceLock<Arc<dyn FetchStrategy>>,
}

impl Downloadable {
    pub fn new(cache_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            url: None,
            mirrors: Vec::new(),
            checksum: ChecksumSpec::Unset,
            version: None,
            download_name: None,
            cache_root: cache_root.into(),
            silence_missing_checksum: false,
            client: HttpClient::default_client()?,
            strategy: OnceLock::new(),
        })
    }

    pub fn with_url(mut self, url: SourceUrl) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumSpec) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_download_name(mut self, name: impl Into<String>) -> Self {
        self.download_name = Some(name.into());
        self
    }

    /// Suppress the missing-checksum warning entirely. Owners set this
    /// only for trusted-origin artifacts that never declared a checksum.
    pub fn silence_missing_checksum(mut self, silence: bool) -> Self {
        self.silence_missing_checksum = silence;
        self
    }

    /// Use a specific HTTP client for strategy construction.
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    /// Pre-seed the strategy slot. Injection seam for callers with custom
    /// transports; the memoized slot is first-write-wins.
    pub fn with_strategy(self, strategy: Arc<dyn FetchStrategy>) -> Self {
        let _ = self.strategy.set(strategy);
        self
    }

    pub fn url(&self) -> Option<&SourceUrl> {
        self.url.as_ref()
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    pub fn checksum(&self) -> &ChecksumSpec {
        &self.checksum
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// The effective version: the explicit one when set and non-null,
    /// otherwise whatever the URL basename reveals.
    pub fn version(&self) -> Option<Version> {
        if let Some(version) = &self.version {
            if !version.is_null() {
                return Some(version.clone());
            }
        }
        let url = self.url.as_ref()?;
        Version::detect(url.basename()).filter(|version| !version.is_null())
    }

    /// The filename identity used for cache addressing. Defaults to the
    /// basename of the resolved URL.
    pub fn download_name(&self) -> Result<String> {
        if let Some(name) = &self.download_name {
            return Ok(name.clone());
        }
        let (primary, _) = self.resolve()?;
        Ok(primary.basename().to_string())
    }

    /// The effective primary URL plus its deduplicated mirror list.
    /// Pure; no I/O.
    pub fn resolve(&self) -> Result<(SourceUrl, Vec<String>)> {
        let primary = self
            .url
            .clone()
            .ok_or_else(|| anyhow::Error::from(ConfigurationError::no_url()))?;

        let mut mirrors: Vec<String> = Vec::new();
        for mirror in &self.mirrors {
            if mirror != primary.as_str() && !mirrors.contains(mirror) {
                mirrors.push(mirror.clone());
            }
        }
        Ok((primary, mirrors))
    }

    /// The memoized fetch strategy, constructed on first use.
    ///
    /// Construction happens once so that repeated calls always address the
    /// same cache location, even if lazily derived state (like the
    /// version) would come out differently on a re-derivation.
    pub fn downloader(&self) -> Result<Arc<dyn FetchStrategy>> {
        if let Some(strategy) = self.strategy.get() {
            return Ok(Arc::clone(strategy));
        }

        let (primary, mirrors) = self.resolve()?;
        let download_name = self.download_name()?;
        let version = self.version();
        let strategy = strategy::build_strategy(
            &primary,
            &download_name,
            version.as_ref(),
            &mirrors,
            &self.cache_root,
            self.client.clone(),
        );
        Ok(Arc::clone(self.strategy.get_or_init(|| strategy)))
    }

    /// The path a successful fetch produces, without fetching.
    pub fn cached_download(&self) -> Result<PathBuf> {
        Ok(self.downloader()?.cached_location())
    }

    /// Whether a prior fetch already produced the cache entry.
    pub fn downloaded(&self) -> bool {
        self.cached_download()
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Fetch into the cache and return the cached path.
    ///
    /// Transfer failures are wrapped in [`DownloadError`] with the cause
    /// preserved. Integrity verification runs only when requested.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(
        &self,
        verify_download_integrity: bool,
        timeout: Option<Duration>,
        quiet: bool,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_root)
            .with_context(|| format!("Failed to create cache directory at {:?}", self.cache_root))?;

        let downloader = self.downloader()?;
        if let Err(cause) = downloader.fetch(timeout, quiet).await {
            let name = self
                .download_name()
                .unwrap_or_else(|_| "<unresolved>".to_string());
            return Err(DownloadError::new(name, cause).into());
        }

        let download = downloader.cached_location();
        if verify_download_integrity {
            self.verify_download_integrity(&download)?;
        }
        Ok(download)
    }

    /// Verify a fetched file against the checksum declaration.
    ///
    /// A checksum mismatch is always fatal. A missing checksum is not: it
    /// is silently accepted when the owner opted into suppression, and
    /// otherwise warned about once, with the computed digest included so
    /// it can be recorded retroactively.
    pub fn verify_download_integrity(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            // Nothing to hash yet.
            return Ok(());
        }

        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match &self.checksum {
            ChecksumSpec::Sha256(expected) => {
                debug!("Verifying checksum for '{}'", basename);
                checksum::verify(path, expected)
            }
            ChecksumSpec::Unset | ChecksumSpec::NoCheck => {
                if self.silence_missing_checksum {
                    return Ok(());
                }
                let actual = checksum::file_sha256(path)?;
                warn!(
                    "Cannot verify integrity of '{}'.\n\
                     No checksum was provided.\n\
                     For your reference, the checksum is:\n  sha256 \"{}\"",
                    basename, actual
                );
                Ok(())
            }
        }
    }

    /// Drop the cached download, forcing the next fetch to transfer again.
    pub fn clear_cache(&self) -> Result<()> {
        self.downloader()?.clear_cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Checksum, ChecksumMismatchError};
    use crate::strategy::MockFetchStrategy;
    use crate::strategy::StrategyKind;

    const TEST_CONTENT_SHA256: &str =
        "6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72";

    fn downloadable(cache: &Path) -> Downloadable {
        Downloadable::new(cache)
            .unwrap()
            .with_url(SourceUrl::new("https://example.com/tool-1.2.0.tar.gz"))
    }

    fn mock_strategy_with_location(path: PathBuf) -> MockFetchStrategy {
        let mut strategy = MockFetchStrategy::new();
        strategy.expect_kind().return_const(StrategyKind::Http);
        strategy
            .expect_cached_location()
            .returning(move || path.clone());
        strategy
    }

    #[test]
    fn test_resolve_requires_url() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = Downloadable::new(cache.path()).unwrap();

        let err = downloadable.resolve().unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[test]
    fn test_resolve_dedups_mirrors() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = downloadable(cache.path()).with_mirrors(vec![
            "https://mirror.example.com/tool.tar.gz".to_string(),
            "https://example.com/tool-1.2.0.tar.gz".to_string(), // same as primary
            "https://mirror.example.com/tool.tar.gz".to_string(), // duplicate
        ]);

        let (primary, mirrors) = downloadable.resolve().unwrap();
        assert_eq!(primary.as_str(), "https://example.com/tool-1.2.0.tar.gz");
        assert_eq!(mirrors, vec!["https://mirror.example.com/tool.tar.gz"]);
    }

    #[test]
    fn test_version_explicit_wins() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = downloadable(cache.path()).with_version(Version::new("9.9"));
        assert_eq!(downloadable.version(), Some(Version::new("9.9")));
    }

    #[test]
    fn test_version_null_sentinel_falls_back_to_url() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = downloadable(cache.path()).with_version(Version::null());
        assert_eq!(downloadable.version(), Some(Version::new("1.2.0")));
    }

    #[test]
    fn test_version_absent_when_undetectable() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = Downloadable::new(cache.path())
            .unwrap()
            .with_url(SourceUrl::new("https://example.com/tool.tar.gz"));
        assert_eq!(downloadable.version(), None);
    }

    #[test]
    fn test_download_name_defaults_to_basename() {
        let cache = tempfile::tempdir().unwrap();
        assert_eq!(
            downloadable(cache.path()).download_name().unwrap(),
            "tool-1.2.0.tar.gz"
        );
    }

    #[test]
    fn test_download_name_explicit() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = downloadable(cache.path()).with_download_name("tool");
        assert_eq!(downloadable.download_name().unwrap(), "tool");
    }

    #[test]
    fn test_cached_download_is_idempotent() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = downloadable(cache.path());

        let first = downloadable.cached_download().unwrap();
        let second = downloadable.cached_download().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_downloader_requires_url() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = Downloadable::new(cache.path()).unwrap();

        let err = downloadable.downloader().err().unwrap();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[tokio::test]
    async fn test_fetch_returns_cached_path() {
        let cache = tempfile::tempdir().unwrap();
        let cached = cache.path().join("entry--tool.tar.gz");

        let mut strategy = mock_strategy_with_location(cached.clone());
        strategy.expect_fetch().returning(|_, _| Ok(()));

        let downloadable = downloadable(cache.path()).with_strategy(Arc::new(strategy));
        let path = downloadable.fetch(false, None, true).await.unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_fetch_wraps_transfer_failure_with_cause() {
        let cache = tempfile::tempdir().unwrap();
        let mut strategy = mock_strategy_with_location(cache.path().join("entry"));
        strategy
            .expect_fetch()
            .returning(|_, _| Err(anyhow!("connection reset by peer")));

        let downloadable = downloadable(cache.path()).with_strategy(Arc::new(strategy));
        let err = downloadable.fetch(false, None, true).await.unwrap_err();

        let download_error = err.downcast_ref::<DownloadError>().unwrap();
        assert!(
            download_error
                .cause()
                .to_string()
                .contains("connection reset")
        );
    }

    #[tokio::test]
    async fn test_fetch_verifies_integrity_on_request() {
        let cache = tempfile::tempdir().unwrap();
        let cached = cache.path().join("entry--tool.tar.gz");
        std::fs::write(&cached, "tampered content").unwrap();

        let mut strategy = mock_strategy_with_location(cached.clone());
        strategy.expect_fetch().returning(|_, _| Ok(()));

        let downloadable = downloadable(cache.path())
            .with_checksum(ChecksumSpec::Sha256(Checksum::new(TEST_CONTENT_SHA256)))
            .with_strategy(Arc::new(strategy));

        let err = downloadable.fetch(true, None, true).await.unwrap_err();
        assert!(err.downcast_ref::<ChecksumMismatchError>().is_some());
        // the cached file is left in place for inspection
        assert!(cached.exists());
    }

    #[tokio::test]
    async fn test_fetch_skips_verification_when_not_requested() {
        let cache = tempfile::tempdir().unwrap();
        let cached = cache.path().join("entry--tool.tar.gz");
        std::fs::write(&cached, "tampered content").unwrap();

        let mut strategy = mock_strategy_with_location(cached);
        strategy.expect_fetch().returning(|_, _| Ok(()));

        let downloadable = downloadable(cache.path())
            .with_checksum(ChecksumSpec::Sha256(Checksum::new(TEST_CONTENT_SHA256)))
            .with_strategy(Arc::new(strategy));

        assert!(downloadable.fetch(false, None, true).await.is_ok());
    }

    #[test]
    fn test_verify_integrity_not_a_file_is_noop() {
        let cache = tempfile::tempdir().unwrap();
        let downloadable = downloadable(cache.path())
            .with_checksum(ChecksumSpec::Sha256(Checksum::new(TEST_CONTENT_SHA256)));

        // the path does not exist yet: nothing to hash
        assert!(
            downloadable
                .verify_download_integrity(&cache.path().join("missing"))
                .is_ok()
        );
    }

    #[test]
    fn test_verify_integrity_match() {
        let cache = tempfile::tempdir().unwrap();
        let file = cache.path().join("tool");
        std::fs::write(&file, "test content").unwrap();

        let downloadable = downloadable(cache.path())
            .with_checksum(ChecksumSpec::Sha256(Checksum::new(TEST_CONTENT_SHA256)));
        assert!(downloadable.verify_download_integrity(&file).is_ok());
    }

    #[test]
    fn test_verify_integrity_missing_checksum_passes() {
        let cache = tempfile::tempdir().unwrap();
        let file = cache.path().join("tool");
        std::fs::write(&file, "test content").unwrap();

        // warn-and-continue: no declared checksum is never fatal
        let downloadable = downloadable(cache.path());
        assert!(downloadable.verify_download_integrity(&file).is_ok());

        // and the silenced variant passes too
        let silenced = Downloadable::new(cache.path())
            .unwrap()
            .with_url(SourceUrl::new("https://example.com/tool"))
            .silence_missing_checksum(true);
        assert!(silenced.verify_download_integrity(&file).is_ok());
    }

    #[tokio::test]
    async fn test_clear_cache_delegates_to_strategy() {
        let cache = tempfile::tempdir().unwrap();
        let mut strategy = mock_strategy_with_location(cache.path().join("entry"));
        strategy.expect_clear_cache().times(1).returning(|| Ok(()));

        let downloadable = downloadable(cache.path()).with_strategy(Arc::new(strategy));
        downloadable.clear_cache().unwrap();
    }
}
