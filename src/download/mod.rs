//! Artifact-specific download decorator.
//!
//! [`ArtifactDownload`] wraps a [`Downloadable`] built from one declared
//! artifact. On top of the plain fetch it layers quarantine tagging,
//! translation of transfer failures into the artifact domain, and the
//! catalog-trust rules for integrity verification. One instance serves one
//! fetch request and carries no state beyond it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use crate::artifact::Artifact;
use crate::downloadable::Downloadable;
use crate::http::HttpClient;
use crate::quarantine::{Quarantine, QuarantineIntent};
use crate::strategy::{FetchStrategy, ProbeInfo};
use crate::url::{SourceUrl, Version};

/// A download failed for a specific artifact. Carries the artifact name
/// and preserves the underlying failure as its cause.
#[derive(Debug)]
pub struct ArtifactError {
    name: String,
    cause: anyhow::Error,
}

impl ArtifactError {
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

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Download failed on artifact '{}' with message: {}",
            self.name, self.cause
        )
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// A download bound to one declared artifact.
pub struct ArtifactDownload {
    artifact: Arc<Artifact>,
    quarantine_intent: QuarantineIntent,
    quarantine: Arc<dyn Quarantine>,
    inner: Downloadable,
}

impl ArtifactDownload {
    pub fn new(
        artifact: Arc<Artifact>,
        cache_root: impl Into<PathBuf>,
        quarantine: Arc<dyn Quarantine>,
        quarantine_intent: QuarantineIntent,
    ) -> Result<Self> {
        let mut inner = Downloadable::new(cache_root)?
            .with_checksum(artifact.sha256.clone())
            .with_download_name(&artifact.name)
            .with_mirrors(artifact.mirrors.clone())
            // Trusted catalogs historically omit checksums for some
            // artifact kinds; only those entries skip the warning.
            .silence_missing_checksum(artifact.official_origin() && artifact.checksum_unset());

        if let Some(url) = &artifact.url {
            inner = inner.with_url(SourceUrl::with_specs(url, artifact.specs.clone()));
        }
        if let Some(version) = &artifact.version {
            inner = inner.with_version(Version::new(version));
        }

        Ok(Self {
            artifact,
            quarantine_intent,
            quarantine,
            inner,
        })
    }

    /// Use a specific HTTP client for strategy construction.
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.inner = self.inner.with_client(client);
        self
    }

    /// Pre-seed the inner strategy slot. Injection seam for custom
    /// transports.
    pub fn with_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.inner = self.inner.with_strategy(strategy);
        self
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn downloadable(&self) -> &Downloadable {
        &self.inner
    }

    pub fn cached_download(&self) -> Result<PathBuf> {
        self.inner.cached_download()
    }

    pub fn downloaded(&self) -> bool {
        self.inner.downloaded()
    }

    /// The filename of the cache entry.
    pub fn basename(&self) -> Result<String> {
        let path = self.cached_download()?;
        Ok(path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.inner.clear_cache()
    }

    /// Fetch the artifact into the cache.
    ///
    /// The inner fetch always runs unverified: quarantine tagging has to
    /// happen before hashing, so verification is performed here
    /// afterwards, and only when requested. Transfer failures come back as
    /// [`ArtifactError`] with the original cause preserved.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(
        &self,
        verify_download_integrity: bool,
        timeout: Option<Duration>,
        quiet: bool,
    ) -> Result<PathBuf> {
        let downloaded = match self.inner.fetch(false, timeout, quiet).await {
            Ok(path) => path,
            Err(cause) => {
                return Err(ArtifactError::new(self.artifact.name.clone(), cause).into());
            }
        };

        self.apply_quarantine(&downloaded).await?;
        if verify_download_integrity {
            self.verify_download_integrity(&downloaded)?;
        }
        Ok(downloaded)
    }

    /// Verify a fetched file, honoring catalog trust.
    ///
    /// An official-catalog artifact that explicitly declared "no checksum
    /// required" skips hashing entirely; there is no digest to compare and
    /// nothing useful to warn about. Everything else goes through the
    /// inner policy.
    pub fn verify_download_integrity(&self, path: &Path) -> Result<()> {
        if self.artifact.no_checksum_defined() && self.artifact.official_origin() {
            info!(
                "No checksum defined for '{}' (official catalog), skipping verification.",
                self.artifact.name
            );
            return Ok(());
        }
        self.inner.verify_download_integrity(path)
    }

    /// Query the remote's last-modified time and size without downloading.
    /// Fails with an unsupported-operation error when the selected
    /// strategy cannot probe.
    pub async fn probe(&self, timeout: Option<Duration>) -> Result<ProbeInfo> {
        self.inner.downloader()?.probe(timeout).await
    }

    async fn apply_quarantine(&self, path: &Path) -> Result<()> {
        if self.quarantine_intent == QuarantineIntent::Unset {
            return Ok(());
        }
        if !self.quarantine.available() {
            warn!(
                "Quarantine is unavailable on this platform; leaving '{}' untagged.",
                self.artifact.name
            );
            return Ok(());
        }

        match self.quarantine_intent {
            QuarantineIntent::Apply => {
                let provenance = self.artifact.url.as_deref().unwrap_or(&self.artifact.name);
                self.quarantine.apply(path, provenance).await
            }
            QuarantineIntent::Release => self.quarantine.release(path).await,
            QuarantineIntent::Unset => Ok(()),
        }
    }
}
