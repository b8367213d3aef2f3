//! Provenance tagging for fetched files.
//!
//! Some platforms can mark a file as having arrived from the network so
//! later security gating knows where it came from. The tagging itself is
//! a platform collaborator behind the [`Quarantine`] trait; platforms
//! without support get [`NoopQuarantine`].

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// What to do with a freshly fetched file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuarantineIntent {
    /// Leave the file untouched.
    #[default]
    Unset,
    /// Tag the file as quarantined, recording its provenance.
    Apply,
    /// Release an existing quarantine tag.
    Release,
}

/// Platform collaborator that applies and releases quarantine tags.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Quarantine: Send + Sync {
    /// Whether tagging is supported on this platform at all.
    fn available(&self) -> bool;

    /// Tag a file as quarantined, recording where it came from.
    async fn apply(&self, path: &Path, provenance: &str) -> Result<()>;

    /// Release a file from quarantine.
    async fn release(&self, path: &Path) -> Result<()>;
}

/// The implementation for platforms without quarantine support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQuarantine;

#[async_trait]
impl Quarantine for NoopQuarantine {
    fn available(&self) -> bool {
        false
    }

    async fn apply(&self, _path: &Path, _provenance: &str) -> Result<()> {
        Ok(())
    }

    async fn release(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
