//! Git fetch strategy.
//!
//! Clones the repository into a content-addressed cache directory on first
//! fetch and updates it in place afterwards. `branch`, `tag`, and
//! `revision` URL specs narrow what is checked out; without a pinned
//! revision the clone is shallow.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::{FetchStrategy, StrategyKind};
use crate::checksum::sha256_hex;
use crate::url::{SourceUrl, Version};

pub struct GitFetchStrategy {
    url: SourceUrl,
    version: Option<Version>,
    cached_path: PathBuf,
}

impl GitFetchStrategy {
    pub fn new(
        url: SourceUrl,
        download_name: &str,
        version: Option<Version>,
        cache_root: &Path,
    ) -> Self {
        let cached_path = cache_root.join(format!(
            "{}--{}",
            sha256_hex(url.as_str().as_bytes()),
            download_name
        ));
        Self {
            url,
            version,
            cached_path,
        }
    }

    /// The ref to check out: an explicit `revision`/`tag`/`branch` spec
    /// wins over the declared version.
    fn target_ref(&self) -> Option<String> {
        for key in ["revision", "tag", "branch"] {
            if let Some(value) = self.url.get_spec(key) {
                return Some(value.to_string());
            }
        }
        self.version
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| v.as_str().to_string())
    }

    async fn run_git(args: &[&str], quiet: bool) -> Result<()> {
        let mut command = Command::new("git");
        command.args(args);
        if quiet {
            command.arg("--quiet");
        }

        debug!("Running git {}...", args.join(" "));
        let output = command
            .output()
            .await
            .context("Failed to execute git; is it installed?")?;

        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn clone_repository(&self, quiet: bool) -> Result<()> {
        let dest = self.cached_path.to_string_lossy().into_owned();
        let mut args = vec!["clone"];

        let target_ref = self.target_ref();
        if let Some(reference) = target_ref.as_deref() {
            args.extend(["--branch", reference]);
        } else {
            // No pinned ref: a shallow clone is enough.
            args.extend(["--depth", "1"]);
        }
        args.push(self.url.as_str());
        args.push(dest.as_str());

        Self::run_git(&args, quiet).await
    }

    async fn update_repository(&self, quiet: bool) -> Result<()> {
        let dir = self.cached_path.to_string_lossy().into_owned();
        Self::run_git(&["-C", dir.as_str(), "fetch", "--force", "origin"], quiet).await?;

        if let Some(reference) = self.target_ref() {
            Self::run_git(&["-C", dir.as_str(), "checkout", reference.as_str()], quiet).await?;
        }
        Ok(())
    }

    async fn fetch_repository(&self, quiet: bool) -> Result<()> {
        if self.cached_path.join(".git").exists() {
            self.update_repository(quiet).await
        } else {
            self.clone_repository(quiet).await
        }
    }
}

#[async_trait]
impl FetchStrategy for GitFetchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Git
    }

    fn cached_location(&self) -> PathBuf {
        self.cached_path.clone()
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, timeout: Option<Duration>, quiet: bool) -> Result<()> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fetch_repository(quiet))
                .await
                .map_err(|_| {
                    anyhow::anyhow!("git fetch of {} timed out after {:?}", self.url, timeout)
                })?,
            None => self.fetch_repository(quiet).await,
        }
    }

    fn clear_cache(&self) -> Result<()> {
        if self.cached_path.exists() {
            fs::remove_dir_all(&self.cached_path).with_context(|| {
                format!("Failed to remove cached repository at {:?}", self.cached_path)
            })?;
        }
        Ok(())
    }
}
