//! Process-wide memoized install state.
//!
//! Enumerating what is installed or outdated can be expensive (it may
//! shell out), so both sets are derived at most once per process run and
//! memoized until an explicit [`reset`](InstallState::reset). Staleness
//! between a reset and true system state is the accepted tradeoff.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

/// External collaborator that enumerates installed and outdated artifacts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateEnumerator: Send + Sync {
    /// Names of all currently installed artifacts.
    async fn list_installed(&self) -> Result<HashSet<String>>;

    /// Names of installed artifacts that are not at the latest known
    /// version.
    async fn list_outdated(&self) -> Result<HashSet<String>>;

    /// Deeper, slower staleness check for one artifact, beyond the fast
    /// outdated set.
    async fn is_outdated_greedy(&self, name: &str) -> Result<bool>;
}

/// Memoized sets of installed and outdated artifact names.
///
/// Explicit context object rather than hidden global state: the owner
/// decides its lifetime and when to invalidate it.
pub struct InstallState {
    enumerator: Arc<dyn StateEnumerator>,
    installed: Mutex<Option<HashSet<String>>>,
    outdated: Mutex<Option<HashSet<String>>>,
}

impl InstallState {
    pub fn new(enumerator: Arc<dyn StateEnumerator>) -> Self {
        Self {
            enumerator,
            installed: Mutex::new(None),
            outdated: Mutex::new(None),
        }
    }

    /// The installed set, enumerated on first call and memoized after.
    pub async fn installed_names(&self) -> Result<HashSet<String>> {
        self.populate_installed().await?;
        Ok(self
            .installed
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default())
    }

    /// The outdated set, enumerated on first call and memoized after.
    pub async fn outdated_names(&self) -> Result<HashSet<String>> {
        self.populate_outdated().await?;
        Ok(self.outdated.lock().unwrap().clone().unwrap_or_default())
    }

    pub async fn is_installed(&self, name: &str) -> Result<bool> {
        self.populate_installed().await?;
        Ok(self
            .installed
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|names| names.contains(name)))
    }

    pub async fn is_outdated(&self, name: &str) -> Result<bool> {
        self.populate_outdated().await?;
        Ok(self
            .outdated
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|names| names.contains(name)))
    }

    /// Deeper staleness check; passes straight through to the enumerator,
    /// deliberately un-memoized.
    pub async fn is_outdated_greedy(&self, name: &str) -> Result<bool> {
        self.enumerator.is_outdated_greedy(name).await
    }

    /// Installed, and either pinned by `no_upgrade` or not known outdated.
    pub async fn installed_and_up_to_date(&self, name: &str, no_upgrade: bool) -> Result<bool> {
        if !self.is_installed(name).await? {
            return Ok(false);
        }
        if no_upgrade {
            return Ok(true);
        }
        Ok(!self.is_outdated(name).await?)
    }

    /// Optimistically mark a name as installed without re-enumerating.
    ///
    /// Only takes effect when the installed set is already populated; an
    /// unpopulated set re-derives from the enumerator on next access and
    /// picks the name up there.
    pub fn record_installed(&self, name: &str) {
        if let Some(names) = self.installed.lock().unwrap().as_mut() {
            names.insert(name.to_string());
        }
    }

    /// Forget both sets. The next access re-enumerates; nothing is
    /// repopulated eagerly.
    pub fn reset(&self) {
        *self.installed.lock().unwrap() = None;
        *self.outdated.lock().unwrap() = None;
    }

    async fn populate_installed(&self) -> Result<()> {
        if self.installed.lock().unwrap().is_some() {
            return Ok(());
        }
        let fresh = self.enumerator.list_installed().await?;
        // first-write-wins if a concurrent populate got there first
        self.installed.lock().unwrap().get_or_insert(fresh);
        Ok(())
    }

    async fn populate_outdated(&self) -> Result<()> {
        if self.outdated.lock().unwrap().is_some() {
            return Ok(());
        }
        let fresh = self.enumerator.list_outdated().await?;
        self.outdated.lock().unwrap().get_or_insert(fresh);
        Ok(())
    }
}
