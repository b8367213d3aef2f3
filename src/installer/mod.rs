//! Install decision engine.
//!
//! Given an artifact name and a set of options, decide whether anything
//! needs doing (skip, fresh install, or upgrade), build the action
//! arguments, and drive the external package runner exactly once per
//! request. Decisions are derived from the memoized
//! [`InstallState`](crate::state::InstallState); the engine never
//! re-downloads or re-installs when state already satisfies the request.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use crate::state::InstallState;

/// The outcome of the decision procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do; state already satisfies the request.
    Skip,
    /// Not installed: run a fresh install.
    FreshInstall,
    /// Installed but stale: run an upgrade.
    Upgrade,
}

/// A value for a pass-through action flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// `true` becomes a bare `--key`; `false` is omitted.
    Bool(bool),
    /// Becomes `--key=value`.
    Value(String),
}

/// Per-request install options.
///
/// The recognized options are a closed set of fields; anything the
/// external action should additionally receive goes through `args`.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Display/install identifier handed to the external action; defaults
    /// to the short name.
    pub full_name: Option<String>,
    /// Result of an earlier [`Installer::preinstall`] gate. `false` means
    /// no action is needed and `install` returns success immediately.
    pub preinstall: bool,
    /// Never upgrade an installed artifact.
    pub no_upgrade: bool,
    /// Treat "possibly outdated" as outdated via the deep check.
    pub greedy: bool,
    /// Force the install action.
    pub force: bool,
    pub verbose: bool,
    /// Command to run after a (now) installed artifact; absent means
    /// success.
    pub postinstall: Option<String>,
    /// Pass-through flags for the install action.
    pub args: BTreeMap<String, OptionValue>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            full_name: None,
            preinstall: true,
            no_upgrade: false,
            greedy: false,
            force: false,
            verbose: false,
            postinstall: None,
            args: BTreeMap::new(),
        }
    }
}

/// External collaborator that performs installs and upgrades.
///
/// Action failure is a boolean, not an error: the runner is an opaque
/// process invocation and its exit status is the whole story.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageRunner: Send + Sync {
    /// Run `subcommand` against `target` with the given flags.
    async fn run(&self, subcommand: &str, target: &str, flags: &[String]) -> bool;

    /// Run a configured post-install command.
    async fn run_postinstall(&self, command: &str) -> bool;
}

/// Drives the skip/install/upgrade decision for one artifact at a time.
pub struct Installer {
    state: Arc<InstallState>,
    runner: Arc<dyn PackageRunner>,
}

impl Installer {
    pub fn new(state: Arc<InstallState>, runner: Arc<dyn PackageRunner>) -> Self {
        Self { state, runner }
    }

    pub fn state(&self) -> &InstallState {
        &self.state
    }

    /// Whether an installed artifact should be upgraded.
    async fn upgrading(&self, name: &str, options: &InstallOptions) -> Result<bool> {
        if options.no_upgrade {
            return Ok(false);
        }
        if self.state.is_outdated(name).await? {
            return Ok(true);
        }
        if !options.greedy {
            return Ok(false);
        }
        self.state.is_outdated_greedy(name).await
    }

    /// The decision for this name under these options.
    #[tracing::instrument(skip(self, options))]
    pub async fn decide(&self, name: &str, options: &InstallOptions) -> Result<Decision> {
        if !self.state.is_installed(name).await? {
            return Ok(Decision::FreshInstall);
        }
        if self.upgrading(name, options).await? {
            Ok(Decision::Upgrade)
        } else {
            Ok(Decision::Skip)
        }
    }

    /// Cheap dry-run gate: `false` only when no action is needed.
    pub async fn preinstall(&self, name: &str, options: &InstallOptions) -> Result<bool> {
        if self.state.is_installed(name).await? && !self.upgrading(name, options).await? {
            if options.verbose {
                info!("Skipping install of {name}. It is already installed.");
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Perform whatever action the decision calls for.
    ///
    /// Idempotent: a gated-out request returns success without touching
    /// anything. The installed set is updated only after a confirmed
    /// fresh-install success; a failure leaves the cache untouched.
    #[tracing::instrument(skip(self, options))]
    pub async fn install(&self, name: &str, options: &InstallOptions) -> Result<bool> {
        if !options.preinstall {
            return Ok(true);
        }

        let full_name = options.full_name.as_deref().unwrap_or(name);

        let action_result = if self.state.is_installed(name).await?
            && self.upgrading(name, options).await?
        {
            if options.verbose {
                let status = if options.greedy {
                    "may not be up-to-date"
                } else {
                    "not up-to-date"
                };
                info!("Upgrading {name}. It is installed but {status}.");
            }
            self.runner.run("upgrade", full_name, &[]).await
        } else {
            let flags = build_action_flags(options);
            if options.verbose {
                if flags.is_empty() {
                    info!("Installing {name}. It is not currently installed.");
                } else {
                    info!(
                        "Installing {name} with {}. It is not currently installed.",
                        flags.join(" ")
                    );
                }
            }

            if self.runner.run("install", full_name, &flags).await {
                self.state.record_installed(name);
                true
            } else {
                false
            }
        };

        let mut result = action_result;
        if self.state.is_installed(name).await? {
            result = result && self.run_postinstall(name, options).await;
        }
        Ok(result)
    }

    async fn run_postinstall(&self, name: &str, options: &InstallOptions) -> bool {
        let Some(command) = options.postinstall.as_deref() else {
            return true;
        };
        if command.trim().is_empty() {
            return true;
        }
        if options.verbose {
            info!("Running postinstall for {name}: {command}");
        }
        self.runner.run_postinstall(command).await
    }
}

/// Build the flag list for a fresh install.
///
/// Pass-through args map to flags (`Bool(true)` -> `--key`,
/// `Bool(false)` -> omitted, `Value(v)` -> `--key=v`). A forced install
/// gets `--force`; otherwise `--adopt` lets the action take over files
/// that already exist. The two are mutually exclusive by construction.
pub fn build_action_flags(options: &InstallOptions) -> Vec<String> {
    let mut flags: Vec<String> = options
        .args
        .iter()
        .filter_map(|(key, value)| match value {
            OptionValue::Bool(true) => Some(format!("--{key}")),
            OptionValue::Bool(false) => None,
            OptionValue::Value(value) => Some(format!("--{key}={value}")),
        })
        .collect();

    if options.force {
        flags.push("--force".to_string());
    }
    if flags.iter().any(|flag| flag == "--force") {
        // forced installs never adopt, wherever the force flag came from
        flags.retain(|flag| flag != "--adopt");
    } else {
        flags.push("--adopt".to_string());
    }

    let mut seen = HashSet::new();
    flags.retain(|flag| seen.insert(flag.clone()));
    flags
}
