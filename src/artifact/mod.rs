//! Parsed artifact declarations.
//!
//! The declaration DSL and its parser live outside this crate; what arrives
//! here is already-structured data. An [`Artifact`] carries everything the
//! acquisition pipeline needs: where to fetch from (URL, specs, mirrors),
//! how to verify (checksum declaration), and how much to trust the catalog
//! it came from (origin).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

/// The checksum declaration attached to an artifact.
///
/// This is deliberately a tri-state. `Unset` (the author never declared a
/// checksum) and `NoCheck` (the author explicitly disabled verification)
/// drive different warn/suppress behavior during integrity verification
/// and must not be collapsed into one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumSpec {
    #[default]
    Unset,
    NoCheck,
    Sha256(Checksum),
}

impl ChecksumSpec {
    pub fn is_unset(&self) -> bool {
        matches!(self, ChecksumSpec::Unset)
    }

    pub fn is_no_check(&self) -> bool {
        matches!(self, ChecksumSpec::NoCheck)
    }

    /// The declared digest, when one exists.
    pub fn digest(&self) -> Option<&Checksum> {
        match self {
            ChecksumSpec::Sha256(digest) => Some(digest),
            _ => None,
        }
    }
}

/// The catalog an artifact declaration came from.
///
/// Official catalogs are first-party and trusted: their entries are exempt
/// from some missing-checksum warnings. Anything else is third-party and
/// gets the full warning treatment. Deserialization defaults to
/// `ThirdParty` so trust is always opted into explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Official,
    #[default]
    ThirdParty,
}

impl Origin {
    pub fn is_official(self) -> bool {
        matches!(self, Origin::Official)
    }
}

/// A declared artifact, as handed over by the declaration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Strategy-specific URL options (e.g. `branch` for Git sources).
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    #[serde(default)]
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub sha256: ChecksumSpec,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub origin: Origin,
}

impl Artifact {
    /// A minimal artifact with just a name; everything else defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            specs: BTreeMap::new(),
            mirrors: Vec::new(),
            sha256: ChecksumSpec::Unset,
            version: None,
            origin: Origin::ThirdParty,
        }
    }

    /// Whether verification was explicitly disabled for this artifact.
    pub fn no_checksum_defined(&self) -> bool {
        self.sha256.is_no_check()
    }

    /// Whether the author never declared any checksum at all.
    pub fn checksum_unset(&self) -> bool {
        self.sha256.is_unset()
    }

    pub fn official_origin(&self) -> bool {
        self.origin.is_official()
    }
}
