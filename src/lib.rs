//! stockpile - artifact acquisition and install-state reconciliation.
//!
//! Given a declared artifact, this crate resolves where to fetch it from,
//! fetches it into a content-addressed local cache with integrity
//! verification, and decides whether the artifact is already present,
//! outdated, or missing before driving an idempotent install or upgrade
//! action exactly once per request.
//!
//! The usual flow: an "ensure artifact X is present" request enters the
//! [`installer::Installer`], which consults the memoized
//! [`state::InstallState`]. If action is needed, a
//! [`download::ArtifactDownload`] is built for X; it delegates to the
//! [`downloadable::Downloadable`] capability, which selects a
//! [`strategy::FetchStrategy`] from the URL shape, fetches into the cache,
//! and verifies the checksum. Control then returns to the engine, which
//! invokes the external install action and records success into the state
//! cache.
//!
//! Declaration parsing, the enumeration of installed artifacts, the
//! install action itself, and quarantine tagging are external
//! collaborators behind traits.

pub mod artifact;
pub mod checksum;
pub mod download;
pub mod downloadable;
pub mod http;
pub mod installer;
pub mod quarantine;
pub mod state;
pub mod strategy;
pub mod url;
