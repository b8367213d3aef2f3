//! Source URL value type and URL-derived version detection.
//!
//! A [`SourceUrl`] is a location string plus the strategy-specific options
//! ("specs") declared alongside it. Specs are opaque to everything except
//! the fetch strategy they are addressed to (e.g. `branch` for Git, or
//! `using` to force a strategy).

use std::collections::BTreeMap;
use std::fmt;

/// A source location with its declared strategy-specific options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    url: String,
    specs: BTreeMap<String, String>,
}

impl SourceUrl {
    /// Create a source URL with no specs.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            specs: BTreeMap::new(),
        }
    }

    /// Create a source URL carrying its declared specs.
    pub fn with_specs(url: impl Into<String>, specs: BTreeMap<String, String>) -> Self {
        Self {
            url: url.into(),
            specs,
        }
    }

    /// Add a single spec, builder style.
    pub fn spec(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.specs.insert(key.into(), value.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn specs(&self) -> &BTreeMap<String, String> {
        &self.specs
    }

    /// Look up a declared spec by name.
    pub fn get_spec(&self, key: &str) -> Option<&str> {
        self.specs.get(key).map(String::as_str)
    }

    /// The URL scheme, if the location has one (`https://...` -> `https`).
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.url.split_once("://")?;
        if scheme.is_empty() { None } else { Some(scheme) }
    }

    /// The final path segment, with any query string or fragment stripped.
    /// Falls back to the whole URL when there is no path separator.
    pub fn basename(&self) -> &str {
        let without_query = self
            .url
            .split_once(['?', '#'])
            .map_or(self.url.as_str(), |(path, _)| path);
        without_query
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(without_query)
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl From<&str> for SourceUrl {
    fn from(url: &str) -> Self {
        SourceUrl::new(url)
    }
}

/// A version string for a downloadable artifact.
///
/// An empty string is the null sentinel: callers treat a null version the
/// same as no version at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The null sentinel.
    pub fn null() -> Self {
        Self(String::new())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Guess a version from a URL basename, e.g. `tool-1.4.2.tar.gz` -> `1.4.2`.
    ///
    /// A candidate token must start at a word boundary (optionally after a
    /// `v` marker) and look like a version: either dotted, or all digits.
    pub fn detect(basename: &str) -> Option<Version> {
        let stem = strip_archive_suffix(basename);
        let bytes = stem.as_bytes();

        for (i, c) in stem.char_indices() {
            if !c.is_ascii_digit() {
                continue;
            }
            let at_boundary = i == 0 || matches!(bytes[i - 1], b'-' | b'_' | b'.');
            let after_v_marker = i >= 1
                && bytes[i - 1] == b'v'
                && (i == 1 || matches!(bytes[i - 2], b'-' | b'_'));
            if !at_boundary && !after_v_marker {
                continue;
            }

            let tail = &stem[i..];
            let end = tail
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
                .unwrap_or(tail.len());
            let candidate = tail[..end].trim_end_matches('.');
            if candidate.contains('.') || candidate.chars().all(|c| c.is_ascii_digit()) {
                return Some(Version::new(candidate));
            }
        }

        None
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tar.xz", ".tar.bz2", ".tgz", ".txz", ".tbz", ".zip", ".gz", ".xz", ".bz2",
    ".dmg", ".pkg", ".deb", ".rpm",
];

fn strip_archive_suffix(name: &str) -> &str {
    for suffix in ARCHIVE_SUFFIXES {
        if let Some(stem) = name.strip_suffix(suffix) {
            return stem;
        }
    }
    name
}
