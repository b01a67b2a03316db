//! Content-addressed build manifests.
//!
//! A [`BuildManifest`] is the immutable record of every output artifact one
//! build produced: path, output-byte hash, size, and the fingerprint of the
//! state inputs the artifact was rendered from. The selective builder
//! compares input fingerprints against the previous manifest to decide what
//! to regenerate; the diff renderer compares output hashes to report what
//! actually changed.
//!
//! Manifests are append-only audit artifacts: once written for a build id
//! they are never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of every output artifact for one build. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub build_id: String,
    /// The state version this build rendered.
    pub based_on_state_version: u64,
    pub created_at: DateTime<Utc>,
    /// True when at least one artifact failed and was carried forward.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    /// Output path → entry, for every artifact including unchanged ones.
    pub files: BTreeMap<String, FileEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BuildFailure>,
}

/// One output artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// SHA-256 of the output bytes.
    pub hash: String,
    pub bytes: u64,
    /// Fingerprint of the state inputs this artifact renders from.
    pub inputs: String,
}

/// A per-artifact regeneration failure, isolated from the rest of the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFailure {
    pub path: String,
    pub error: String,
    /// Whether the previous build's version of the artifact was kept.
    pub carried_forward: bool,
}

impl BuildManifest {
    /// Entry lookup by output path.
    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Paths of all page HTML artifacts (top-level `*.html` outputs).
    pub fn page_paths(&self) -> impl Iterator<Item = &str> {
        self.files
            .keys()
            .map(String::as_str)
            .filter(|p| p.ends_with(".html") && !p.contains('/'))
    }
}
