//! Durable, versioned persistence for site state and its audit trail.
//!
//! The store exclusively owns the canonical [`SiteState`] for each domain.
//! Everything else reads snapshots or goes through the change executor; no
//! other component writes `state.json`.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//! └── example.com/
//!     ├── state.json                  # versioned envelope, atomically replaced
//!     ├── changesets/
//!     │   ├── cs000002-4f0c1a9b23de.json
//!     │   └── cs000003-91b2aa04c7f1.json
//!     └── builds/
//!         └── b0002-4f0c1a9b23de/
//!             ├── manifest.json
//!             ├── index.html
//!             └── assets/css/main.css
//! ```
//!
//! # Optimistic concurrency
//!
//! `state.json` carries a monotonically increasing version. Every save must
//! present the version it loaded; if the stored version has advanced in the
//! meantime the save fails with [`StoreError::Conflict`] instead of silently
//! overwriting. Two post-edit invocations racing on the same domain are
//! detected, not interleaved.
//!
//! # Durability
//!
//! Every acknowledged write goes through a temp file in the target
//! directory, is fsynced, then atomically renamed into place. A crash
//! mid-write leaves the previous file intact; nothing is acknowledged that
//! is not on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::hash;
use crate::manifest::BuildManifest;
use crate::ops::{Operation, Scope};
use crate::state::SiteState;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No site state exists for the domain; a full initial pipeline run is
    /// required before post-edits.
    #[error("no site state for domain {0}")]
    NotFound(String),
    /// The stored version advanced past the one the caller loaded.
    #[error("version conflict: expected {expected}, store has {found}")]
    Conflict { expected: u64, found: u64 },
    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),
    #[error("corrupt store document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The versioned envelope persisted as `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub state: SiteState,
}

/// Persisted record of one executed (or no-op) change set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSetRecord {
    pub id: String,
    pub targets: BTreeSet<Scope>,
    pub operations: Vec<Operation>,
    pub operations_hash: String,
    /// The free-text instruction recorded for audit; never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub based_on_version: u64,
    pub resulting_version: u64,
    /// Null until the corresponding build completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resulting_build_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Compact view of a record, as yielded by [`StateStore::history`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSetSummary {
    pub id: String,
    pub targets: BTreeSet<Scope>,
    pub operation_count: usize,
    pub operations_hash: String,
    pub prompt: Option<String>,
    pub resulting_build_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ChangeSetRecord> for ChangeSetSummary {
    fn from(record: ChangeSetRecord) -> Self {
        Self {
            id: record.id,
            targets: record.targets,
            operation_count: record.operations.len(),
            operations_hash: record.operations_hash,
            prompt: record.prompt,
            resulting_build_id: record.resulting_build_id,
            created_at: record.created_at,
        }
    }
}

/// Filesystem-backed store, one subdirectory per domain.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn domain_dir(&self, domain: &str) -> PathBuf {
        self.root.join(domain)
    }

    fn state_path(&self, domain: &str) -> PathBuf {
        self.domain_dir(domain).join("state.json")
    }

    fn changesets_dir(&self, domain: &str) -> PathBuf {
        self.domain_dir(domain).join("changesets")
    }

    /// Directory the builder writes a build's artifacts into.
    pub fn build_dir(&self, domain: &str, build_id: &str) -> PathBuf {
        self.domain_dir(domain).join("builds").join(build_id)
    }

    // ------------------------------------------------------------------
    // Site state
    // ------------------------------------------------------------------

    /// Whether any state exists for `domain`.
    pub fn exists(&self, domain: &str) -> bool {
        self.state_path(domain).exists()
    }

    /// Load the current versioned state for `domain`.
    pub fn load(&self, domain: &str) -> Result<VersionedState, StoreError> {
        let path = self.state_path(domain);
        if !path.exists() {
            return Err(StoreError::NotFound(domain.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Persist `state`, enforcing optimistic concurrency.
    ///
    /// `expected_version` is the version the caller loaded (0 for a domain
    /// that does not exist yet). Returns the new version on success. The
    /// write is durable before this returns.
    pub fn save(
        &self,
        domain: &str,
        state: &SiteState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let path = self.state_path(domain);
        let found = match self.load(domain) {
            Ok(current) => current.version,
            Err(StoreError::NotFound(_)) => 0,
            Err(other) => return Err(other),
        };
        if found != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                found,
            });
        }
        let envelope = VersionedState {
            version: expected_version + 1,
            updated_at: Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(envelope.version)
    }

    // ------------------------------------------------------------------
    // Change sets
    // ------------------------------------------------------------------

    /// Next record id for this domain: a zero-padded sequence number plus
    /// the short operations hash.
    ///
    /// The sequence prefix makes record filenames sort in creation order,
    /// which is what `history` relies on for newest-first iteration.
    pub fn next_change_set_id(
        &self,
        domain: &str,
        operations_hash: &str,
    ) -> Result<String, StoreError> {
        let seq = self.change_set_paths(domain)?.len() as u64 + 1;
        Ok(format!("cs{seq:06}-{}", hash::short_id(operations_hash)))
    }

    /// Persist a change-set record in the append-only audit trail.
    pub fn record_change_set(
        &self,
        domain: &str,
        record: &ChangeSetRecord,
    ) -> Result<(), StoreError> {
        let path = self.changesets_dir(domain).join(format!("{}.json", record.id));
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(())
    }

    /// Load one change-set record by id.
    pub fn load_change_set(
        &self,
        domain: &str,
        id: &str,
    ) -> Result<Option<ChangeSetRecord>, StoreError> {
        let path = self.changesets_dir(domain).join(format!("{id}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Memo lookup: has this exact instruction set already executed against
    /// the current state?
    ///
    /// Matches a record whose `operations_hash` equals `operations_hash` and
    /// whose `based_on_version` *or* `resulting_version` equals
    /// `current_version`. The second arm resolves the common case of an
    /// identical re-submission after a successful pass, where the store has
    /// advanced exactly to the recorded resulting version.
    pub fn find_change_set(
        &self,
        domain: &str,
        operations_hash: &str,
        current_version: u64,
    ) -> Result<Option<ChangeSetRecord>, StoreError> {
        for path in self.change_set_paths(domain)? {
            let json = fs::read_to_string(&path)?;
            let record: ChangeSetRecord = serde_json::from_str(&json)?;
            if record.operations_hash == operations_hash
                && (record.based_on_version == current_version
                    || record.resulting_version == current_version)
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Attach a completed build to its change-set record.
    pub fn attach_build(
        &self,
        domain: &str,
        change_set_id: &str,
        build_id: &str,
    ) -> Result<(), StoreError> {
        let Some(mut record) = self.load_change_set(domain, change_set_id)? else {
            return Ok(());
        };
        record.resulting_build_id = Some(build_id.to_string());
        self.record_change_set(domain, &record)
    }

    /// Change-set history, newest first.
    ///
    /// The iterator is lazy (one record parsed per step) and restartable:
    /// each call re-reads the directory, so it reflects the store rather
    /// than a point-in-time cursor.
    pub fn history(&self, domain: &str) -> Result<History, StoreError> {
        let mut paths = self.change_set_paths(domain)?;
        // Record ids lead with a zero-padded sequence number, so reverse
        // lexicographic order is newest-first.
        paths.sort();
        paths.reverse();
        Ok(History { paths, next: 0 })
    }

    fn change_set_paths(&self, domain: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.changesets_dir(domain);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    // ------------------------------------------------------------------
    // Build manifests
    // ------------------------------------------------------------------

    /// Persist a build manifest inside its build directory.
    pub fn save_manifest(
        &self,
        domain: &str,
        manifest: &BuildManifest,
    ) -> Result<(), StoreError> {
        let path = self
            .build_dir(domain, &manifest.build_id)
            .join("manifest.json");
        let json = serde_json::to_string_pretty(manifest)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(())
    }

    /// Load the manifest for one build id, if the build completed.
    pub fn load_manifest(
        &self,
        domain: &str,
        build_id: &str,
    ) -> Result<Option<BuildManifest>, StoreError> {
        let path = self.build_dir(domain, build_id).join("manifest.json");
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// The most recent completed build recorded in `state.build_history`.
    ///
    /// Walks the history backwards and skips ids whose manifest was never
    /// written (a cancelled or crashed build leaves such a dangling id).
    pub fn latest_manifest(
        &self,
        domain: &str,
        state: &SiteState,
    ) -> Result<Option<BuildManifest>, StoreError> {
        for build_id in state.build_history.iter().rev() {
            if let Some(manifest) = self.load_manifest(domain, build_id)? {
                return Ok(Some(manifest));
            }
        }
        Ok(None)
    }
}

/// Newest-first, lazily-parsed change-set history.
pub struct History {
    paths: Vec<PathBuf>,
    next: usize,
}

impl Iterator for History {
    type Item = Result<ChangeSetSummary, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.get(self.next)?;
        self.next += 1;
        let result = fs::read_to_string(path)
            .map_err(StoreError::from)
            .and_then(|json| Ok(serde_json::from_str::<ChangeSetRecord>(&json)?))
            .map(ChangeSetSummary::from);
        Some(result)
    }
}

/// Write `bytes` to `path` durably: temp file in the same directory,
/// fsync, atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("path has no parent directory"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
