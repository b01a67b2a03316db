//! Post-edit orchestration: one invocation, one logical unit of work.
//!
//! [`run_post_edit`] is the single externally-meaningful operation of this
//! crate. It wires the components in their data-flow order:
//!
//! ```text
//! load state ──► plan ──► execute ──► build ──► diff/preview ──► record
//!   (store)    (plan)     (exec)    (builder)     (diff)        (store)
//! ```
//!
//! Planning only reads state; execution owns the one atomic save; the
//! builder reads the already-committed new state and never mutates it.
//! Cancelling an invocation anywhere before the executor's save leaves no
//! observable effect; cancelling during the build leaves the previous
//! manifest as the last valid one (a manifest is written only after every
//! artifact job resolved).
//!
//! [`initialize`] performs the one-time first population of a domain from a
//! crawl snapshot. Everything after that flows through post-edits.

use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::builder::{self, BuildError, BuildRequest, BuildStats};
use crate::config::RenewalConfig;
use crate::diff::{self, DiffReport};
use crate::exec::{self, ExecError};
use crate::hash::InvalidFragment;
use crate::hints::{CrawlSnapshot, ScopeHints};
use crate::ops::Scope;
use crate::plan::{self, PlanError};
use crate::store::{StateStore, StoreError, VersionedState};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Fragment(#[from] InvalidFragment),
    #[error("domain {0} is already initialized")]
    AlreadyInitialized(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One post-edit request.
#[derive(Debug, Clone)]
pub struct PostEditRequest {
    pub domain: String,
    pub scopes: Vec<Scope>,
    /// Free-text instruction; recorded for audit, never interpreted here.
    pub prompt: Option<String>,
    pub hints: ScopeHints,
}

/// What one invocation produced.
#[derive(Debug)]
pub struct PostEditOutcome {
    pub change_set_id: String,
    pub operations: usize,
    /// Build this invocation resolves to; `None` only for a no-op pass on a
    /// never-built domain.
    pub build_id: Option<String>,
    /// True when the pass resolved to an already-executed change set and no
    /// new build was produced.
    pub reused: bool,
    pub partial: bool,
    pub stats: Option<BuildStats>,
    pub diff: Option<DiffReport>,
    pub preview_path: Option<PathBuf>,
}

/// First population of a domain from a crawl snapshot.
///
/// Refuses to clobber an existing domain; post-edits are the only mutation
/// path once state exists.
pub fn initialize(
    store: &StateStore,
    config: &RenewalConfig,
    snapshot: CrawlSnapshot,
) -> Result<VersionedState, PipelineError> {
    let domain = snapshot.domain.clone();
    if store.exists(&domain) {
        return Err(PipelineError::AlreadyInitialized(domain));
    }
    let mut state = snapshot.into_state()?;
    state.css_bundle.framework = config.builder.framework.clone();
    let version = store.save(&domain, &state, 0)?;
    info!(
        domain = %domain,
        version,
        pages = state.pages.len(),
        "domain initialized"
    );
    store.load(&domain).map_err(PipelineError::from)
}

/// Run one complete post-edit pass for a domain.
pub fn run_post_edit(
    store: &StateStore,
    config: &RenewalConfig,
    request: &PostEditRequest,
) -> Result<PostEditOutcome, PipelineError> {
    let domain = request.domain.as_str();
    let current = store.load(domain)?;
    let previous_manifest = store.latest_manifest(domain, &current.state)?;
    let previous_dir = previous_manifest
        .as_ref()
        .map(|m| store.build_dir(domain, &m.build_id));

    let change_set = plan::plan(&current.state, &request.scopes, &request.hints)?;
    info!(
        domain,
        operations = change_set.operations.len(),
        hash = %change_set.short_hash(),
        "change set planned"
    );

    let executed = exec::apply(store, domain, &current, &change_set, request.prompt.as_deref())?;

    // Re-submission or no-op: resolve to the existing build, produce nothing.
    if executed.reused {
        return Ok(PostEditOutcome {
            change_set_id: executed.record.id,
            operations: change_set.operations.len(),
            build_id: executed.build_id,
            reused: true,
            partial: false,
            stats: None,
            diff: None,
            preview_path: None,
        });
    }

    // A non-empty change set always carries a build id.
    let build_id = executed
        .build_id
        .clone()
        .unwrap_or_else(|| exec::build_id_for(executed.state.version, &change_set.operations_hash));
    let output_dir = store.build_dir(domain, &build_id);

    let built = builder::build(&BuildRequest {
        state: &executed.state.state,
        state_version: executed.state.version,
        build_id: build_id.clone(),
        previous: previous_manifest.as_ref(),
        previous_dir: previous_dir.as_deref(),
        output_dir: &output_dir,
    })?;
    store.save_manifest(domain, &built.manifest)?;
    store.attach_build(domain, &executed.record.id, &build_id)?;

    let report = diff::diff(
        previous_manifest.as_ref(),
        &built.manifest,
        previous_dir.as_deref(),
        &output_dir,
    );
    let preview_path = if config.preview.write {
        Some(diff::write_preview(&report, &output_dir, &output_dir)?)
    } else {
        None
    };

    info!(
        domain,
        build = %build_id,
        summary = %report.summary(),
        partial = built.manifest.partial,
        "post-edit complete"
    );

    Ok(PostEditOutcome {
        change_set_id: executed.record.id,
        operations: change_set.operations.len(),
        build_id: Some(build_id),
        reused: false,
        partial: built.manifest.partial,
        stats: Some(built.stats),
        diff: Some(report),
        preview_path,
    })
}
