//! Transactional, memoized change-set execution.
//!
//! The executor is the only writer of site state. It folds a change set's
//! operations over the loaded state, recomputing content hashes as part of
//! the fold, and persists the result through the store's
//! optimistic-concurrency `save`. Until that single save succeeds, nothing
//! is observable; a cancelled pass leaves no trace.
//!
//! # Idempotence
//!
//! Before executing, the executor looks for a persisted record of the same
//! `operations_hash` against the current state version. A hit means this
//! exact instruction set already ran; the recorded outcome (state version
//! and build reference) is returned without re-executing, so re-submitting
//! an identical request is always cheap and side-effect free.
//!
//! # Conflicts
//!
//! A [`StoreError::Conflict`] on save means another invocation committed
//! between our load and our save. The executor reloads once and re-folds
//! against the fresh state; a second conflict is surfaced to the caller
//! (if the conflict is semantic rather than a race, re-planning is the
//! caller's job).
//!
//! # Build ids
//!
//! Build ids are deterministic: `b{version:04}-{opshash12}` for the state
//! version the change set produces. The id is appended to the state's build
//! history inside the same save that commits the mutation, so history and
//! state can never disagree. The change-set record's `resulting_build_id`
//! stays null until the builder finishes and the pipeline attaches it.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::hash;
use crate::ops::{ApplyError, ChangeSet};
use crate::store::{ChangeSetRecord, StateStore, StoreError, VersionedState};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("operation failed to apply: {0}")]
    Apply(#[from] ApplyError),
}

/// Result of one execution pass.
#[derive(Debug)]
pub struct ExecOutcome {
    pub record: ChangeSetRecord,
    /// The state after this pass (unchanged when `reused` is true).
    pub state: VersionedState,
    /// Build id this pass resolves to. `None` only when a no-op change set
    /// ran against a domain that has never been built.
    pub build_id: Option<String>,
    /// True when the pass resolved to an already-executed change set.
    pub reused: bool,
}

/// Deterministic build id for a state version and operations hash.
pub fn build_id_for(version: u64, operations_hash: &str) -> String {
    format!("b{version:04}-{}", hash::short_id(operations_hash))
}

/// Apply `change_set` to the state loaded as `current`.
pub fn apply(
    store: &StateStore,
    domain: &str,
    current: &VersionedState,
    change_set: &ChangeSet,
    prompt: Option<&str>,
) -> Result<ExecOutcome, ExecError> {
    // Already executed against this state? Resolve to the recorded result.
    if let Some(record) =
        store.find_change_set(domain, &change_set.operations_hash, current.version)?
    {
        info!(
            domain,
            change_set = %record.id,
            "change set already executed, reusing result"
        );
        let state = store.load(domain)?;
        let build_id = record
            .resulting_build_id
            .clone()
            .or_else(|| state.state.latest_build_id().map(str::to_string));
        return Ok(ExecOutcome {
            record,
            state,
            build_id,
            reused: true,
        });
    }

    // A valid but empty change set: record the pass, mutate nothing.
    if change_set.is_empty() {
        let build_id = current.state.latest_build_id().map(str::to_string);
        let record = ChangeSetRecord {
            id: store.next_change_set_id(domain, &change_set.operations_hash)?,
            targets: change_set.targets.clone(),
            operations: Vec::new(),
            operations_hash: change_set.operations_hash.clone(),
            prompt: prompt.map(str::to_string),
            based_on_version: current.version,
            resulting_version: current.version,
            resulting_build_id: build_id.clone(),
            created_at: Utc::now(),
        };
        store.record_change_set(domain, &record)?;
        info!(domain, change_set = %record.id, "empty change set, nothing to do");
        return Ok(ExecOutcome {
            record,
            state: current.clone(),
            build_id,
            reused: true,
        });
    }

    match execute_once(store, domain, current, change_set, prompt) {
        Err(ExecError::Store(StoreError::Conflict { expected, found })) => {
            warn!(
                domain,
                expected, found, "state version conflict, reloading and retrying once"
            );
            let fresh = store.load(domain)?;
            execute_once(store, domain, &fresh, change_set, prompt)
        }
        other => other,
    }
}

fn execute_once(
    store: &StateStore,
    domain: &str,
    current: &VersionedState,
    change_set: &ChangeSet,
    prompt: Option<&str>,
) -> Result<ExecOutcome, ExecError> {
    // Fold every operation in planned order; each apply recomputes the
    // content hashes of the pages it touches.
    let mut state = current.state.clone();
    for op in &change_set.operations {
        state = op.apply(&state)?;
    }

    let next_version = current.version + 1;
    let build_id = build_id_for(next_version, &change_set.operations_hash);
    state.build_history.push(build_id.clone());

    let resulting_version = store.save(domain, &state, current.version)?;
    let record = ChangeSetRecord {
        id: store.next_change_set_id(domain, &change_set.operations_hash)?,
        targets: change_set.targets.clone(),
        operations: change_set.operations.clone(),
        operations_hash: change_set.operations_hash.clone(),
        prompt: prompt.map(str::to_string),
        based_on_version: current.version,
        resulting_version,
        resulting_build_id: None,
        created_at: Utc::now(),
    };
    store.record_change_set(domain, &record)?;

    info!(
        domain,
        change_set = %record.id,
        operations = change_set.operations.len(),
        version = resulting_version,
        "change set applied"
    );

    Ok(ExecOutcome {
        record,
        state: VersionedState {
            version: resulting_version,
            updated_at: Utc::now(),
            state,
        },
        build_id: Some(build_id),
        reused: false,
    })
}
