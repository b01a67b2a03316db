//! # Site Renewal
//!
//! An incremental re-optimization pipeline for existing websites. A site is
//! crawled and analyzed once; after that, every request for new copy, a new
//! theme, or a new navigation layout flows through a durable site state and
//! a delta build, never through a full re-crawl and re-render.
//!
//! # Architecture: State → Delta → Build
//!
//! ```text
//! hints + scopes ──► plan ──► ChangeSet ──► exec ──► SiteState vN+1
//!                   (read-only)            (one atomic save)
//!                                                │
//!                                                ▼
//!              previous manifest ──► builder ──► BuildManifest + files
//!                                                │
//!                                                ▼
//!                                     diff ──► DiffReport + preview.html
//! ```
//!
//! Three properties hold everywhere:
//!
//! - **Determinism**: equal inputs plan equal change sets with equal
//!   hashes; all mappings are ordered, all hashing is over canonical form.
//! - **Idempotence**: a change set that already executed against a state
//!   version resolves to its recorded result; re-submitting an instruction
//!   set never re-executes and never creates a second build.
//! - **Selectivity**: every output artifact is content-addressed by the
//!   fingerprint of the state slices it renders from; unaffected artifacts
//!   are copied byte-identically from the previous build.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`hash`] | Canonical-form SHA-256 fingerprints for all change detection |
//! | [`state`] | `SiteState` and friends: the durable site representation |
//! | [`ops`] | Closed operation vocabulary and `ChangeSet` |
//! | [`hints`] | Structured producer inputs: scope hints, crawl snapshots |
//! | [`store`] | Versioned per-domain persistence, optimistic concurrency |
//! | [`plan`] | Delta planner: hints in, deterministic change set out |
//! | [`exec`] | Memoized, transactional change-set execution |
//! | [`render`] | Pure artifact renderers (maud HTML, token CSS, JSON) |
//! | [`builder`] | Selective build against the previous manifest |
//! | [`manifest`] | Content-addressed build manifests |
//! | [`diff`] | Manifest-keyed diff reports and the HTML preview |
//! | [`pipeline`] | `init` and the end-to-end post-edit pass |
//! | [`config`] | Sparse `renewal.toml` over stock defaults |
//! | [`output`] | CLI output formatting, kept apart from logic |
//!
//! # Design Decisions
//!
//! ## One Save Per Change Set
//!
//! The executor folds every operation in memory and commits the result with
//! a single optimistic-concurrency save. There is no journal to replay and
//! no partially-applied state to repair: a crash or cancellation before the
//! save simply never happened. Build ids are deterministic
//! (`b{version}-{hash}`) and appended to the build history inside that same
//! save, so state and history cannot drift apart.
//!
//! ## Structured Hints, Not Prompt Parsing
//!
//! The planner consumes scope-tagged hint objects produced upstream. The
//! user's free-text instruction is recorded on the audit trail and passed
//! through to the generation backends, but this crate never interprets it.
//! That keeps planning a pure function and keeps "what did the model mean"
//! arguments out of the state machine.
//!
//! ## Input Fingerprints Over Output Comparison
//!
//! The builder does not render everything and compare bytes; it
//! fingerprints the state slices each artifact reads and skips the render
//! when the fingerprint matches the previous manifest. Build cost is
//! proportional to the delta, and unchanged files keep their exact bytes,
//! which keeps downstream cache invalidation honest.
//!
//! ## Files, Not a Database
//!
//! State, change sets, and manifests are pretty-printed JSON in a
//! per-domain directory, written via temp-file-and-rename with fsync.
//! Every persisted artifact is addressable by a stable id and inspectable
//! with a pager, which has debugging value no embedded database matches at
//! this scale.

pub mod builder;
pub mod config;
pub mod diff;
pub mod exec;
pub mod hash;
pub mod hints;
pub mod manifest;
pub mod ops;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod render;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
