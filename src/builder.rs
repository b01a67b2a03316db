//! Selective build: regenerate only what the state delta actually touched.
//!
//! Rendering a page is cheap; rendering hundreds of them on every minor
//! theme tweak is not, and rewriting identical files defeats downstream
//! CDN/cache invalidation. The builder therefore treats every output as a
//! content-addressed artifact:
//!
//! 1. For each artifact, fingerprint the state slices its renderer reads.
//! 2. If the previous manifest recorded the same fingerprint and the prior
//!    output file still exists, copy the prior bytes verbatim and carry the
//!    recorded hash/size forward. Unaffected outputs are reproduced
//!    byte-identically and never re-rendered.
//! 3. Otherwise render, write, and hash the fresh bytes.
//!
//! Regeneration runs on the rayon pool; artifacts are independent, so there
//! is no ordering requirement, only the bound on parallel workers.
//!
//! # Failure isolation
//!
//! One artifact failing to regenerate must not sink the batch. The failing
//! path keeps its previous build's version when one exists, the failure is
//! recorded, and the manifest is flagged `partial`. Only a build where
//! every artifact fails is an error. A `partial` manifest still records its
//! carried-forward entries with their *previous* input fingerprints, so the
//! next build retries exactly the artifacts that never regenerated.

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use chrono::Utc;
use std::fmt;

use crate::hash::{self, InvalidFragment};
use crate::manifest::{BuildFailure, BuildManifest, FileEntry};
use crate::render;
use crate::state::SiteState;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Fragment(#[from] InvalidFragment),
    #[error("all {failed} artifacts failed to regenerate")]
    AllArtifactsFailed { failed: usize },
}

/// Everything one build run needs.
pub struct BuildRequest<'a> {
    pub state: &'a SiteState,
    pub state_version: u64,
    pub build_id: String,
    /// Manifest of the build to reuse unchanged artifacts from.
    pub previous: Option<&'a BuildManifest>,
    /// Directory holding the previous build's output files.
    pub previous_dir: Option<&'a Path>,
    pub output_dir: &'a Path,
}

/// Manifest plus reuse counters for reporting.
pub struct BuildOutcome {
    pub manifest: BuildManifest,
    pub stats: BuildStats,
}

/// How the build spent its time.
#[derive(Debug, Default)]
pub struct BuildStats {
    pub reused: u32,
    pub regenerated: u32,
    pub failed: u32,
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed > 0 {
            write!(
                f,
                "{} reused, {} regenerated, {} failed",
                self.reused, self.regenerated, self.failed
            )
        } else {
            write!(f, "{} reused, {} regenerated", self.reused, self.regenerated)
        }
    }
}

/// One output artifact and the renderer that produces it.
#[derive(Debug, Clone, PartialEq)]
enum ArtifactKind {
    Page(String),
    Css,
    NavPartial,
    HeadPartial(String),
    MediaManifest,
}

struct ArtifactJob {
    path: String,
    kind: ArtifactKind,
    /// Fingerprint of the state slices the renderer reads.
    inputs: String,
}

/// Run a selective build of `state` into `output_dir`.
pub fn build(request: &BuildRequest<'_>) -> Result<BuildOutcome, BuildError> {
    fs::create_dir_all(request.output_dir)?;
    let jobs = plan_artifacts(request.state)?;
    let total = jobs.len();

    let mut stats = BuildStats::default();
    let mut files = std::collections::BTreeMap::new();
    let mut failures = Vec::new();
    let mut to_render = Vec::new();

    // Reuse pass: byte-copy artifacts whose inputs are unchanged.
    for job in jobs {
        match reusable_entry(&job, request) {
            Some((entry, prev_path)) => {
                if let Err(err) = copy_into(&prev_path, request.output_dir, &job.path) {
                    // Prior output vanished or is unreadable; fall back to
                    // a fresh render.
                    warn!(path = %job.path, %err, "reuse copy failed, regenerating");
                    to_render.push(job);
                } else {
                    stats.reused += 1;
                    files.insert(job.path, entry);
                }
            }
            None => to_render.push(job),
        }
    }

    // Regeneration pass: independent artifacts, bounded parallelism.
    let rendered: Vec<(ArtifactJob, Result<FileEntry, String>)> = to_render
        .into_par_iter()
        .map(|job| {
            let result = regenerate(&job, request);
            (job, result)
        })
        .collect();

    for (job, result) in rendered {
        match result {
            Ok(entry) => {
                stats.regenerated += 1;
                files.insert(job.path, entry);
            }
            Err(error) => {
                stats.failed += 1;
                let carried = carry_forward(&job, request, request.output_dir);
                if let Some(entry) = carried {
                    files.insert(job.path.clone(), entry);
                }
                failures.push(BuildFailure {
                    carried_forward: files.contains_key(&job.path),
                    path: job.path,
                    error,
                });
            }
        }
    }

    if stats.failed as usize == total && total > 0 {
        return Err(BuildError::AllArtifactsFailed { failed: total });
    }

    let manifest = BuildManifest {
        build_id: request.build_id.clone(),
        based_on_state_version: request.state_version,
        created_at: Utc::now(),
        partial: !failures.is_empty(),
        files,
        failures,
    };

    info!(
        build = %manifest.build_id,
        reused = stats.reused,
        regenerated = stats.regenerated,
        failed = stats.failed,
        partial = manifest.partial,
        "build finished"
    );

    Ok(BuildOutcome { manifest, stats })
}

/// Enumerate every artifact the current state implies.
fn plan_artifacts(state: &SiteState) -> Result<Vec<ArtifactJob>, InvalidFragment> {
    let mut jobs = Vec::new();

    for page in state.pages.values() {
        jobs.push(ArtifactJob {
            path: page.output_file(),
            inputs: hash::hash_fragment(&(
                "page",
                &page.content_hash,
                &page.title,
                &state.navigation,
                &state.head,
                &state.seo.meta,
            ))?,
            kind: ArtifactKind::Page(page.path.clone()),
        });
        jobs.push(ArtifactJob {
            path: format!("partials/head/{}.html", page.slug()),
            inputs: hash::hash_fragment(&(
                "head",
                &page.title,
                &page.seo,
                &state.head,
                &state.seo.meta,
            ))?,
            kind: ArtifactKind::HeadPartial(page.path.clone()),
        });
    }

    jobs.push(ArtifactJob {
        path: "assets/css/main.css".to_string(),
        inputs: hash::hash_fragment(&("css", &state.theme, &state.css_bundle))?,
        kind: ArtifactKind::Css,
    });
    jobs.push(ArtifactJob {
        path: "partials/nav.html".to_string(),
        inputs: hash::hash_fragment(&("nav", &state.navigation))?,
        kind: ArtifactKind::NavPartial,
    });
    jobs.push(ArtifactJob {
        path: "media/manifest.json".to_string(),
        inputs: hash::hash_fragment(&("media", &state.assets))?,
        kind: ArtifactKind::MediaManifest,
    });

    Ok(jobs)
}

/// Previous entry for this artifact, when its inputs are unchanged and the
/// prior output is still on disk.
fn reusable_entry(
    job: &ArtifactJob,
    request: &BuildRequest<'_>,
) -> Option<(FileEntry, std::path::PathBuf)> {
    let previous = request.previous?;
    let prev_dir = request.previous_dir?;
    let entry = previous.file(&job.path)?;
    if entry.inputs != job.inputs {
        return None;
    }
    let prev_path = prev_dir.join(&job.path);
    if !prev_path.exists() {
        return None;
    }
    Some((entry.clone(), prev_path))
}

fn copy_into(prev_path: &Path, output_dir: &Path, rel: &str) -> io::Result<()> {
    let target = output_dir.join(rel);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(prev_path, &target)?;
    Ok(())
}

/// Render one artifact and write it; errors become per-artifact failures.
fn regenerate(job: &ArtifactJob, request: &BuildRequest<'_>) -> Result<FileEntry, String> {
    let bytes = render_artifact(&job.kind, request.state)?;
    let target = request.output_dir.join(&job.path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::write(&target, &bytes).map_err(|e| e.to_string())?;
    Ok(FileEntry {
        hash: hash::hash_bytes(&bytes),
        bytes: bytes.len() as u64,
        inputs: job.inputs.clone(),
    })
}

fn render_artifact(kind: &ArtifactKind, state: &SiteState) -> Result<Vec<u8>, String> {
    let bytes = match kind {
        ArtifactKind::Page(path) => {
            let page = state
                .page(path)
                .ok_or_else(|| format!("page {path} disappeared between planning and render"))?;
            render::render_page(state, page).into_string().into_bytes()
        }
        ArtifactKind::HeadPartial(path) => {
            let page = state
                .page(path)
                .ok_or_else(|| format!("page {path} disappeared between planning and render"))?;
            render::render_head_block(state, page)
                .into_string()
                .into_bytes()
        }
        ArtifactKind::Css => render::render_css(state).into_bytes(),
        ArtifactKind::NavPartial => render::render_nav(&state.navigation)
            .into_string()
            .into_bytes(),
        ArtifactKind::MediaManifest => render::render_media_manifest(state)
            .map_err(|e| e.to_string())?
            .into_bytes(),
    };
    Ok(bytes)
}

/// Keep the previous build's version of a failed artifact, if there is one.
fn carry_forward(
    job: &ArtifactJob,
    request: &BuildRequest<'_>,
    output_dir: &Path,
) -> Option<FileEntry> {
    let previous = request.previous?;
    let prev_dir = request.previous_dir?;
    let entry = previous.file(&job.path)?;
    let prev_path = prev_dir.join(&job.path);
    if !prev_path.exists() {
        return None;
    }
    copy_into(&prev_path, output_dir, &job.path).ok()?;
    // Keep the *previous* inputs fingerprint: the artifact genuinely still
    // reflects the old inputs, and the next build must retry it.
    Some(entry.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlockKind, ContentBlock, PageState};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn site_state() -> SiteState {
        let mut state = SiteState::default();
        state.theme.insert("color.primary".into(), "#fff".into());
        for (path, title, text) in [
            ("/", "Home", "Welcome"),
            ("/about", "About", "We renew sites"),
        ] {
            let block = ContentBlock {
                id: "hero".into(),
                text: text.into(),
                kind: BlockKind::Text,
                meta: BTreeMap::new(),
            };
            state.pages.insert(
                path.into(),
                PageState::new(path, title, vec![block], BTreeMap::new()).unwrap(),
            );
        }
        state
    }

    fn build_into(
        dir: &Path,
        state: &SiteState,
        version: u64,
        build_id: &str,
        previous: Option<&BuildManifest>,
        previous_dir: Option<&Path>,
    ) -> BuildOutcome {
        build(&BuildRequest {
            state,
            state_version: version,
            build_id: build_id.into(),
            previous,
            previous_dir,
            output_dir: dir,
        })
        .unwrap()
    }

    // =========================================================================
    // Full build
    // =========================================================================

    #[test]
    fn first_build_regenerates_everything() {
        let tmp = TempDir::new().unwrap();
        let state = site_state();
        let outcome = build_into(tmp.path(), &state, 1, "b0001-aaaa", None, None);

        assert_eq!(outcome.stats.reused, 0);
        // 2 pages + 2 head partials + css + nav + media.
        assert_eq!(outcome.stats.regenerated, 7);
        assert!(!outcome.manifest.partial);
        assert!(tmp.path().join("index.html").exists());
        assert!(tmp.path().join("about.html").exists());
        assert!(tmp.path().join("assets/css/main.css").exists());
        assert!(tmp.path().join("partials/nav.html").exists());
        assert!(tmp.path().join("media/manifest.json").exists());
    }

    #[test]
    fn manifest_records_hash_and_size_for_every_file() {
        let tmp = TempDir::new().unwrap();
        let state = site_state();
        let outcome = build_into(tmp.path(), &state, 1, "b0001-aaaa", None, None);
        for (path, entry) in &outcome.manifest.files {
            let on_disk = fs::read(tmp.path().join(path)).unwrap();
            assert_eq!(entry.bytes, on_disk.len() as u64, "size mismatch for {path}");
            assert_eq!(entry.hash, hash::hash_bytes(&on_disk), "hash mismatch for {path}");
        }
    }

    // =========================================================================
    // Selective rebuild
    // =========================================================================

    #[test]
    fn identical_state_reuses_everything() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);
        let second = build_into(
            next_dir.path(),
            &state,
            1,
            "b0001-bbbb",
            Some(&first.manifest),
            Some(prev_dir.path()),
        );

        assert_eq!(second.stats.regenerated, 0);
        assert_eq!(second.stats.reused, 7);
        for (path, entry) in &second.manifest.files {
            assert_eq!(entry.hash, first.manifest.files[path].hash);
        }
    }

    #[test]
    fn css_only_change_reuses_pages_byte_identically() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);

        let mut next_state = state.clone();
        next_state
            .theme
            .insert("color.primary".into(), "#0d6efd".into());
        let second = build_into(
            next_dir.path(),
            &next_state,
            2,
            "b0002-cccc",
            Some(&first.manifest),
            Some(prev_dir.path()),
        );

        // Pages, head partials, nav, media reused; only css regenerated.
        assert_eq!(second.stats.regenerated, 1);
        assert_ne!(
            second.manifest.files["assets/css/main.css"].hash,
            first.manifest.files["assets/css/main.css"].hash
        );
        for path in ["index.html", "about.html", "partials/nav.html"] {
            assert_eq!(
                second.manifest.files[path].hash, first.manifest.files[path].hash,
                "{path} should be carried forward"
            );
            let prev_bytes = fs::read(prev_dir.path().join(path)).unwrap();
            let next_bytes = fs::read(next_dir.path().join(path)).unwrap();
            assert_eq!(prev_bytes, next_bytes, "{path} should be byte-identical");
        }
    }

    #[test]
    fn content_change_regenerates_only_that_page() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);

        let mut next_state = state.clone();
        let about = next_state.pages.get_mut("/about").unwrap();
        about.blocks[0].text = "We renew sites, fast".into();
        about.recompute_hash().unwrap();

        let second = build_into(
            next_dir.path(),
            &next_state,
            2,
            "b0002-dddd",
            Some(&first.manifest),
            Some(prev_dir.path()),
        );

        // Only the about page re-rendered; its head partial inputs are
        // unchanged (title and seo untouched).
        assert_eq!(second.stats.regenerated, 1);
        assert_ne!(
            second.manifest.files["about.html"].hash,
            first.manifest.files["about.html"].hash
        );
        assert_eq!(
            second.manifest.files["index.html"].hash,
            first.manifest.files["index.html"].hash
        );
    }

    #[test]
    fn new_page_is_added_without_touching_others() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);

        let mut next_state = state.clone();
        next_state.pages.insert(
            "/contact".into(),
            PageState::new("/contact", "Contact", vec![], BTreeMap::new()).unwrap(),
        );
        let second = build_into(
            next_dir.path(),
            &next_state,
            2,
            "b0002-eeee",
            Some(&first.manifest),
            Some(prev_dir.path()),
        );

        // New page + its head partial.
        assert_eq!(second.stats.regenerated, 2);
        assert!(second.manifest.files.contains_key("contact.html"));
        assert_eq!(
            second.manifest.files["index.html"].hash,
            first.manifest.files["index.html"].hash
        );
    }

    #[test]
    fn removed_page_drops_out_of_manifest() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);

        let mut next_state = state.clone();
        next_state.pages.remove("/about");
        let second = build_into(
            next_dir.path(),
            &next_state,
            2,
            "b0002-ffff",
            Some(&first.manifest),
            Some(prev_dir.path()),
        );

        assert!(first.manifest.files.contains_key("about.html"));
        assert!(!second.manifest.files.contains_key("about.html"));
    }

    #[test]
    fn missing_prior_file_forces_regeneration() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);

        fs::remove_file(prev_dir.path().join("index.html")).unwrap();
        let second = build_into(
            next_dir.path(),
            &state,
            1,
            "b0001-gggg",
            Some(&first.manifest),
            Some(prev_dir.path()),
        );

        // Regenerated rather than copied; deterministic render, same hash.
        assert_eq!(second.stats.regenerated, 1);
        assert_eq!(
            second.manifest.files["index.html"].hash,
            first.manifest.files["index.html"].hash
        );
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    #[test]
    fn blocked_artifact_is_carried_forward_as_partial() {
        let prev_dir = TempDir::new().unwrap();
        let next_dir = TempDir::new().unwrap();
        let state = site_state();
        let first = build_into(prev_dir.path(), &state, 1, "b0001-aaaa", None, None);

        let mut next_state = state.clone();
        let home = next_state.pages.get_mut("/").unwrap();
        home.blocks[0].text = "Fresh hero".into();
        home.recompute_hash().unwrap();

        // Make the page path unwritable by planting a directory there.
        fs::create_dir_all(next_dir.path().join("index.html")).unwrap();

        let outcome = build(&BuildRequest {
            state: &next_state,
            state_version: 2,
            build_id: "b0002-hhhh".into(),
            previous: Some(&first.manifest),
            previous_dir: Some(prev_dir.path()),
            output_dir: next_dir.path(),
        })
        .unwrap();

        assert!(outcome.manifest.partial);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.manifest.failures.len(), 1);
        assert_eq!(outcome.manifest.failures[0].path, "index.html");
        // Failure did not prevent the rest of the build.
        assert!(next_dir.path().join("about.html").exists());
    }

    #[test]
    fn build_stats_display() {
        let stats = BuildStats {
            reused: 5,
            regenerated: 2,
            failed: 0,
        };
        assert_eq!(stats.to_string(), "5 reused, 2 regenerated");
        let stats = BuildStats {
            reused: 1,
            regenerated: 0,
            failed: 2,
        };
        assert_eq!(stats.to_string(), "1 reused, 0 regenerated, 2 failed");
    }
}
