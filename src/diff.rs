//! Manifest-keyed build comparison and HTML preview.
//!
//! Two builds are compared by their manifests, never by walking state:
//! every output path is classified as added, removed, changed (output hash
//! differs), or unchanged. For changed textual artifacts the on-disk files
//! provide a compact line-level delta; binary artifacts report size and
//! hash movement only.
//!
//! [`diff`] is total: any pair of valid manifests produces a report, and an
//! empty report is an expected outcome (a change set whose operations were
//! all no-ops). Missing or unreadable files degrade a changed entry to a
//! hash-only record rather than failing the comparison.
//!
//! [`write_preview`] renders the report as a standalone HTML page next to
//! the build, so a human can inspect exactly what a post-edit touched
//! before anything ships.

use maud::{DOCTYPE, Markup, html};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::manifest::BuildManifest;

/// Comparison of two builds, keyed by output path.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffReport {
    pub previous_build_id: Option<String>,
    pub build_id: String,
    pub added: Vec<FileStat>,
    pub removed: Vec<FileStat>,
    pub changed: Vec<ChangedFile>,
    pub unchanged: Vec<String>,
}

/// Path plus size, for added/removed listings.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub path: String,
    pub bytes: u64,
}

/// One artifact whose output hash moved between builds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedFile {
    pub path: String,
    pub previous_hash: String,
    pub new_hash: String,
    pub previous_bytes: u64,
    pub new_bytes: u64,
    /// Line delta for textual artifacts with both files readable.
    pub delta: Option<TextDelta>,
}

/// Compact line-level delta: the replaced middle after trimming the common
/// prefix and suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDelta {
    /// 1-based line number where the builds diverge.
    pub start_line: usize,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl DiffReport {
    /// True when the builds are identical file for file.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// One-line summary for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} removed, {} changed, {} unchanged",
            self.added.len(),
            self.removed.len(),
            self.changed.len(),
            self.unchanged.len()
        )
    }
}

/// Compare two builds by manifest. Never fails.
///
/// `previous_dir` and `new_dir` locate the artifact files for line deltas;
/// passing directories that no longer exist simply omits the deltas.
pub fn diff(
    previous: Option<&BuildManifest>,
    new: &BuildManifest,
    previous_dir: Option<&Path>,
    new_dir: &Path,
) -> DiffReport {
    let mut report = DiffReport {
        previous_build_id: previous.map(|m| m.build_id.clone()),
        build_id: new.build_id.clone(),
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
        unchanged: Vec::new(),
    };

    let empty = std::collections::BTreeMap::new();
    let prev_files = previous.map(|m| &m.files).unwrap_or(&empty);

    for (path, entry) in &new.files {
        match prev_files.get(path) {
            None => report.added.push(FileStat {
                path: path.clone(),
                bytes: entry.bytes,
            }),
            Some(prev) if prev.hash == entry.hash => report.unchanged.push(path.clone()),
            Some(prev) => {
                let delta = if is_textual(path) {
                    text_delta(
                        previous_dir.map(|d| d.join(path)),
                        &new_dir.join(path),
                    )
                } else {
                    None
                };
                report.changed.push(ChangedFile {
                    path: path.clone(),
                    previous_hash: prev.hash.clone(),
                    new_hash: entry.hash.clone(),
                    previous_bytes: prev.bytes,
                    new_bytes: entry.bytes,
                    delta,
                });
            }
        }
    }

    for (path, entry) in prev_files {
        if !new.files.contains_key(path) {
            report.removed.push(FileStat {
                path: path.clone(),
                bytes: entry.bytes,
            });
        }
    }

    report
}

fn is_textual(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "html" | "css" | "json" | "txt" | "js" | "svg"))
}

fn text_delta(previous_path: Option<PathBuf>, new_path: &Path) -> Option<TextDelta> {
    let old = fs::read_to_string(previous_path?).ok()?;
    let new = fs::read_to_string(new_path).ok()?;
    Some(compute_delta(&old, &new))
}

/// Trim the common prefix and suffix, report the replaced middle.
fn compute_delta(old: &str, new: &str) -> TextDelta {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut prefix = 0;
    while prefix < old_lines.len()
        && prefix < new_lines.len()
        && old_lines[prefix] == new_lines[prefix]
    {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < old_lines.len() - prefix
        && suffix < new_lines.len() - prefix
        && old_lines[old_lines.len() - 1 - suffix] == new_lines[new_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }

    TextDelta {
        start_line: prefix + 1,
        removed: old_lines[prefix..old_lines.len() - suffix]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        added: new_lines[prefix..new_lines.len() - suffix]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

// ============================================================================
// HTML preview
// ============================================================================

/// Write the preview page for `report` into `dir` as `preview.html`.
pub fn write_preview(report: &DiffReport, dir: &Path, new_dir: &Path) -> io::Result<PathBuf> {
    let markup = render_preview(report, new_dir);
    fs::create_dir_all(dir)?;
    let path = dir.join("preview.html");
    fs::write(&path, markup.into_string())?;
    Ok(path)
}

fn render_preview(report: &DiffReport, new_dir: &Path) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Build preview " (report.build_id) }
                style { (PREVIEW_CSS) }
            }
            body {
                h1 { "Build " (report.build_id) }
                @if let Some(prev) = &report.previous_build_id {
                    p { "Compared against " (prev) ": " (report.summary()) }
                    @if report.is_empty() {
                        p.empty { "No differences detected, the builds are identical." }
                    }
                    (render_sections(report))
                } @else {
                    p { "No previous build. Files in this build:" }
                    ul {
                        @for file in list_build_files(new_dir) {
                            li { (file) }
                        }
                    }
                }
            }
        }
    }
}

fn render_sections(report: &DiffReport) -> Markup {
    html! {
        @for file in &report.added {
            h2 { "Added: " (file.path) }
            p { (file.bytes) " bytes" }
        }
        @for file in &report.removed {
            h2 { "Removed: " (file.path) }
            p { "was " (file.bytes) " bytes" }
        }
        @for file in &report.changed {
            h2 { "Changed: " (file.path) }
            p {
                (file.previous_bytes) " → " (file.new_bytes) " bytes, "
                code { (crate::hash::short_id(&file.previous_hash)) }
                " → "
                code { (crate::hash::short_id(&file.new_hash)) }
            }
            @if let Some(delta) = &file.delta {
                p.delta-pos { "From line " (delta.start_line) }
                @if !delta.removed.is_empty() {
                    pre.removed {
                        @for line in &delta.removed { "- " (line) "\n" }
                    }
                }
                @if !delta.added.is_empty() {
                    pre.added {
                        @for line in &delta.added { "+ " (line) "\n" }
                    }
                }
            }
        }
    }
}

/// All files under a build directory, relative, sorted.
fn list_build_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

const PREVIEW_CSS: &str = "\
body { font-family: system-ui, sans-serif; margin: 2rem; max-width: 60rem; }
pre { padding: 0.5rem; overflow-x: auto; }
pre.removed { background: #fbeaea; }
pre.added { background: #eafbea; }
code { background: #f2f2f2; padding: 0 0.25rem; }
p.empty { color: #666; }
";
