//! CLI output formatting for pipeline results.
//!
//! Formatting is kept apart from pipeline logic: every function here turns
//! an already-computed result into lines of text, and the `print_*`
//! wrappers are the only place they reach stdout. Tests assert on the
//! lines, not on captured output.
//!
//! Display is information-first: the primary line for every entity is its
//! semantic identity (scope, operation type, path), with hashes and byte
//! counts as indented secondary context.

use crate::ops::{ChangeSet, Operation};
use crate::pipeline::PostEditOutcome;
use crate::store::{ChangeSetSummary, VersionedState};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_index(pos: usize) -> String {
    format!("{:03}", pos + 1)
}

/// One line per operation: index, type, target detail.
pub fn format_plan(change_set: &ChangeSet) -> Vec<String> {
    let mut lines = Vec::new();
    let targets: Vec<String> = change_set.targets.iter().map(ToString::to_string).collect();
    lines.push(format!(
        "Change set {} ({})",
        change_set.short_hash(),
        if targets.is_empty() {
            "no targets".to_string()
        } else {
            targets.join(", ")
        }
    ));

    if change_set.is_empty() {
        lines.push(format!("{}nothing to do", indent(1)));
        return lines;
    }

    for (pos, op) in change_set.operations.iter().enumerate() {
        lines.push(format!("{} {}", format_index(pos), op.kind()));
        if let Some(detail) = operation_detail(op) {
            lines.push(format!("{}{}", indent(1), detail));
        }
    }
    lines
}

fn operation_detail(op: &Operation) -> Option<String> {
    match op {
        Operation::CssTokensUpdate { tokens } => Some(format!("{} token(s)", tokens.len())),
        Operation::CssBundleRewrite { framework, .. } => framework
            .as_ref()
            .map(|f| format!("framework: {f}"))
            .or(Some("raw stylesheet".to_string())),
        Operation::NavLayoutUpdate { layout } => Some(format!(
            "location: {}",
            layout.location.css_suffix()
        )),
        Operation::NavItemsUpdate { items } => Some(format!("{} item(s)", items.len())),
        Operation::ContentBlockUpdate { page, block, .. } => {
            Some(format!("{page} # {block}"))
        }
        Operation::SeoMetaUpdate { page, meta } => Some(match page {
            Some(page) => format!("{page}: {} entr(ies)", meta.len()),
            None => format!("global: {} entr(ies)", meta.len()),
        }),
        Operation::HeadUpdate { .. } => None,
        Operation::ImageReplace { src, .. } => Some(src.clone()),
        Operation::LogoReplace { logo } => Some(logo.src.clone()),
    }
}

/// Summary of a completed post-edit pass.
pub fn format_outcome(outcome: &PostEditOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    if outcome.reused {
        lines.push(format!(
            "No changes: change set {} already executed",
            outcome.change_set_id
        ));
        match &outcome.build_id {
            Some(build) => lines.push(format!("{}Build: {build}", indent(1))),
            None => lines.push(format!("{}No build yet for this domain", indent(1))),
        }
        return lines;
    }

    lines.push(format!(
        "Applied change set {} ({} operation(s))",
        outcome.change_set_id, outcome.operations
    ));
    if let Some(build) = &outcome.build_id {
        let marker = if outcome.partial { " [partial]" } else { "" };
        lines.push(format!("{}Build: {build}{marker}", indent(1)));
    }
    if let Some(stats) = &outcome.stats {
        lines.push(format!("{}Artifacts: {stats}", indent(1)));
    }
    if let Some(report) = &outcome.diff {
        lines.push(format!("{}Diff: {}", indent(1), report.summary()));
        for file in &report.changed {
            lines.push(format!("{}~ {}", indent(2), file.path));
        }
        for file in &report.added {
            lines.push(format!("{}+ {}", indent(2), file.path));
        }
        for file in &report.removed {
            lines.push(format!("{}- {}", indent(2), file.path));
        }
    }
    if let Some(path) = &outcome.preview_path {
        lines.push(format!("{}Preview: {}", indent(1), path.display()));
    }
    lines
}

/// History listing, newest first, one entity per record.
pub fn format_history(records: &[ChangeSetSummary]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No change sets recorded".to_string()];
    }
    let mut lines = Vec::new();
    for (pos, record) in records.iter().enumerate() {
        let targets: Vec<String> = record.targets.iter().map(ToString::to_string).collect();
        lines.push(format!(
            "{} {} ({} operation(s), {})",
            format_index(pos),
            record.id,
            record.operation_count,
            if targets.is_empty() {
                "no targets".to_string()
            } else {
                targets.join(", ")
            }
        ));
        lines.push(format!(
            "{}Created: {}",
            indent(1),
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(prompt) = &record.prompt {
            lines.push(format!("{}Prompt: {prompt}", indent(1)));
        }
        if let Some(build) = &record.resulting_build_id {
            lines.push(format!("{}Build: {build}", indent(1)));
        }
    }
    lines
}

/// Current state overview for `show`.
pub fn format_state(domain: &str, versioned: &VersionedState) -> Vec<String> {
    let state = &versioned.state;
    let mut lines = vec![
        format!("{domain} (version {})", versioned.version),
        format!("{}Pages: {}", indent(1), state.pages.len()),
    ];
    for page in state.pages.values() {
        lines.push(format!(
            "{}{} ({} block(s))",
            indent(2),
            page.path,
            page.blocks.len()
        ));
        lines.push(format!(
            "{}Hash: {}",
            indent(3),
            crate::hash::short_id(&page.content_hash)
        ));
    }
    lines.push(format!(
        "{}Theme tokens: {}",
        indent(1),
        state.theme.len()
    ));
    lines.push(format!(
        "{}Nav items: {}",
        indent(1),
        state.navigation.items.len()
    ));
    lines.push(format!(
        "{}Images: {}",
        indent(1),
        state.assets.images.len()
    ));
    match state.latest_build_id() {
        Some(build) => lines.push(format!("{}Latest build: {build}", indent(1))),
        None => lines.push(format!("{}Never built", indent(1))),
    }
    lines
}

/// One build's manifest for `show --build`.
pub fn format_manifest(manifest: &crate::manifest::BuildManifest) -> Vec<String> {
    let marker = if manifest.partial { " [partial]" } else { "" };
    let mut lines = vec![
        format!(
            "Build {}{} (state version {}, {} files)",
            manifest.build_id,
            marker,
            manifest.based_on_state_version,
            manifest.files.len()
        ),
        format!(
            "{}Created: {}",
            indent(1),
            manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ];
    for (path, entry) in &manifest.files {
        lines.push(format!("{}{}", indent(1), path));
        lines.push(format!(
            "{}{} bytes, {}",
            indent(2),
            entry.bytes,
            crate::hash::short_id(&entry.hash)
        ));
    }
    for failure in &manifest.failures {
        lines.push(format!(
            "{}FAILED {} ({}){}",
            indent(1),
            failure.path,
            failure.error,
            if failure.carried_forward {
                ", previous version kept"
            } else {
                ""
            }
        ));
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ChangeSet;
    use std::collections::BTreeMap;

    fn css_change_set() -> ChangeSet {
        ChangeSet::new(vec![Operation::CssTokensUpdate {
            tokens: BTreeMap::from([("color.primary".to_string(), "#0d6efd".to_string())]),
        }])
        .unwrap()
    }

    #[test]
    fn plan_lists_operations_with_index() {
        let lines = format_plan(&css_change_set());
        assert!(lines[0].starts_with("Change set"));
        assert!(lines[0].contains("css"));
        assert_eq!(lines[1], "001 css.tokens.update");
        assert!(lines[2].contains("1 token(s)"));
    }

    #[test]
    fn empty_plan_says_nothing_to_do() {
        let lines = format_plan(&ChangeSet::new(vec![]).unwrap());
        assert!(lines[1].contains("nothing to do"));
    }

    #[test]
    fn history_of_empty_store() {
        let lines = format_history(&[]);
        assert_eq!(lines, vec!["No change sets recorded".to_string()]);
    }

    #[test]
    fn manifest_lists_files_and_failures() {
        use crate::manifest::{BuildFailure, BuildManifest, FileEntry};
        use chrono::Utc;

        let manifest = BuildManifest {
            build_id: "b0002-abc123def456".into(),
            based_on_state_version: 2,
            created_at: Utc::now(),
            partial: true,
            files: BTreeMap::from([(
                "index.html".to_string(),
                FileEntry {
                    hash: "aaaabbbbccccdddd".into(),
                    bytes: 512,
                    inputs: "in".into(),
                },
            )]),
            failures: vec![BuildFailure {
                path: "about.html".into(),
                error: "boom".into(),
                carried_forward: true,
            }],
        };
        let lines = format_manifest(&manifest);
        assert!(lines[0].contains("[partial]"));
        assert!(lines.iter().any(|l| l.contains("index.html")));
        assert!(lines.iter().any(|l| l.contains("512 bytes")));
        assert!(
            lines
                .iter()
                .any(|l| l.contains("FAILED about.html") && l.contains("previous version kept"))
        );
    }

    #[test]
    fn state_overview_shows_pages_and_build() {
        use crate::test_helpers::sample_state;
        use chrono::Utc;

        let mut state = sample_state();
        state.build_history.push("b0002-abc".into());
        let versioned = VersionedState {
            version: 2,
            updated_at: Utc::now(),
            state,
        };
        let lines = format_state("example.com", &versioned);
        assert!(lines[0].contains("example.com (version 2)"));
        assert!(lines.iter().any(|l| l.contains("/about")));
        assert!(lines.iter().any(|l| l.contains("Latest build: b0002-abc")));
    }
}
