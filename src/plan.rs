//! Delta planning: structured hints in, deterministic change set out.
//!
//! The planner turns a change request (requested scopes + scope-tagged
//! hints) into an ordered [`ChangeSet`] against the current site state. It
//! is read-only over state and pure over its inputs: equal inputs always
//! produce a change set with the same `operations_hash`.
//!
//! # Pipeline
//!
//! 1. Resolve requested scopes (`all` expands to every concrete scope).
//! 2. Run the rule set for each resolved scope. Rules are pure mappings
//!    from hints to operations; state is consulted only to resolve targets
//!    (does the page exist, does the block exist) and to drop proposals the
//!    state already satisfies.
//! 3. Drop operations value-equal to one already planned.
//! 4. Order by scope priority (`head < nav < css < content < images < logo
//!    < seo`), then by declaration order within a scope. Later operations
//!    may shadow leaf fields written by earlier ones, so this order is
//!    load-bearing and must survive into execution unchanged.
//! 5. Hash the canonical serialization of the ordered list.
//!
//! A pass where no scope yields operations returns a valid, empty change
//! set (its hash is the hash of the empty sequence); the executor treats it
//! as a recorded no-op.
//!
//! The user's free-text instruction is deliberately absent from planning.
//! It goes to the generation backends and onto the audit record; whatever
//! they made of it comes back here as structured hints.

use thiserror::Error;
use tracing::debug;

use crate::hash::InvalidFragment;
use crate::hints::ScopeHints;
use crate::ops::{ChangeSet, Operation, Scope};
use crate::state::SiteState;

#[derive(Error, Debug)]
pub enum PlanError {
    /// A hint resolved to an operation outside the closed model (unknown
    /// page, block, or image). Planning aborts; nothing reaches execution.
    #[error("invalid operation for scope {scope}: {reason}")]
    InvalidOperation { scope: Scope, reason: String },
    #[error(transparent)]
    Fragment(#[from] InvalidFragment),
}

/// Plan a change set from `hints` against `state`.
///
/// `requested` may be empty, which behaves like `all`.
pub fn plan(
    state: &SiteState,
    requested: &[Scope],
    hints: &ScopeHints,
) -> Result<ChangeSet, PlanError> {
    let scopes = resolve_scopes(requested);
    let mut operations: Vec<Operation> = Vec::new();

    for scope in &scopes {
        let planned = match scope {
            Scope::Head => plan_head(hints),
            Scope::Nav => plan_nav(hints),
            Scope::Css => plan_css(hints),
            Scope::Content => plan_content(state, hints)?,
            Scope::Images => plan_images(state, hints)?,
            Scope::Logo => plan_logo(hints),
            Scope::Seo => plan_seo(state, hints)?,
            Scope::All => unreachable!("resolve_scopes never yields All"),
        };
        for op in planned {
            // Value-equal duplicates collapse to the first occurrence.
            if !operations.contains(&op) {
                operations.push(op);
            }
        }
    }

    // Rules run in priority order already; the sort keeps the guarantee
    // even if a rule ever emits for a neighboring scope. Stable, so
    // declaration order within a scope is preserved.
    operations.sort_by_key(|op| op.scope().priority());

    let change_set = ChangeSet::new(operations)?;
    debug!(
        scopes = %scopes.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
        operations = change_set.operations.len(),
        hash = %change_set.short_hash(),
        "planned change set"
    );
    Ok(change_set)
}

/// Expand the requested scopes to a concrete set in priority order.
fn resolve_scopes(requested: &[Scope]) -> Vec<Scope> {
    if requested.is_empty() || requested.contains(&Scope::All) {
        return Scope::PRIORITY.to_vec();
    }
    Scope::PRIORITY
        .iter()
        .copied()
        .filter(|scope| requested.contains(scope))
        .collect()
}

fn plan_head(hints: &ScopeHints) -> Vec<Operation> {
    let Some(head) = &hints.head else {
        return Vec::new();
    };
    if head.title_template.is_none() && head.meta.is_empty() && head.links.is_empty() {
        return Vec::new();
    }
    vec![Operation::HeadUpdate {
        title_template: head.title_template.clone(),
        meta: head.meta.clone(),
        links: head.links.clone(),
    }]
}

fn plan_nav(hints: &ScopeHints) -> Vec<Operation> {
    let Some(nav) = &hints.nav else {
        return Vec::new();
    };
    let mut ops = Vec::new();
    if let Some(layout) = &nav.layout {
        ops.push(Operation::NavLayoutUpdate {
            layout: layout.clone(),
        });
    }
    if let Some(items) = &nav.items {
        ops.push(Operation::NavItemsUpdate {
            items: items.clone(),
        });
    }
    ops
}

fn plan_css(hints: &ScopeHints) -> Vec<Operation> {
    let Some(theme) = &hints.theme else {
        return Vec::new();
    };
    let mut ops = Vec::new();
    if !theme.tokens.is_empty() {
        ops.push(Operation::CssTokensUpdate {
            tokens: theme.tokens.clone(),
        });
    }
    if theme.raw_css.is_some() || theme.framework.is_some() {
        ops.push(Operation::CssBundleRewrite {
            raw: theme.raw_css.clone(),
            framework: theme.framework.clone(),
        });
    }
    ops
}

/// Content proposals resolve against existing pages and blocks, and are
/// dropped when the state already carries the proposed text and metadata.
fn plan_content(state: &SiteState, hints: &ScopeHints) -> Result<Vec<Operation>, PlanError> {
    let mut ops = Vec::new();
    for proposal in &hints.content {
        let page = state.page(&proposal.page).ok_or_else(|| PlanError::InvalidOperation {
            scope: Scope::Content,
            reason: format!("no page at {}", proposal.page),
        })?;
        let block = page.block(&proposal.block).ok_or_else(|| PlanError::InvalidOperation {
            scope: Scope::Content,
            reason: format!("no block {} on page {}", proposal.block, proposal.page),
        })?;

        let satisfied = block.text == proposal.text
            && proposal.meta.as_ref().is_none_or(|meta| *meta == block.meta);
        if satisfied {
            continue;
        }

        ops.push(Operation::ContentBlockUpdate {
            page: proposal.page.clone(),
            block: proposal.block.clone(),
            text: proposal.text.clone(),
            meta: proposal.meta.clone(),
        });
    }
    Ok(ops)
}

fn plan_images(state: &SiteState, hints: &ScopeHints) -> Result<Vec<Operation>, PlanError> {
    let mut ops = Vec::new();
    for swap in &hints.images {
        if state.assets.image(&swap.src).is_none() {
            return Err(PlanError::InvalidOperation {
                scope: Scope::Images,
                reason: format!("no image asset with src {}", swap.src),
            });
        }
        ops.push(Operation::ImageReplace {
            src: swap.src.clone(),
            replacement: swap.replacement.clone(),
        });
    }
    Ok(ops)
}

fn plan_logo(hints: &ScopeHints) -> Vec<Operation> {
    hints
        .logo
        .iter()
        .map(|hint| Operation::LogoReplace {
            logo: hint.logo.clone(),
        })
        .collect()
}

fn plan_seo(state: &SiteState, hints: &ScopeHints) -> Result<Vec<Operation>, PlanError> {
    let mut ops = Vec::new();
    for proposal in &hints.seo {
        if let Some(path) = &proposal.page {
            if state.page(path).is_none() {
                return Err(PlanError::InvalidOperation {
                    scope: Scope::Seo,
                    reason: format!("no page at {path}"),
                });
            }
        }
        if proposal.meta.is_empty() {
            continue;
        }
        ops.push(Operation::SeoMetaUpdate {
            page: proposal.page.clone(),
            meta: proposal.meta.clone(),
        });
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::{ContentProposal, HeadHint, NavHint, SeoProposal, ThemeHint};
    use crate::state::{BlockKind, ContentBlock, NavLayout, PageState};
    use std::collections::BTreeMap;

    fn base_state() -> SiteState {
        let mut state = SiteState::default();
        state.theme.insert("color.primary".into(), "#fff".into());
        let block = ContentBlock {
            id: "hero".into(),
            text: "Welcome".into(),
            kind: BlockKind::Text,
            meta: BTreeMap::new(),
        };
        let page = PageState::new("/", "Home", vec![block], BTreeMap::new()).unwrap();
        state.pages.insert("/".into(), page);
        state
    }

    fn css_hints(primary: &str) -> ScopeHints {
        ScopeHints {
            theme: Some(ThemeHint {
                tokens: BTreeMap::from([("color.primary".to_string(), primary.to_string())]),
                raw_css: None,
                framework: None,
            }),
            ..ScopeHints::default()
        }
    }

    // =========================================================================
    // Scope resolution
    // =========================================================================

    #[test]
    fn empty_request_expands_to_all() {
        assert_eq!(resolve_scopes(&[]), Scope::PRIORITY.to_vec());
    }

    #[test]
    fn all_expands_to_every_scope() {
        assert_eq!(
            resolve_scopes(&[Scope::All, Scope::Css]),
            Scope::PRIORITY.to_vec()
        );
    }

    #[test]
    fn subset_resolves_in_priority_order() {
        // Requested out of order; resolution normalizes.
        assert_eq!(
            resolve_scopes(&[Scope::Seo, Scope::Head]),
            vec![Scope::Head, Scope::Seo]
        );
    }

    // =========================================================================
    // Rules
    // =========================================================================

    #[test]
    fn css_hint_yields_token_update() {
        let state = base_state();
        let cs = plan(&state, &[Scope::Css], &css_hints("#0d6efd")).unwrap();
        assert_eq!(cs.operations.len(), 1);
        assert!(matches!(
            &cs.operations[0],
            Operation::CssTokensUpdate { tokens } if tokens["color.primary"] == "#0d6efd"
        ));
    }

    #[test]
    fn raw_css_adds_bundle_rewrite() {
        let state = base_state();
        let mut hints = css_hints("#0d6efd");
        hints.theme.as_mut().unwrap().raw_css = Some("body { margin: 0; }".into());
        let cs = plan(&state, &[Scope::Css], &hints).unwrap();
        assert_eq!(cs.operations.len(), 2);
        assert!(matches!(
            &cs.operations[1],
            Operation::CssBundleRewrite { raw: Some(_), .. }
        ));
    }

    #[test]
    fn scope_filter_ignores_unrelated_hints() {
        let state = base_state();
        let mut hints = css_hints("#0d6efd");
        hints.nav = Some(NavHint {
            layout: Some(NavLayout::default()),
            items: None,
        });
        // Only css requested, so the nav hint is not consulted.
        let cs = plan(&state, &[Scope::Css], &hints).unwrap();
        assert!(cs.operations.iter().all(|op| op.scope() == Scope::Css));
    }

    #[test]
    fn satisfied_content_proposal_yields_no_op() {
        let state = base_state();
        let hints = ScopeHints {
            content: vec![ContentProposal {
                page: "/".into(),
                block: "hero".into(),
                text: "Welcome".into(),
                meta: None,
            }],
            ..ScopeHints::default()
        };
        let cs = plan(&state, &[Scope::Content], &hints).unwrap();
        assert!(cs.is_empty());
        assert_eq!(cs.operations_hash.len(), 64);
    }

    #[test]
    fn changed_content_proposal_yields_update() {
        let state = base_state();
        let hints = ScopeHints {
            content: vec![ContentProposal {
                page: "/".into(),
                block: "hero".into(),
                text: "Welcome to the renewed site".into(),
                meta: None,
            }],
            ..ScopeHints::default()
        };
        let cs = plan(&state, &[Scope::Content], &hints).unwrap();
        assert_eq!(cs.operations.len(), 1);
    }

    #[test]
    fn unknown_page_aborts_planning() {
        let state = base_state();
        let hints = ScopeHints {
            content: vec![ContentProposal {
                page: "/missing".into(),
                block: "hero".into(),
                text: "x".into(),
                meta: None,
            }],
            ..ScopeHints::default()
        };
        let err = plan(&state, &[Scope::Content], &hints).unwrap_err();
        assert!(matches!(
            err,
            PlanError::InvalidOperation {
                scope: Scope::Content,
                ..
            }
        ));
    }

    #[test]
    fn unknown_seo_page_reports_seo_scope() {
        let state = base_state();
        let hints = ScopeHints {
            seo: vec![SeoProposal {
                page: Some("/missing".into()),
                meta: BTreeMap::from([("description".to_string(), "x".to_string())]),
            }],
            ..ScopeHints::default()
        };
        let err = plan(&state, &[Scope::Seo], &hints).unwrap_err();
        assert!(matches!(
            err,
            PlanError::InvalidOperation {
                scope: Scope::Seo,
                ..
            }
        ));
    }

    // =========================================================================
    // Ordering, dedup, determinism
    // =========================================================================

    #[test]
    fn operations_ordered_by_scope_priority() {
        let state = base_state();
        let hints = ScopeHints {
            theme: css_hints("#0d6efd").theme,
            head: Some(HeadHint {
                title_template: Some("{title} | Acme".into()),
                meta: BTreeMap::new(),
                links: BTreeMap::new(),
            }),
            seo: vec![SeoProposal {
                page: None,
                meta: BTreeMap::from([("og:type".to_string(), "website".to_string())]),
            }],
            ..ScopeHints::default()
        };
        // Request in reverse priority order; output must not care.
        let cs = plan(&state, &[Scope::Seo, Scope::Css, Scope::Head], &hints).unwrap();
        let scopes: Vec<Scope> = cs.operations.iter().map(Operation::scope).collect();
        assert_eq!(scopes, vec![Scope::Head, Scope::Css, Scope::Seo]);
    }

    #[test]
    fn duplicate_operations_collapse() {
        let state = base_state();
        let hints = ScopeHints {
            seo: vec![
                SeoProposal {
                    page: None,
                    meta: BTreeMap::from([("og:type".to_string(), "website".to_string())]),
                },
                SeoProposal {
                    page: None,
                    meta: BTreeMap::from([("og:type".to_string(), "website".to_string())]),
                },
            ],
            ..ScopeHints::default()
        };
        let cs = plan(&state, &[Scope::Seo], &hints).unwrap();
        assert_eq!(cs.operations.len(), 1);
    }

    #[test]
    fn planning_is_deterministic() {
        let state = base_state();
        let hints = css_hints("#0d6efd");
        let a = plan(&state, &[Scope::All], &hints).unwrap();
        let b = plan(&state, &[Scope::All], &hints).unwrap();
        assert_eq!(a.operations_hash, b.operations_hash);
        assert_eq!(a.operations, b.operations);
    }

    #[test]
    fn no_hints_yield_empty_change_set() {
        let state = base_state();
        let cs = plan(&state, &[Scope::All], &ScopeHints::default()).unwrap();
        assert!(cs.is_empty());
    }
}
