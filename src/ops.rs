//! The closed vocabulary of site mutations.
//!
//! Every change to a [`SiteState`] is expressed as an [`Operation`]: a typed,
//! immutable, value-comparable mutation request with a payload schema fixed
//! per type. The enum is the whole vocabulary; an unknown `type` tag fails
//! deserialization, so nothing outside this set can reach the executor.
//!
//! Operations serialize as `{"type": "css.tokens.update", "payload": {...}}`,
//! which is also the canonical form their hashes are computed over.
//!
//! # Application semantics
//!
//! [`Operation::apply`] is a pure, total function over well-formed payloads:
//! it never partially applies, and it recomputes the content hash of every
//! page it touches before returning. Re-applying an operation to a state it
//! already shaped is harmless (the result is value-identical); the
//! idempotence guarantee callers actually rely on lives at the change-set
//! level in the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::hash::{self, InvalidFragment};
use crate::state::{ImageAsset, LogoAsset, NavEntry, NavLayout, SiteState};

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("no page at {0}")]
    UnknownPage(String),
    #[error("no block {block} on page {page}")]
    UnknownBlock { page: String, block: String },
    #[error("no image asset with src {0}")]
    UnknownImage(String),
    #[error(transparent)]
    Fragment(#[from] InvalidFragment),
}

/// A named subset of the site's concerns that a change request targets.
///
/// `All` is only valid as a *requested* scope; operations always carry a
/// concrete scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Css,
    Seo,
    Images,
    Logo,
    Content,
    Nav,
    Head,
    All,
}

impl Scope {
    /// Every concrete scope, in application-priority order.
    ///
    /// Later scopes may shadow leaf fields written by earlier ones, so this
    /// order is part of the planner's determinism contract.
    pub const PRIORITY: [Scope; 7] = [
        Scope::Head,
        Scope::Nav,
        Scope::Css,
        Scope::Content,
        Scope::Images,
        Scope::Logo,
        Scope::Seo,
    ];

    /// Position in [`Self::PRIORITY`]; `All` sorts last and never appears
    /// on a planned operation.
    pub fn priority(self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Css => "css",
            Scope::Seo => "seo",
            Scope::Images => "images",
            Scope::Logo => "logo",
            Scope::Content => "content",
            Scope::Nav => "nav",
            Scope::Head => "head",
            Scope::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" => Ok(Scope::Css),
            "seo" => Ok(Scope::Seo),
            "images" => Ok(Scope::Images),
            "logo" => Ok(Scope::Logo),
            "content" => Ok(Scope::Content),
            "nav" => Ok(Scope::Nav),
            "head" => Ok(Scope::Head),
            "all" => Ok(Scope::All),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// An atomic, typed mutation request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Operation {
    /// Merge token values into the theme and the css bundle's token record.
    #[serde(rename = "css.tokens.update")]
    CssTokensUpdate { tokens: BTreeMap<String, String> },

    /// Replace the raw stylesheet text and/or the framework label.
    #[serde(rename = "css.bundle.rewrite")]
    CssBundleRewrite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        framework: Option<String>,
    },

    /// Replace the navigation layout configuration.
    #[serde(rename = "nav.layout.update")]
    NavLayoutUpdate { layout: NavLayout },

    /// Replace the ordered menu tree.
    #[serde(rename = "nav.items.update")]
    NavItemsUpdate { items: Vec<NavEntry> },

    /// Replace one content block's text (and optionally its metadata).
    #[serde(rename = "content.block.update")]
    ContentBlockUpdate {
        page: String,
        block: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<BTreeMap<String, Value>>,
    },

    /// Merge meta entries into global SEO state, or into one page's overrides.
    #[serde(rename = "seo.meta.update")]
    SeoMetaUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<String>,
        meta: BTreeMap<String, String>,
    },

    /// Patch global head metadata.
    #[serde(rename = "head.update")]
    HeadUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title_template: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        meta: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        links: BTreeMap<String, String>,
    },

    /// Swap an image reference for an optimized replacement.
    #[serde(rename = "image.replace")]
    ImageReplace { src: String, replacement: ImageAsset },

    /// Replace the site logo reference.
    #[serde(rename = "logo.replace")]
    LogoReplace { logo: LogoAsset },
}

impl Operation {
    /// The scope this operation targets.
    pub fn scope(&self) -> Scope {
        match self {
            Operation::CssTokensUpdate { .. } | Operation::CssBundleRewrite { .. } => Scope::Css,
            Operation::NavLayoutUpdate { .. } | Operation::NavItemsUpdate { .. } => Scope::Nav,
            Operation::ContentBlockUpdate { .. } => Scope::Content,
            Operation::SeoMetaUpdate { .. } => Scope::Seo,
            Operation::HeadUpdate { .. } => Scope::Head,
            Operation::ImageReplace { .. } => Scope::Images,
            Operation::LogoReplace { .. } => Scope::Logo,
        }
    }

    /// Wire name of the operation type.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CssTokensUpdate { .. } => "css.tokens.update",
            Operation::CssBundleRewrite { .. } => "css.bundle.rewrite",
            Operation::NavLayoutUpdate { .. } => "nav.layout.update",
            Operation::NavItemsUpdate { .. } => "nav.items.update",
            Operation::ContentBlockUpdate { .. } => "content.block.update",
            Operation::SeoMetaUpdate { .. } => "seo.meta.update",
            Operation::HeadUpdate { .. } => "head.update",
            Operation::ImageReplace { .. } => "image.replace",
            Operation::LogoReplace { .. } => "logo.replace",
        }
    }

    /// Apply this operation to `state`, returning the successor state.
    ///
    /// Pure and total over well-formed payloads: the input state is never
    /// mutated, and content hashes of touched pages are recomputed before
    /// the new state is returned.
    pub fn apply(&self, state: &SiteState) -> Result<SiteState, ApplyError> {
        let mut next = state.clone();
        match self {
            Operation::CssTokensUpdate { tokens } => {
                for (key, value) in tokens {
                    next.theme.insert(key.clone(), value.clone());
                    next.css_bundle.tokens.insert(key.clone(), value.clone());
                }
            }
            Operation::CssBundleRewrite { raw, framework } => {
                if let Some(raw) = raw {
                    next.css_bundle.raw = raw.clone();
                }
                if let Some(framework) = framework {
                    next.css_bundle.framework = framework.clone();
                }
            }
            Operation::NavLayoutUpdate { layout } => {
                next.navigation.layout = layout.clone();
            }
            Operation::NavItemsUpdate { items } => {
                next.navigation.items = items.clone();
            }
            Operation::ContentBlockUpdate {
                page,
                block,
                text,
                meta,
            } => {
                let entry = next
                    .pages
                    .get_mut(page)
                    .ok_or_else(|| ApplyError::UnknownPage(page.clone()))?;
                let target = entry
                    .blocks
                    .iter_mut()
                    .find(|b| b.id == *block)
                    .ok_or_else(|| ApplyError::UnknownBlock {
                        page: page.clone(),
                        block: block.clone(),
                    })?;
                target.text = text.clone();
                if let Some(meta) = meta {
                    target.meta = meta.clone();
                }
                entry.recompute_hash()?;
            }
            Operation::SeoMetaUpdate { page, meta } => match page {
                Some(path) => {
                    let entry = next
                        .pages
                        .get_mut(path)
                        .ok_or_else(|| ApplyError::UnknownPage(path.clone()))?;
                    for (key, value) in meta {
                        entry.seo.insert(key.clone(), value.clone());
                    }
                    entry.recompute_hash()?;
                }
                None => {
                    for (key, value) in meta {
                        next.seo.meta.insert(key.clone(), value.clone());
                    }
                }
            },
            Operation::HeadUpdate {
                title_template,
                meta,
                links,
            } => {
                if let Some(template) = title_template {
                    next.head.title_template = template.clone();
                }
                for (key, value) in meta {
                    next.head.meta.insert(key.clone(), value.clone());
                }
                for (rel, href) in links {
                    next.head.links.insert(rel.clone(), href.clone());
                }
            }
            Operation::ImageReplace { src, replacement } => {
                let slot = next
                    .assets
                    .images
                    .iter_mut()
                    .find(|i| i.src == *src)
                    .ok_or_else(|| ApplyError::UnknownImage(src.clone()))?;
                *slot = replacement.clone();
            }
            Operation::LogoReplace { logo } => {
                next.assets.logo = Some(logo.clone());
            }
        }
        Ok(next)
    }
}

/// An ordered, hashed batch of operations produced by one planning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// The scopes this batch touches.
    pub targets: BTreeSet<Scope>,
    pub operations: Vec<Operation>,
    /// Canonical fingerprint of the ordered operation list.
    pub operations_hash: String,
    pub created_at: DateTime<Utc>,
}

impl ChangeSet {
    /// Build a change set, deriving targets and hash from the operations.
    ///
    /// The operation list must already be in its final deterministic order;
    /// the hash is computed over exactly that order.
    pub fn new(operations: Vec<Operation>) -> Result<Self, InvalidFragment> {
        let targets = operations.iter().map(Operation::scope).collect();
        let operations_hash = hash::hash_fragment(&operations)?;
        Ok(Self {
            targets,
            operations,
            operations_hash,
            created_at: Utc::now(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Short identifier derived from the operations hash.
    pub fn short_hash(&self) -> &str {
        hash::short_id(&self.operations_hash)
    }
}
