//! Structured inputs from out-of-scope producers.
//!
//! Two document kinds cross the boundary into this crate:
//!
//! - [`ScopeHints`]: scope-tagged proposal objects from the text/theme
//!   generation backends. However many backends ran and whichever proposal
//!   won, what arrives here is one validated hint object per scope. The
//!   planner trusts the schema (serde enforces it) but not the values; it
//!   still applies its own ordering, dedup, and hashing rules.
//!
//! - [`CrawlSnapshot`]: the initial-population document assembled from the
//!   crawl and analysis producers, used exactly once per domain to create
//!   the first [`SiteState`]. The pipeline never re-derives any of it.
//!
//! Free-text user instructions are *not* represented here. The prompt string
//! travels to the generation backends and onto the change-set audit record
//! unchanged; this crate never parses it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::hash::InvalidFragment;
use crate::state::{
    AssetCatalog, ContentBlock, HeadState, ImageAsset, LogoAsset, NavEntry, NavLayout, PageState,
    SeoState, SiteState,
};

/// Scope-tagged proposals for one planning pass. All fields optional;
/// an absent field simply yields no operations for that scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav: Option<NavHint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentProposal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seo: Vec<SeoProposal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<HeadHint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSwap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoHint>,
}

impl ScopeHints {
    /// Parse a hints document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Proposed theme token values, plus an optional full bundle rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeHint {
    /// Token values to merge (`color.primary`, `shape.radius`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
    /// Replacement stylesheet text, when a backend regenerated the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// Proposed navigation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<NavLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<NavEntry>>,
}

/// One proposed replacement for a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProposal {
    pub page: String,
    pub block: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, Value>>,
}

/// Proposed SEO meta entries, global or per page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoProposal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    pub meta: BTreeMap<String, String>,
}

/// Proposed head metadata patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_template: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

/// Swap one catalogued image for an optimized replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSwap {
    pub src: String,
    pub replacement: ImageAsset,
}

/// Replacement logo reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoHint {
    pub logo: LogoAsset,
}

// ============================================================================
// Initial population
// ============================================================================

/// Structured output of the crawl/analysis producers for one domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlSnapshot {
    pub domain: String,
    #[serde(default)]
    pub pages: Vec<CrawledPage>,
    #[serde(default)]
    pub nav_items: Vec<NavEntry>,
    #[serde(default)]
    pub head: HeadState,
    #[serde(default)]
    pub theme_tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub assets: AssetCatalog,
    #[serde(default)]
    pub seo: SeoState,
}

/// One crawled page with its extracted content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub seo: BTreeMap<String, String>,
}

impl CrawlSnapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Materialize the first [`SiteState`] for this domain.
    ///
    /// Page content hashes are established here; everything downstream can
    /// assume the invariant holds from version 1 onwards.
    pub fn into_state(self) -> Result<SiteState, InvalidFragment> {
        let mut state = SiteState {
            head: self.head,
            theme: self.theme_tokens.clone(),
            assets: self.assets,
            seo: self.seo,
            ..SiteState::default()
        };
        state.navigation.items = self.nav_items;
        state.css_bundle.tokens = self.theme_tokens;
        for crawled in self.pages {
            let page = PageState::new(
                crawled.path.clone(),
                crawled.title,
                crawled.blocks,
                crawled.seo,
            )?;
            state.pages.insert(crawled.path, page);
        }
        Ok(state)
    }
}
