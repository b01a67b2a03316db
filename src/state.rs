//! The durable site representation shared across the pipeline.
//!
//! A [`SiteState`] is the canonical, structured record of one website: its
//! navigation tree, head metadata, pages with content blocks, theme tokens,
//! stylesheet bundle, media catalog, and SEO data. One instance exists per
//! domain; it is created on the first full pipeline run and then mutated
//! only through change-set execution.
//!
//! All mapping-shaped fields use `BTreeMap` so serialization order is
//! stable; these structures feed content fingerprints and must hash
//! identically regardless of how they were assembled.
//!
//! # Page hash invariant
//!
//! `PageState::content_hash` is always the canonical fingerprint of the
//! page's `(blocks, seo)` pair. Every mutation path recomputes it
//! synchronously through [`PageState::recompute_hash`]; nothing ever stores
//! a stale hash. The selective builder relies on this to decide which page
//! artifacts can be reused byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::hash::{self, InvalidFragment};

/// Canonical representation of one site, keyed by domain in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteState {
    pub navigation: Navigation,
    pub head: HeadState,
    /// Pages keyed by site-relative path (`/`, `/about`, ...).
    pub pages: BTreeMap<String, PageState>,
    /// Theme tokens as dotted keys: `color.primary`, `shape.radius`, ...
    pub theme: BTreeMap<String, String>,
    pub css_bundle: CssBundle,
    pub assets: AssetCatalog,
    pub seo: SeoState,
    /// Append-only list of build ids, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_history: Vec<String>,
}

/// Ordered menu tree plus layout configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<NavEntry>,
    #[serde(default)]
    pub layout: NavLayout,
}

/// One menu entry; children form dropdown groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavEntry {
    pub label: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavEntry>,
}

/// Where and how the menu renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavLayout {
    #[serde(default)]
    pub location: NavLocation,
    #[serde(default)]
    pub dropdown: DropdownMode,
    #[serde(default)]
    pub sticky: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavLocation {
    #[default]
    TopLeft,
    TopRight,
    TopCenter,
    SideLeft,
    SideRight,
    Footer,
}

impl NavLocation {
    /// CSS class suffix (`nav-top-left`, ...).
    pub fn css_suffix(self) -> &'static str {
        match self {
            NavLocation::TopLeft => "top-left",
            NavLocation::TopRight => "top-right",
            NavLocation::TopCenter => "top-center",
            NavLocation::SideLeft => "side-left",
            NavLocation::SideRight => "side-right",
            NavLocation::Footer => "footer",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropdownMode {
    #[default]
    Hover,
    Click,
    None,
}

/// Global head metadata applied to every rendered page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadState {
    /// Title template; `{title}` expands to the page title.
    #[serde(default)]
    pub title_template: String,
    /// `<meta name=...>` entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    /// `<link rel=...>` entries, rel → href.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

/// One page: ordered content blocks plus per-page SEO overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub path: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
    /// Per-page meta overrides (description, keywords, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seo: BTreeMap<String, String>,
    /// Fingerprint of `(blocks, seo)`; see the module docs for the invariant.
    pub content_hash: String,
}

impl PageState {
    /// Create a page and establish its content hash.
    pub fn new(
        path: impl Into<String>,
        title: impl Into<String>,
        blocks: Vec<ContentBlock>,
        seo: BTreeMap<String, String>,
    ) -> Result<Self, InvalidFragment> {
        let mut page = Self {
            path: path.into(),
            title: title.into(),
            blocks,
            seo,
            content_hash: String::new(),
        };
        page.recompute_hash()?;
        Ok(page)
    }

    /// Recompute `content_hash` from the current blocks and seo mapping.
    ///
    /// Must be called by every mutation path before the page is observed
    /// again; [`crate::ops::Operation::apply`] does this as part of its fold.
    pub fn recompute_hash(&mut self) -> Result<(), InvalidFragment> {
        self.content_hash = hash::hash_fragment(&(&self.blocks, &self.seo))?;
        Ok(())
    }

    /// Find a block by id.
    pub fn block(&self, id: &str) -> Option<&ContentBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Output filename for this page (`index.html` for `/`).
    pub fn output_file(&self) -> String {
        let slug = self.path.trim_matches('/');
        if slug.is_empty() {
            "index.html".to_string()
        } else if slug.ends_with(".html") {
            slug.to_string()
        } else {
            format!("{}.html", slug.replace('/', "-"))
        }
    }

    /// Slug used for per-page partial filenames.
    pub fn slug(&self) -> String {
        let slug = self.path.trim_matches('/');
        if slug.is_empty() {
            "index".to_string()
        } else {
            slug.trim_end_matches(".html").replace('/', "-")
        }
    }
}

/// A logical fragment of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub kind: BlockKind,
    /// Free-form producer metadata (heading, call-to-action, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    #[default]
    Text,
    Markdown,
}

/// Raw stylesheet text plus the token mapping that generated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CssBundle {
    #[serde(default)]
    pub raw: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
    pub framework: String,
}

impl Default for CssBundle {
    fn default() -> Self {
        Self {
            raw: String::new(),
            tokens: BTreeMap::new(),
            framework: "bootstrap".to_string(),
        }
    }
}

/// Image and logo references with sizes and optimized variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetCatalog {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoAsset>,
}

impl AssetCatalog {
    pub fn image(&self, src: &str) -> Option<&ImageAsset> {
        self.images.iter().find(|i| i.src == src)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub src: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<ImageVariant>,
}

/// One optimized rendition of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVariant {
    pub src: String,
    pub width: u32,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoAsset {
    pub src: String,
    pub bytes: u64,
}

/// Global SEO metadata and structured-data documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoState {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    /// JSON-LD documents keyed by schema type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub structured_data: BTreeMap<String, Value>,
}

impl SiteState {
    /// Page lookup by path.
    pub fn page(&self, path: &str) -> Option<&PageState> {
        self.pages.get(path)
    }

    /// Most recent build id, if any build ever completed.
    pub fn latest_build_id(&self) -> Option<&str> {
        self.build_history.last().map(String::as_str)
    }
}
