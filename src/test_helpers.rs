//! Shared fixtures for the site-renewal test suite.
//!
//! Builders for the small "example.com" site used across module tests:
//! one home page with a hero block, an about page, a starter theme, and a
//! couple of catalogued assets. Kept deliberately tiny so assertions can
//! name every artifact a build produces.

use std::collections::BTreeMap;

use crate::hints::{CrawlSnapshot, CrawledPage, ScopeHints, ThemeHint};
use crate::state::{BlockKind, ContentBlock, ImageAsset, NavEntry, SiteState};

/// A crawl snapshot for `domain`: two pages, starter nav and theme.
pub fn sample_snapshot(domain: &str) -> CrawlSnapshot {
    let mut snapshot = CrawlSnapshot {
        domain: domain.to_string(),
        ..CrawlSnapshot::default()
    };
    snapshot.pages.push(CrawledPage {
        path: "/".to_string(),
        title: "Home".to_string(),
        blocks: vec![ContentBlock {
            id: "hero".to_string(),
            text: "Welcome".to_string(),
            kind: BlockKind::Text,
            meta: BTreeMap::new(),
        }],
        seo: BTreeMap::new(),
    });
    snapshot.pages.push(CrawledPage {
        path: "/about".to_string(),
        title: "About".to_string(),
        blocks: vec![ContentBlock {
            id: "story".to_string(),
            text: "We renew sites".to_string(),
            kind: BlockKind::Text,
            meta: BTreeMap::new(),
        }],
        seo: BTreeMap::new(),
    });
    snapshot.nav_items = vec![
        NavEntry {
            label: "Home".to_string(),
            href: "index.html".to_string(),
            children: vec![],
        },
        NavEntry {
            label: "About".to_string(),
            href: "about.html".to_string(),
            children: vec![],
        },
    ];
    snapshot
        .theme_tokens
        .insert("color.primary".to_string(), "#fff".to_string());
    snapshot.assets.images.push(ImageAsset {
        src: "img/team.jpg".to_string(),
        bytes: 240_000,
        alt: Some("The team".to_string()),
        variants: vec![],
    });
    snapshot
}

/// The sample snapshot materialized as a state.
pub fn sample_state() -> SiteState {
    sample_snapshot("example.com").into_state().unwrap()
}

/// Css-scope hints setting `color.primary` to `primary`.
pub fn sample_hints(primary: &str) -> ScopeHints {
    ScopeHints {
        theme: Some(ThemeHint {
            tokens: BTreeMap::from([("color.primary".to_string(), primary.to_string())]),
            raw_css: None,
            framework: None,
        }),
        ..ScopeHints::default()
    }
}
