//! Artifact rendering: site state in, output bytes out.
//!
//! Every renderer here is a pure function from state slices to content.
//! The selective builder decides *whether* to run them; this module only
//! knows *how*. Keeping renderers pure and slice-scoped is what makes the
//! builder's input fingerprints honest: an artifact's fingerprint covers
//! exactly the slices its renderer reads.
//!
//! HTML is generated with [maud](https://maud.lambda.xyz/): compile-time
//! checked templates, type-safe interpolation, auto-escaped by default.
//! Markdown content blocks go through `pulldown-cmark`.
//!
//! ## Artifact classes
//!
//! | Output path | Renderer | Inputs |
//! |-------------|----------|--------|
//! | `index.html`, `<slug>.html` | [`render_page`] | page blocks/seo, nav, head, global seo |
//! | `assets/css/main.css` | [`render_css`] | theme tokens, css bundle |
//! | `partials/nav.html` | [`render_nav`] | navigation |
//! | `partials/head/<slug>.html` | [`render_head_block`] | head, page seo |
//! | `media/manifest.json` | [`render_media_manifest`] | asset catalog |

use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Parser, html as md_html};

use crate::hash::InvalidFragment;
use crate::state::{BlockKind, ContentBlock, Navigation, PageState, SiteState};

/// Stylesheet href used by every page; stable so page artifacts do not
/// depend on CSS content.
pub const CSS_HREF: &str = "assets/css/main.css";

/// Expand the head title template for one page.
///
/// `{title}` in the template expands to the page title; an empty template
/// falls back to the page title alone.
pub fn page_title(state: &SiteState, page: &PageState) -> String {
    let template = state.head.title_template.trim();
    if template.is_empty() {
        page.title.clone()
    } else if template.contains("{title}") {
        template.replace("{title}", &page.title)
    } else {
        template.to_string()
    }
}

/// Renders one full page document.
pub fn render_page(state: &SiteState, page: &PageState) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            (render_head_block(state, page))
            body {
                header.site-header {
                    (render_nav(&state.navigation))
                }
                main {
                    @for block in &page.blocks {
                        (render_block(block))
                    }
                }
                footer.site-footer {
                    p { "Generated by site-renewal" }
                }
            }
        }
    }
}

/// Renders the `<head>` element for one page.
///
/// Per-page seo overrides win over global seo meta; head meta entries are
/// always emitted. Also written standalone as `partials/head/<slug>.html`.
pub fn render_head_block(state: &SiteState, page: &PageState) -> Markup {
    let title = page_title(state, page);
    let description = page
        .seo
        .get("description")
        .or_else(|| state.seo.meta.get("description"));

    html! {
        head {
            meta charset="utf-8";
            meta name="viewport" content="width=device-width, initial-scale=1.0";
            title { (title) }
            @if let Some(desc) = description {
                meta name="description" content=(desc);
            }
            @for (name, content) in &state.head.meta {
                meta name=(name) content=(content);
            }
            @for (key, value) in &page.seo {
                @if key != "description" {
                    meta name=(key) content=(value);
                }
            }
            link rel="stylesheet" href=(CSS_HREF);
            @for (rel, href) in &state.head.links {
                link rel=(rel) href=(href);
            }
        }
    }
}

/// Renders the navigation partial.
///
/// Layout config lands as classes and data attributes so the stylesheet
/// can place the menu without this markup changing per location.
pub fn render_nav(navigation: &Navigation) -> Markup {
    let layout = &navigation.layout;
    let classes = format!(
        "nav nav-{}{}",
        layout.location.css_suffix(),
        if layout.sticky { " nav-sticky" } else { "" }
    );
    let dropdown = match layout.dropdown {
        crate::state::DropdownMode::Hover => "hover",
        crate::state::DropdownMode::Click => "click",
        crate::state::DropdownMode::None => "none",
    };

    html! {
        nav class=(classes) data-dropdown=(dropdown) {
            ul {
                @for item in &navigation.items {
                    li {
                        a href=(item.href) { (item.label) }
                        @if !item.children.is_empty() {
                            ul.nav-dropdown {
                                @for child in &item.children {
                                    li { a href=(child.href) { (child.label) } }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Renders one content block as a section.
fn render_block(block: &ContentBlock) -> Markup {
    let heading = block
        .meta
        .get("heading")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let cta = block
        .meta
        .get("call_to_action")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    html! {
        section id=(block.id) class={ "block-" (kind_class(block.kind)) } {
            @if let Some(heading) = &heading {
                h2 { (heading) }
            }
            @match block.kind {
                BlockKind::Markdown => (PreEscaped(markdown_to_html(&block.text))),
                BlockKind::Text => p { (block.text) },
            }
            @if let Some(cta) = &cta {
                p.cta { (cta) }
            }
        }
    }
}

fn kind_class(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Text => "text",
        BlockKind::Markdown => "markdown",
    }
}

fn markdown_to_html(text: &str) -> String {
    let parser = Parser::new(text);
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

/// Renders the stylesheet bundle.
///
/// Theme tokens become CSS custom properties (`color.primary` turns into
/// `--color-primary`); the raw bundle text, when a backend supplied one,
/// follows the token block so it can reference the variables.
pub fn render_css(state: &SiteState) -> String {
    let mut out = String::new();
    out.push_str(&format!("/* framework: {} */\n", state.css_bundle.framework));
    out.push_str(":root {\n");
    for (token, value) in &state.theme {
        out.push_str(&format!("  --{}: {};\n", token.replace('.', "-"), value));
    }
    out.push_str("}\n");

    if state.css_bundle.raw.is_empty() {
        // No generated bundle yet: project the tokens onto a minimal set of
        // rules so a fresh site is styled at all.
        out.push('\n');
        out.push_str(
            ".btn-primary {\n  background: var(--color-primary, #0d6efd);\n  color: #fff;\n  border-radius: var(--shape-radius, 0.5rem);\n  padding: 0.75rem 1.5rem;\n}\n",
        );
        out.push('\n');
        out.push_str("nav ul { display: flex; gap: 1rem; list-style: none; padding: 0; margin: 0; }\n");
    } else {
        out.push('\n');
        out.push_str(&state.css_bundle.raw);
        if !state.css_bundle.raw.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Renders the media manifest: the asset catalog as stable, pretty JSON.
pub fn render_media_manifest(state: &SiteState) -> Result<String, InvalidFragment> {
    let json = serde_json::to_string_pretty(&state.assets)
        .map_err(InvalidFragment::from)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        DropdownMode, NavEntry, NavLayout, NavLocation, PageState, SiteState,
    };
    use std::collections::BTreeMap;

    fn page_with(blocks: Vec<ContentBlock>) -> PageState {
        PageState::new("/", "Home", blocks, BTreeMap::new()).unwrap()
    }

    fn text_block(id: &str, text: &str) -> ContentBlock {
        ContentBlock {
            id: id.into(),
            text: text.into(),
            kind: BlockKind::Text,
            meta: BTreeMap::new(),
        }
    }

    // =========================================================================
    // Titles
    // =========================================================================

    #[test]
    fn empty_template_falls_back_to_page_title() {
        let state = SiteState::default();
        let page = page_with(vec![]);
        assert_eq!(page_title(&state, &page), "Home");
    }

    #[test]
    fn template_expands_placeholder() {
        let mut state = SiteState::default();
        state.head.title_template = "{title} | Acme Corp".into();
        let page = page_with(vec![]);
        assert_eq!(page_title(&state, &page), "Home | Acme Corp");
    }

    // =========================================================================
    // Pages
    // =========================================================================

    #[test]
    fn page_document_has_doctype_and_blocks() {
        let state = SiteState::default();
        let page = page_with(vec![text_block("hero", "Welcome")]);
        let html = render_page(&state, &page).into_string();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<section id="hero""#));
        assert!(html.contains("Welcome"));
        assert!(html.contains(CSS_HREF));
    }

    #[test]
    fn block_text_is_escaped() {
        let state = SiteState::default();
        let page = page_with(vec![text_block("hero", "<script>alert('x')</script>")]);
        let html = render_page(&state, &page).into_string();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn markdown_block_renders_html() {
        let state = SiteState::default();
        let block = ContentBlock {
            id: "body".into(),
            text: "Some **bold** copy".into(),
            kind: BlockKind::Markdown,
            meta: BTreeMap::new(),
        };
        let html = render_page(&state, &page_with(vec![block])).into_string();
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn block_meta_heading_and_cta_render() {
        let state = SiteState::default();
        let block = ContentBlock {
            id: "hero".into(),
            text: "Welcome".into(),
            kind: BlockKind::Text,
            meta: BTreeMap::from([
                ("heading".to_string(), serde_json::json!("Hello")),
                ("call_to_action".to_string(), serde_json::json!("Book now")),
            ]),
        };
        let html = render_page(&state, &page_with(vec![block])).into_string();
        assert!(html.contains("<h2>Hello</h2>"));
        assert!(html.contains(r#"<p class="cta">Book now</p>"#));
    }

    // =========================================================================
    // Head
    // =========================================================================

    #[test]
    fn page_seo_overrides_global_description() {
        let mut state = SiteState::default();
        state.seo.meta.insert("description".into(), "Global".into());
        let mut page = page_with(vec![]);
        page.seo.insert("description".into(), "Per page".into());
        page.recompute_hash().unwrap();

        let head = render_head_block(&state, &page).into_string();
        assert!(head.contains(r#"content="Per page""#));
        assert!(!head.contains(r#"content="Global""#));
    }

    #[test]
    fn head_links_render() {
        let mut state = SiteState::default();
        state
            .head
            .links
            .insert("icon".into(), "/favicon.svg".into());
        let head = render_head_block(&state, &page_with(vec![])).into_string();
        assert!(head.contains(r#"<link rel="icon" href="/favicon.svg">"#));
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    #[test]
    fn nav_renders_items_and_layout_classes() {
        let nav = Navigation {
            items: vec![NavEntry {
                label: "Home".into(),
                href: "index.html".into(),
                children: vec![],
            }],
            layout: NavLayout {
                location: NavLocation::TopRight,
                dropdown: DropdownMode::Click,
                sticky: true,
            },
        };
        let html = render_nav(&nav).into_string();
        assert!(html.contains("nav-top-right"));
        assert!(html.contains("nav-sticky"));
        assert!(html.contains(r#"data-dropdown="click""#));
        assert!(html.contains("Home"));
    }

    #[test]
    fn nav_renders_dropdown_children() {
        let nav = Navigation {
            items: vec![NavEntry {
                label: "Services".into(),
                href: "services.html".into(),
                children: vec![NavEntry {
                    label: "Web".into(),
                    href: "services-web.html".into(),
                    children: vec![],
                }],
            }],
            layout: NavLayout::default(),
        };
        let html = render_nav(&nav).into_string();
        assert!(html.contains("nav-dropdown"));
        assert!(html.contains("Web"));
    }

    // =========================================================================
    // CSS
    // =========================================================================

    #[test]
    fn css_projects_tokens_as_custom_properties() {
        let mut state = SiteState::default();
        state.theme.insert("color.primary".into(), "#0d6efd".into());
        state.theme.insert("shape.radius".into(), "1.25rem".into());
        let css = render_css(&state);
        assert!(css.contains("--color-primary: #0d6efd;"));
        assert!(css.contains("--shape-radius: 1.25rem;"));
        assert!(css.contains("framework: bootstrap"));
    }

    #[test]
    fn raw_bundle_replaces_fallback_rules() {
        let mut state = SiteState::default();
        state.css_bundle.raw = "body { margin: 0; }".into();
        let css = render_css(&state);
        assert!(css.contains("body { margin: 0; }"));
        assert!(!css.contains(".btn-primary"));
    }

    // =========================================================================
    // Media manifest
    // =========================================================================

    #[test]
    fn media_manifest_is_stable_json() {
        let mut state = SiteState::default();
        state.assets.images.push(crate::state::ImageAsset {
            src: "img/team.jpg".into(),
            bytes: 240_000,
            alt: Some("The team".into()),
            variants: vec![],
        });
        let a = render_media_manifest(&state).unwrap();
        let b = render_media_manifest(&state).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("img/team.jpg"));
    }
}
