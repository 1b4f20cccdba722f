//! Splits a sanitized document into isolated, one-section scenes.
//!
//! Each scene is a `div.scene` host carrying a declarative shadow root with
//! the shared document metadata and a synthetic body. The body keeps one slot
//! per top-level section so positional selectors match as they would in the
//! source page.

use ego_tree::{NodeId, NodeRef, Tree};
use html5ever::QualName;
use scraper::{ElementRef, Html, Node};
use tracing::debug;
use url::Url;

use crate::address;
use crate::document::css;
use crate::document::{
    child_text, element_ids, is_html_element, is_plain_attribute, new_element, rebuild_element, replace_text, text_node,
};

/// Elements moved out of the document and shared by every scene.
const METADATA_TAGS: &[&str] = &["style", "link", "meta", "base"];

const ADDRESS_ATTRIBUTES: &[&str] = &["href", "src", "action", "data-src", "poster"];

const ADDRESS_PROPERTIES: &[&str] = &[
    "background",
    "background-image",
    "border-image",
    "border-image-source",
    "content",
    "cursor",
    "list-style",
    "list-style-image",
    "mask",
    "mask-image",
    "-webkit-mask",
    "-webkit-mask-image",
    "offset-path",
    "src",
];

const STANDARD_CSS: &str = "\
:host { display: block; position: relative; width: 100%; height: 100%; overflow: hidden; contain: strict; }
[data-scene-body] { margin: 0; padding: 0; width: 100%; height: 100%; scroll-snap-type: y mandatory; }
[data-scene-body] > section { position: relative; height: 100%; scroll-snap-align: start; scroll-snap-stop: always; }";

const BODY_STYLE: &str = "overflow: hidden; overscroll-behavior: none; touch-action: none;";

const PLACEHOLDER_STYLE: &str = "display: none !important; width: 0; height: 0;";

const ERROR_STYLE: &str = "position: absolute; inset: 0; width: fit-content; height: fit-content; \
margin: auto; font-size: 20vw; font-weight: 900;";

/// One isolated section of a feed document, ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    index: usize,
    html: String,
}

impl Scene {
    /// Position of the section in the document's canonical index.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// Placeholder shown when a document cannot be loaded.
    pub fn error() -> Self {
        let mut tree = Html::new_document().tree;
        let root = tree.root().id();
        let host = append(&mut tree, root, new_element("div", &[("class", "scene scene-error")]));
        let shadow = append(&mut tree, host, new_element("template", &[("shadowrootmode", "open")]));
        let mark = append(&mut tree, shadow, new_element("div", &[("style", ERROR_STYLE)]));
        append_node(&mut tree, mark, text_node("✕"));

        Self {
            index: 0,
            html: serialize(&tree, host),
        }
    }
}

/// Composes one scene per top-level `section` of `document`.
///
/// `base_address` is the address the document was loaded from. Only sections
/// in `[range_start, range_end)` are composed; the range is clamped to the
/// number of sections.
pub fn compose_sections(
    base_address: &str,
    mut document: Html,
    range_start: Option<usize>,
    range_end: Option<usize>,
) -> Vec<Scene> {
    let root = document.tree.root().id();

    let metadata: Vec<NodeId> = find_element(&document.tree, "head")
        .map(|head| element_ids(&document.tree, head))
        .unwrap_or_default()
        .into_iter()
        .filter(|id| {
            document
                .tree
                .get(*id)
                .and_then(|n| n.value().as_element())
                .is_some_and(|e| METADATA_TAGS.iter().any(|tag| is_html_element(e, tag)))
        })
        .collect();
    for id in &metadata {
        if let Some(mut node) = document.tree.get_mut(*id) {
            node.detach();
        }
    }

    let body = find_body(&document.tree);
    let sections: Vec<NodeId> = document
        .tree
        .get(body)
        .map(|node| {
            node.children()
                .filter(|c| c.value().as_element().is_some_and(|e| is_html_element(e, "section")))
                .map(|c| c.id())
                .collect()
        })
        .unwrap_or_default();

    match address::folder_of(base_address) {
        Some(base) => {
            absolutize(&mut document.tree, root, &base);
            for id in &metadata {
                absolutize(&mut document.tree, *id, &base);
            }
        }
        None => debug!(%base_address, "No folder for base address, references left as written"),
    }

    let start = range_start.unwrap_or(0).min(sections.len());
    let end = range_end.unwrap_or(sections.len()).min(sections.len());
    if start >= end {
        return Vec::new();
    }

    (start..end)
        .map(|index| Scene {
            index,
            html: compose_scene(&document.tree, &metadata, &sections, index),
        })
        .collect()
}

fn compose_scene(source: &Tree<Node>, metadata: &[NodeId], sections: &[NodeId], index: usize) -> String {
    let mut tree = Html::new_document().tree;
    let root = tree.root().id();

    let position = index.to_string();
    let host = append(
        &mut tree,
        root,
        new_element("div", &[("class", "scene"), ("data-scene-index", &position)]),
    );
    let shadow = append(&mut tree, host, new_element("template", &[("shadowrootmode", "open")]));

    let style = append(&mut tree, shadow, new_element("style", &[]));
    append_node(&mut tree, style, text_node(STANDARD_CSS));
    for id in metadata {
        if let Some(node) = source.get(*id) {
            copy_subtree(node, &mut tree, shadow);
        }
    }

    let body = append(
        &mut tree,
        shadow,
        new_element(
            "div",
            &[
                ("data-scene-body", ""),
                ("data-suppress-gestures", "wheel touchmove"),
                ("style", BODY_STYLE),
            ],
        ),
    );
    for (slot, id) in sections.iter().enumerate() {
        match source.get(*id) {
            Some(section) if slot == index => copy_subtree(section, &mut tree, body),
            _ => {
                append(
                    &mut tree,
                    body,
                    new_element(
                        "div",
                        &[("aria-hidden", "true"), ("inert", ""), ("style", PLACEHOLDER_STYLE)],
                    ),
                );
            }
        }
    }

    serialize(&tree, host)
}

fn find_element(tree: &Tree<Node>, tag: &str) -> Option<NodeId> {
    tree.root()
        .descendants()
        .find(|n| n.value().as_element().is_some_and(|e| is_html_element(e, tag)))
        .map(|n| n.id())
}

fn find_body(tree: &Tree<Node>) -> NodeId {
    find_element(tree, "body")
        .or_else(|| find_element(tree, "html"))
        .unwrap_or_else(|| tree.root().id())
}

/// Rewrites address attributes and reference properties under `subtree`.
fn absolutize(tree: &mut Tree<Node>, subtree: NodeId, base: &Url) {
    let mut resolve_property = |name: &str, value: &str| -> String {
        if !ADDRESS_PROPERTIES.contains(&name) {
            return value.to_string();
        }
        css::rewrite_first_url(value, |reference| address::resolve(reference, base.as_str()).ok())
            .unwrap_or_default()
    };

    for id in element_ids(tree, subtree) {
        let Some(element) = tree.get(id).and_then(|n| n.value().as_element()).cloned() else {
            continue;
        };

        let mut attributes: Vec<(QualName, String)> = Vec::new();
        for (name, value) in element.attrs.iter() {
            let local: &str = &name.local;
            if is_plain_attribute(name, "style") {
                attributes.push((name.clone(), css::rewrite_declarations(value, &mut resolve_property)));
            } else if ADDRESS_ATTRIBUTES.contains(&local) {
                if let Ok(resolved) = address::resolve(value, base.as_str()) {
                    attributes.push((name.clone(), resolved));
                }
            } else {
                attributes.push((name.clone(), value.to_string()));
            }
        }

        let is_style = is_html_element(&element, "style");
        let rebuilt = rebuild_element(element.name.clone(), attributes);
        if let Some(mut node) = tree.get_mut(id) {
            *node.value() = Node::Element(rebuilt);
        }

        if is_style {
            let sheet = css::rewrite_sheet(&child_text(tree, id), &mut resolve_property);
            replace_text(tree, id, &sheet);
        }
    }
}

fn append(tree: &mut Tree<Node>, parent: NodeId, element: scraper::node::Element) -> NodeId {
    append_node(tree, parent, Node::Element(element))
}

fn append_node(tree: &mut Tree<Node>, parent: NodeId, node: Node) -> NodeId {
    match tree.get_mut(parent) {
        Some(mut parent) => parent.append(node).id(),
        None => tree.orphan(node).id(),
    }
}

fn copy_subtree(source: NodeRef<'_, Node>, tree: &mut Tree<Node>, parent: NodeId) {
    let id = append_node(tree, parent, source.value().clone());
    for child in source.children() {
        copy_subtree(child, tree, id);
    }
}

fn serialize(tree: &Tree<Node>, id: NodeId) -> String {
    tree.get(id)
        .and_then(ElementRef::wrap)
        .map(|element| element.html())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_document, DocumentSanitizer};

    const PAGE: &str = "https://ex.com/feed/post.html";

    const THREE: &str = r#"<html><head><title>t</title><link rel="stylesheet" href="a.css"></head>
        <body><section id="s1">one</section><p>between</p><section id="s2">two</section><section id="s3">three</section></body></html>"#;

    fn placeholders(html: &str) -> usize {
        html.matches(r#"aria-hidden="true""#).count()
    }

    #[test]
    fn test_one_scene_per_section() {
        let scenes = compose_sections(PAGE, parse_document(THREE), None, None);
        assert_eq!(scenes.len(), 3);

        for (i, scene) in scenes.iter().enumerate() {
            assert_eq!(scene.index(), i);
            assert_eq!(scene.html().matches("<section").count(), 1);
            assert_eq!(placeholders(scene.html()), 2);
            assert!(scene.html().contains(&format!(r#"id="s{}""#, i + 1)));
            assert!(scene.html().contains(&format!(r#"data-scene-index="{}""#, i)));
            assert!(!scene.html().contains("between"));
        }
    }

    #[test]
    fn test_section_keeps_its_position() {
        let scenes = compose_sections(PAGE, parse_document(THREE), None, None);
        let html = scenes[1].html();
        let section = html.find(r#"<section id="s2">"#).unwrap();
        let first_placeholder = html.find("aria-hidden").unwrap();
        let last_placeholder = html.rfind("aria-hidden").unwrap();
        assert!(first_placeholder < section);
        assert!(section < last_placeholder);
    }

    #[test]
    fn test_range_selects_sections() {
        let scenes = compose_sections(PAGE, parse_document(THREE), Some(1), Some(2));
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].index(), 1);
        assert!(scenes[0].html().contains("two"));
    }

    #[test]
    fn test_range_is_clamped() {
        assert_eq!(compose_sections(PAGE, parse_document(THREE), Some(2), Some(99)).len(), 1);
        assert!(compose_sections(PAGE, parse_document(THREE), Some(5), None).is_empty());
        assert!(compose_sections(PAGE, parse_document(THREE), Some(2), Some(1)).is_empty());
    }

    #[test]
    fn test_no_sections_no_scenes() {
        let scenes = compose_sections(PAGE, parse_document("<div><section>nested</section></div>"), None, None);
        assert!(scenes.is_empty());
    }

    #[test]
    fn test_metadata_shared_and_absolutized() {
        let raw = r#"<head><style>.x { background-image: url(bg.png) }</style><meta name="author" content="a">
            </head><body><section><a href="/top.html" style="cursor: url(c.cur), auto">x</a></section><section>y</section></body>"#;
        let scenes = compose_sections(PAGE, parse_document(raw), None, None);
        assert_eq!(scenes.len(), 2);

        for scene in &scenes {
            let html = scene.html();
            assert!(html.contains(".x { background-image: url(https://ex.com/feed/bg.png); }"));
            assert!(html.contains(r#"content="a""#));
            assert!(html.contains(":host"));
        }
        assert!(scenes[0].html().contains(r#"href="https://ex.com/top.html""#));
        assert!(scenes[0].html().contains("cursor: url(https://ex.com/feed/c.cur), auto;"));
    }

    #[test]
    fn test_sanitized_pipeline_drops_scripts() {
        let raw = r#"<body><section>a<script>x()</script></section><section onclick="y()">b</section></body>"#;
        let document = DocumentSanitizer::for_address(raw, PAGE).unwrap().read();
        let scenes = compose_sections(PAGE, document, None, None);
        assert_eq!(scenes.len(), 2);
        for scene in &scenes {
            assert!(!scene.html().contains("<script"));
            assert!(!scene.html().contains("onclick"));
        }
    }

    #[test]
    fn test_scene_structure() {
        let scenes = compose_sections(PAGE, parse_document("<section>only</section>"), None, None);
        let html = scenes[0].html();
        assert!(html.starts_with(r#"<div class="scene" data-scene-index="0"><template shadowrootmode="open"><style>"#));
        assert!(html.contains(r#"data-suppress-gestures="wheel touchmove""#));
        assert_eq!(placeholders(html), 0);
    }

    #[test]
    fn test_section_style_stays_in_its_section() {
        let raw = r#"<head><style>h1 { color: red }</style></head><body>
            <section>one</section>
            <section><style>.local { color: blue }</style><p class="local">two</p></section></body>"#;
        let scenes = compose_sections(PAGE, parse_document(raw), None, None);
        assert_eq!(scenes.len(), 2);

        assert!(scenes[0].html().contains("h1 { color: red; }"));
        assert!(!scenes[0].html().contains(".local"));
        assert!(scenes[1].html().contains("h1 { color: red; }"));
        assert_eq!(scenes[1].html().matches(".local { color: blue; }").count(), 1);

        let section = scenes[1].html().find("<section>").unwrap();
        assert!(scenes[1].html().find(".local {").unwrap() > section);
    }

    #[test]
    fn test_split_closing_tag_in_style_stays_inert() {
        let raw = "<head><style>p{color:red}</sty/**/le><img src=x onerror=alert(1)></style></head>\
                   <body><section>a</section></body>";
        let document = DocumentSanitizer::for_address(raw, PAGE).unwrap().read();
        let scenes = compose_sections(PAGE, document, None, None);
        assert_eq!(scenes.len(), 1);

        let reparsed = Html::parse_fragment(scenes[0].html());
        for node in reparsed.tree.root().descendants() {
            let Some(element) = node.value().as_element() else {
                continue;
            };
            assert_ne!(element.name(), "img");
            assert!(element.attrs().all(|(name, _)| !name.starts_with("on")));
        }
    }

    #[test]
    fn test_namespaced_attributes_survive() {
        let raw = r##"<body><section><svg><use xlink:href="#icon"></use></svg></section></body>"##;
        let document = DocumentSanitizer::for_address(raw, PAGE).unwrap().read();
        let scenes = compose_sections(PAGE, document, None, None);
        assert!(scenes[0].html().contains("xlink:href="));
    }

    #[test]
    fn test_error_scene() {
        let scene = Scene::error();
        assert!(scene.html().contains("✕"));
        assert!(scene.html().contains("scene-error"));
    }
}
