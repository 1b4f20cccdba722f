//! Foreign document processing.
//!
//! ```text
//! raw HTML → DocumentReader (hooks) → DocumentSanitizer (policy) → compose_sections → Scene[]
//! ```
//!
//! Documents are parsed with `scraper` and mutated in place through the
//! underlying `ego_tree` arena.

pub mod css;
pub mod reader;
pub mod sanitizer;
pub mod scene;

pub use reader::{DocumentReader, ElementAction};
pub use sanitizer::DocumentSanitizer;
pub use scene::{compose_sections, Scene};

use ego_tree::{NodeId, Tree};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{Attribute, LocalName, Namespace, ParseOpts, QualName};
use scraper::node::{Element, Text};
use scraper::{Html, Node};
use tracing::{debug, warn};

use crate::fetcher::{RequestOptions, Transport};

const DOCUMENT_MEDIA_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Fetches, sanitizes and composes the document at `address`.
///
/// `None` when the page cannot be fetched or is not HTML.
pub async fn download_scenes(
    transport: &dyn Transport,
    address: &str,
    range_start: Option<usize>,
    range_end: Option<usize>,
) -> Option<Vec<Scene>> {
    let base = crate::address::folder_of(address)?;
    let response = transport.request(address, RequestOptions::default()).await?;

    let media_type = response.media_type();
    if !DOCUMENT_MEDIA_TYPES.contains(&media_type.as_str()) {
        warn!(%address, actual = %media_type, "Feed document is not HTML");
        return None;
    }

    let document = DocumentSanitizer::new(response.body, base).read();
    let scenes = compose_sections(address, document, range_start, range_end);
    debug!(%address, scenes = scenes.len(), "Composed feed document");
    Some(scenes)
}

pub(crate) const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parses a complete document with scripting disabled, so the content of
/// `noscript` is built as elements rather than raw text.
pub fn parse_document(raw: &str) -> Html {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    html5ever::driver::parse_document(Html::new_document(), opts).one(raw)
}

pub(crate) fn html_name(tag: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag))
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}

/// Builds a new HTML element.
pub fn new_element(tag: &str, attributes: &[(&str, &str)]) -> Element {
    Element::new(
        html_name(tag),
        attributes.iter().map(|(n, v)| attribute(n, v)).collect(),
    )
}

/// Rebuilds an element with the same name and a new attribute list.
///
/// Attribute names keep their namespace and prefix, so `xlink:href` stays
/// qualified.
pub(crate) fn rebuild_element(name: QualName, attributes: impl IntoIterator<Item = (QualName, String)>) -> Element {
    Element::new(
        name,
        attributes
            .into_iter()
            .map(|(name, value)| Attribute {
                name,
                value: StrTendril::from(value),
            })
            .collect(),
    )
}

/// Whether `name` is the plain, unnamespaced attribute `local`.
pub(crate) fn is_plain_attribute(name: &QualName, local: &str) -> bool {
    &*name.local == local && name.ns.is_empty()
}

pub(crate) fn text_node(text: &str) -> Node {
    Node::Text(Text {
        text: StrTendril::from(text),
    })
}

pub(crate) fn is_html_element(element: &Element, tag: &str) -> bool {
    element.name() == tag && &*element.name.ns == HTML_NAMESPACE
}

/// Ids of every element in the subtree rooted at `root`, in document order.
pub(crate) fn element_ids(tree: &Tree<Node>, root: NodeId) -> Vec<NodeId> {
    tree.get(root)
        .map(|node| {
            node.descendants()
                .filter(|n| n.value().is_element())
                .map(|n| n.id())
                .collect()
        })
        .unwrap_or_default()
}

/// Concatenated text of the direct text children of `id`.
pub(crate) fn child_text(tree: &Tree<Node>, id: NodeId) -> String {
    tree.get(id)
        .map(|node| {
            node.children()
                .filter_map(|c| c.value().as_text().map(|t| t.text.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Replaces every child of `id` with a single text node.
pub(crate) fn replace_text(tree: &mut Tree<Node>, id: NodeId, text: &str) {
    let children: Vec<NodeId> = tree
        .get(id)
        .map(|node| node.children().map(|c| c.id()).collect())
        .unwrap_or_default();
    for child in children {
        if let Some(mut child) = tree.get_mut(child) {
            child.detach();
        }
    }
    if let Some(mut node) = tree.get_mut(id) {
        node.append(text_node(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticTransport;

    const PAGE: &str = "https://ex.com/feed/post.html";

    #[tokio::test]
    async fn test_download_scenes() {
        let transport = StaticTransport::new().get(
            PAGE,
            &[("content-type", "text/html; charset=utf-8")],
            "<section><img src=a.png></section><section>b<script>x()</script></section>",
        );
        let scenes = download_scenes(&transport, PAGE, None, None).await.unwrap();
        assert_eq!(scenes.len(), 2);
        assert!(scenes[0].html().contains(r#"src="https://ex.com/feed/a.png""#));
        assert!(!scenes[1].html().contains("<script"));
    }

    #[test]
    fn test_download_scenes_rejects_other_media() {
        let transport = StaticTransport::new().get(PAGE, &[("content-type", "text/plain")], "<section></section>");
        assert!(tokio_test::block_on(download_scenes(&transport, PAGE, None, None)).is_none());
        assert!(tokio_test::block_on(download_scenes(&StaticTransport::new(), PAGE, None, None)).is_none());
    }

    #[test]
    fn test_parse_keeps_noscript_elements() {
        let document = parse_document("<p>x</p><noscript><b>y</b></noscript>");
        assert!(document.html().contains("<noscript><b>y</b></noscript>"));
    }
}
