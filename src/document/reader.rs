use ego_tree::NodeId;
use html5ever::QualName;
use scraper::node::Element;
use scraper::{Html, Node};

use crate::document::css::{self, PropertyHook};
use crate::document::{
    child_text, element_ids, is_html_element, is_plain_attribute, parse_document, rebuild_element, replace_text,
};

/// What the element hook decides for one element.
#[derive(Debug, Clone)]
pub enum ElementAction {
    Keep,
    /// Removed with its subtree once the walk has finished.
    Remove,
    /// Takes the element's position and adopts its children.
    Replace(Element),
}

type ElementHook<'a> = Box<dyn FnMut(&Element) -> ElementAction + 'a>;
type AttributeHook<'a> = Box<dyn FnMut(&str, &str, &Element) -> Option<String> + 'a>;

/// Single-pass, hook-driven walk over a foreign document.
///
/// Every element is visited once in document order, including elements that
/// are scheduled for removal. `read` consumes the reader, so a document can
/// only be walked once.
pub struct DocumentReader<'a> {
    raw: String,
    element_hook: ElementHook<'a>,
    attribute_hook: AttributeHook<'a>,
    property_hook: Box<PropertyHook<'a>>,
}

impl<'a> DocumentReader<'a> {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            element_hook: Box::new(|_| ElementAction::Keep),
            attribute_hook: Box::new(|_, value, _| Some(value.to_string())),
            property_hook: Box::new(|_, value| value.to_string()),
        }
    }

    pub fn trap_element(mut self, hook: impl FnMut(&Element) -> ElementAction + 'a) -> Self {
        self.element_hook = Box::new(hook);
        self
    }

    /// Returning `None` removes the attribute.
    pub fn trap_attribute(
        mut self,
        hook: impl FnMut(&str, &str, &Element) -> Option<String> + 'a,
    ) -> Self {
        self.attribute_hook = Box::new(hook);
        self
    }

    /// Applies to inline `style` declarations and to `<style>` sheets.
    pub fn trap_property(mut self, hook: impl FnMut(&str, &str) -> String + 'a) -> Self {
        self.property_hook = Box::new(hook);
        self
    }

    pub fn read(mut self) -> Html {
        let mut document = parse_document(&self.raw);
        let root = document.tree.root().id();
        let mut trash: Vec<NodeId> = Vec::new();

        for id in element_ids(&document.tree, root) {
            let Some(original) = document.tree.get(id).and_then(|n| n.value().as_element()).cloned() else {
                continue;
            };

            let element = match (self.element_hook)(&original) {
                ElementAction::Keep => original,
                ElementAction::Remove => {
                    trash.push(id);
                    continue;
                }
                ElementAction::Replace(replacement) => replacement,
            };

            let is_style = is_html_element(&element, "style");
            let element = self.rewrite_attributes(&element);
            if let Some(mut node) = document.tree.get_mut(id) {
                *node.value() = Node::Element(element);
            }

            if is_style {
                let sheet = child_text(&document.tree, id);
                let sheet = css::rewrite_sheet(&sheet, &mut *self.property_hook);
                replace_text(&mut document.tree, id, &sheet);
            }
        }

        for id in trash {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
        document
    }

    fn rewrite_attributes(&mut self, element: &Element) -> Element {
        let mut attributes: Vec<(QualName, String)> = Vec::new();
        for (name, value) in element.attrs.iter() {
            if let Some(value) = (self.attribute_hook)(&*name.local, &**value, element) {
                attributes.push((name.clone(), value));
            }
        }

        if let Some((_, style)) = attributes.iter_mut().find(|(name, _)| is_plain_attribute(name, "style")) {
            let rewritten = css::rewrite_declarations(style, &mut *self.property_hook);
            *style = rewritten;
        }

        rebuild_element(element.name.clone(), attributes)
    }
}
