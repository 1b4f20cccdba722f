//! Fixed sanitization policy for untrusted feed documents.
//!
//! Executable and embedding elements are dropped, inline event handlers are
//! stripped, and relative references are made absolute against the feed
//! folder. Anything that cannot be resolved is dropped rather than kept.

use scraper::node::Element;
use scraper::Html;
use url::Url;

use crate::address;
use crate::document::css;
use crate::document::reader::{DocumentReader, ElementAction};
use crate::document::{html_name, rebuild_element};

const DROPPED_ELEMENTS: &[&str] = &["frame", "frameset", "script", "iframe", "portal", "fencedframe"];

/// Style properties whose first `url(...)` is made absolute.
pub const URL_PROPERTIES: &[&str] = &[
    "background",
    "background-image",
    "border-image",
    "border-image-source",
    "list-style",
    "list-style-image",
    "mask",
    "mask-image",
    "-webkit-mask",
    "-webkit-mask-image",
    "content",
];

const SCRIPT_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

pub struct DocumentSanitizer {
    raw: String,
    base: Url,
}

impl DocumentSanitizer {
    pub fn new(raw: impl Into<String>, base: Url) -> Self {
        Self {
            raw: raw.into(),
            base,
        }
    }

    /// Uses the folder of `address` as base. `None` when it has no folder.
    pub fn for_address(raw: impl Into<String>, address: &str) -> Option<Self> {
        address::folder_of(address).map(|base| Self::new(raw, base))
    }

    pub fn read(self) -> Html {
        let Self { raw, base } = self;
        let base = &base;

        DocumentReader::new(raw)
            .trap_element(sanitize_element)
            .trap_attribute(move |name, value, element| sanitize_attribute(name, value, element, base))
            .trap_property(move |name, value| sanitize_property(name, value, base))
            .read()
    }
}

pub fn sanitize_element(element: &Element) -> ElementAction {
    let name = element.name();
    if DROPPED_ELEMENTS.contains(&name) {
        return ElementAction::Remove;
    }
    if name == "noscript" {
        let attributes = element.attrs.iter().map(|(name, value)| (name.clone(), value.to_string()));
        return ElementAction::Replace(rebuild_element(html_name("div"), attributes));
    }
    ElementAction::Keep
}

pub fn sanitize_attribute(name: &str, value: &str, element: &Element, base: &Url) -> Option<String> {
    let name = name.to_ascii_lowercase();
    if name.starts_with("on") {
        return None;
    }

    let tag = element.name();
    match (tag, name.as_str()) {
        (_, "srcset") => resolve_source_set(value, base),
        (_, "href" | "src") | ("embed", "source") | ("video", "poster") | ("object", "data") | ("form", "action") => {
            resolve_plain_address(value, base)
        }
        _ => Some(value.to_string()),
    }
}

/// An empty result removes the property.
pub fn sanitize_property(name: &str, value: &str, base: &Url) -> String {
    if !URL_PROPERTIES.contains(&name) {
        return value.to_string();
    }
    css::rewrite_first_url(value, |address| resolve_plain_address(address, base)).unwrap_or_default()
}

/// Makes a relative address absolute.
///
/// Values with a scheme, `data:` values and root-relative paths are kept as
/// written. Script addresses are rejected, including ones hidden behind the
/// tabs, newlines and control characters that URL parsing discards.
pub fn resolve_plain_address(value: &str, base: &Url) -> Option<String> {
    let cleaned: String = value.chars().filter(|c| !matches!(c, '\t' | '\n' | '\r')).collect();
    let cleaned = cleaned.trim_matches(|c: char| c <= ' ');
    if is_script_address(cleaned) {
        return None;
    }
    if cleaned.starts_with("data:") || address::has_scheme(cleaned) || cleaned.starts_with('/') {
        return Some(cleaned.to_string());
    }

    let resolved = address::resolve(cleaned, base.as_str()).ok()?;
    if is_script_address(&resolved) {
        return None;
    }
    Some(resolved)
}

fn is_script_address(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    SCRIPT_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme))
}

/// Resolves every address of a `srcset` list. Commas inside addresses are
/// not supported.
pub fn resolve_source_set(value: &str, base: &Url) -> Option<String> {
    let mut candidates = Vec::new();
    for candidate in value.split(',') {
        let mut parts = candidate.split_whitespace();
        let Some(address) = parts.next() else {
            continue;
        };
        let mut resolved = vec![resolve_plain_address(address, base)?];
        resolved.extend(parts.map(String::from));
        candidates.push(resolved.join(" "));
    }
    Some(candidates.join(", "))
}
