//! Address parsing, normalization and resolution.
//!
//! Every listing entry is resolved against the *folder* of the listing's own
//! address, so `https://ex.com/feed/index.txt` and `https://ex.com/feed/`
//! both act as the base `https://ex.com/feed/`.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::app::{HtmlFeedError, Result};

static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme regex"));

static FILE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.[a-z0-9]+$").expect("extension regex"));

const FOLLOW_URI_PREFIX: &str = "html://follow?";
const MAX_FOLLOW_URI_LEN: usize = 2048;

/// Parses `address`, optionally relative to `base`.
pub fn try_parse(address: &str, base: Option<&Url>) -> Option<Url> {
    match base {
        Some(base) => base.join(address).ok(),
        None => Url::parse(address).ok(),
    }
}

/// Returns true when `reference` starts with a scheme such as `https:` or `data:`.
pub fn has_scheme(reference: &str) -> bool {
    SCHEME_PREFIX.is_match(reference)
}

/// Returns the containing folder of `address`, always ending in `/`.
///
/// The last path segment is treated as a file name and dropped only when it
/// carries an extension; `https://ex.com/feed` is already a folder.
pub fn folder_of(address: &str) -> Option<Url> {
    let url = Url::parse(address).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }

    let mut parts: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    if parts.last().is_some_and(|last| FILE_EXTENSION.is_match(last)) {
        parts.pop();
    }

    let path = if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", parts.join("/"))
    };

    let mut folder = url.clone();
    folder.set_path(&path);
    folder.set_query(None);
    folder.set_fragment(None);
    let _ = folder.set_username("");
    let _ = folder.set_password(None);
    Some(folder)
}

/// Resolves `reference` against `base`.
///
/// References that already carry a scheme are returned unchanged. A trailing
/// slash is appended to `base` before joining so that a folder given without
/// one is not mistaken for a file.
pub fn resolve(reference: &str, base: &str) -> Result<String> {
    if has_scheme(reference) {
        return Ok(reference.to_string());
    }

    let base: Cow<'_, str> = if base.ends_with('/') {
        Cow::Borrowed(base)
    } else {
        Cow::Owned(format!("{}/", base))
    };

    Url::parse(&base)
        .and_then(|b| b.join(reference))
        .map(String::from)
        .map_err(|e| HtmlFeedError::InvalidAddress(format!("{} (base {}): {}", reference, base, e)))
}

/// Extracts the feed address from an `html://follow?<address>` URI.
pub fn parse_follow_uri(uri: &str) -> Option<String> {
    let payload = uri.trim().strip_prefix(FOLLOW_URI_PREFIX)?;
    if payload.len() > MAX_FOLLOW_URI_LEN {
        return None;
    }
    Url::parse(payload).ok().map(String::from)
}
