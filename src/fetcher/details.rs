use tracing::debug;
use url::Url;

use crate::address;
use crate::document::{DocumentReader, ElementAction};
use crate::domain::FeedDetail;
use crate::fetcher::{RequestOptions, Transport};

/// Parent folders scanned for metadata when none is configured.
pub const DEFAULT_MAX_UPSCAN: usize = 8;

/// Reads the descriptive metadata of the feed at `address`.
///
/// The feed folder's root document is read first. When it carries no
/// author, description or icon, parent folders are tried in turn, up to
/// `max_upscan` of them, stopping at the domain root. `None` when no
/// document in the scan could be fetched at all.
pub async fn download_details(
    transport: &dyn Transport,
    address: &str,
    max_upscan: usize,
) -> Option<FeedDetail> {
    let mut folder = address::folder_of(address)?;
    let mut fetched: Option<FeedDetail> = None;

    for _ in 0..=max_upscan {
        if let Some(response) = transport
            .request(folder.as_str(), RequestOptions::default().quiet())
            .await
        {
            let mut detail = extract_details(&response.body);
            detail.date = response.header("last-modified").to_string();
            if !detail.is_empty() {
                debug!(%address, folder = %folder, "Found feed details");
                return Some(detail);
            }
            fetched.get_or_insert(detail);
        }

        match parent_folder(&folder) {
            Some(parent) => folder = parent,
            None => break,
        }
    }

    fetched
}

/// Extracts the description, author and icon from a root document.
pub fn extract_details(raw: &str) -> FeedDetail {
    let mut detail = FeedDetail::default();

    DocumentReader::new(raw)
        .trap_element(|element| {
            let attr = |name: &str| element.attr(name).unwrap_or("").to_string();
            match element.name() {
                "meta" => match attr("name").to_ascii_lowercase().as_str() {
                    "description" => detail.description = attr("content"),
                    "author" => detail.author = attr("content"),
                    _ => {}
                },
                "link" if attr("rel").eq_ignore_ascii_case("icon") => detail.icon = attr("href"),
                _ => {}
            }
            ElementAction::Keep
        })
        .read();

    detail
}

fn parent_folder(folder: &Url) -> Option<Url> {
    let parent = folder.join("..").ok()?;
    (parent != *folder).then_some(parent)
}
