use tracing::{debug, error, warn};
use url::Url;

use crate::address;
use crate::domain::{Fingerprint, Listing};
use crate::fetcher::fingerprint::{content_fingerprint, fingerprint_of};
use crate::fetcher::{RequestOptions, Transport, TransportResponse};

/// Media type every listing resource must declare.
pub const LISTING_MEDIA_TYPE: &str = "text/plain";

/// A validated listing together with the fingerprint of its revision.
#[derive(Debug, Clone)]
pub struct IndexDownload {
    pub listing: Listing,
    pub fingerprint: Fingerprint,
}

/// Downloads and parses the listing published at `address`.
pub async fn download_index(transport: &dyn Transport, address: &str) -> Option<IndexDownload> {
    if address::folder_of(address).is_none() {
        warn!(%address, "Feed address has no resolvable folder");
        return None;
    }

    let response = transport.request(address, RequestOptions::default()).await?;
    listing_from_response(address, &response)
}

/// Validates a fetched listing response and parses its body.
pub fn listing_from_response(address: &str, response: &TransportResponse) -> Option<IndexDownload> {
    let Some(folder) = address::folder_of(address) else {
        warn!(%address, "Feed address has no resolvable folder");
        return None;
    };

    let media_type = response.media_type();
    if media_type != LISTING_MEDIA_TYPE {
        error!(
            %address,
            expected = LISTING_MEDIA_TYPE,
            actual = %media_type,
            "Feed listing returned with an incorrect media type"
        );
        return None;
    }

    let listing = parse_listing(&response.body, &folder);
    let mut fingerprint = fingerprint_of(&response.headers);
    if fingerprint.is_empty() {
        fingerprint = content_fingerprint(listing.entries());
    }

    debug!(%address, entries = listing.len(), %fingerprint, "Parsed feed listing");
    Some(IndexDownload {
        listing,
        fingerprint,
    })
}

/// Parses a listing body relative to `folder`.
///
/// Blank lines and `#` comments are skipped, as are lines that do not
/// resolve to a valid address.
pub fn parse_listing(body: &str, folder: &Url) -> Listing {
    let entries = body
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let resolved = address::resolve(line, folder.as_str()).ok()?;
            address::try_parse(&resolved, None).map(String::from)
        })
        .collect();

    Listing::new(entries)
}
