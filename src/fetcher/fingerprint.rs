use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG, LAST_MODIFIED};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::Fingerprint;
use crate::fetcher::index;
use crate::fetcher::{RequestOptions, Transport};

/// Number of hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 16;

fn digest(input: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    Fingerprint::new(hex)
}

/// Derives a fingerprint from the cache-relevant response headers.
///
/// `ETag`, `Last-Modified` and `Content-Length` are concatenated in that order
/// with missing values contributing nothing. The result is empty only when
/// all three are absent.
pub fn fingerprint_of(headers: &HeaderMap) -> Fingerprint {
    let values: Vec<&str> = [ETAG, LAST_MODIFIED, CONTENT_LENGTH]
        .iter()
        .map(|name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
        })
        .collect();

    if values.iter().all(|v| v.is_empty()) {
        return Fingerprint::default();
    }
    digest(&values.concat())
}

/// Derives a fingerprint from the listing entries themselves.
pub fn content_fingerprint(entries: &[String]) -> Fingerprint {
    digest(&entries.join("\n"))
}

/// Probes `address` for its current fingerprint.
///
/// A quiet HEAD request is tried first. When the server sends none of the
/// cache headers, the listing is downloaded and fingerprinted by content so
/// the value stays comparable with the one from [`index::download_index`].
pub async fn ping(
    transport: &dyn Transport,
    address: &str,
    cancel: Option<CancellationToken>,
) -> Option<Fingerprint> {
    let response = transport
        .request(address, RequestOptions::head().quiet().with_cancel(cancel.clone()))
        .await?;

    let fingerprint = fingerprint_of(&response.headers);
    if !fingerprint.is_empty() {
        return Some(fingerprint);
    }

    debug!(%address, "No cache headers on probe, fingerprinting listing content");
    let response = transport
        .request(address, RequestOptions::default().quiet().with_cancel(cancel))
        .await?;
    index::listing_from_response(address, &response).map(|download| download.fingerprint)
}
