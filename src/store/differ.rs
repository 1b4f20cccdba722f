use std::collections::HashSet;

use tracing::debug;

use crate::app::Result;
use crate::domain::{Listing, ListingDiff};
use crate::store::Store;

/// Compares `listing` with the one persisted for `feed_id`, then replaces
/// the persisted listing with it.
///
/// With nothing persisted yet, every entry counts as added. Both sides of
/// the result keep source order.
pub fn diff_and_persist<S: Store + ?Sized>(store: &S, feed_id: i64, listing: &Listing) -> Result<ListingDiff> {
    let previous = store.read_listing(feed_id)?.unwrap_or_default();
    let diff = diff_listings(&previous, listing);

    store.write_listing(feed_id, listing)?;
    debug!(
        feed_id,
        added = diff.added.len(),
        removed = diff.removed.len(),
        "Stored new listing"
    );
    Ok(diff)
}

/// Entries of `current` missing from `previous`, and the reverse.
pub fn diff_listings(previous: &Listing, current: &Listing) -> ListingDiff {
    let before: HashSet<&str> = previous.iter().map(String::as_str).collect();
    let after: HashSet<&str> = current.iter().map(String::as_str).collect();

    ListingDiff {
        added: current
            .iter()
            .filter(|entry| !before.contains(entry.as_str()))
            .cloned()
            .collect(),
        removed: previous
            .iter()
            .filter(|entry| !after.contains(entry.as_str()))
            .cloned()
            .collect(),
    }
}
