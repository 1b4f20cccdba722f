use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::app::{HtmlFeedError, Result};
use crate::domain::{Feed, FeedUpdate, Post};
use crate::fetcher::details::{download_details, DEFAULT_MAX_UPSCAN};
use crate::fetcher::index::download_index;
use crate::fetcher::poller::DEFAULT_WORKERS;
use crate::fetcher::Transport;
use crate::store::{diff_and_persist, Store};

/// Re-reads modified feeds and records their new posts.
pub struct Refresher {
    transport: Arc<dyn Transport>,
    semaphore: Arc<Semaphore>,
    max_upscan: usize,
}

impl Refresher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_workers(transport, DEFAULT_WORKERS, DEFAULT_MAX_UPSCAN)
    }

    pub fn with_workers(transport: Arc<dyn Transport>, workers: usize, max_upscan: usize) -> Self {
        Self {
            transport,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            max_upscan,
        }
    }

    /// Refreshes every feed, returning the number of new posts per feed id.
    ///
    /// A failing feed is logged and reported in its slot. It never stops the
    /// others.
    pub async fn refresh_all<S: Store + Send + Sync + 'static>(
        &self,
        feeds: Vec<Feed>,
        store: Arc<S>,
    ) -> Vec<(i64, Result<usize>)> {
        let mut handles = Vec::new();

        for feed in feeds {
            let transport = self.transport.clone();
            let semaphore = self.semaphore.clone();
            let store = store.clone();
            let max_upscan = self.max_upscan;

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (feed.id, Err(HtmlFeedError::Other("Refresher closed".into()))),
                };

                let result = refresh_feed(transport.as_ref(), store.as_ref(), &feed, max_upscan).await;
                if let Err(e) = &result {
                    warn!(url = %feed.url, "Feed refresh failed: {}", e);
                }
                (feed.id, result)
            });

            handles.push(handle);
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Task join error: {}", e);
                }
            }
        }

        results
    }
}

/// Downloads the listing and details of `feed`, diffs the listing against
/// the stored one and records a post for every new entry.
pub async fn refresh_feed<S: Store + ?Sized>(
    transport: &dyn Transport,
    store: &S,
    feed: &Feed,
    max_upscan: usize,
) -> Result<usize> {
    let (index, details) = tokio::join!(
        download_index(transport, &feed.url),
        download_details(transport, &feed.url, max_upscan)
    );

    let index = index.ok_or_else(|| HtmlFeedError::InvalidContent(format!("No usable listing at {}", feed.url)))?;
    let diff = diff_and_persist(store, feed.id, &index.listing)?;

    let posts: Vec<Post> = diff
        .added
        .iter()
        .map(|entry| Post::from_entry(feed.id, &feed.url, entry))
        .collect();
    let new_count = store.add_posts(&posts)?;

    let mut update = FeedUpdate::default();
    if let Some(detail) = &details {
        update = update.with_detail(detail);
    } else {
        debug!(url = %feed.url, "No feed details available");
    }
    update.fingerprint = Some(index.fingerprint);
    update.length = Some(index.listing.len());
    update.last_fetched_at = Some(Utc::now());
    store.update_feed(feed.id, &update)?;

    info!(
        url = %feed.url,
        added = new_count,
        removed = diff.removed.len(),
        "Refreshed feed"
    );
    Ok(new_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticTransport;
    use crate::store::SqliteStore;

    const FEED: &str = "https://ex.com/feed/index.txt";

    fn transport(listing: &str) -> StaticTransport {
        StaticTransport::new()
            .get(FEED, &[("content-type", "text/plain"), ("etag", "\"1\"")], listing)
            .get(
                "https://ex.com/feed/",
                &[("content-type", "text/html")],
                r#"<meta name="author" content="Ada"><link rel="icon" href="i.png">"#,
            )
    }

    fn stored_feed(store: &SqliteStore) -> Feed {
        let id = store.add_feed(&Feed::new(FEED.into())).unwrap();
        store.get_feed(id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_refresh_feed_records_new_posts() {
        let store = SqliteStore::in_memory().unwrap();
        let feed = stored_feed(&store);

        let added = refresh_feed(&transport("a.html\nb.html"), &store, &feed, 2).await.unwrap();
        assert_eq!(added, 2);

        let posts = store.get_posts_by_feed(feed.id).unwrap();
        let mut paths: Vec<&str> = posts.iter().map(|p| p.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, ["a.html", "b.html"]);

        let updated = store.get_feed(feed.id).unwrap().unwrap();
        assert_eq!(updated.author, "Ada");
        assert_eq!(updated.icon_url().as_deref(), Some("https://ex.com/feed/i.png"));
        assert_eq!(updated.length, 2);
        assert!(!updated.fingerprint.is_empty());
        assert!(updated.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_feed_only_adds_new_entries() {
        let store = SqliteStore::in_memory().unwrap();
        let feed = stored_feed(&store);

        refresh_feed(&transport("a.html"), &store, &feed, 0).await.unwrap();
        let added = refresh_feed(&transport("a.html\nc.html"), &store, &feed, 0).await.unwrap();
        assert_eq!(added, 1);
        assert_eq!(store.get_posts_by_feed(feed.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_feed_without_listing_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let feed = stored_feed(&store);

        let result = refresh_feed(&StaticTransport::new(), &store, &feed, 0).await;
        assert!(matches!(result, Err(HtmlFeedError::InvalidContent(_))));
        assert!(store.read_listing(feed.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_all_isolates_failures() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let good = stored_feed(&store);
        let bad_id = store.add_feed(&Feed::new("https://gone.com/index.txt".into())).unwrap();
        let bad = store.get_feed(bad_id).unwrap().unwrap();

        let refresher = Refresher::with_workers(Arc::new(transport("a.html")), 2, 0);
        let mut results = refresher.refresh_all(vec![good.clone(), bad], store.clone()).await;
        results.sort_by_key(|(id, _)| *id);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, good.id);
        assert_eq!(*results[0].1.as_ref().unwrap(), 1);
        assert!(results[1].1.is_err());
    }
}
