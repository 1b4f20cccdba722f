use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::Feed;
use crate::fetcher::fingerprint::ping;
use crate::fetcher::Transport;

pub const DEFAULT_WORKERS: usize = 10;

type Cursor = Arc<tokio::sync::Mutex<Option<BoxStream<'static, Feed>>>>;

struct Sweep {
    generation: u64,
    cancel: CancellationToken,
    cursor: Cursor,
}

/// Finds feeds whose remote fingerprint differs from the stored one.
///
/// A sweep runs a fixed number of workers over one shared stream of feeds,
/// so each feed is probed exactly once. Only one sweep is active at a time.
pub struct ChangePoller {
    transport: Arc<dyn Transport>,
    workers: usize,
    sweep: Mutex<Option<Sweep>>,
    generations: AtomicU64,
}

impl ChangePoller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_workers(transport, DEFAULT_WORKERS)
    }

    pub fn with_workers(transport: Arc<dyn Transport>, workers: usize) -> Self {
        Self {
            transport,
            workers: workers.max(1),
            sweep: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Probes every feed from `feeds` and returns those that changed.
    ///
    /// Feeds that cannot be reached are left out. Starting a sweep stops the
    /// previous one.
    pub async fn sweep(&self, feeds: BoxStream<'static, Feed>) -> Vec<Feed> {
        self.stop();

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let cursor: Cursor = Arc::new(tokio::sync::Mutex::new(Some(feeds)));
        if let Ok(mut sweep) = self.sweep.lock() {
            *sweep = Some(Sweep {
                generation,
                cancel: cancel.clone(),
                cursor: cursor.clone(),
            });
        }

        let modified: Arc<Mutex<Vec<Feed>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::with_capacity(self.workers);

        for _ in 0..self.workers {
            let transport = self.transport.clone();
            let cursor = cursor.clone();
            let cancel = cancel.clone();
            let modified = modified.clone();

            handles.push(tokio::spawn(async move {
                run_worker(transport, cursor, cancel, modified).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Poller worker join error: {}", e);
            }
        }

        self.finish(generation);

        let modified = match Arc::try_unwrap(modified) {
            Ok(list) => list.into_inner().unwrap_or_else(|e| e.into_inner()),
            Err(shared) => shared.lock().map(|list| list.clone()).unwrap_or_default(),
        };
        info!(modified = modified.len(), "Change sweep finished");
        modified
    }

    /// Cancels in-flight probes and abandons the remaining feeds.
    pub fn stop(&self) {
        let Ok(mut sweep) = self.sweep.lock() else {
            return;
        };
        if let Some(sweep) = sweep.take() {
            debug!("Stopping change sweep");
            sweep.cancel.cancel();
            if let Ok(mut cursor) = sweep.cursor.try_lock() {
                *cursor = None;
            }
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.sweep.lock().map(|sweep| sweep.is_some()).unwrap_or(false)
    }

    /// Clears the active sweep unless a newer one has replaced it.
    fn finish(&self, generation: u64) {
        if let Ok(mut sweep) = self.sweep.lock() {
            if sweep.as_ref().is_some_and(|s| s.generation == generation) {
                *sweep = None;
            }
        }
    }
}

async fn run_worker(
    transport: Arc<dyn Transport>,
    cursor: Cursor,
    cancel: CancellationToken,
    modified: Arc<Mutex<Vec<Feed>>>,
) {
    loop {
        let next = {
            let mut guard = cursor.lock().await;
            match guard.as_mut() {
                Some(stream) if !cancel.is_cancelled() => stream.next().await,
                _ => None,
            }
        };
        let Some(feed) = next else {
            break;
        };

        let probe = cancel.child_token();
        match ping(transport.as_ref(), &feed.url, Some(probe)).await {
            Some(fingerprint) if fingerprint != feed.fingerprint => {
                debug!(url = %feed.url, %fingerprint, "Feed changed");
                if let Ok(mut list) = modified.lock() {
                    list.push(feed);
                }
            }
            Some(_) => {}
            None => debug!(url = %feed.url, "Feed unreachable, skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use reqwest::header::HeaderMap;

    use crate::domain::Fingerprint;
    use crate::fetcher::fingerprint::fingerprint_of;
    use crate::fetcher::testing::StaticTransport;
    use crate::fetcher::{RequestOptions, TransportResponse};

    fn feed(url: &str, fingerprint: Fingerprint) -> Feed {
        let mut feed = Feed::new(url.to_string());
        feed.fingerprint = fingerprint;
        feed
    }

    fn etag(value: &str) -> Fingerprint {
        let mut headers = HeaderMap::new();
        headers.insert("etag", value.parse().unwrap());
        fingerprint_of(&headers)
    }

    /// Never answers until the request is cancelled.
    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn request(&self, _address: &str, options: RequestOptions) -> Option<TransportResponse> {
            if let Some(cancel) = options.cancel {
                cancel.cancelled().await;
            }
            None
        }
    }

    #[tokio::test]
    async fn test_sweep_reports_only_changed_feeds() {
        let transport = Arc::new(
            StaticTransport::new()
                .head("https://ex.com/same/index.txt", &[("etag", "\"v1\"")])
                .head("https://ex.com/changed/index.txt", &[("etag", "\"v2\"")]),
        );
        let poller = ChangePoller::with_workers(transport, 3);

        let feeds = vec![
            feed("https://ex.com/same/index.txt", etag("\"v1\"")),
            feed("https://ex.com/changed/index.txt", etag("\"v1\"")),
            feed("https://ex.com/gone/index.txt", etag("\"v1\"")),
        ];
        let modified = poller.sweep(stream::iter(feeds).boxed()).await;

        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].url, "https://ex.com/changed/index.txt");
        assert!(!poller.is_fetching());
    }

    #[tokio::test]
    async fn test_sweep_probes_each_feed_once() {
        let mut transport = StaticTransport::new();
        let mut feeds = Vec::new();
        for i in 0..25 {
            let url = format!("https://ex.com/{}/index.txt", i);
            transport = transport.head(&url, &[("etag", "\"new\"")]);
            feeds.push(feed(&url, Fingerprint::default()));
        }
        let transport = Arc::new(transport);
        let poller = ChangePoller::with_workers(transport.clone(), 4);

        let modified = poller.sweep(stream::iter(feeds).boxed()).await;
        assert_eq!(modified.len(), 25);

        let mut urls: Vec<String> = transport.requests().into_iter().map(|(_, url)| url).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 25);
        assert_eq!(transport.requests().len(), 25);
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let poller = ChangePoller::new(Arc::new(StaticTransport::new()));
        assert!(poller.sweep(stream::empty().boxed()).await.is_empty());
        assert_eq!(poller.workers(), DEFAULT_WORKERS);
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_probes() {
        let poller = Arc::new(ChangePoller::with_workers(Arc::new(HangingTransport), 2));
        let feeds: Vec<Feed> = (0..10)
            .map(|i| feed(&format!("https://ex.com/{}/index.txt", i), Fingerprint::default()))
            .collect();

        let running = poller.clone();
        let sweep = tokio::spawn(async move { running.sweep(stream::iter(feeds).boxed()).await });

        while !poller.is_fetching() {
            tokio::task::yield_now().await;
        }
        poller.stop();
        assert!(!poller.is_fetching());

        let modified = sweep.await.unwrap();
        assert!(modified.is_empty());
    }
}
