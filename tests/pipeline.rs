use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use htmlfeed::document::{download_scenes, Scene};
use htmlfeed::domain::Feed;
use htmlfeed::fetcher::poller::ChangePoller;
use htmlfeed::fetcher::refresher::Refresher;
use htmlfeed::fetcher::{RequestOptions, Transport, TransportResponse};
use htmlfeed::store::{SqliteStore, Store};

const FEED: &str = "https://site.test/blog/index.txt";

/// A mutable in-memory web.
#[derive(Default)]
struct FakeWeb {
    pages: Mutex<HashMap<String, (Vec<(&'static str, String)>, String)>>,
}

impl FakeWeb {
    fn publish(&self, address: &str, headers: &[(&'static str, &str)], body: &str) {
        let headers = headers.iter().map(|(n, v)| (*n, v.to_string())).collect();
        self.pages
            .lock()
            .unwrap()
            .insert(address.to_string(), (headers, body.to_string()));
    }

    fn publish_listing(&self, version: &str, body: &str) {
        self.publish(
            FEED,
            &[("content-type", "text/plain"), ("etag", version)],
            body,
        );
    }
}

#[async_trait]
impl Transport for FakeWeb {
    async fn request(&self, address: &str, options: RequestOptions) -> Option<TransportResponse> {
        let pages = self.pages.lock().unwrap();
        let (headers, body) = pages.get(address)?;

        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_static(*name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let body = if options.method == Method::HEAD {
            String::new()
        } else {
            body.clone()
        };
        Some(TransportResponse {
            status: StatusCode::OK,
            headers: map,
            body,
        })
    }
}

#[tokio::test]
async fn test_sweep_then_refresh_records_only_new_posts() {
    let web = Arc::new(FakeWeb::default());
    web.publish_listing("\"v1\"", "first.html\nsecond.html");
    web.publish(
        "https://site.test/blog/",
        &[("content-type", "text/html")],
        r#"<meta name="description" content="A blog">"#,
    );

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let id = store.add_feed(&Feed::new(FEED.into())).unwrap();

    let poller = ChangePoller::with_workers(web.clone(), 2);
    let refresher = Refresher::with_workers(web.clone(), 2, 1);

    // A new feed has no fingerprint, so it is always modified.
    let feeds = store.get_all_feeds().unwrap();
    let modified = poller.sweep(stream::iter(feeds).boxed()).await;
    assert_eq!(modified.len(), 1);
    let results = refresher.refresh_all(modified, store.clone()).await;
    assert_eq!(*results[0].1.as_ref().unwrap(), 2);

    let feed = store.get_feed(id).unwrap().unwrap();
    assert_eq!(feed.description, "A blog");

    // Unchanged fingerprint: nothing to refresh.
    let modified = poller
        .sweep(stream::iter(store.get_all_feeds().unwrap()).boxed())
        .await;
    assert!(modified.is_empty());

    // A new revision adds one post and drops one entry.
    web.publish_listing("\"v2\"", "second.html\nthird.html");
    let modified = poller
        .sweep(stream::iter(store.get_all_feeds().unwrap()).boxed())
        .await;
    assert_eq!(modified.len(), 1);
    let results = refresher.refresh_all(modified, store.clone()).await;
    assert_eq!(*results[0].1.as_ref().unwrap(), 1);

    let mut paths: Vec<String> = store
        .get_posts_by_feed(id)
        .unwrap()
        .into_iter()
        .map(|p| p.path)
        .collect();
    paths.sort();
    assert_eq!(paths, ["first.html", "second.html", "third.html"]);
    assert_eq!(
        store.read_listing(id).unwrap().unwrap().entries(),
        [
            "https://site.test/blog/second.html",
            "https://site.test/blog/third.html"
        ]
    );
}

#[tokio::test]
async fn test_post_document_becomes_isolated_scenes() {
    let web = FakeWeb::default();
    web.publish(
        "https://site.test/blog/first.html",
        &[("content-type", "text/html; charset=utf-8")],
        r#"<!DOCTYPE html>
        <html><head><link rel="stylesheet" href="style.css"><script src="x.js"></script></head>
        <body>
          <section><h1 onclick="steal()">Hello</h1><img srcset="a.png 1x, b.png 2x"></section>
          <section style="background-image: url('bg.jpg')"><iframe src="https://ads.test/"></iframe>Bye</section>
        </body></html>"#,
    );

    let scenes = download_scenes(&web, "https://site.test/blog/first.html", None, None)
        .await
        .unwrap();
    assert_eq!(scenes.len(), 2);

    for scene in &scenes {
        let html = scene.html();
        assert!(!html.contains("<script"));
        assert!(!html.contains("<iframe"));
        assert!(!html.contains("onclick"));
        assert!(html.contains("https://site.test/blog/style.css"));
    }
    assert!(scenes[0]
        .html()
        .contains("https://site.test/blog/a.png 1x, https://site.test/blog/b.png 2x"));
    assert!(scenes[1].html().contains("url('https://site.test/blog/bg.jpg')"));

    let second = download_scenes(&web, "https://site.test/blog/first.html", Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].index(), 1);
    assert!(second[0].html().contains("Bye"));
}

#[tokio::test]
async fn test_missing_document_falls_back_to_error_scene() {
    let web = FakeWeb::default();
    let scenes = download_scenes(&web, "https://site.test/blog/missing.html", None, None)
        .await
        .unwrap_or_else(|| vec![Scene::error()]);
    assert_eq!(scenes.len(), 1);
    assert!(scenes[0].html().contains("✕"));
}
