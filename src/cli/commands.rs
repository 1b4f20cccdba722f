use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::address;
use crate::app::{AppContext, HtmlFeedError, Result};
use crate::document::{download_scenes, Scene};
use crate::domain::Feed;
use crate::fetcher::details::download_details;
use crate::fetcher::index::download_index;
use crate::fetcher::refresher::refresh_feed;
use crate::store::Store;

/// Accepts a plain listing address or an `html://follow?` link.
pub fn normalize_feed_address(input: &str) -> Result<String> {
    let candidate = address::parse_follow_uri(input).unwrap_or_else(|| input.trim().to_string());
    address::try_parse(&candidate, None)
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .ok_or_else(|| HtmlFeedError::InvalidAddress(input.to_string()))
}

pub async fn follow_feed(ctx: &AppContext, input: &str) -> Result<Feed> {
    let url = normalize_feed_address(input)?;

    if let Some(feed) = ctx.store.get_feed_by_url(&url)? {
        println!("Already following: {}", url);
        return Ok(feed);
    }

    // Refuse to store anything that is not a listing
    if download_index(ctx.transport.as_ref(), &url).await.is_none() {
        return Err(HtmlFeedError::InvalidContent(format!("No feed listing at {}", url)));
    }

    let feed_id = ctx.store.add_feed(&Feed::new(url.clone()))?;
    let feed = ctx
        .store
        .get_feed(feed_id)?
        .ok_or_else(|| HtmlFeedError::FeedNotFound(url.clone()))?;
    println!("Following: {}", url);

    let count = refresh_feed(
        ctx.transport.as_ref(),
        ctx.store.as_ref(),
        &feed,
        ctx.config.details.max_upscan,
    )
    .await?;

    let feed = ctx.store.get_feed(feed_id)?.unwrap_or(feed);
    if !feed.author.is_empty() {
        println!("Author: {}", feed.author);
    }
    println!("Recorded {} posts", count);
    Ok(feed)
}

pub async fn unfollow_feed(ctx: &AppContext, input: &str) -> Result<()> {
    let url = normalize_feed_address(input)?;
    let feed = ctx
        .store
        .get_feed_by_url(&url)?
        .ok_or_else(|| HtmlFeedError::FeedNotFound(url.clone()))?;

    ctx.store.delete_feed(feed.id)?;
    println!("Unfollowed: {}", url);
    Ok(())
}

pub async fn refresh_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds to refresh");
        return Ok(());
    }

    println!("Checking {} feeds...", feeds.len());
    let modified = ctx.poller.sweep(stream::iter(feeds).boxed()).await;

    if modified.is_empty() {
        println!("No feeds changed");
        return Ok(());
    }

    let results = ctx.refresher.refresh_all(modified, ctx.store.clone()).await;

    let mut total_new = 0;
    let mut errors = 0;

    for (feed_id, result) in results {
        match result {
            Ok(count) => {
                total_new += count;
                if count > 0 {
                    if let Ok(Some(feed)) = ctx.store.get_feed(feed_id) {
                        println!("  {} new posts from {}", count, feed.display_title());
                    }
                }
            }
            Err(e) => {
                errors += 1;
                if let Ok(Some(feed)) = ctx.store.get_feed(feed_id) {
                    eprintln!("  Error refreshing {}: {}", feed.display_title(), e);
                }
            }
        }
    }

    println!("Refresh complete: {} new posts, {} errors", total_new, errors);
    Ok(())
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let posts = ctx.store.get_posts_by_feed(feed.id)?;
        let unvisited = posts.iter().filter(|p| !p.visited).count();
        println!(
            "{} ({} posts, {} unvisited)\n  {}",
            feed.display_title(),
            posts.len(),
            unvisited,
            feed.url
        );
        if !feed.description.is_empty() {
            println!("  {}", feed.description);
        }
    }

    Ok(())
}

pub fn list_posts(ctx: &AppContext) -> Result<()> {
    let posts = ctx.store.get_all_posts()?;

    if posts.is_empty() {
        println!("No posts");
        return Ok(());
    }

    let feeds: HashMap<i64, Feed> = ctx
        .store
        .get_all_feeds()?
        .into_iter()
        .map(|feed| (feed.id, feed))
        .collect();

    for post in posts {
        let marker = if post.visited { " " } else { "●" };
        let date = post.created_at.format("%Y-%m-%d");
        let url = feeds
            .get(&post.feed_id)
            .and_then(|feed| post.url(&feed.url))
            .unwrap_or_else(|| post.path.clone());

        println!("{} {} {}  [{}]", marker, date, url, &post.id[..12.min(post.id.len())]);
    }

    Ok(())
}

pub async fn show_details(ctx: &AppContext, input: &str) -> Result<()> {
    let url = normalize_feed_address(input)?;
    let detail = download_details(ctx.transport.as_ref(), &url, ctx.config.details.max_upscan)
        .await
        .ok_or_else(|| HtmlFeedError::InvalidContent(format!("No feed details at {}", url)))?;

    let json = serde_json::to_string_pretty(&detail)
        .map_err(|e| HtmlFeedError::Other(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

pub async fn preview(ctx: &AppContext, url: &str, start: Option<usize>, end: Option<usize>) -> Result<()> {
    let scenes = match download_scenes(ctx.transport.as_ref(), url, start, end).await {
        Some(scenes) => scenes,
        None => {
            tracing::warn!(%url, "Could not load document, showing error scene");
            vec![Scene::error()]
        }
    };

    for scene in scenes {
        println!("{}", scene.html());
    }
    Ok(())
}

/// Marks a post visited. `id` may be a unique prefix of the post id.
pub fn visit_post(ctx: &AppContext, id: &str) -> Result<()> {
    let matches: Vec<String> = ctx
        .store
        .get_all_posts()?
        .into_iter()
        .filter(|post| post.id.starts_with(id))
        .map(|post| post.id)
        .collect();

    match matches.as_slice() {
        [post_id] => {
            ctx.store.set_visited(post_id, true)?;
            println!("Visited: {}", post_id);
            Ok(())
        }
        [] => Err(HtmlFeedError::PostNotFound(id.to_string())),
        _ => Err(HtmlFeedError::Other(format!("Ambiguous post id: {}", id))),
    }
}
