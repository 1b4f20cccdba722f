use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address;

/// One item of a feed, recorded when its address first appears in a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub feed_id: i64,
    /// Address of the item relative to the feed's folder.
    pub path: String,
    pub visited: bool,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(feed_id: i64, feed_url: &str, path: &str) -> Self {
        Self {
            id: Self::generate_id(feed_url, path),
            feed_id,
            path: path.to_string(),
            visited: false,
            created_at: Utc::now(),
        }
    }

    /// Builds a post from an absolute listing entry, storing the entry
    /// relative to the feed folder when it lives underneath it.
    pub fn from_entry(feed_id: i64, feed_url: &str, entry: &str) -> Self {
        let path = address::folder_of(feed_url)
            .and_then(|folder| entry.strip_prefix(folder.as_str()).map(String::from))
            .unwrap_or_else(|| entry.to_string());
        Self::new(feed_id, feed_url, &path)
    }

    /// Generate a deterministic ID from feed URL and post path
    pub fn generate_id(feed_url: &str, path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(feed_url.as_bytes());
        hasher.update(path.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Absolute address of the post's document.
    pub fn url(&self, feed_url: &str) -> Option<String> {
        let folder = address::folder_of(feed_url)?;
        address::resolve(&self.path, folder.as_str()).ok()
    }
}
