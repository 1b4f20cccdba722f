use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{HtmlFeedError, Result};
use crate::domain::{Feed, FeedUpdate, Fingerprint, Listing, Post};
use crate::store::Store;

const FEED_COLUMNS: &str = "id, url, author, description, icon, fingerprint, length, last_modified, last_fetched_at, created_at";

const POST_COLUMNS: &str = "id, feed_id, path, visited, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| HtmlFeedError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            HtmlFeedError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn row_to_feed(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            url: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
            icon: row.get(4)?,
            fingerprint: Fingerprint::new(row.get::<_, String>(5)?),
            length: row.get::<_, i64>(6)?.max(0) as usize,
            last_modified: row.get(7)?,
            last_fetched_at: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| Self::parse_datetime(&s)),
            created_at: row
                .get::<_, String>(9)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
        Ok(Post {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            path: row.get(2)?,
            visited: row.get::<_, i32>(3)? != 0,
            created_at: row
                .get::<_, String>(4)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }
}

impl Store for SqliteStore {
    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feeds (url, author, description, icon, fingerprint, length, last_modified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                feed.url,
                feed.author,
                feed.description,
                feed.icon,
                feed.fingerprint.as_str(),
                feed.length as i64,
                feed.last_modified,
                feed.created_at.to_rfc3339()
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS),
                params![id],
                Self::row_to_feed,
            )
            .optional()?;

        Ok(result)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE url = ?1", FEED_COLUMNS),
                params![url],
                Self::row_to_feed,
            )
            .optional()?;

        Ok(result)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds ORDER BY author, url",
            FEED_COLUMNS
        ))?;

        let feeds = stmt
            .query_map([], Self::row_to_feed)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()> {
        let conn = self.conn()?;

        if let Some(ref author) = update.author {
            conn.execute(
                "UPDATE feeds SET author = ?1 WHERE id = ?2",
                params![author, id],
            )?;
        }
        if let Some(ref description) = update.description {
            conn.execute(
                "UPDATE feeds SET description = ?1 WHERE id = ?2",
                params![description, id],
            )?;
        }
        if let Some(ref icon) = update.icon {
            conn.execute(
                "UPDATE feeds SET icon = ?1 WHERE id = ?2",
                params![icon, id],
            )?;
        }
        if let Some(ref fingerprint) = update.fingerprint {
            conn.execute(
                "UPDATE feeds SET fingerprint = ?1 WHERE id = ?2",
                params![fingerprint.as_str(), id],
            )?;
        }
        if let Some(length) = update.length {
            conn.execute(
                "UPDATE feeds SET length = ?1 WHERE id = ?2",
                params![length as i64, id],
            )?;
        }
        if let Some(ref last_modified) = update.last_modified {
            conn.execute(
                "UPDATE feeds SET last_modified = ?1 WHERE id = ?2",
                params![last_modified, id],
            )?;
        }
        if let Some(ref last_fetched_at) = update.last_fetched_at {
            conn.execute(
                "UPDATE feeds SET last_fetched_at = ?1 WHERE id = ?2",
                params![last_fetched_at.to_rfc3339(), id],
            )?;
        }

        Ok(())
    }

    fn delete_feed(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn read_listing(&self, feed_id: i64) -> Result<Option<Listing>> {
        let conn = self.conn()?;

        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM listings WHERE feed_id = ?1",
                params![feed_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(body.map(|text| Listing::from_text(&text)))
    }

    fn write_listing(&self, feed_id: i64, listing: &Listing) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO listings (feed_id, body) VALUES (?1, ?2)
             ON CONFLICT(feed_id) DO UPDATE SET body = ?2",
            params![feed_id, listing.to_text()],
        )?;

        Ok(())
    }

    fn add_posts(&self, posts: &[Post]) -> Result<usize> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let mut count = 0;

        for post in posts {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO posts (id, feed_id, path, visited, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    post.id,
                    post.feed_id,
                    post.path,
                    post.visited as i32,
                    post.created_at.to_rfc3339()
                ],
            )?;
            count += inserted;
        }

        tx.commit()?;
        Ok(count)
    }

    fn get_posts_by_feed(&self, feed_id: i64) -> Result<Vec<Post>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM posts WHERE feed_id = ?1 ORDER BY created_at DESC, rowid DESC",
            POST_COLUMNS
        ))?;

        let posts = stmt
            .query_map(params![feed_id], Self::row_to_post)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn get_all_posts(&self) -> Result<Vec<Post>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM posts ORDER BY created_at DESC, rowid DESC",
            POST_COLUMNS
        ))?;

        let posts = stmt
            .query_map([], Self::row_to_post)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn set_visited(&self, post_id: &str, visited: bool) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE posts SET visited = ?1 WHERE id = ?2",
            params![visited as i32, post_id],
        )?;
        if changed == 0 {
            return Err(HtmlFeedError::PostNotFound(post_id.to_string()));
        }

        Ok(())
    }
}
