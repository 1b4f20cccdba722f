pub mod differ;
pub mod sqlite;

use crate::app::Result;
use crate::domain::{Feed, FeedUpdate, Listing, Post};

pub use differ::diff_and_persist;
pub use sqlite::SqliteStore;

pub trait Store {
    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;
    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()>;
    fn delete_feed(&self, id: i64) -> Result<()>;

    // Listing operations
    fn read_listing(&self, feed_id: i64) -> Result<Option<Listing>>;
    fn write_listing(&self, feed_id: i64, listing: &Listing) -> Result<()>;

    // Post operations
    fn add_posts(&self, posts: &[Post]) -> Result<usize>;
    fn get_posts_by_feed(&self, feed_id: i64) -> Result<Vec<Post>>;
    fn get_all_posts(&self) -> Result<Vec<Post>>;
    fn set_visited(&self, post_id: &str, visited: bool) -> Result<()>;
}
