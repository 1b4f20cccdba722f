pub mod feed;
pub mod fingerprint;
pub mod listing;
pub mod post;

pub use feed::{Feed, FeedDetail, FeedUpdate};
pub use fingerprint::Fingerprint;
pub use listing::{Listing, ListingDiff};
pub use post::Post;
