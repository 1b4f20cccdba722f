use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address;
use crate::domain::Fingerprint;

/// A followed feed, as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    /// Address of the plain-text listing.
    pub url: String,
    pub author: String,
    pub description: String,
    /// Icon reference as written in the feed's root document, possibly relative.
    pub icon: String,
    pub fingerprint: Fingerprint,
    /// Number of entries in the most recently stored listing.
    pub length: usize,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(url: String) -> Self {
        Self {
            id: 0,
            url,
            author: String::new(),
            description: String::new(),
            icon: String::new(),
            fingerprint: Fingerprint::default(),
            length: 0,
            last_modified: None,
            last_fetched_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn display_title(&self) -> &str {
        if self.author.is_empty() {
            &self.url
        } else {
            &self.author
        }
    }

    /// Fully-qualified address of the feed's icon.
    pub fn icon_url(&self) -> Option<String> {
        if self.icon.is_empty() {
            return None;
        }
        let folder = address::folder_of(&self.url)?;
        address::resolve(&self.icon, folder.as_str()).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub author: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub length: Option<usize>,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl FeedUpdate {
    /// Carries every non-empty field of `detail` into the update.
    pub fn with_detail(mut self, detail: &FeedDetail) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        self.author = non_empty(&detail.author);
        self.description = non_empty(&detail.description);
        self.icon = non_empty(&detail.icon);
        self.last_modified = non_empty(&detail.date);
        self
    }
}

/// Descriptive metadata extracted from a feed's root document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDetail {
    /// Value of the root document's `Last-Modified` header.
    pub date: String,
    pub author: String,
    pub description: String,
    pub icon: String,
}

impl FeedDetail {
    pub fn is_empty(&self) -> bool {
        self.author.is_empty() && self.description.is_empty() && self.icon.is_empty()
    }
}
