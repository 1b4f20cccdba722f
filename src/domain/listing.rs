use serde::{Deserialize, Serialize};

/// Ordered absolute item addresses of one feed revision.
///
/// Source order is preserved and duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Listing(Vec<String>);

impl Listing {
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    /// Reads a persisted newline-delimited listing.
    pub fn from_text(text: &str) -> Self {
        Self(
            text.split('\n')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Serializes to the newline-delimited form used for persistence.
    pub fn to_text(&self) -> String {
        self.0.join("\n")
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Entries gained and lost between two consecutive listings of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ListingDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
