// src/event.rs
//! Unified event record shared by every source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Category assigned when neither a keyword nor a source tag matched.
pub const GENERAL_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "RSS")]
    Rss,
    #[serde(rename = "Reddit")]
    Reddit,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "RSS",
            SourceType::Reddit => "Reddit",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("rss") => Ok(SourceType::Rss),
            s if s.eq_ignore_ascii_case("reddit") => Ok(SourceType::Reddit),
            other => Err(format!("unknown source type `{other}`")),
        }
    }
}

/// Classifier output. `categories` is never empty once produced by
/// [`crate::classify::Classifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub categories: BTreeSet<String>,
    pub mentioned_locations: BTreeSet<String>,
}

impl Analysis {
    pub fn general() -> Self {
        Self {
            categories: BTreeSet::from([GENERAL_CATEGORY.to_string()]),
            mentioned_locations: BTreeSet::new(),
        }
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains(name)
    }
}

/// One normalized mention. Built once by the normalizer and never mutated;
/// `link_original` is the natural key in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub content_raw: String,
    pub content_summary: String,
    pub link_original: String,
    pub timestamp_published: DateTime<Utc>,
    pub timestamp_scraped: DateTime<Utc>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub analysis: Analysis,
}

impl Event {
    /// Events without a link cannot be deduplicated and must not be stored.
    pub fn is_storable(&self) -> bool {
        !self.link_original.trim().is_empty()
    }
}
