// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::event::SourceType;

/// One `<item>` of a news feed, as delivered by the feed producer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub source_name: String, // e.g. "TheHindu"
    pub id: Option<String>,  // guid
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

/// One submission of the forum listing. Field names follow Reddit's JSON.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForumPost {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub selftext: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub created_utc: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub link_flair_text: Option<String>,
}

/// Source-specific record handed to the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Feed(FeedEntry),
    Forum(ForumPost),
}

impl RawRecord {
    pub fn source_type(&self) -> SourceType {
        match self {
            RawRecord::Feed(_) => SourceType::Rss,
            RawRecord::Forum(_) => SourceType::Reddit,
        }
    }

    /// Short identifier for diagnostics.
    pub fn hint(&self) -> String {
        match self {
            RawRecord::Feed(e) => e
                .link
                .clone()
                .or_else(|| e.id.clone())
                .unwrap_or_else(|| "<no link>".to_string()),
            RawRecord::Forum(p) => p.id.clone().unwrap_or_else(|| "<no id>".to_string()),
        }
    }
}

/// One provider fetch. `skipped` counts records the provider could not
/// decode at all; they never reach the normalizer but are still rejections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
}

impl Fetched {
    pub fn new(records: Vec<RawRecord>, skipped: usize) -> Self {
        Self { records, skipped }
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Fetched>;
    fn name(&self) -> &str;
    fn kind(&self) -> SourceType;
}
