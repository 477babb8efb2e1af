// src/ingest/normalize.rs
//! Raw feed entries / forum posts → unified [`Event`]s.
//!
//! The normalizer never touches the store. A record it cannot turn into an
//! event is rejected with a [`NormalizeError`]; `normalize_batch` wraps it in
//! [`PulseError::Normalize`], logs it and carries on with the rest.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::classify::Classifier;
use crate::error::PulseError;
use crate::event::{Event, SourceType};
use crate::ingest::clean_text;
use crate::ingest::types::{FeedEntry, ForumPost, RawRecord};

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("record has no link")]
    MissingLink,
    #[error("invalid link `{0}`")]
    InvalidLink(String),
    #[error("record is missing `{0}`")]
    MissingField(&'static str),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result of normalizing one batch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub events: Vec<Event>,
    /// One [`PulseError::Normalize`] per rejected record, in input order.
    pub rejections: Vec<PulseError>,
}

impl NormalizedBatch {
    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    classifier: Classifier,
    forum_base: Url,
    forum_domain: String,
}

impl Normalizer {
    pub fn new(classifier: Classifier) -> Self {
        let forum_base = Url::parse("https://www.reddit.com").expect("static url");
        let forum_domain = own_domain(&forum_base);
        Self {
            classifier,
            forum_base,
            forum_domain,
        }
    }

    /// Resolve permalinks against `base` and treat its host as the forum's own domain.
    pub fn with_forum_base(mut self, base: &str) -> anyhow::Result<Self> {
        let url = Url::parse(base).with_context(|| format!("forum base url `{base}`"))?;
        if url.host_str().is_none() {
            return Err(anyhow!("forum base url `{base}` has no host"));
        }
        self.forum_domain = own_domain(&url);
        self.forum_base = url;
        Ok(self)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn normalize(&self, record: RawRecord, now: DateTime<Utc>) -> Result<Event, NormalizeError> {
        match record {
            RawRecord::Feed(entry) => self.normalize_feed(entry, now),
            RawRecord::Forum(post) => self.normalize_forum(post, now),
        }
    }

    pub fn normalize_batch(&self, records: Vec<RawRecord>, now: DateTime<Utc>) -> NormalizedBatch {
        let mut out = NormalizedBatch {
            events: Vec::with_capacity(records.len()),
            rejections: Vec::new(),
        };
        for record in records {
            let hint = record.hint();
            let kind = record.source_type();
            match self.normalize(record, now) {
                Ok(ev) => out.events.push(ev),
                Err(e) => {
                    let err = PulseError::rejected(hint, e);
                    tracing::warn!(target: "ingest", source_type = %kind, error = %err, "record rejected");
                    out.rejections.push(err);
                }
            }
        }
        out
    }

    fn normalize_feed(&self, entry: FeedEntry, now: DateTime<Utc>) -> Result<Event, NormalizeError> {
        let link = resolve_feed_link(&entry)?;

        let title = entry.title.as_deref().map(clean_text).unwrap_or_default();
        let summary = entry.summary.as_deref().map(clean_text).unwrap_or_default();
        let content_raw = format!("{title}. {summary}");
        let analysis = self
            .classifier
            .classify_with_tags(content_raw.as_str(), &entry.tags);

        let origin_id = entry
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(link.as_str());

        Ok(Event {
            event_id: format!("rss_{origin_id}"),
            source_type: SourceType::Rss,
            source_name: entry.source_name,
            content_summary: if summary.is_empty() { title } else { summary },
            content_raw,
            link_original: link,
            timestamp_published: entry.published.unwrap_or(now),
            timestamp_scraped: now,
            media_urls: Vec::new(),
            analysis,
        })
    }

    fn normalize_forum(&self, post: ForumPost, now: DateTime<Utc>) -> Result<Event, NormalizeError> {
        let id = post
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(NormalizeError::MissingField("id"))?;

        let permalink = post
            .permalink
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(NormalizeError::MissingLink)?;
        let link = if permalink.starts_with("http://") || permalink.starts_with("https://") {
            checked_link(permalink)?
        } else {
            self.forum_base
                .join(permalink)
                .map_err(|_| NormalizeError::InvalidLink(permalink.to_string()))?
                .to_string()
        };

        let created = post
            .created_utc
            .ok_or(NormalizeError::MissingField("created_utc"))?;
        let published = from_unix_f64(created)?;

        let title = post.title.as_deref().unwrap_or_default();
        let body = post.selftext.as_deref().unwrap_or_default();
        let analysis = self.classifier.classify_with_tags(
            format!("{title}. {body}").as_str(),
            post.link_flair_text.iter(),
        );

        let media_urls = match post.url.as_deref() {
            Some(u) if !post.is_self && self.is_external(u) => vec![u.to_string()],
            _ => Vec::new(),
        };

        let forum = post
            .subreddit
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown");

        Ok(Event {
            event_id: format!("reddit_{id}"),
            source_type: SourceType::Reddit,
            source_name: format!("r/{forum}"),
            content_raw: format!("{title} :: {body}"),
            content_summary: title.to_string(),
            link_original: link,
            timestamp_published: published,
            timestamp_scraped: now,
            media_urls,
            analysis,
        })
    }

    /// True when `u` is an absolute URL outside the forum's own domain.
    fn is_external(&self, u: &str) -> bool {
        let Ok(parsed) = Url::parse(u) else {
            return false;
        };
        match parsed.host_str() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                host != self.forum_domain && !host.ends_with(&format!(".{}", self.forum_domain))
            }
            None => false,
        }
    }
}

fn own_domain(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn resolve_feed_link(entry: &FeedEntry) -> Result<String, NormalizeError> {
    if let Some(link) = entry.link.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return checked_link(link);
    }
    // A guid that is itself a URL is as good as a link.
    match entry.id.as_deref().map(str::trim) {
        Some(id) if id.starts_with("http://") || id.starts_with("https://") => checked_link(id),
        _ => Err(NormalizeError::MissingLink),
    }
}

fn checked_link(s: &str) -> Result<String, NormalizeError> {
    match Url::parse(s) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {
            Ok(s.to_string())
        }
        _ => Err(NormalizeError::InvalidLink(s.to_string())),
    }
}

fn from_unix_f64(ts: f64) -> Result<DateTime<Utc>, NormalizeError> {
    if !ts.is_finite() || ts < 0.0 {
        return Err(NormalizeError::InvalidTimestamp(ts.to_string()));
    }
    let secs = ts.trunc() as i64;
    let nanos = ((ts.fract() * 1e9) as u32).min(999_999_999);
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| NormalizeError::InvalidTimestamp(ts.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn guid_url_stands_in_for_missing_link() {
        let entry = FeedEntry {
            source_name: "TheHindu".into(),
            id: Some("https://news.example/a/1".into()),
            ..Default::default()
        };
        assert_eq!(resolve_feed_link(&entry).unwrap(), "https://news.example/a/1");

        let opaque = FeedEntry {
            id: Some("urn:uuid:1234".into()),
            ..Default::default()
        };
        assert_eq!(resolve_feed_link(&opaque), Err(NormalizeError::MissingLink));
    }

    #[test]
    fn relative_link_is_invalid() {
        assert!(matches!(
            checked_link("/news/1"),
            Err(NormalizeError::InvalidLink(_))
        ));
        assert!(checked_link("ftp://x.example/f").is_err());
    }

    #[test]
    fn unix_f64_keeps_fraction() {
        let t = from_unix_f64(1_700_000_000.5).unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(t.timestamp_subsec_millis(), 500);
        assert!(from_unix_f64(f64::NAN).is_err());
        assert!(from_unix_f64(-1.0).is_err());
    }

    #[test]
    fn subdomains_of_the_forum_are_internal() {
        let n = Normalizer::new(Classifier::default());
        assert!(!n.is_external("https://www.reddit.com/r/bangalore/comments/x"));
        assert!(!n.is_external("https://old.reddit.com/gallery/abc"));
        assert!(!n.is_external("https://reddit.com/x"));
        assert!(n.is_external("https://i.redd.it/abc.jpg"));
        assert!(n.is_external("https://news.example/story"));
        assert!(!n.is_external("not a url"));
    }

    #[test]
    fn custom_forum_base_changes_own_domain() {
        let n = Normalizer::new(Classifier::default())
            .with_forum_base("https://forum.example.org")
            .unwrap();
        assert!(!n.is_external("https://forum.example.org/t/1"));
        assert!(n.is_external("https://www.reddit.com/r/x"));
        assert!(Normalizer::new(Classifier::default())
            .with_forum_base("not a url")
            .is_err());
    }

    #[test]
    fn batch_counts_rejections() {
        let n = Normalizer::new(Classifier::default());
        let recs = vec![
            RawRecord::Feed(FeedEntry {
                source_name: "X".into(),
                link: Some("https://x.example/1".into()),
                title: Some("Road closed".into()),
                ..Default::default()
            }),
            RawRecord::Feed(FeedEntry {
                source_name: "X".into(),
                title: Some("No link here".into()),
                ..Default::default()
            }),
        ];
        let out = n.normalize_batch(recs, now());
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.rejected(), 1);
        assert!(matches!(
            &out.rejections[0],
            PulseError::Normalize { source: NormalizeError::MissingLink, .. }
        ));
    }
}
