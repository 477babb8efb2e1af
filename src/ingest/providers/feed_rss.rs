// src/ingest/providers/feed_rss.rs
//! RSS 2.0 feeds.
//!
//! The channel is first cut into raw `<item>` fragments with the streaming
//! reader, then every fragment is deserialized on its own. An item that does
//! not decode (duplicate elements, markup inside `<title>`, …) is skipped
//! with a warning; only a document that is not an RSS channel at all fails
//! the whole fetch.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::borrow::Cow;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use crate::event::SourceType;
use crate::ingest::types::{FeedEntry, Fetched, RawRecord, SourceProvider};

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<TextNode>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<TextNode>,
}

/// Element whose attributes (`isPermaLink`, `domain`) we ignore.
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Items of one feed document that decoded, plus how many did not.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    pub skipped: usize,
}

/// RFC 2822 (`pubDate`), then RFC 3339; `None` when neither parses.
pub fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let odt = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok();
    match odt {
        Some(dt) => DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()),
        // Obsolete zone names ("GMT", "IST"…) that `time` refuses.
        None => DateTime::parse_from_rfc2822(ts)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// A named RSS 2.0 feed, read from an embedded string or over HTTP.
pub struct FeedRssProvider {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl FeedRssProvider {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    pub fn parse_entries(name: &str, xml: &str) -> Result<ParsedFeed> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let fragments =
            item_fragments(&xml_clean).with_context(|| format!("parsing {name} rss xml"))?;

        let mut out = ParsedFeed {
            entries: Vec::with_capacity(fragments.len()),
            skipped: 0,
        };
        for (idx, fragment) in fragments.into_iter().enumerate() {
            match from_str::<Item>(fragment) {
                Ok(it) => out.entries.push(to_entry(name, it)),
                Err(e) => {
                    tracing::warn!(target: "ingest", provider = name, item = idx, error = %e, "malformed feed item skipped");
                    out.skipped += 1;
                }
            }
        }
        Ok(out)
    }
}

fn to_entry(name: &str, it: Item) -> FeedEntry {
    let published = it.pub_date.as_deref().and_then(|raw| {
        let parsed = parse_pub_date(raw);
        if parsed.is_none() {
            tracing::debug!(provider = name, pub_date = raw, "unparseable pubDate");
        }
        parsed
    });
    FeedEntry {
        source_name: name.to_string(),
        id: it.guid.map(|g| g.value).filter(|v| !v.trim().is_empty()),
        link: it.link,
        title: it.title,
        summary: it.description,
        published,
        tags: it
            .categories
            .into_iter()
            .map(|c| c.value)
            .filter(|v| !v.trim().is_empty())
            .collect(),
    }
}

/// Raw `<item>…</item>` slices of a channel, in document order.
fn item_fragments(xml: &str) -> Result<Vec<&str>> {
    let mut reader = Reader::from_str(xml);
    // A mismatched tag inside one item must not sink its siblings.
    reader.config_mut().check_end_names = false;

    let mut fragments = Vec::new();
    let mut depth = 0usize;
    let mut saw_channel = false;
    loop {
        let start = byte_offset(reader.buffer_position());
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"item" => {
                reader
                    .read_to_end(e.name())
                    .with_context(|| format!("unterminated <item> at byte {start}"))?;
                let end = byte_offset(reader.buffer_position());
                fragments.push(&xml[start..end]);
            }
            Ok(Event::Start(e)) => {
                saw_channel |= e.local_name().as_ref() == b"channel";
                depth += 1;
            }
            Ok(Event::Empty(e)) => saw_channel |= e.local_name().as_ref() == b"channel",
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(anyhow!("xml error at byte {}: {e}", reader.error_position())),
        }
    }

    if !saw_channel {
        bail!("document has no <channel>");
    }
    if depth != 0 {
        bail!("document ends inside an open element");
    }
    Ok(fragments)
}

fn byte_offset(pos: u64) -> usize {
    usize::try_from(pos).unwrap_or(usize::MAX)
}

#[async_trait]
impl SourceProvider for FeedRssProvider {
    async fn fetch_latest(&self) -> Result<Fetched> {
        let parsed = match &self.mode {
            Mode::Fixture(s) => Self::parse_entries(&self.name, s)?,
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} http status", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                Self::parse_entries(&self.name, &body)?
            }
        };
        Ok(Fetched::new(
            parsed.entries.into_iter().map(RawRecord::Feed).collect(),
            parsed.skipped,
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceType {
        SourceType::Rss
    }
}

/// XML only knows five named entities; feeds routinely ship HTML ones.
/// Known HTML entities are decoded, unknown ones and bare `&` are escaped, so
/// the reader never fails on them. The five XML entities pass through.
fn scrub_html_entities_for_xml(s: &str) -> Cow<'_, str> {
    static RE_AMP: OnceCell<Regex> = OnceCell::new();
    let re = RE_AMP.get_or_init(|| {
        Regex::new(r"&(#[xX][0-9a-fA-F]+;|#[0-9]+;|[A-Za-z][A-Za-z0-9]*;)?").unwrap()
    });
    re.replace_all(s, |caps: &Captures<'_>| -> String {
        let Some(entity) = caps.get(1).map(|m| m.as_str()) else {
            return "&amp;".to_string();
        };
        if entity.starts_with('#') {
            return format!("&{entity}");
        }
        match entity.trim_end_matches(';') {
            "amp" | "lt" | "gt" | "quot" | "apos" => format!("&{entity}"),
            "nbsp" => " ".to_string(),
            "ndash" | "mdash" => "-".to_string(),
            "ldquo" | "rdquo" => "\"".to_string(),
            "lsquo" | "rsquo" => "'".to_string(),
            "hellip" => "...".to_string(),
            _ => {
                let raw = format!("&{entity}");
                let decoded = html_escape::decode_html_entities(&raw);
                if decoded.as_ref() == raw.as_str() {
                    format!("&amp;{entity}")
                } else {
                    // `&LT;`, `&AMP;`… decode to markup characters.
                    html_escape::encode_safe(decoded.as_ref()).into_owned()
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_formats() {
        let a = parse_pub_date("Tue, 14 Nov 2023 22:13:20 +0530").unwrap();
        assert_eq!(a.timestamp(), 1_699_980_200);
        let b = parse_pub_date("2023-11-14T16:43:20Z").unwrap();
        assert_eq!(b, a);
        let c = parse_pub_date("Tue, 14 Nov 2023 16:43:20 GMT").unwrap();
        assert_eq!(c, a);
        assert!(parse_pub_date("yesterday").is_none());
    }

    #[test]
    fn minimal_channel_parses() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
<item><title>Jam&nbsp;at Hebbal</title><link>https://n.example/1</link>
<guid isPermaLink="false">abc-1</guid>
<category>City</category><category domain="x">Traffic</category></item>
</channel></rss>"#;
        let parsed = FeedRssProvider::parse_entries("N", xml).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.skipped, 0);
        let e = &parsed.entries[0];
        assert_eq!(e.id.as_deref(), Some("abc-1"));
        assert_eq!(e.title.as_deref(), Some("Jam at Hebbal"));
        assert_eq!(e.tags, vec!["City".to_string(), "Traffic".to_string()]);
        assert!(e.published.is_none());
    }

    #[test]
    fn empty_channel_is_ok() {
        let xml = r#"<rss><channel><title>T</title></channel></rss>"#;
        assert!(FeedRssProvider::parse_entries("N", xml)
            .unwrap()
            .entries
            .is_empty());
    }

    #[test]
    fn html_entities_are_made_xml_safe() {
        assert_eq!(scrub_html_entities_for_xml("Caf&eacute; &amp; bar"), "Caf\u{e9} &amp; bar");
        assert_eq!(scrub_html_entities_for_xml("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(scrub_html_entities_for_xml("&#39;x&#x27;"), "&#39;x&#x27;");
        assert_eq!(scrub_html_entities_for_xml("&bogus; &lt;"), "&amp;bogus; &lt;");
        assert_eq!(scrub_html_entities_for_xml("a&nbsp;b&hellip;"), "a b...");
    }

    #[test]
    fn fragments_keep_nested_markup_inside_one_item() {
        let xml = "<rss><channel>\n<item><title>A <b>bold</b></title></item>\n<item/><item><title>B</title></item></channel></rss>";
        let frags = item_fragments(xml).unwrap();
        assert_eq!(
            frags,
            vec![
                "<item><title>A <b>bold</b></title></item>",
                "<item><title>B</title></item>"
            ]
        );
    }

    #[test]
    fn non_rss_document_is_an_error() {
        assert!(item_fragments("<html><body>502</body></html>").is_err());
    }

    #[test]
    fn broken_xml_is_an_error() {
        assert!(FeedRssProvider::parse_entries("N", "<rss><channel>").is_err());
    }
}
