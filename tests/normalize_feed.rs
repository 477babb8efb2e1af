// tests/normalize_feed.rs
use chrono::{DateTime, Utc};
use city_pulse::classify::Classifier;
use city_pulse::event::SourceType;
use city_pulse::ingest::normalize::{NormalizeError, Normalizer};
use city_pulse::ingest::types::{FeedEntry, RawRecord};

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_100_000, 0).unwrap()
}

fn entry() -> FeedEntry {
    FeedEntry {
        source_name: "TheHindu".into(),
        id: Some("hindu-42".into()),
        link: Some("https://www.thehindu.com/news/cities/bangalore/article42.ece".into()),
        title: Some("Pothole woes on Old Airport Road".into()),
        summary: Some("<p>Residents say the <em>drainage</em> work was left half done.</p>".into()),
        published: Some(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
        tags: vec!["Bengaluru".into()],
    }
}

#[test]
fn feed_entry_becomes_event() {
    let n = Normalizer::new(Classifier::default());
    let ev = n.normalize(RawRecord::Feed(entry()), now()).unwrap();

    assert_eq!(ev.event_id, "rss_hindu-42");
    assert_eq!(ev.source_type, SourceType::Rss);
    assert_eq!(ev.source_name, "TheHindu");
    assert_eq!(
        ev.content_raw,
        "Pothole woes on Old Airport Road. Residents say the drainage work was left half done."
    );
    assert_eq!(
        ev.content_summary,
        "Residents say the drainage work was left half done."
    );
    assert_eq!(ev.timestamp_published.timestamp(), 1_700_000_000);
    assert_eq!(ev.timestamp_scraped, now());
    assert!(ev.media_urls.is_empty());
    assert!(ev.analysis.categories.contains("civic_issue"));
    assert!(ev.analysis.categories.contains("traffic"));
    assert!(ev.analysis.categories.contains("Bengaluru"));
    assert!(ev.analysis.mentioned_locations.contains("Old Airport Road"));
}

#[test]
fn missing_published_time_falls_back_to_now() {
    let mut e = entry();
    e.published = None;
    let ev = Normalizer::new(Classifier::default())
        .normalize(RawRecord::Feed(e), now())
        .unwrap();
    assert_eq!(ev.timestamp_published, now());
}

#[test]
fn event_id_falls_back_to_link() {
    let mut e = entry();
    e.id = None;
    let link = e.link.clone().unwrap();
    let ev = Normalizer::new(Classifier::default())
        .normalize(RawRecord::Feed(e), now())
        .unwrap();
    assert_eq!(ev.event_id, format!("rss_{link}"));
}

#[test]
fn entry_without_link_is_rejected() {
    let n = Normalizer::new(Classifier::default());
    let mut e = entry();
    e.link = Some("   ".into());
    e.id = Some("hindu-42".into());
    assert_eq!(
        n.normalize(RawRecord::Feed(e), now()).unwrap_err(),
        NormalizeError::MissingLink
    );
}

#[test]
fn summary_falls_back_to_title_and_empty_entry_is_general() {
    let e = FeedEntry {
        source_name: "X".into(),
        link: Some("https://x.example/a".into()),
        title: Some("Librarian retires".into()),
        ..Default::default()
    };
    let ev = Normalizer::new(Classifier::default())
        .normalize(RawRecord::Feed(e), now())
        .unwrap();
    assert_eq!(ev.content_summary, "Librarian retires");
    assert_eq!(ev.content_raw, "Librarian retires. ");
    assert_eq!(
        ev.analysis.categories.iter().collect::<Vec<_>>(),
        vec!["general"]
    );
}
