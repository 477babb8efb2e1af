// tests/providers_reddit.rs
use city_pulse::event::SourceType;
use city_pulse::ingest::providers::reddit::RedditProvider;
use city_pulse::ingest::types::{RawRecord, SourceProvider};

const LISTING: &str = include_str!("fixtures/reddit_new.json");

#[tokio::test]
async fn listing_fixture_parses_and_skips_malformed_children() {
    let provider = RedditProvider::from_fixture("bangalore", LISTING);
    assert_eq!(provider.name(), "r/bangalore");
    assert_eq!(provider.kind(), SourceType::Reddit);

    let fetched = provider.fetch_latest().await.expect("listing parse ok");
    // p5 has a non-boolean is_self and is dropped while decoding
    assert_eq!(fetched.skipped, 1);
    let ids: Vec<String> = fetched
        .records
        .iter()
        .map(|r| match r {
            RawRecord::Forum(p) => p.id.clone().unwrap_or_default(),
            other => panic!("unexpected record {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec!["p1", "p2", "p3", "p4", "p6"]);
}

#[tokio::test]
async fn post_fields_are_mapped() {
    let provider = RedditProvider::from_fixture("bangalore", LISTING);
    let records = provider.fetch_latest().await.unwrap().records;
    let RawRecord::Forum(p1) = &records[0] else {
        panic!("expected forum post");
    };
    assert!(p1.is_self);
    assert_eq!(p1.link_flair_text.as_deref(), Some("Traffic"));
    assert_eq!(p1.created_utc, Some(1_700_000_000.0));

    let RawRecord::Forum(p6) = &records[4] else {
        panic!("expected forum post");
    };
    // integer timestamps decode too
    assert_eq!(p6.created_utc, Some(1_700_000_300.0));
    assert!(!p6.is_self);
}

#[tokio::test]
async fn non_listing_body_is_a_fetch_error() {
    let provider = RedditProvider::from_fixture("bangalore", r#"{"message":"Forbidden","error":403}"#);
    assert!(provider.fetch_latest().await.is_err());
}
