// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod metrics;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::classify::{Classifier, ClassifierConfig};
pub use crate::error::PulseError;
pub use crate::event::{Analysis, Event, SourceType};
pub use crate::ingest::normalize::Normalizer;
pub use crate::store::{upsert_batch, EventSink, SqliteStore};

use std::time::Duration;

use crate::config::PulseConfig;
use crate::ingest::providers::{
    feed_rss::FeedRssProvider,
    reddit::{RedditCredentials, RedditProvider},
};
use crate::ingest::types::SourceProvider;

/// Shared HTTP client; the per-request timeout bounds every external call.
pub fn build_http_client(cfg: &PulseConfig) -> Result<reqwest::Client, PulseError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http.timeout_secs))
        .user_agent(concat!("city-pulse/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PulseError::setup(format!("building http client: {e}")))
}

/// Feeds first, then the forum. Forum setup (credentials + token) happens
/// here, so a missing credential halts the run before anything is fetched.
pub async fn build_providers(
    cfg: &PulseConfig,
    client: &reqwest::Client,
    with_forum: bool,
) -> Result<Vec<Box<dyn SourceProvider>>, PulseError> {
    let mut providers: Vec<Box<dyn SourceProvider>> = cfg
        .feeds
        .iter()
        .map(|f| {
            Box::new(FeedRssProvider::from_url(&f.name, &f.url, client.clone()))
                as Box<dyn SourceProvider>
        })
        .collect();

    if with_forum && cfg.forum.enabled {
        let creds = RedditCredentials::from_env()?;
        let reddit = RedditProvider::connect(client.clone(), &creds, &cfg.forum).await?;
        providers.push(Box::new(reddit));
    }
    Ok(providers)
}

pub fn build_normalizer(cfg: &PulseConfig) -> Result<Normalizer, PulseError> {
    let classifier = Classifier::new(cfg.classifier.clone());
    let categories: Vec<&str> = classifier.category_names().collect();
    if categories.is_empty() {
        tracing::warn!("no keyword categories configured, every event will be `general` or tag-only");
    } else {
        tracing::info!(?categories, locations = cfg.classifier.locations.len(), "classifier ready");
    }
    Normalizer::new(classifier)
        .with_forum_base(&cfg.forum.base_url)
        .map_err(|e| PulseError::setup(format!("{e:#}")))
}
