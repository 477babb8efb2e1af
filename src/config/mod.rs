// src/config/mod.rs
//! Run configuration: feeds, forum, store location and classifier tables.
//!
//! Lookup order for [`PulseConfig::load_default`]:
//! 1) `$PULSE_CONFIG_PATH` (must exist)
//! 2) `config/pulse.toml`
//! 3) `config/pulse.json`
//! 4) built-in seed ([`PulseConfig::default_seed`])

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::ClassifierConfig;

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/pulse.toml";
pub const DEFAULT_JSON_PATH: &str = "config/pulse.json";

/// Upper bound Reddit accepts for one listing page.
pub const MAX_FORUM_LIMIT: u32 = 100;

fn default_city() -> String {
    "Bengaluru".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/city_pulse.sqlite3")
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_subreddit() -> String {
    "bangalore".to_string()
}
fn default_limit() -> u32 {
    50
}
fn default_base_url() -> String {
    "https://www.reddit.com".to_string()
}
fn default_api_base() -> String {
    "https://oauth.reddit.com".to_string()
}
fn default_token_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub feeds: Vec<FeedSource>,
    #[serde(default)]
    pub forum: ForumConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_subreddit")]
    pub subreddit: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Public site root; permalinks are resolved against it and its host is
    /// treated as the forum's own domain.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subreddit: default_subreddit(),
            limit: default_limit(),
            base_url: default_base_url(),
            api_base: default_api_base(),
            token_url: default_token_url(),
        }
    }
}

impl PulseConfig {
    /// The Bengaluru setup the tool started with.
    pub fn default_seed() -> Self {
        let feeds = [
            (
                "TimesOfIndia",
                "https://timesofindia.indiatimes.com/rssfeeds/-2128833038.cms",
            ),
            (
                "TheHindu",
                "https://www.thehindu.com/news/cities/bangalore/feeder/default.xml",
            ),
            (
                "DeccanHerald",
                "https://www.deccanherald.com/rss/city/bengaluru.xml",
            ),
            (
                "BangaloreMirror",
                "https://bangaloremirror.indiatimes.com/rssfeeds/-2128830345.cms",
            ),
        ]
        .iter()
        .map(|(name, url)| FeedSource {
            name: name.to_string(),
            url: url.to_string(),
        })
        .collect();

        Self {
            city: default_city(),
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            feeds,
            forum: ForumConfig::default(),
            classifier: ClassifierConfig::default_seed(),
        }
    }

    /// Load from an explicit path. TOML or JSON, picked by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validated()
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from(DEFAULT_JSON_PATH);
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        tracing::debug!("no config file found, using built-in seed");
        Self::default_seed().validated()
    }

    /// Clean tables and reject configs that cannot run.
    pub fn validated(mut self) -> Result<Self> {
        self.classifier = self.classifier.cleaned();
        self.forum.limit = self.forum.limit.clamp(1, MAX_FORUM_LIMIT);
        self.forum.subreddit = self
            .forum
            .subreddit
            .trim()
            .trim_start_matches("r/")
            .to_string();

        let mut names = BTreeSet::new();
        for feed in &mut self.feeds {
            feed.name = feed.name.trim().to_string();
            feed.url = feed.url.trim().to_string();
            if feed.name.is_empty() {
                return Err(anyhow!("feed with url `{}` has no name", feed.url));
            }
            if !names.insert(feed.name.clone()) {
                return Err(anyhow!("duplicate feed name `{}`", feed.name));
            }
            url::Url::parse(&feed.url)
                .with_context(|| format!("feed `{}` has an invalid url", feed.name))?;
        }
        if self.forum.enabled && self.forum.subreddit.is_empty() {
            return Err(anyhow!("forum is enabled but no subreddit is set"));
        }
        if self.http.timeout_secs == 0 {
            return Err(anyhow!("http.timeout_secs must be > 0"));
        }
        Ok(self)
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PulseConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            if let Ok(v) = toml::from_str(s) {
                return Ok(v);
            }
            serde_json::from_str(s).map_err(|_| anyhow!("unsupported config format"))
        }
    }
}
