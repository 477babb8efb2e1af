// src/ingest/providers/reddit.rs
//! Newest posts of one subreddit.
//!
//! Live mode authenticates once at setup with the application-only OAuth
//! grant (`client_credentials`) and then reads `/r/<sub>/new`. A token that
//! cannot be obtained is a setup failure, never a per-record one. Each listing
//! child is decoded on its own, so a single malformed post is skipped with a
//! warning instead of failing the whole listing.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

use crate::config::ForumConfig;
use crate::error::PulseError;
use crate::event::SourceType;
use crate::ingest::types::{Fetched, ForumPost, RawRecord, SourceProvider};

pub const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";

#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

// Never print the secret.
impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RedditCredentials {
    pub fn from_env() -> Result<Self, PulseError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; every missing/blank key is named in the error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PulseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let (id, secret, agent) = (
            get(ENV_CLIENT_ID),
            get(ENV_CLIENT_SECRET),
            get(ENV_USER_AGENT),
        );
        match (id, secret, agent) {
            (Some(client_id), Some(client_secret), Some(user_agent)) => Ok(Self {
                client_id,
                client_secret,
                user_agent,
            }),
            (id, secret, agent) => {
                let missing: Vec<&str> = [
                    (ENV_CLIENT_ID, id.is_none()),
                    (ENV_CLIENT_SECRET, secret.is_none()),
                    (ENV_USER_AGENT, agent.is_none()),
                ]
                .iter()
                .filter(|(_, m)| *m)
                .map(|(k, _)| *k)
                .collect();
                Err(PulseError::setup(format!(
                    "reddit credentials not found, set {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    kind: Option<String>,
    data: serde_json::Value,
}

pub struct RedditProvider {
    subreddit: String,
    label: String,
    limit: u32,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        api_base: String,
        user_agent: String,
        token: String,
    },
}

impl RedditProvider {
    pub fn from_fixture(subreddit: &str, json: &str) -> Self {
        Self {
            subreddit: subreddit.to_string(),
            label: format!("r/{subreddit}"),
            limit: crate::config::MAX_FORUM_LIMIT,
            mode: Mode::Fixture(json.to_string()),
        }
    }

    /// Obtain an app-only token. Any failure here is a [`PulseError::Setup`].
    pub async fn connect(
        client: reqwest::Client,
        creds: &RedditCredentials,
        cfg: &ForumConfig,
    ) -> Result<Self, PulseError> {
        let token = fetch_token(&client, creds, &cfg.token_url)
            .await
            .map_err(|e| PulseError::setup(format!("connecting to reddit: {e:#}")))?;
        tracing::info!(subreddit = %cfg.subreddit, "reddit client setup successful");
        Ok(Self {
            subreddit: cfg.subreddit.clone(),
            label: format!("r/{}", cfg.subreddit),
            limit: cfg.limit.clamp(1, crate::config::MAX_FORUM_LIMIT),
            mode: Mode::Http {
                client,
                api_base: cfg.api_base.trim_end_matches('/').to_string(),
                user_agent: creds.user_agent.clone(),
                token,
            },
        })
    }

    /// Decode a listing page, keeping at most `limit` posts. Children that do
    /// not decode are counted in [`Fetched::skipped`].
    pub fn parse_listing(&self, json: &str) -> Result<Fetched> {
        let listing: Listing =
            serde_json::from_str(json).with_context(|| format!("parsing {} listing", self.label))?;

        let mut out = Fetched::default();
        for child in listing.data.children {
            if out.records.len() >= self.limit as usize {
                break;
            }
            if child.kind.as_deref().is_some_and(|k| k != "t3") {
                continue;
            }
            match serde_json::from_value::<ForumPost>(child.data) {
                Ok(mut post) => {
                    if post.subreddit.as_deref().map_or(true, |s| s.trim().is_empty()) {
                        post.subreddit = Some(self.subreddit.clone());
                    }
                    out.records.push(RawRecord::Forum(post));
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", provider = %self.label, error = %e, "malformed post skipped");
                    out.skipped += 1;
                }
            }
        }
        Ok(out)
    }
}

async fn fetch_token(client: &reqwest::Client, creds: &RedditCredentials, token_url: &str) -> Result<String> {
    let resp = client
        .post(token_url)
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .header(reqwest::header::USER_AGENT, &creds.user_agent)
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .context("token request")?
        .error_for_status()
        .context("token request status")?;
    let body: TokenResponse = resp.json().await.context("token response body")?;
    match (body.access_token, body.error) {
        (Some(t), None) if !t.is_empty() => Ok(t),
        (_, Some(err)) => Err(anyhow!("token endpoint refused: {err}")),
        _ => Err(anyhow!("token endpoint returned no access_token")),
    }
}

#[async_trait]
impl SourceProvider for RedditProvider {
    async fn fetch_latest(&self) -> Result<Fetched> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_listing(s),
            Mode::Http {
                client,
                api_base,
                user_agent,
                token,
            } => {
                let url = format!("{api_base}/r/{}/new", self.subreddit);
                let limit = self.limit.to_string();
                let body = client
                    .get(&url)
                    .query(&[("limit", limit.as_str()), ("raw_json", "1")])
                    .bearer_auth(token)
                    .header(reqwest::header::USER_AGENT, user_agent)
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.label))?
                    .error_for_status()
                    .with_context(|| format!("{} http status", self.label))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.label))?;
                self.parse_listing(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceType {
        SourceType::Reddit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn all_missing_keys_are_named() {
        let env: HashMap<&str, &str> = HashMap::from([(ENV_CLIENT_ID, "abc"), (ENV_USER_AGENT, " ")]);
        let err = RedditCredentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains(ENV_CLIENT_SECRET));
        assert!(msg.contains(ENV_USER_AGENT));
        assert!(!msg.contains(ENV_CLIENT_ID));
    }

    #[test]
    fn complete_credentials_are_accepted_and_secret_hidden() {
        let creds = RedditCredentials::from_lookup(|k| Some(format!("{k}-value"))).unwrap();
        assert_eq!(creds.client_id, "REDDIT_CLIENT_ID-value");
        assert!(!format!("{creds:?}").contains("REDDIT_CLIENT_SECRET-value"));
    }

    #[test]
    fn malformed_child_is_skipped() {
        let json = r#"{"kind":"Listing","data":{"children":[
            {"kind":"t3","data":{"id":"a1","title":"ok","created_utc":1.0,"permalink":"/r/x/a1","is_self":true}},
            {"kind":"t3","data":{"id":"a2","is_self":"maybe"}},
            {"kind":"t1","data":{"id":"c1"}}
        ]}}"#;
        let p = RedditProvider::from_fixture("x", json);
        let fetched = p.parse_listing(json).unwrap();
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.skipped, 1);
        match &fetched.records[0] {
            RawRecord::Forum(post) => assert_eq!(post.subreddit.as_deref(), Some("x")),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn listing_without_data_is_an_error() {
        let p = RedditProvider::from_fixture("x", "{}");
        assert!(p.parse_listing("{}").is_err());
    }
}
