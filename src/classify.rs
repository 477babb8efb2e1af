// src/classify.rs
//! Keyword classifier: raw text → category tags + mentioned locations.
//!
//! Both tables come from configuration ([`ClassifierConfig`]), never from code:
//! - `categories`: category name → trigger phrases. A category matches if ANY
//!   of its phrases occurs in the text.
//! - `locations`:  known place names. Every one that occurs is reported,
//!   title-cased (`"silk board"` → `"Silk Board"`).
//!
//! Matching is a case-insensitive substring test, not tokenized, so `"jam"`
//! also fires inside `"pyjamas"`. False positives of that kind are accepted.
//!
//! When nothing matches (and no source tag is supplied) the result is exactly
//! `{"general"}`. Output sets are ordered, so results compare and serialize
//! deterministically.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::event::{Analysis, GENERAL_CATEGORY};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub locations: Vec<String>,
}

impl ClassifierConfig {
    /// Trim + lowercase every phrase, drop empties and duplicates.
    /// Category names are trimmed; categories left without phrases are dropped.
    pub fn cleaned(self) -> Self {
        let mut categories = BTreeMap::new();
        for (name, phrases) in self.categories {
            let name = name.trim().to_string();
            let phrases = clean_list(phrases);
            if name.is_empty() || phrases.is_empty() {
                continue;
            }
            categories
                .entry(name)
                .or_insert_with(Vec::new)
                .extend(phrases);
        }
        for phrases in categories.values_mut() {
            phrases.sort();
            phrases.dedup();
        }
        Self {
            categories,
            locations: clean_list(self.locations),
        }
    }

    /// Built-in Bengaluru tables, used when no config file is present.
    pub fn default_seed() -> Self {
        let mut categories = BTreeMap::new();
        for (name, phrases) in [
            (
                "traffic",
                &[
                    "traffic",
                    "jam",
                    "congestion",
                    "road",
                    "flyover",
                    "accident",
                    "diversion",
                    "slow moving",
                    "blockade",
                ][..],
            ),
            (
                "civic_issue",
                &[
                    "water logging",
                    "water-logged",
                    "pothole",
                    "garbage",
                    "waste",
                    "fallen tree",
                    "tree fall",
                    "sewage",
                    "drainage",
                    "water supply",
                ][..],
            ),
            (
                "power_cut",
                &[
                    "power cut",
                    "outage",
                    "no electricity",
                    "bescom",
                    "power failure",
                ][..],
            ),
            (
                "cultural_event",
                &[
                    "exhibition",
                    "concert",
                    "festival",
                    "market",
                    "sante",
                    "play",
                    "performance",
                    "flash mob",
                    "carnival",
                    "mela",
                ][..],
            ),
            (
                "crime",
                &["theft", "robbery", "murder", "assault", "arrested", "police"][..],
            ),
        ] {
            categories.insert(
                name.to_string(),
                phrases.iter().map(|p| p.to_string()).collect(),
            );
        }

        let locations = [
            "koramangala",
            "hsr layout",
            "indiranagar",
            "marathahalli",
            "whitefield",
            "btm layout",
            "jayanagar",
            "jp nagar",
            "bellandur",
            "electronic city",
            "majestic",
            "mg road",
            "hebbal",
            "sarjapur",
            "old airport road",
            "silk board",
            "tin factory",
            "yelahanka",
            "manyata tech park",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            categories,
            locations,
        }
        .cleaned()
    }
}

/// Immutable, pre-normalized matcher built from a [`ClassifierConfig`].
#[derive(Debug, Clone)]
pub struct Classifier {
    categories: Vec<(String, Vec<String>)>,
    // (lowercase needle, display name)
    locations: Vec<(String, String)>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let config = config.cleaned();
        let categories = config.categories.into_iter().collect();
        let locations = config
            .locations
            .into_iter()
            .map(|loc| {
                let display = title_case(&loc);
                (loc, display)
            })
            .collect();
        Self {
            categories,
            locations,
        }
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    /// Classify `text` (`&str` or `Option<&str>`).
    pub fn classify<'a>(&self, text: impl Into<Option<&'a str>>) -> Analysis {
        self.classify_with_tags(text, std::iter::empty::<&str>())
    }

    /// Like [`Classifier::classify`], but unions source-provided tags (feed
    /// categories, forum flair) into the category set before the `general`
    /// fallback is applied.
    pub fn classify_with_tags<'a, I, S>(&self, text: impl Into<Option<&'a str>>, tags: I) -> Analysis
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lower = text.into().unwrap_or_default().to_lowercase();

        let mut categories = BTreeSet::new();
        let mut mentioned_locations = BTreeSet::new();

        if !lower.is_empty() {
            for (name, phrases) in &self.categories {
                if phrases.iter().any(|p| lower.contains(p.as_str())) {
                    categories.insert(name.clone());
                }
            }
            for (needle, display) in &self.locations {
                if lower.contains(needle.as_str()) {
                    mentioned_locations.insert(display.clone());
                }
            }
        }

        for tag in tags {
            let tag = tag.as_ref().trim();
            if !tag.is_empty() {
                categories.insert(tag.to_string());
            }
        }

        if categories.is_empty() {
            categories.insert(GENERAL_CATEGORY.to_string());
        }

        Analysis {
            categories,
            mentioned_locations,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default_seed())
    }
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let set: BTreeSet<String> = items
        .into_iter()
        .map(|it| it.trim().to_lowercase())
        .filter(|it| !it.is_empty())
        .collect();
    set.into_iter().collect()
}
