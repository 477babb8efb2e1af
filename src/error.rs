// src/error.rs
//! Failure taxonomy for one pipeline run.
//!
//! Only [`PulseError::Setup`] is allowed to halt a run. Every other kind is
//! caught where it happens, logged once and contained to its smallest scope
//! (one source, one record, one event).

use thiserror::Error;

use crate::ingest::normalize::NormalizeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PulseError {
    /// Missing/invalid credentials, unreadable config, unreachable store.
    #[error("setup failed: {0}")]
    Setup(String),

    /// One producer (a feed or the forum) could not be fetched or parsed.
    #[error("source `{source_name}` fetch failed: {reason}")]
    SourceFetch { source_name: String, reason: String },

    /// A single raw record could not be turned into an event.
    #[error("record `{record}` rejected: {source}")]
    Normalize {
        record: String,
        #[source]
        source: NormalizeError,
    },

    /// A single event could not be written.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl PulseError {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn rejected(record: impl Into<String>, source: NormalizeError) -> Self {
        Self::Normalize {
            record: record.into(),
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Setup(_))
    }
}
