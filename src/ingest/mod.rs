// src/ingest/mod.rs
pub mod normalize;
pub mod providers;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::PulseError;
use crate::event::SourceType;
use crate::ingest::normalize::Normalizer;
use crate::ingest::types::SourceProvider;
use crate::store::{upsert_batch, EventSink};

/// Max chars kept from a single cleaned field.
const MAX_FIELD_CHARS: usize = 4_000;

/// One-time metrics registration (so series show up in the exported text).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_records_total", "Raw records fetched from providers.");
        describe_counter!(
            "ingest_rejected_total",
            "Records rejected during normalization."
        );
        describe_counter!("ingest_inserted_total", "Events newly stored.");
        describe_counter!(
            "ingest_duplicates_total",
            "Events skipped because their link was already stored."
        );
        describe_counter!("ingest_store_errors_total", "Per-event storage failures.");
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Clean feed text: decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // Curly quotes → ASCII so keyword phrases still match.
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    let chars = out.chars().count();
    if chars > MAX_FIELD_CHARS {
        tracing::debug!(target: "ingest", chars, kept = MAX_FIELD_CHARS, "field truncated");
        out = out.chars().take(MAX_FIELD_CHARS).collect();
    }
    out
}

/// Outcome of one provider's fetch → normalize → store cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub kind: SourceType,
    pub fetched: usize,
    pub normalized: usize,
    pub rejected: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub fetch_error: Option<String>,
}

impl SourceReport {
    fn empty(source: &str, kind: SourceType) -> Self {
        Self {
            source: source.to_string(),
            kind,
            fetched: 0,
            normalized: 0,
            rejected: 0,
            inserted: 0,
            duplicates: 0,
            failed: 0,
            fetch_error: None,
        }
    }
}

/// Totals for one source type (all feeds, or the forum).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindTotals {
    pub fetched: usize,
    pub inserted: usize,
}

pub fn totals_for(reports: &[SourceReport], kind: SourceType) -> KindTotals {
    reports
        .iter()
        .filter(|r| r.kind == kind)
        .fold(KindTotals::default(), |acc, r| KindTotals {
            fetched: acc.fetched + r.normalized,
            inserted: acc.inserted + r.inserted,
        })
}

/// Fetch one provider, normalize its records and store the events.
/// A failed fetch is contained: the report carries the error and zero events.
pub async fn run_source(
    provider: &dyn SourceProvider,
    normalizer: &Normalizer,
    sink: &dyn EventSink,
    now: DateTime<Utc>,
) -> SourceReport {
    ensure_metrics_described();
    let mut report = SourceReport::empty(provider.name(), provider.kind());

    let t0 = std::time::Instant::now();
    let fetched = match provider.fetch_latest().await {
        Ok(v) => v,
        Err(e) => {
            let err = PulseError::SourceFetch {
                source_name: provider.name().to_string(),
                reason: format!("{e:#}"),
            };
            tracing::warn!(target: "ingest", provider = provider.name(), error = %err, "provider error");
            counter!("ingest_provider_errors_total").increment(1);
            report.fetch_error = Some(err.to_string());
            return report;
        }
    };
    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    // Records the provider could not decode were fetched and rejected all the same.
    report.fetched = fetched.records.len() + fetched.skipped;
    counter!("ingest_records_total").increment(report.fetched as u64);

    let batch = normalizer.normalize_batch(fetched.records, now);
    report.normalized = batch.events.len();
    report.rejected = batch.rejected() + fetched.skipped;
    counter!("ingest_rejected_total").increment(report.rejected as u64);

    let outcome = upsert_batch(sink, &batch.events);
    report.inserted = outcome.inserted;
    report.duplicates = outcome.duplicates;
    report.failed = outcome.failed + outcome.rejected;
    counter!("ingest_inserted_total").increment(outcome.inserted as u64);
    counter!("ingest_duplicates_total").increment(outcome.duplicates as u64);
    counter!("ingest_store_errors_total").increment(outcome.failed as u64);

    tracing::info!(
        target: "ingest",
        provider = provider.name(),
        fetched = report.fetched,
        rejected = report.rejected,
        inserted = report.inserted,
        duplicates = report.duplicates,
        failed = report.failed,
        "source done"
    );
    report
}

/// Run every provider once, strictly one after another.
pub async fn run_once(
    providers: &[Box<dyn SourceProvider>],
    normalizer: &Normalizer,
    sink: &dyn EventSink,
) -> Vec<SourceReport> {
    let mut reports = Vec::with_capacity(providers.len());
    for p in providers {
        let now = Utc::now();
        reports.push(run_source(p.as_ref(), normalizer, sink, now).await);
    }
    gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
    reports
}
