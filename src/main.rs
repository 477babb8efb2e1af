//! city-pulse binary entrypoint.
//! Loads config, sets up the store and the sources, runs one ingest cycle
//! and prints a per-source summary.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use city_pulse::cli::{Cli, Command, RecentArgs, RunArgs};
use city_pulse::config::PulseConfig;
use city_pulse::event::SourceType;
use city_pulse::ingest::{run_once, totals_for};
use city_pulse::metrics::Metrics;
use city_pulse::{build_http_client, build_normalizer, build_providers, PulseError, SqliteStore};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("city_pulse=info,ingest=info,store=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn load_config(cli: &Cli) -> Result<PulseConfig, PulseError> {
    let mut cfg = match &cli.config {
        Some(path) => PulseConfig::load_from(path),
        None => PulseConfig::load_default(),
    }
    .map_err(|e| PulseError::setup(format!("{e:#}")))?;

    if let Some(db) = &cli.db {
        cfg.database.path = db.clone();
    }
    Ok(cfg)
}

fn open_store(cfg: &PulseConfig) -> Result<SqliteStore, PulseError> {
    let store = SqliteStore::open(&cfg.database.path).map_err(|e| {
        PulseError::setup(format!(
            "could not open store at {}: {e}",
            cfg.database.path.display()
        ))
    })?;
    info!(path = %cfg.database.path.display(), "store ready");
    Ok(store)
}

async fn run(cfg: PulseConfig, args: RunArgs) -> Result<(), PulseError> {
    info!(city = %cfg.city, feeds = cfg.feeds.len(), "starting city pulse scraper");

    let metrics = match &args.metrics_file {
        Some(_) => Some(Metrics::init().map_err(|e| PulseError::setup(format!("{e:#}")))?),
        None => None,
    };

    let store = open_store(&cfg)?;
    let normalizer = build_normalizer(&cfg)?;
    let client = build_http_client(&cfg)?;
    let providers = build_providers(&cfg, &client, !args.no_forum).await?;

    let reports = run_once(&providers, &normalizer, &store).await;

    for r in &reports {
        match &r.fetch_error {
            Some(err) => println!("   ! {}: {err}", r.source),
            None => println!(
                "   {}: fetched {}, added {} new ({} already stored, {} rejected, {} failed)",
                r.source, r.normalized, r.inserted, r.duplicates, r.rejected, r.failed
            ),
        }
    }
    let rss = totals_for(&reports, SourceType::Rss);
    println!(
        "-> RSS: Fetched {} articles, added {} new ones.",
        rss.fetched, rss.inserted
    );
    if reports.iter().any(|r| r.kind == SourceType::Reddit) {
        let reddit = totals_for(&reports, SourceType::Reddit);
        println!(
            "-> Reddit: Fetched {} posts, added {} new ones.",
            reddit.fetched, reddit.inserted
        );
    }

    if let (Some(m), Some(path)) = (&metrics, &args.metrics_file) {
        if let Err(e) = m.write_textfile(path) {
            warn!(error = ?e, "could not write metrics file");
        }
    }

    info!("scraping cycle complete");
    Ok(())
}

fn recent(cfg: PulseConfig, args: RecentArgs) -> Result<(), PulseError> {
    let store = open_store(&cfg)?;
    let events = store
        .recent(args.limit, args.category.as_deref())
        .map_err(PulseError::from)?;
    for ev in events {
        match serde_json::to_string(&ev) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(link = %ev.link_original, error = %e, "could not serialize event"),
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env (REDDIT_* credentials) when present.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let result = match load_config(&cli) {
        Ok(cfg) => match cli.command() {
            Command::Run(args) => run(cfg, args).await,
            Command::Recent(args) => recent(cfg, args),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "halting execution");
            ExitCode::FAILURE
        }
    }
}
