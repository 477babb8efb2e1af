// src/cli.rs
//! Command-line surface of the `city-pulse` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Collect city event mentions from news feeds and a subreddit into SQLite.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Config file (TOML or JSON). Defaults to $PULSE_CONFIG_PATH, then config/pulse.{toml,json}
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the SQLite database path from the config
    #[arg(long, global = true, env = "PULSE_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch every source once and store new events (default)
    Run(RunArgs),
    /// Print the most recently published stored events as JSON lines
    Recent(RecentArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Skip the subreddit even if it is enabled in the config
    #[arg(long)]
    pub no_forum: bool,

    /// Write Prometheus metrics to this file after the run
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct RecentArgs {
    #[arg(short, long, default_value_t = 20)]
    pub limit: usize,

    /// Only events tagged with this category
    #[arg(long)]
    pub category: Option<String>,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default() {
        let cli = Cli::parse_from(["city-pulse"]);
        assert_eq!(cli.command(), Command::Run(RunArgs::default()));
        assert!(!cli.json_logs);
    }

    #[test]
    fn recent_with_filters_and_global_flags() {
        let cli = Cli::parse_from([
            "city-pulse",
            "recent",
            "--category",
            "traffic",
            "-l",
            "5",
            "--db",
            "/tmp/p.sqlite3",
        ]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/p.sqlite3")));
        assert_eq!(
            cli.command(),
            Command::Recent(RecentArgs {
                limit: 5,
                category: Some("traffic".into())
            })
        );
    }

    #[test]
    fn run_flags() {
        let cli = Cli::parse_from(["city-pulse", "run", "--no-forum", "--metrics-file", "m.prom"]);
        match cli.command() {
            Command::Run(args) => {
                assert!(args.no_forum);
                assert_eq!(args.metrics_file, Some(PathBuf::from("m.prom")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
