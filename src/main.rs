//! guard-discovery CLI: mine decision point guards from a projected event log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use guard_discovery::config::{DiscoveryConfig, StrategyKind};
use guard_discovery::discovery::{
    DecisionPoint, DecisionPointResult, ProjectedLog, RuleDiscovery, infer_schema,
};

#[derive(Parser)]
#[command(name = "guard-discovery", version, about = "Decision rule discovery for process models")]
struct Cli {
    /// TOML configuration file; command line flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine guards for every decision point and print them as JSON.
    Discover {
        /// Projected event log (JSON).
        #[arg(long)]
        log: PathBuf,

        /// Decision points and their branches (JSON array).
        #[arg(long)]
        decision_points: PathBuf,

        /// Guard engine.
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,

        /// Worker threads (defaults to one per core).
        #[arg(long)]
        threads: Option<usize>,

        /// Include the trained tree of every decision point.
        #[arg(long)]
        summaries: bool,
    },

    /// Print the attribute schema inferred from a log.
    Schema {
        /// Projected event log (JSON).
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Serialize)]
struct DiscoverOutput<'a> {
    results: &'a BTreeMap<String, DecisionPointResult>,
    failures: BTreeMap<&'a str, String>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&content).into_diagnostic()
}

/// An error and its causes on one line.
fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DiscoveryConfig::load(path)?,
        None => DiscoveryConfig::default(),
    };

    match cli.command {
        Commands::Discover {
            log,
            decision_points,
            strategy,
            threads,
            summaries,
        } => {
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if threads.is_some() {
                config.threads = threads;
            }
            let log: ProjectedLog = read_json(&log)?;
            let points: Vec<DecisionPoint> = read_json(&decision_points)?;

            let discovery = RuleDiscovery::new(config)?;
            let mut report = discovery.discover(&log, &points);
            if !summaries {
                for result in report.results.values_mut() {
                    result.summary.clear();
                }
            }

            let failures: BTreeMap<&str, String> = report
                .failures
                .iter()
                .map(|(point, error)| (point.as_str(), describe(error)))
                .collect();
            let output = DiscoverOutput {
                results: &report.results,
                failures,
            };
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }

        Commands::Schema { log } => {
            let log: ProjectedLog = read_json(&log)?;
            let schema = infer_schema(&log, &config);
            println!("{}", serde_json::to_string_pretty(&schema).into_diagnostic()?);
        }
    }

    Ok(())
}
