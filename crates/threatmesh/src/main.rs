//! # ThreatMesh Node
//!
//! Main entry point for the ThreatMesh node.
//!
//! This binary provides:
//! - The pipeline loop (aggregate, verify, score, decide, export)
//! - Config scaffolding and validation
//! - An operator tool for checking a score and its action by hand

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use threatmesh::{CycleReport, Pipeline, DEFAULT_CONFIG_FILE, VERSION};
use threatmesh_config::{Config, LoggingConfig, PolicyConfig};
use threatmesh_core::CredibilityEngine;
use threatmesh_credibility::WeightedCredibility;
use threatmesh_policy::PolicyGate;
use threatmesh_types::{
    Action, EvidenceOrigin, SourceKind, ThreatEvidence, ThreatLevel, ThreatType,
    UpstreamCorrelation,
};

/// ThreatMesh node and tools
#[derive(Parser, Debug)]
#[command(name = "threatmesh")]
#[command(author = "ThreatMesh Team")]
#[command(version)]
#[command(about = "ThreatMesh node - consensus-verified threat intelligence")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format: text, json, or compact (defaults to [logging].format)
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Compact,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Text,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run pipeline cycles until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Write an example configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load and validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Compute a credibility score and the action it leads to
    Score {
        /// Configuration whose weights and policy to apply (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Local source confidence
        #[arg(long)]
        initial: f64,

        /// Consensus confidence
        #[arg(long)]
        consensus: f64,

        /// Confidence of a correlated upstream indicator
        #[arg(long)]
        upstream: Option<f64>,

        /// Block threshold (defaults to the configured policy)
        #[arg(long)]
        threshold: Option<f64>,
    },
}

impl Commands {
    fn config_path(&self) -> Option<&Path> {
        match self {
            Commands::Run { config, .. } | Commands::Validate { config } => Some(config.as_path()),
            Commands::Score { config, .. } => config.as_deref(),
            Commands::Init { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging defaults come from the config file when there is one to read.
    let logging = cli
        .command
        .config_path()
        .and_then(|path| Config::load(path).ok())
        .map(|config| config.logging)
        .unwrap_or_default();
    init_tracing(&cli, &logging)?;

    info!(version = VERSION, "Starting ThreatMesh");

    match cli.command {
        Commands::Run { config, once } => handle_run(&config, once).await,
        Commands::Init { output, force } => handle_init(&output, force),
        Commands::Validate { config } => handle_validate(&config),
        Commands::Score {
            config,
            initial,
            consensus,
            upstream,
            threshold,
        } => handle_score(config.as_deref(), initial, consensus, upstream, threshold),
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins, then `-v`, then `[logging].level`.
fn init_tracing(cli: &Cli, logging: &LoggingConfig) -> Result<()> {
    let filter = match cli.verbose {
        0 => {
            let level = logging.level.to_lowercase();
            format!("{level},threatmesh={level}")
        }
        1 => "info,threatmesh=debug".to_string(),
        2 => "debug,threatmesh=debug".to_string(),
        _ => "trace,threatmesh=trace".to_string(),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&logging.format));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(env_filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(env_filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(fmt::layer().compact())
                .with(env_filter)
                .init();
        }
    }

    Ok(())
}

/// Handle the `run` command
async fn handle_run(config_path: &Path, once: bool) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let pipeline = Arc::new(Pipeline::from_config(&config)?);

    if once {
        let report = pipeline.run_cycle().await;
        print_report(&report);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    // The runner may already have stopped; a closed channel is fine.
    let _ = shutdown_tx.send(());

    let cycles = runner.await.context("pipeline task failed")?;
    match pipeline.store().persist() {
        Ok(Some(entries)) => info!(entries, "Final store snapshot written"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to write final store snapshot"),
    }

    info!(cycles, "ThreatMesh stopped");
    Ok(())
}

/// Handle the `init` command
fn handle_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    Config::example().save(output)?;
    info!(path = %output.display(), "Wrote example configuration");

    println!("Configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [[sources]] at your sensor and feed exports");
    println!("  2. List peer nodes under [[consensus.peers]]");
    println!("  3. threatmesh run --config {}", output.display());
    Ok(())
}

/// Handle the `validate` command
fn handle_validate(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    let enabled_sources = config.sources.iter().filter(|s| s.enabled).count();
    let enabled_peers = config.consensus.enabled_peers().count();

    println!("Configuration OK: {}", config_path.display());
    println!("  Node:        {} ({})", config.node.node_id, config.node.region);
    println!(
        "  Sources:     {} configured, {} enabled",
        config.sources.len(),
        enabled_sources
    );
    println!(
        "  Peers:       {} enabled, quorum {}",
        enabled_peers, config.consensus.minimum_quorum
    );
    println!(
        "  Thresholds:  consensus {:.2}, block {:.2}",
        config.consensus.consensus_threshold, config.policy.credibility_threshold
    );
    if enabled_peers < config.consensus.minimum_quorum {
        println!("  Warning:     fewer enabled peers than the quorum; rounds will be undetermined");
    }
    Ok(())
}

/// Handle the `score` command
fn handle_score(
    config_path: Option<&Path>,
    initial: f64,
    consensus: f64,
    upstream: Option<f64>,
    threshold: Option<f64>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    let outcome = manual_score(&config, initial, consensus, upstream, threshold)?;
    println!("Credibility score: {:.3}", outcome.score);
    println!("Block threshold:   {:.3}", outcome.threshold);
    println!("Action:            {}", outcome.action);
    Ok(())
}

/// Result of scoring operator-supplied inputs.
#[derive(Debug)]
struct ManualScore {
    score: f64,
    threshold: f64,
    action: Action,
}

/// Score the inputs with the node's configured weights and policy.
fn manual_score(
    config: &Config,
    initial: f64,
    consensus: f64,
    upstream: Option<f64>,
    threshold: Option<f64>,
) -> Result<ManualScore> {
    let mut evidence = ThreatEvidence::new(
        "0.0.0.0",
        ThreatType::IoCMatch,
        ThreatLevel::Warning,
        EvidenceOrigin::new("operator", SourceKind::LocalSensor),
    )
    .with_initial_score(initial);
    if let Some(confidence) = upstream {
        evidence = evidence.with_upstream(UpstreamCorrelation {
            feed: "operator".to_string(),
            indicator_id: "operator".to_string(),
            confidence,
        });
    }

    let engine = WeightedCredibility::new(&config.credibility)?;
    let score = engine.calculate_credibility_score(&evidence, consensus)?;
    evidence.credibility_score = score;

    let policy = PolicyConfig {
        credibility_threshold: threshold.unwrap_or(config.policy.credibility_threshold),
        ignored_sources: Vec::new(),
    };
    policy.validate()?;
    let gate = PolicyGate::new(&policy);

    Ok(ManualScore {
        score,
        threshold: gate.threshold(),
        action: gate.action_for(&evidence),
    })
}

fn print_report(report: &CycleReport) {
    println!("Cycle complete");
    println!("  Fetched:       {} ({} dropped)", report.fetched, report.dropped);
    println!("  Upserted:      {}", report.upserted);
    println!(
        "  Decisions:     {} block, {} monitor, {} ignore",
        report.count(Action::Block),
        report.count(Action::Monitor),
        report.count(Action::Ignore)
    );
    println!("  Undetermined:  {}", report.undetermined);
    println!(
        "  Failures:      {} items, {} sinks",
        report.failures, report.sink_failures
    );
    if !report.degraded_sources.is_empty() {
        println!("  Degraded:      {}", report.degraded_sources.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_score_defaults() {
        let outcome = manual_score(&Config::default(), 0.6, 0.9, None, None).unwrap();
        // 0.3 * 0.6 + 0.7 * 0.9
        assert!((outcome.score - 0.81).abs() < 1e-9);
        assert_eq!(outcome.threshold, 0.7);
        assert_eq!(outcome.action, Action::Block);
    }

    #[test]
    fn test_manual_score_uses_configured_weights() {
        let mut config = Config::default();
        config.credibility.weights.uncorrelated_local = 0.8;
        config.credibility.weights.uncorrelated_consensus = 0.2;
        config.policy.credibility_threshold = 0.5;

        let outcome = manual_score(&config, 0.6, 0.9, None, None).unwrap();
        // 0.8 * 0.6 + 0.2 * 0.9
        assert!((outcome.score - 0.66).abs() < 1e-9);
        assert_eq!(outcome.threshold, 0.5);
        assert_eq!(outcome.action, Action::Block);

        let outcome = manual_score(&config, 0.6, 0.9, None, Some(0.9)).unwrap();
        assert_eq!(outcome.action, Action::Monitor);
    }

    #[test]
    fn test_manual_score_rejects_out_of_range_inputs() {
        assert!(manual_score(&Config::default(), 1.5, 0.9, None, None).is_err());
        assert!(manual_score(&Config::default(), 0.6, 0.9, None, Some(2.0)).is_err());
    }
}
