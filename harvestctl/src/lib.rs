use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use harvest_core::browser::{BrowserError, BrowserHandle, BrowserLauncher, LaunchOverrides};
use harvest_core::captcha::{CaptchaGate, HttpCaptchaSolver, SolverError};
use harvest_core::{
    ConfigBundle, ConfigError, CrawlError, CrawlOptions, CrawlOrchestrator, CrawlStats,
    HarvestConfig, Ledger, LedgerError, Navigator, RecordSink,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("crawl error: {0}")]
    Crawl(#[from] CrawlError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "License-lookup crawl control interface", long_about = None)]
pub struct Cli {
    /// Directory holding harvest.toml and browser.toml
    #[arg(long, default_value = "configs")]
    pub config_dir: PathBuf,
    /// Override for the postal-code ledger CSV
    #[arg(long)]
    pub ledger: Option<PathBuf>,
    /// Override for the record sink CSV
    #[arg(long)]
    pub sink: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl every pending postal code in the ledger
    Run(RunArgs),
    /// Summarize ledger progress
    Status,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the configured headless setting
    #[arg(long)]
    pub headless: Option<bool>,
    /// Navigate and extract without writing the ledger or the sink
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Cap on postal codes attempted this invocation
    #[arg(long)]
    pub max_codes: Option<usize>,
    /// Abort the run on the first failed postal code
    #[arg(long, default_value_t = false)]
    pub stop_on_first_error: bool,
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    pending: usize,
    done: usize,
    total: usize,
}

pub async fn run(cli: Cli) -> Result<()> {
    let bundle = ConfigBundle::from_directory(&cli.config_dir)?;
    let ledger_path = cli
        .ledger
        .clone()
        .unwrap_or_else(|| PathBuf::from(&bundle.harvest.paths.ledger));
    let sink_path = cli
        .sink
        .clone()
        .unwrap_or_else(|| PathBuf::from(&bundle.harvest.paths.sink));

    match &cli.command {
        Commands::Status => status(&cli, &ledger_path),
        Commands::Run(args) => {
            let options = CrawlOptions {
                max_codes_per_run: args.max_codes,
                stop_on_first_error: args.stop_on_first_error,
                dry_run: args.dry_run,
            };
            let overrides = LaunchOverrides {
                headless: args.headless,
            };
            let stats = run_crawl(&bundle, &ledger_path, &sink_path, options, overrides).await?;
            report_stats(&cli, &stats)
        }
    }
}

fn status(cli: &Cli, ledger_path: &Path) -> Result<()> {
    let ledger = Ledger::load(ledger_path)?;
    let (pending, done) = ledger.counts();
    let summary = StatusSummary {
        pending,
        done,
        total: pending + done,
    };
    match cli.format {
        OutputFormat::Text => {
            println!(
                "{} pending, {} done ({} total)",
                summary.pending, summary.done, summary.total
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

async fn run_crawl(
    bundle: &ConfigBundle,
    ledger_path: &Path,
    sink_path: &Path,
    options: CrawlOptions,
    overrides: LaunchOverrides,
) -> Result<CrawlStats> {
    // Setup failures surface before the browser is launched.
    let solver = HttpCaptchaSolver::from_env(bundle.harvest.solver.clone())?;
    let ledger = Ledger::load(ledger_path)?;
    let sink = RecordSink::new(sink_path);

    let launcher = BrowserLauncher::new(bundle.browser.clone());
    let handle = launcher.launch_with_overrides(overrides).await?;

    // The browser is released on both the success and the failure path.
    let outcome = execute(&handle, &bundle.harvest, solver, ledger, sink, options).await;
    if let Err(err) = handle.shutdown().await {
        warn!(error = %err, "browser shutdown reported an error");
    }
    outcome
}

async fn execute(
    handle: &BrowserHandle,
    harvest: &HarvestConfig,
    solver: HttpCaptchaSolver,
    ledger: Ledger,
    sink: RecordSink,
    options: CrawlOptions,
) -> Result<CrawlStats> {
    let session = handle.new_session().await?;
    let gate = CaptchaGate::new(
        harvest.selectors.clone(),
        harvest.timeouts.clone(),
        &harvest.paths.artifacts_dir,
        Box::new(solver),
    );
    let navigator = Navigator::new(
        Box::new(session),
        gate,
        Duration::from_secs(harvest.timeouts.marker_seconds),
    );
    let mut orchestrator = CrawlOrchestrator::new(
        Box::new(navigator),
        ledger,
        sink,
        harvest.crawl.clone(),
        harvest.selectors.clone(),
        options,
    )?;
    Ok(orchestrator.run().await?)
}

fn report_stats(cli: &Cli, stats: &CrawlStats) -> Result<()> {
    match cli.format {
        OutputFormat::Text => {
            println!(
                "{} of {} postal codes completed, {} records written, {} pages discarded",
                stats.codes_completed,
                stats.codes_processed,
                stats.records_written,
                stats.pages_discarded
            );
            for error in &stats.errors {
                println!("failed: {error}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::parse_from([
            "harvestctl",
            "--format",
            "json",
            "run",
            "--dry-run",
            "--max-codes",
            "3",
        ]);
        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Run(args) => {
                assert!(args.dry_run);
                assert_eq!(args.max_codes, Some(3));
                assert!(!args.stop_on_first_error);
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn status_reads_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("zip_codes.csv");
        std::fs::write(&ledger_path, "zip_code,status\n00501,Done\n00544,Pending\n").unwrap();

        let cli = Cli::parse_from(["harvestctl", "status"]);
        status(&cli, &ledger_path).unwrap();
    }

    #[test]
    fn missing_ledger_is_a_setup_failure() {
        let cli = Cli::parse_from(["harvestctl", "status"]);
        let err = status(&cli, Path::new("/nonexistent/zip_codes.csv")).unwrap_err();
        assert!(matches!(err, AppError::Ledger(_)));
    }
}
