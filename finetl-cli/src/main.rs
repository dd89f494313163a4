//! finetl CLI: run, validate and push-ohlcv commands.
//!
//! Commands:
//! - `run`: run a pipeline from a TOML, YAML or JSON config file
//! - `validate`: parse a config file and print the validated configuration
//! - `push-ohlcv`: download OHLCV bars and publish them to a Hugging Face dataset

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use finetl_core::load::{HfHubClient, HubApi};
use finetl_core::{logging, Pipeline, PipelineReport};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Intervals accepted by `push-ohlcv`.
const PUSH_INTERVALS: [&str; 12] = [
    "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk", "1mo",
];

#[derive(Parser)]
#[command(
    name = "finetl",
    version,
    about = "Extract market data and load it into files, datasets or databases"
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a config file.
    Run {
        /// Path to a .toml, .yaml/.yml or .json config file.
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Validate a config file and print the result.
    Validate {
        /// Path to a .toml, .yaml/.yml or .json config file.
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Download OHLCV bars and push them to a Hugging Face dataset.
    PushOhlcv {
        /// Target dataset repository (e.g. username/dataset-name).
        #[arg(long)]
        repo_id: String,

        /// Tickers to download.
        #[arg(long, num_args = 1.., default_values_t = ["AAPL".to_string(), "MSFT".to_string(), "GOOGL".to_string()])]
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 1900-01-01.
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end_date: Option<String>,

        /// Bar interval.
        #[arg(long, default_value = "1d", value_parser = PossibleValuesParser::new(PUSH_INTERVALS))]
        interval: String,

        /// Create the dataset as private.
        #[arg(long, default_value_t = false)]
        private: bool,

        /// Create the repository if it does not exist.
        #[arg(long, default_value_t = false)]
        create_repo: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Run { config } => run_pipeline(&config),
        Commands::Validate { config } => run_validate(&config),
        Commands::PushOhlcv {
            repo_id,
            tickers,
            start_date,
            end_date,
            interval,
            private,
            create_repo,
        } => run_push_ohlcv(
            repo_id,
            tickers,
            start_date,
            end_date,
            &interval,
            private,
            create_repo,
        ),
    }
}

fn run_pipeline(config_path: &Path) -> Result<()> {
    let pipeline = Pipeline::from_file(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let report = pipeline
        .run()
        .with_context(|| format!("pipeline '{}' failed", pipeline.config().name))?;
    print_report(&report);
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<()> {
    let pipeline = Pipeline::from_file(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    println!("{}", serde_json::to_string_pretty(pipeline.config())?);
    println!("Configuration is valid.");
    Ok(())
}

fn run_push_ohlcv(
    repo_id: String,
    tickers: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    interval: &str,
    private: bool,
    create_repo: bool,
) -> Result<()> {
    let start_date = start
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("invalid --start-date")?
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default());

    let end_date = end
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("invalid --end-date")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let client = HfHubClient::from_env().context("failed to set up Hugging Face client")?;
    match client.whoami() {
        Ok(user) => info!(user = %user, endpoint = client.endpoint(), "authenticated"),
        Err(e) => {
            eprintln!("Hugging Face credentials check failed: {e}");
            eprintln!("Set HF_TOKEN or run `huggingface-cli login`.");
            std::process::exit(1);
        }
    }

    let exists = client
        .repo_exists(&repo_id)
        .with_context(|| format!("failed to look up repository {repo_id}"))?;
    if !exists {
        if !create_repo {
            eprintln!("Repository {repo_id} does not exist. Re-run with --create-repo to create it.");
            std::process::exit(1);
        }
        client
            .create_repo(&repo_id, private)
            .with_context(|| format!("failed to create repository {repo_id}"))?;
        println!("Created repository {repo_id}");
    }

    let config = json!({
        "name": "push-ohlcv",
        "extraction": {
            "source": "yfinance",
            "tickers": tickers,
            "data_types": {
                "ohlcv": {
                    "enabled": true,
                    "start_date": start_date.to_string(),
                    "end_date": end_date.to_string(),
                    "interval": interval,
                },
                "financials": { "enabled": false },
            },
        },
        "loading": {
            "destination": "huggingface",
            "repo_id": repo_id,
            "private": private,
        },
    });

    let pipeline = Pipeline::from_value(&config).context("invalid push-ohlcv arguments")?;
    let report = pipeline.run().context("push-ohlcv failed")?;
    print_report(&report);
    if report.loaded {
        println!("Dataset available at {}/datasets/{repo_id}", client.endpoint());
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!();
    println!("=== {} ===", report.name);
    println!("OHLCV rows:       {}", report.ohlcv_rows);
    println!("Financials rows:  {}", report.financials_rows);
    if !report.skipped_tickers.is_empty() {
        println!("Skipped tickers:  {}", report.skipped_tickers.join(", "));
    }
    if report.loaded {
        println!("Status:           loaded");
    } else {
        println!("Status:           nothing to load");
    }
}
