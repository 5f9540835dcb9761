//! continuity CLI entry point

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use continuity::{
    commands::{
        cmd_compute, cmd_diagnose, cmd_ingest, cmd_init, cmd_report, cmd_status,
        print_compute_report, print_diagnose_report, print_ingest_report, print_report_summary,
        print_status,
    },
    config::Config,
    error::{Error, Result},
    fetch::HttpFetcher,
    progress::LogWriterFactory,
    store::ChartDb,
    weeks::parse_week,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "continuity")]
#[command(version, about = "Track weekly chart rankings and score track durability", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "CONTINUITY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Fetch, parse and store every tracked chart
    Ingest {
        /// Snapshot date (YYYY-MM-DD), bucketed to its Monday; defaults to this week
        #[arg(long, value_parser = parse_week)]
        snapshot_date: Option<NaiveDate>,
    },

    /// Recompute durability metrics
    Compute {
        /// Latest week to include (YYYY-MM-DD); defaults to the latest snapshot
        #[arg(long, value_parser = parse_week)]
        snapshot_date: Option<NaiveDate>,
    },

    /// Render the HTML report
    Report {
        /// Metrics week to report (YYYY-MM-DD); defaults to each chart's latest
        #[arg(long, value_parser = parse_week)]
        snapshot_date: Option<NaiveDate>,

        /// Output file (defaults to report/index.html next to the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ingest, compute and report in one go
    RunAll {
        /// Snapshot date (YYYY-MM-DD); defaults to this week
        #[arg(long, value_parser = parse_week)]
        snapshot_date: Option<NaiveDate>,
    },

    /// Show per-chart snapshot and metrics state
    Status,

    /// Fetch and parse every chart without storing, saving debug artifacts
    Diagnose {
        /// Date used to name the debug directory (YYYY-MM-DD)
        #[arg(long, value_parser = parse_week)]
        snapshot_date: Option<NaiveDate>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Init { force } => {
            let result = cmd_init(&config_path, force).await?;
            if cli.json {
                print_json(&result)?;
            } else {
                if result.config_written {
                    println!("✓ continuity initialized");
                } else {
                    println!("✓ Existing config kept (use --force to overwrite)");
                }
                println!("  Config: {}", result.config_path.display());
                println!("  Database: {}", result.db_path.display());
                println!("\nNext steps:");
                println!("  1. Edit the config file to adjust tracked charts");
                println!("  2. Run: continuity run-all");
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "continuity", &mut std::io::stdout());
        }

        Commands::Ingest { snapshot_date } => {
            let (config, db) = open(&config_path).await?;
            let fetcher = HttpFetcher::new(&config.fetch)?;
            let report = cmd_ingest(&config, &db, &fetcher, snapshot_date).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_ingest_report(&report);
            }
        }

        Commands::Compute { snapshot_date } => {
            let (_config, db) = open(&config_path).await?;
            let report = cmd_compute(&db, snapshot_date).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_compute_report(&report);
            }
        }

        Commands::Report {
            snapshot_date,
            output,
        } => {
            let (config, db) = open(&config_path).await?;
            let (data, summary) =
                cmd_report(&config, &db, snapshot_date, output.as_deref()).await?;
            if cli.json {
                print_json(&data)?;
            } else {
                print_report_summary(&summary);
            }
        }

        Commands::RunAll { snapshot_date } => {
            let (config, db) = open(&config_path).await?;
            let fetcher = HttpFetcher::new(&config.fetch)?;

            let ingest = cmd_ingest(&config, &db, &fetcher, snapshot_date).await?;
            let compute = cmd_compute(&db, Some(ingest.snapshot_date)).await?;
            let (_data, summary) = cmd_report(&config, &db, None, None).await?;

            if cli.json {
                print_json(&serde_json::json!({
                    "ingest": ingest,
                    "compute": compute,
                    "report": summary,
                }))?;
            } else {
                print_ingest_report(&ingest);
                print_compute_report(&compute);
                print_report_summary(&summary);
            }
        }

        Commands::Status => {
            let (config, db) = open(&config_path).await?;
            let status = cmd_status(&config, &db).await?;
            if cli.json {
                print_json(&status)?;
            } else {
                print_status(&status);
            }
        }

        Commands::Diagnose { snapshot_date } => {
            let config = load_config(&config_path)?;
            let fetcher = HttpFetcher::new(&config.fetch)?;
            let report = cmd_diagnose(&config, &fetcher, snapshot_date).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_diagnose_report(&report);
            }
            return Ok(report.exit_code());
        }
    }

    Ok(0)
}

/// Config file path: explicit file, file inside an explicit directory, or the default
fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => p.to_path_buf(),
        Some(dir) => dir.join("config.toml"),
        None => Config::default_config_path(),
    }
}

fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        debug!("Config file not found: {}", config_path.display());
        return Err(Error::NotInitialized);
    }
    Config::load(config_path)
}

async fn open(config_path: &Path) -> Result<(Config, ChartDb)> {
    let config = load_config(config_path)?;
    let db = ChartDb::new(&config.paths.db_file).await?;
    Ok((config, db))
}
