//! # Calibration Store CLI (`calib`)
//!
//! ## Usage
//!
//! ```bash
//! calib --config ./config/calib.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `calib init` | Create the SQLite database and schema |
//! | `calib process` | Ingest every calibration file in the configured directory |
//! | `calib query <KEY>...` | Print stored values for keys as JSON |
//! | `calib files` | List ingested calibration files |
//! | `calib content <FILENAME>` | Print a file's raw content |
//! | `calib serve` | Start the HTTP API |

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use calibration_store::config::{self, Config};
use calibration_store::migrate;
use calibration_store::server;
use calibration_store::service::{CalibrationService, ServiceSettings};
use calibration_store::store::SqliteStore;

/// Calibration Store CLI — ingest and query instrument calibration files.
#[derive(Parser)]
#[command(
    name = "calib",
    about = "Ingest instrument calibration files and query their key/value records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/calib.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Parse and store every calibration file in a directory.
    ///
    /// Re-processing replaces the records of each file, so repeated runs
    /// never duplicate rows.
    Process {
        /// Directory to scan instead of `[ingest].directory`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Look up stored values by key (exact, case-sensitive).
    Query {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List ingested calibration files.
    Files,

    /// Print the raw content of an ingested file.
    Content { filename: String },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

async fn open_service(cfg: &Config) -> anyhow::Result<CalibrationService> {
    let store = SqliteStore::open(cfg).await?;
    Ok(CalibrationService::new(
        Arc::new(store),
        ServiceSettings::from_config(cfg),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Process { dir } => {
            let service = open_service(&cfg).await?;
            let dir = dir.unwrap_or_else(|| service.settings().directory.clone());
            let summary = service.process_directory(&dir).await?;

            println!("process {}", dir.display());
            println!("  files processed: {}", summary.files_processed);
            println!("  records saved: {}", summary.records_saved);
            println!("  errors: {}", summary.errors.len());
            for err in &summary.errors {
                println!("    {}: {}", err.filename, err.reason);
            }
            println!("ok");
        }
        Commands::Query { keys } => {
            let service = open_service(&cfg).await?;
            let result = service.query(&keys).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Files => {
            let service = open_service(&cfg).await?;
            let files = service.list_calibration_files().await?;
            println!("{:<40} {:>8} {:<10} VALID FROM", "FILENAME", "RECORDS", "PANDORA");
            for f in &files {
                let (pandora, valid) = f
                    .metadata
                    .as_ref()
                    .map(|m| (m.pandora_id.as_str(), m.validity_date.as_str()))
                    .unwrap_or(("-", "-"));
                println!(
                    "{:<40} {:>8} {:<10} {}",
                    f.filename, f.record_count, pandora, valid
                );
            }
            println!("{} files", files.len());
        }
        Commands::Content { filename } => {
            let service = open_service(&cfg).await?;
            let content = service.get_content(&filename).await?;
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&content)
                .context("Failed to write content to stdout")?;
            stdout.flush()?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
