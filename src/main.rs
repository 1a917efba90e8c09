//! Address tagger CLI.
//!
//! Commands:
//! - `init`: tag every address (or the first `--limit`) and store the labels
//! - `update`: re-tag addresses active in the last `--days` days
//! - `address <id>`: evaluate one address and print its labels
//! - `report`: label statistics over the whole store
//! - `export-json <path>` / `export-csv <path>`: dump every stored label

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use address_tagger::capability::mock::SeededMockProvider;
use address_tagger::capability::CapabilityProvider;
use address_tagger::config::{AppConfig, LoggingConfig};
use address_tagger::engine::report::{log_statistics, log_summary};
use address_tagger::engine::{BatchSummary, TaggingEngine};
use address_tagger::store::sqlite::SqliteStore;

#[derive(Parser)]
#[command(
    name = "address-tagger",
    about = "Behavioral labelling engine for prediction-market trading addresses"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Serve enrichment lookups from seeded synthetic data.
    #[arg(long, global = true, default_value_t = false)]
    use_mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tag every address and store the labels.
    Init {
        /// Only process the first N addresses by id.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Re-tag recently active addresses, replacing their automatic labels.
    Update {
        /// Activity window in days. Defaults to `engine.update_lookback_days`.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Evaluate a single address without storing anything.
    Address {
        /// Address id.
        id: i64,
    },
    /// Print label statistics.
    Report,
    /// Export every stored label as JSON.
    ExportJson { path: PathBuf },
    /// Export every stored label as CSV.
    ExportCsv { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config.to_string_lossy())?;

    init_logging(&cfg.logging);

    let url = cfg.database.resolved_url();
    let store = Arc::new(SqliteStore::connect(&url, cfg.database.max_connections).await?);
    store.migrate().await?;

    let capabilities: Arc<dyn CapabilityProvider> = if cli.use_mock {
        warn!("Using seeded mock capabilities; labels are for demonstration only");
        Arc::new(SeededMockProvider::default())
    } else {
        store.clone()
    };

    let engine = TaggingEngine::from_config(&cfg, store.clone(), store, capabilities);

    match cli.command {
        Commands::Init { limit } => {
            let summary = engine.tag_all(limit).await?;
            log_summary(&summary);
            print_summary("Initial tagging complete", &summary);
        }
        Commands::Update { days } => {
            let days = days.unwrap_or(engine.settings().update_lookback_days);
            let summary = engine.update_recent(days).await?;
            log_summary(&summary);
            print_summary("Update complete", &summary);
        }
        Commands::Address { id } => {
            let Some(labels) = engine.tag_entity(id).await? else {
                bail!("address {id} not found");
            };
            println!("\nLabels of address {id}:");
            if labels.is_empty() {
                println!("  (none)");
            }
            for label in &labels {
                println!("  {label}");
            }
        }
        Commands::Report => {
            let stats = engine.report().await?;
            log_statistics(&stats);
            println!("\nLabel statistics");
            println!("   Addresses:           {}", stats.total_entities);
            println!("   Labelled addresses:  {}", stats.labelled_entities);
            println!("   Coverage:            {:.1}%", stats.coverage * 100.0);
            println!("   Labels:              {}", stats.total_labels);
            println!("   Labels per address:  {:.2}", stats.avg_labels_per_entity);
            println!("\nTop labels:");
            for count in stats.distribution.iter().take(10) {
                println!("   [{}] {}: {}", count.category, count.label_name, count.count);
            }
        }
        Commands::ExportJson { path } => {
            let records = engine.export_json(&path).await?;
            println!("\nExported {records} labels to {}", path.display());
        }
        Commands::ExportCsv { path } => {
            let records = engine.export_csv(&path).await?;
            println!("\nExported {records} labels to {}", path.display());
        }
    }

    info!("Done");
    Ok(())
}

fn print_summary(title: &str, summary: &BatchSummary) {
    println!("\n{title}");
    println!(
        "   Labelled addresses:  {}/{}",
        summary.entities_labelled, summary.entities_total
    );
    println!("   Skipped:             {}", summary.entities_skipped);
    println!("   Labels:              {}", summary.total_labels);
}

/// Initialise the `tracing` subscriber.
///
/// `RUST_LOG` overrides `[logging] level`; `TAGGER_LOG_JSON` forces JSON output.
fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let json_logging = cfg.json || std::env::var("TAGGER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
