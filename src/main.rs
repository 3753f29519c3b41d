use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use event_radar::{config::AppConfig, db::Store, orchestrator, scraping, utils};

#[derive(Parser)]
#[command(
    name = "event-radar",
    version,
    about = "Scrapes Turkish ticketing sites into a normalized event store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every source (or the named ones) and sync the store
    Run {
        /// Source id to run; repeat for several
        #[arg(long = "source", value_name = "ID")]
        sources: Vec<String>,
        /// Wall-clock cap for the whole run
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List the registered sources
    Sources,
    /// Show stored events ordered by start time
    Events {
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show the most recent run-log rows
    Logs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Dump every stored event to a JSON file
    Export { path: PathBuf },
    /// Print the effective configuration
    Config {
        /// Persist the file configuration (defaults filled in)
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("event_radar=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;

    match cli.command {
        Command::Run {
            sources,
            timeout_secs,
        } => {
            let limit = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.run_timeout());
            let summary = orchestrator::run_with_deadline(config, sources, limit).await?;
            print_json(&summary)?;
        }
        Command::Sources => print_json(&scraping::list_scrapers())?,
        Command::Events { source, limit } => {
            let store = open_store(&config)?;
            print_json(&store.list_events(source.as_deref(), Some(limit))?)?;
        }
        Command::Logs { limit } => {
            let store = open_store(&config)?;
            print_json(&store.recent_logs(limit)?)?;
        }
        Command::Export { path } => {
            let store = open_store(&config)?;
            let events = store.list_events(None, None)?;
            utils::ensure_parent(&path);
            fs::write(&path, serde_json::to_string_pretty(&events)?)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(count = events.len(), path = %path.display(), "exported events");
        }
        Command::Config { write } => {
            if write {
                let path = utils::default_config_path();
                AppConfig::load_from(&path)?.save_to(&path)?;
                info!(path = %path.display(), "config written");
            }
            print_json(&config)?;
        }
    }
    Ok(())
}

fn open_store(config: &AppConfig) -> Result<Store> {
    let path = config.database_path();
    Store::open(&path).with_context(|| format!("opening event store {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
