//! flexflow - declarative state machine engine
//!
//! Loads definitions, creates entities and triggers events against a local
//! store from the command line.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, StorageBackend};
use flexflow_core::{DefinitionStore, EntityService, EntityStore, PluginRegistry};
use flexflow_storage::{seed_definitions, FileStore, MemoryStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flexflow")]
#[command(about = "Declarative state machine engine")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "FLEXFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a machine definition from a JSON file
    Load {
        /// Definition file
        file: PathBuf,
    },

    /// Create an entity at its machine's initial state
    Create {
        /// Business id of the new entity
        business_id: String,

        /// Machine id to bind the entity to
        machine_id: String,
    },

    /// Trigger an event on an entity
    Trigger {
        /// Business id
        business_id: String,

        /// Event name
        event: String,

        /// Header as key=value (value parsed as JSON when possible)
        #[arg(short = 'H', long = "header", value_parser = commands::parse_header)]
        headers: Vec<(String, Value)>,
    },

    /// Show an entity
    Get {
        /// Business id
        business_id: String,
    },

    /// List events that have a transition from the entity's current state
    Events {
        /// Business id
        business_id: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::debug!(
        "Storage backend: {:?}, data directory: {}",
        config.storage.backend,
        config.storage.data_dir.display()
    );

    let registry = Arc::new(PluginRegistry::with_builtins()?);

    let service = match config.storage.backend {
        StorageBackend::Memory => open_service(Arc::new(MemoryStore::new()), registry, &config)?,
        StorageBackend::File => {
            let store = FileStore::open(&config.storage.data_dir)?;
            open_service(Arc::new(store), registry, &config)?
        }
    };

    match commands::execute(&service, cli.command) {
        Ok(output) => {
            println!("{}", commands::format_json(&output));
        }
        Err(e) => {
            eprintln!("{} [{}]: {}", "Error".red(), e.error_code(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Seeds definitions into the store, then builds the service and compiles
/// every seeded machine so plugin errors surface at startup.
fn open_service<S>(
    store: Arc<S>,
    registry: Arc<PluginRegistry>,
    config: &Config,
) -> Result<EntityService, Box<dyn std::error::Error>>
where
    S: DefinitionStore + EntityStore + 'static,
{
    let mut seeded = Vec::new();
    if let Some(dir) = &config.definitions.seed_dir {
        let report = seed_definitions(store.as_ref(), dir)?;
        tracing::info!(
            "Seeded {} definition(s) from {}, {} already present",
            report.loaded.len(),
            dir.display(),
            report.skipped.len()
        );
        seeded.extend(report.loaded);
        seeded.extend(report.skipped);
    }

    let service = EntityService::new(store, registry);
    for machine_id in &seeded {
        service.machine(machine_id)?;
    }

    Ok(service)
}
