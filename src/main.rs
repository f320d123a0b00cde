use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aios_tribunal::{
    config::{Config, LogFormat},
    docket::{import_docket, Docket},
    server::{self, AppState},
    stats::{StatsEngine, StatsMode},
    storage::SqliteStorage,
};

/// AIOS tribunal server
#[derive(Parser, Debug)]
#[command(name = "aios-tribunal", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Print the displayed stats for a case as JSON
    Stats {
        /// Case to compute stats for
        #[arg(long)]
        case_id: String,

        /// atmosphere, real, or hybrid
        #[arg(long)]
        mode: Option<StatsMode>,

        /// Evaluate at this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Upsert cases, seeds, and arguments from a JSON docket
    ImportDocket {
        /// Path to the docket file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "AIOS tribunal starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = Arc::new(AppState::new(config, storage));
            if let Err(e) = server::serve(state).await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
            info!("Server shutdown complete");
        }
        Command::Stats { case_id, mode, at } => {
            let mode = mode.unwrap_or(config.tribunal.default_stats_mode);
            let now = at.unwrap_or_else(Utc::now);

            let stats = StatsEngine::new(storage)
                .snapshot(&case_id, mode, now)
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::ImportDocket { path } => {
            let docket = Docket::load(&path)?;
            let summary = import_docket(&storage, &docket, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
