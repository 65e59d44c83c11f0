//! Delegates API daemon
//!
//! ## Usage
//!
//! ```bash
//! # Recompute rankings for some governances
//! delegates-api compute test.eth s-tn:0x1234
//!
//! # Print the stored aggregate for a governance
//! delegates-api governance test.eth
//!
//! # Print the current ranking, or the ranking at a past sequence value
//! delegates-api delegates test.eth
//! delegates-api delegates test.eth --at 12
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use delegates_api::{Config, DelegatesDb, Orchestrator, Pipeline, PipelineSettings, SystemClock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "delegates-api")]
#[command(about = "Delegate voting power rankings for governance spaces")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "DELEGATES_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Hub URL
    #[arg(long, env = "HUB_URL")]
    hub_url: Option<String>,

    /// Score API URL
    #[arg(long, env = "SCORE_API_URL")]
    score_api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute the given governances and wait for the pass to finish
    Compute {
        #[arg(required = true)]
        governances: Vec<String>,
    },
    /// Print a governance aggregate as JSON
    Governance { id: String },
    /// Print a governance's delegate ranking as JSON
    Delegates {
        governance: String,
        /// Sequence value to read the ranking at (defaults to current)
        #[arg(long)]
        at: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("delegates_api=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(hub_url) = args.hub_url {
        config.hub_url = hub_url;
    }
    if let Some(score_api_url) = args.score_api_url {
        config.score_api_url = score_api_url;
    }

    let db = Arc::new(DelegatesDb::open(&config.database_path).context("opening database")?);

    match args.command {
        Command::Compute { governances } => {
            let pipeline = Pipeline::from_config(&config).context("building pipeline")?;
            let orchestrator = Arc::new(Orchestrator::new(
                pipeline,
                PipelineSettings::from(&config),
                Arc::clone(&db),
                Arc::new(SystemClock),
            )?);

            let report = orchestrator.trigger(governances).await?;
            for (governance, error) in &report.failed {
                warn!(%governance, %error, "Governance failed");
            }
            info!(
                computed = report.computed.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "Compute finished"
            );
        }
        Command::Governance { id } => {
            let row = db.governance(&id)?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
        Command::Delegates { governance, at } => {
            let rows = match at {
                Some(block) => db.delegates_at(&governance, block)?,
                None => db.current_delegates(&governance)?,
            };
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}
