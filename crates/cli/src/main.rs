//! Quillgate entry point.
//!
//! This binary is the composition root for the entire system:
//!
//! 1. **Parse configuration**: load `quillgate.toml` and validate it.
//! 2. **Wire observability**: configure `tracing-subscriber` with a text or
//!    JSON layer and an optional OpenTelemetry OTLP exporter. All spans and
//!    events emitted by every crate in the workspace flow through it.
//! 3. **Construct infrastructure**: open the usage store and build the LLM
//!    and detection adapters, then inject them into the [`nodes::Orchestrator`].
//! 4. **Dispatch the subcommand**:
//!    - `serve` runs the HTTP API until Ctrl-C.
//!    - `usage` prints one identity's quota status.
//!    - `subscription set` records a paid subscription (SQLite backend only).

mod app;
mod config;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pipeline::{CustomerId, Identity, PriceId, SubscriptionId, SubscriptionRecord, Timestamp};
use server::AppState;
use tracing::info;

use crate::config::{Config, StoreBackend, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "quillgate", version)]
#[command(about = "Usage-gated rewrite, translation and AI-detection pipeline")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "QUILLGATE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// SQLite database path (overrides `store.path`)
    #[arg(long, env = "QUILLGATE_DATABASE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides `server.listen`)
        #[arg(long, env = "QUILLGATE_LISTEN")]
        listen: Option<SocketAddr>,
    },

    /// Print the quota status of one identity
    Usage {
        #[arg(long)]
        identity: String,
    },

    /// Manage subscription records
    #[command(subcommand)]
    Subscription(SubscriptionCommand),
}

#[derive(Subcommand)]
enum SubscriptionCommand {
    /// Insert or replace the subscription for an identity
    Set {
        #[arg(long)]
        identity: String,

        #[arg(long)]
        price_id: String,

        /// End of the paid period, RFC 3339 (e.g. `2030-01-01T00:00:00Z`)
        #[arg(long)]
        period_end: String,

        #[arg(long)]
        customer_id: Option<String>,

        #[arg(long)]
        subscription_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(path) = cli.database {
        config.store.path = path;
    }

    let _telemetry = telemetry::init(&config.telemetry)?;
    info!(config = %cli.config.display(), "configuration loaded");

    match cli.command {
        Command::Serve { listen } => serve(config, listen).await,
        Command::Usage { identity } => usage(&config, &identity).await,
        Command::Subscription(SubscriptionCommand::Set {
            identity,
            price_id,
            period_end,
            customer_id,
            subscription_id,
        }) => {
            let record = SubscriptionRecord {
                identity: parse_identity(&identity)?,
                current_period_end: Some(
                    Timestamp::parse_rfc3339(&period_end)
                        .with_context(|| format!("invalid --period-end '{period_end}'"))?,
                ),
                price_id: Some(PriceId::new(&price_id).context("--price-id must not be empty")?),
                customer_id: customer_id.and_then(CustomerId::new),
                subscription_id: subscription_id.and_then(SubscriptionId::new),
            };
            set_subscription(&config, record).await
        }
    }
}

async fn serve(config: Config, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let stores = app::open_stores(&config.store)?;
    let orchestrator = app::build_orchestrator(&config, &stores)?;
    let identity_header = server::identity_header(&config.server.identity_header)
        .context("invalid server.identity_header")?;

    let addr = listen.unwrap_or(config.server.listen);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        free_limit = config.quota.free_limit,
        detection_policy = ?config.quota.detection_policy,
        "starting quillgate"
    );

    let state = AppState::new(Arc::new(orchestrator), identity_header);
    server::serve(listener, state, shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

async fn usage(config: &Config, identity: &str) -> anyhow::Result<()> {
    let identity = parse_identity(identity)?;
    let stores = app::open_stores(&config.store)?;
    let orchestrator = app::build_orchestrator(config, &stores)?;
    let status = orchestrator.usage(&identity).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn set_subscription(config: &Config, record: SubscriptionRecord) -> anyhow::Result<()> {
    if config.store.backend != StoreBackend::Sqlite {
        bail!("`subscription set` requires store.backend = \"sqlite\"");
    }
    let stores = app::open_stores(&config.store)?;
    let Some(sqlite) = stores.sqlite else {
        bail!("SQLite store unavailable");
    };
    let identity = record.identity.clone();
    sqlite.upsert_subscription(record).await?;
    println!("subscription recorded for {identity}");
    Ok(())
}

fn parse_identity(raw: &str) -> anyhow::Result<Identity> {
    Identity::new(raw.trim()).context("--identity must not be empty")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
