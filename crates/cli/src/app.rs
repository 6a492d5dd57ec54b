//! Composition root: turns a [`Config`] into a wired [`Orchestrator`].

use std::sync::Arc;

use anyhow::Context;
use detector::GptZeroClient;
use llm::OpenAiCompatProvider;
use nodes::{DetectionNormalizer, Orchestrator, StageRunner};
use pipeline::{QuotaGate, SubscriptionOracle, SubscriptionStore, SystemClock, UsageStore};
use store::{MemoryStore, SqliteStore};
use tracing::info;

use crate::config::{Config, StoreBackend, StoreConfig};

/// The storage handles shared by the quota gate and the subscription oracle.
pub struct Stores {
    pub usage: Arc<dyn UsageStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Present only for the SQLite backend; admin writes go through it.
    pub sqlite: Option<SqliteStore>,
}

/// Opens the configured backend.
pub fn open_stores(config: &StoreConfig) -> anyhow::Result<Stores> {
    match config.backend {
        StoreBackend::Memory => {
            info!(backend = "memory", "usage state will not survive restarts");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                usage: store.clone(),
                subscriptions: store,
                sqlite: None,
            })
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.path)
                .with_context(|| format!("failed to open {}", config.path.display()))?;
            Ok(Stores {
                usage: Arc::new(store.clone()),
                subscriptions: Arc::new(store.clone()),
                sqlite: Some(store),
            })
        }
    }
}

/// Builds the orchestrator with the real HTTP adapters.
pub fn build_orchestrator(config: &Config, stores: &Stores) -> anyhow::Result<Orchestrator> {
    let retry = config.retry_config();

    let llm = OpenAiCompatProvider::new(config.llm.endpoint.clone())
        .context("failed to build LLM provider")?;
    let detector =
        GptZeroClient::new(config.detector.clone()).context("failed to build detection client")?;

    Ok(Orchestrator::new(
        SubscriptionOracle::new(stores.subscriptions.clone(), Arc::new(SystemClock)),
        QuotaGate::new(stores.usage.clone(), config.quota.free_limit),
        StageRunner::new(Arc::new(llm), retry.clone()),
        DetectionNormalizer::new(Arc::new(detector), retry),
        config.pipeline_settings()?,
    ))
}
