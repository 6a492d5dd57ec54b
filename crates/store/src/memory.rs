//! In-process store backed by [`DashMap`].

use async_trait::async_trait;
use dashmap::DashMap;
use pipeline::{Identity, StoreError, SubscriptionRecord, SubscriptionStore, UsageStore};

/// Volatile usage counters and subscriptions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    usage: DashMap<Identity, u32>,
    subscriptions: DashMap<Identity, SubscriptionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the subscription for `record.identity`.
    pub fn upsert_subscription(&self, record: SubscriptionRecord) {
        self.subscriptions.insert(record.identity.clone(), record);
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn count(&self, identity: &Identity) -> Result<u32, StoreError> {
        Ok(self.usage.get(identity).map(|c| *c).unwrap_or(0))
    }

    async fn increment(&self, identity: &Identity, ceiling: u32) -> Result<u32, StoreError> {
        // The entry guard holds the shard lock for the whole update.
        let mut count = self.usage.entry(identity.clone()).or_insert(0);
        *count = count.saturating_add(1).min(ceiling);
        Ok(*count)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find(&self, identity: &Identity) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(self.subscriptions.get(identity).map(|r| r.clone()))
    }
}
