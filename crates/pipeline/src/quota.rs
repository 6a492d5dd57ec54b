//! Free-tier quota and subscription entitlement rules.
//!
//! [`SubscriptionOracle`] answers whether an identity is exempt from the
//! free-tier ceiling; [`QuotaGate`] enforces the ceiling for everyone else.
//! Callers consult the oracle first and must never increment an entitled
//! identity.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Clock, Identity, StoreError, SubscriptionRecord, SubscriptionStore, Timestamp, UsageStore};

/// Free operations per identity when nothing else is configured.
pub const DEFAULT_FREE_LIMIT: u32 = 100;

/// Grace window added to a subscription's period end to absorb billing-cycle
/// clock skew.
pub const ENTITLEMENT_GRACE: Duration = Duration::from_millis(86_400_000);

/// Whether `detect` runs are gated and charged like LLM runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPolicy {
    /// Detection is a read-only check: never gated, never charged.
    #[default]
    Free,
    /// Detection is authorized and charged like any other pipeline.
    Metered,
}

// ---------------------------------------------------------------------------
// Quota gate
// ---------------------------------------------------------------------------

/// Enforces the free-tier ceiling over a [`UsageStore`].
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn UsageStore>,
    limit: u32,
}

impl QuotaGate {
    /// Creates a gate with the given ceiling.
    pub fn new(store: Arc<dyn UsageStore>, limit: u32) -> Self {
        Self { store, limit }
    }

    /// The configured ceiling.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Current usage count for `identity`.
    pub async fn count(&self, identity: &Identity) -> Result<u32, StoreError> {
        self.store.count(identity).await
    }

    /// Returns `true` while the identity is below the ceiling.
    pub async fn authorize(&self, identity: &Identity) -> Result<bool, StoreError> {
        let count = self.store.count(identity).await?;
        let allowed = count < self.limit;
        debug!(%identity, count, limit = self.limit, allowed, "quota checked");
        Ok(allowed)
    }

    /// Records one completed chargeable run. Returns the new count.
    pub async fn increment(&self, identity: &Identity) -> Result<u32, StoreError> {
        let count = self.store.increment(identity, self.limit).await?;
        debug!(%identity, count, limit = self.limit, "quota incremented");
        Ok(count)
    }
}

impl std::fmt::Debug for QuotaGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGate")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Subscription oracle
// ---------------------------------------------------------------------------

/// Applies the entitlement formula to a record at time `now`.
///
/// Entitled iff a price is present and `period_end + grace > now`.
pub fn is_entitled_at(record: &SubscriptionRecord, now: Timestamp) -> bool {
    let Some(period_end) = record.current_period_end else {
        return false;
    };
    let grace_ms = ENTITLEMENT_GRACE.as_millis() as i64;
    record.price_id.is_some() && period_end.epoch_millis().saturating_add(grace_ms) > now.epoch_millis()
}

/// Answers whether an identity currently has unlimited use.
#[derive(Clone)]
pub struct SubscriptionOracle {
    store: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionOracle {
    /// Creates an oracle reading from `store` with time from `clock`.
    pub fn new(store: Arc<dyn SubscriptionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns `true` if the identity holds an active subscription.
    ///
    /// A missing record is `Ok(false)`; only store failures are errors.
    pub async fn is_entitled(&self, identity: &Identity) -> Result<bool, StoreError> {
        let Some(record) = self.store.find(identity).await? else {
            debug!(%identity, "no subscription found");
            return Ok(false);
        };
        let entitled = is_entitled_at(&record, self.clock.now());
        debug!(%identity, entitled, "subscription checked");
        Ok(entitled)
    }
}

impl std::fmt::Debug for SubscriptionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionOracle").finish_non_exhaustive()
    }
}
