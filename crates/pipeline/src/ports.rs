//! Port traits implemented by infrastructure crates.
//!
//! The domain defines *what* it needs from the outside world; the `llm`,
//! `detector` and `store` crates define *how*. Upstream ports return the raw
//! JSON body so that shape validation stays in the orchestration layer.

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    Conversation, Identity, ModelId, ProviderError, StoreError, SubscriptionRecord, Timestamp,
};

// ---------------------------------------------------------------------------
// Upstream services
// ---------------------------------------------------------------------------

/// A chat-completion request: model identifier plus ordered messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: ModelId,
    /// Conversation, instruction included.
    pub messages: Conversation,
}

impl ChatRequest {
    /// Creates a request.
    pub fn new(model: ModelId, messages: Conversation) -> Self {
        Self { model, messages }
    }
}

/// A chat-completion endpoint.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Sends one completion request and returns the decoded JSON body.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Throttled`] for transient HTTP 429, other variants for
    /// transport, configuration, or non-JSON bodies.
    async fn complete(&self, request: &ChatRequest) -> Result<serde_json::Value, ProviderError>;
}

/// An AI-text-detection endpoint.
#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Service name for logs (e.g. `"gptzero"`).
    fn name(&self) -> &str;

    /// Submits `text` for analysis and returns the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Same classification as [`LlmProvider::complete`].
    async fn detect(&self, text: &str) -> Result<serde_json::Value, ProviderError>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Per-identity usage counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Current count; `0` when no record exists.
    async fn count(&self, identity: &Identity) -> Result<u32, StoreError>;

    /// Atomically adds one, creating the record if needed and never exceeding
    /// `ceiling`. Returns the new count.
    ///
    /// Implementations must not read-then-write; concurrent increments for the
    /// same identity must all be counted (up to the ceiling).
    async fn increment(&self, identity: &Identity, ceiling: u32) -> Result<u32, StoreError>;
}

/// Read access to billing subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Looks up the subscription for `identity`. `Ok(None)` when absent.
    async fn find(&self, identity: &Identity) -> Result<Option<SubscriptionRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Source of "now" for entitlement checks.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> Timestamp;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
