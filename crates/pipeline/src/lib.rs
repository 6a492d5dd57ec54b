//! Core orchestration domain for Quillgate.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, quota rule, and cross-cutting error type used throughout the service.
//! Infrastructure crates implement the port traits defined here; they never
//! add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`Identity`, `ModelId`, `PipelineRunId`, ...) |
//! | [`types`] | Shared value types (`Message`, `DetectionFinding`, `Timestamp`, ...) |
//! | [`conversation`] | Immutable conversation builder |
//! | [`request`] | Tagged pipeline requests, validation, and outcomes |
//! | [`payloads`] | Optional-field upstream response records |
//! | [`errors`] | Error taxonomy and retry-policy types |
//! | [`ports`] | Traits implemented by infrastructure crates |
//! | [`quota`] | Quota gate and subscription oracle |

pub mod conversation;
pub mod errors;
pub mod identifiers;
pub mod payloads;
pub mod ports;
pub mod quota;
pub mod request;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use conversation::Conversation;
pub use errors::{
    parse_retry_after, PipelineError, ProviderError, RetryClassification, RetryPolicy,
    StoreError, UpstreamService,
};
pub use identifiers::{CustomerId, Identity, ModelId, PipelineRunId, PriceId, SubscriptionId};
pub use payloads::{
    CompletionChoice, CompletionMessage, CompletionPayload, DetectionDocument, DetectionPayload,
    DetectionSentence,
};
pub use ports::{
    ChatRequest, Clock, DetectionService, LlmProvider, SubscriptionStore, SystemClock, UsageStore,
};
pub use quota::{
    is_entitled_at, DetectionPolicy, QuotaGate, SubscriptionOracle, DEFAULT_FREE_LIMIT,
    ENTITLEMENT_GRACE,
};
pub use request::{PipelineKind, PipelineOutcome, PipelineRequest, MAX_TARGET_LANGUAGE_CHARS};
pub use types::{
    Classification, DetectionFinding, Message, Role, StageResult, SubscriptionRecord, Timestamp,
    UsageStatus,
};
