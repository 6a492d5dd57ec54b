//! Quillgate pipeline orchestration.
//!
//! This crate sequences calls between the business rules of the [`pipeline`]
//! crate and the upstream adapters behind its port traits: the retry
//! envelope around single upstream calls, the LLM stage runner, the detection
//! normalizer, and the [`Orchestrator`] that drives every pipeline kind.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes contain no domain rules of their own and no
//! I/O; every external effect goes through a `pipeline` port.

pub mod detection;
pub mod orchestrator;
pub mod retry;
pub mod settings;
pub mod stage;

pub use detection::{normalize, DetectionNormalizer};
pub use orchestrator::{Orchestrator, RunState};
pub use retry::{compute_delay, with_retry, RetryConfig};
pub use settings::{
    Instructions, PipelineSettings, DEFAULT_REWRITE_INSTRUCTION, DEFAULT_TARGET_LANGUAGE,
    DEFAULT_TRANSLATE_INSTRUCTION, LANGUAGE_PLACEHOLDER,
};
pub use stage::StageRunner;
