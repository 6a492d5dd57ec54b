//! Quillgate LLM infrastructure adapter.
//!
//! Implements the [`pipeline::LlmProvider`] trait for any endpoint that speaks
//! the OpenAI chat-completion format.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, authentication, and status
//! classification live here. Response shape validation does not: the raw JSON
//! body is handed back to the orchestration layer.

pub mod config;
pub mod openai;

pub use config::LlmConfig;
pub use openai::OpenAiCompatProvider;
