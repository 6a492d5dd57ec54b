//! Quillgate AI-detection client adapter.
//!
//! Implements [`pipeline::DetectionService`] over the GPTZero API as exposed
//! through RapidAPI: a multipart form POST with a single `text` field,
//! authenticated by the `x-rapidapi-key` and `x-rapidapi-host` headers.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport, authentication, and status classification
//! live here. The nested document/sentence payload is returned as raw JSON;
//! flattening it into findings is the orchestration layer's job.

pub mod client;

pub use client::{DetectorConfig, GptZeroClient};
