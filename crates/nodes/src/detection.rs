//! Detection normalizer: flattens the nested document/sentence payload of
//! the AI-detection service into ordered [`DetectionFinding`]s.
//!
//! Document-level fields are copied onto every sentence of that document.
//! Order is preserved exactly across documents and sentences.

use std::sync::Arc;

use pipeline::{
    Classification, DetectionFinding, DetectionPayload, DetectionService, PipelineError,
    UpstreamService,
};
use tracing::debug;

use crate::retry::{with_retry, RetryConfig};

/// Runs detection requests and normalizes their results.
#[derive(Clone)]
pub struct DetectionNormalizer {
    service: Arc<dyn DetectionService>,
    retry: RetryConfig,
}

impl DetectionNormalizer {
    /// Creates a normalizer over `service` with the given retry envelope.
    pub fn new(service: Arc<dyn DetectionService>, retry: RetryConfig) -> Self {
        Self { service, retry }
    }

    /// Analyses `text`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidRequest`] for blank text; nothing is sent.
    /// - [`PipelineError::UpstreamInvalidResponse`] when the payload lacks the
    ///   expected structure (see [`normalize`]).
    /// - [`PipelineError::UpstreamError`] for transport failures and exhausted
    ///   throttling.
    pub async fn detect(&self, text: &str) -> Result<Vec<DetectionFinding>, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::invalid("Text is required."));
        }

        let raw = with_retry(self.service.name(), &self.retry, || self.service.detect(text))
            .await
            .map_err(|err| PipelineError::from_provider(UpstreamService::Detection, err))?;

        let findings = normalize(raw)?;
        debug!(
            service = self.service.name(),
            findings = findings.len(),
            "detection normalized"
        );
        Ok(findings)
    }
}

impl std::fmt::Debug for DetectionNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionNormalizer")
            .field("service", &self.service.name())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Reshapes a raw detection body into findings.
///
/// Fails when `documents` is absent or empty, when a document lacks its
/// class, confidence fields, or `sentences`, when the class is not one of
/// `ai`/`human`/`mixed`, or when a sentence lacks text or carries a
/// probability outside `[0, 1]`. A document with an empty sentence list
/// contributes no findings.
pub fn normalize(raw: serde_json::Value) -> Result<Vec<DetectionFinding>, PipelineError> {
    let payload: DetectionPayload =
        serde_json::from_value(raw).map_err(|err| invalid(err.to_string()))?;

    let documents = payload
        .documents
        .filter(|docs| !docs.is_empty())
        .ok_or_else(|| invalid("missing documents"))?;

    let mut findings = Vec::new();
    for (d, doc) in documents.into_iter().enumerate() {
        let class = doc
            .predicted_class
            .ok_or_else(|| invalid(format!("documents[{d}] missing predicted_class")))?;
        let classification = Classification::parse(&class)
            .ok_or_else(|| invalid(format!("documents[{d}] unknown predicted_class '{class}'")))?;
        let confidence_category = doc
            .confidence_category
            .ok_or_else(|| invalid(format!("documents[{d}] missing confidence_category")))?;
        let confidence_score = doc
            .confidence_score
            .ok_or_else(|| invalid(format!("documents[{d}] missing confidence_score")))?;
        let sentences = doc
            .sentences
            .ok_or_else(|| invalid(format!("documents[{d}] missing sentences")))?;

        findings.reserve(sentences.len());
        for (s, entry) in sentences.into_iter().enumerate() {
            let sentence = entry
                .sentence
                .ok_or_else(|| invalid(format!("documents[{d}].sentences[{s}] missing sentence")))?;
            let generated_probability = entry
                .generated_prob
                .filter(|p| (0.0..=1.0).contains(p))
                .ok_or_else(|| {
                    invalid(format!(
                        "documents[{d}].sentences[{s}] generated_prob missing or outside [0, 1]"
                    ))
                })?;

            findings.push(DetectionFinding {
                sentence,
                generated_probability,
                classification,
                confidence_category: confidence_category.clone(),
                confidence_score,
            });
        }
    }

    Ok(findings)
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::UpstreamInvalidResponse {
        service: UpstreamService::Detection,
        message: message.into(),
    }
}
