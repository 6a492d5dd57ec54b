//! Upstream response records.
//!
//! Every field is optional so that any JSON object deserialises; presence is
//! checked explicitly by the stage runner and detection normalizer rather
//! than trusted. A body that does not even match these loose shapes (e.g.
//! `choices` is a string) fails deserialisation and is treated the same way.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat completion
// ---------------------------------------------------------------------------

/// An OpenAI-format chat completion body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionPayload {
    /// Completion id.
    pub id: Option<String>,
    /// Model that produced the reply.
    pub model: Option<String>,
    /// Candidate replies; only the first is used.
    pub choices: Option<Vec<CompletionChoice>>,
}

/// One candidate reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionChoice {
    /// The reply message.
    pub message: Option<CompletionMessage>,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
}

/// Role and text of a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionMessage {
    /// Normally `"assistant"`.
    pub role: Option<String>,
    /// Reply text.
    pub content: Option<String>,
}

impl CompletionPayload {
    /// Returns the first choice's reply text if it is present and non-empty.
    pub fn reply_text(&self) -> Option<&str> {
        self.choices
            .as_deref()?
            .first()?
            .message
            .as_ref()?
            .content
            .as_deref()
            .filter(|text| !text.is_empty())
    }
}

// ---------------------------------------------------------------------------
// AI detection
// ---------------------------------------------------------------------------

/// A GPTZero-style detection body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionPayload {
    /// One entry per analysed document.
    pub documents: Option<Vec<DetectionDocument>>,
}

/// Document-level verdict plus its sentences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionDocument {
    /// `"ai"`, `"human"` or `"mixed"`.
    pub predicted_class: Option<String>,
    /// Confidence bucket, e.g. `"high"`.
    pub confidence_category: Option<String>,
    /// Confidence in the predicted class.
    pub confidence_score: Option<f64>,
    /// Sentences in source order.
    pub sentences: Option<Vec<DetectionSentence>>,
}

/// A single scored sentence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSentence {
    /// Sentence text.
    pub sentence: Option<String>,
    /// Probability the sentence was generated.
    pub generated_prob: Option<f64>,
}
