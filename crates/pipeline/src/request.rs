//! Inbound pipeline requests and the shaped results returned to callers.
//!
//! [`PipelineRequest`] is a tagged variant: the `kind` field selects the
//! pipeline shape and determines which payload fields are required. Requests
//! are validated before any quota check or upstream call.

use serde::{Deserialize, Serialize};

use crate::{DetectionFinding, DetectionPolicy, Message, PipelineError};

/// The fixed set of pipeline shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Sentence-level AI detection.
    Detect,
    /// Single LLM rewrite of a conversation.
    Generate,
    /// Single LLM translation of a text.
    TranslateOnly,
    /// Rewrite, then translate the rewrite.
    GenerateThenTranslate,
}

impl PipelineKind {
    /// Returns `true` if runs of this kind consume free-tier quota.
    ///
    /// LLM pipelines always do; detection does only under
    /// [`DetectionPolicy::Metered`].
    pub fn is_chargeable(self, detection: DetectionPolicy) -> bool {
        match self {
            Self::Detect => detection == DetectionPolicy::Metered,
            Self::Generate | Self::TranslateOnly | Self::GenerateThenTranslate => true,
        }
    }

    /// Kebab-case name, as used on the wire and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Generate => "generate",
            Self::TranslateOnly => "translate-only",
            Self::GenerateThenTranslate => "generate-then-translate",
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run one pipeline.
///
/// Wire format: `{"kind": "generate-then-translate", "messages": [...], "targetLanguage": "French"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PipelineRequest {
    /// Detect AI-generated sentences in `text`.
    Detect {
        /// Text to analyse.
        text: String,
    },
    /// Rewrite the last turn of a conversation.
    Generate {
        /// Caller-supplied conversation, without the pipeline instruction.
        messages: Vec<Message>,
    },
    /// Translate `text`.
    TranslateOnly {
        /// Text to translate.
        text: String,
        /// Target language; the configured default applies when absent.
        #[serde(default, rename = "targetLanguage", skip_serializing_if = "Option::is_none")]
        target_language: Option<String>,
    },
    /// Rewrite, then translate the rewrite.
    GenerateThenTranslate {
        /// Caller-supplied conversation, without the pipeline instruction.
        messages: Vec<Message>,
        /// Target language; the configured default applies when absent.
        #[serde(default, rename = "targetLanguage", skip_serializing_if = "Option::is_none")]
        target_language: Option<String>,
    },
}

impl PipelineRequest {
    /// The pipeline shape this request selects.
    pub fn kind(&self) -> PipelineKind {
        match self {
            Self::Detect { .. } => PipelineKind::Detect,
            Self::Generate { .. } => PipelineKind::Generate,
            Self::TranslateOnly { .. } => PipelineKind::TranslateOnly,
            Self::GenerateThenTranslate { .. } => PipelineKind::GenerateThenTranslate,
        }
    }

    /// Checks required payload fields.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidRequest`] naming the first problem found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            Self::Detect { text } => require_text(text),
            Self::Generate { messages } => require_messages(messages),
            Self::TranslateOnly {
                text,
                target_language,
            } => {
                require_text(text)?;
                require_language(target_language.as_deref())
            }
            Self::GenerateThenTranslate {
                messages,
                target_language,
            } => {
                require_messages(messages)?;
                require_language(target_language.as_deref())
            }
        }
    }
}

fn require_text(text: &str) -> Result<(), PipelineError> {
    if text.trim().is_empty() {
        return Err(PipelineError::invalid("Text is required."));
    }
    Ok(())
}

fn require_messages(messages: &[Message]) -> Result<(), PipelineError> {
    if messages.is_empty() {
        return Err(PipelineError::invalid("Messages are required."));
    }
    if let Some(index) = messages.iter().position(|m| m.content.trim().is_empty()) {
        return Err(PipelineError::invalid(format!(
            "Message {index} has empty content."
        )));
    }
    Ok(())
}

/// Longest accepted `targetLanguage`, in characters.
///
/// The value is spliced into a system instruction, so it is kept to a short
/// single line.
pub const MAX_TARGET_LANGUAGE_CHARS: usize = 64;

fn require_language(language: Option<&str>) -> Result<(), PipelineError> {
    let Some(language) = language else {
        return Ok(());
    };
    if language.trim().is_empty() {
        return Err(PipelineError::invalid("targetLanguage must not be empty."));
    }
    if language.chars().count() > MAX_TARGET_LANGUAGE_CHARS {
        return Err(PipelineError::invalid(format!(
            "targetLanguage must be at most {MAX_TARGET_LANGUAGE_CHARS} characters."
        )));
    }
    if language.chars().any(char::is_control) {
        return Err(PipelineError::invalid(
            "targetLanguage must not contain line breaks or control characters.",
        ));
    }
    Ok(())
}

/// The shaped result of a completed run.
///
/// Serialises to the per-kind response contract: a bare findings array,
/// `{text}`, or `{originalText, translatedText}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineOutcome {
    /// `detect` result.
    Findings(Vec<DetectionFinding>),
    /// `generate` and `translate-only` result.
    Text {
        /// Model reply.
        text: String,
    },
    /// `generate-then-translate` result.
    Translated {
        /// Stage-one rewrite.
        #[serde(rename = "originalText")]
        original_text: String,
        /// Stage-two translation of the rewrite.
        #[serde(rename = "translatedText")]
        translated_text: String,
    },
}
