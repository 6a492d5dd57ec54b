//! Per-deployment pipeline settings: models, instructions, detection gating.

use pipeline::{DetectionPolicy, ModelId};

/// Marker replaced by the target language in the translation template.
pub const LANGUAGE_PLACEHOLDER: &str = "{language}";

/// System instruction prepended to caller conversations by `generate`.
pub const DEFAULT_REWRITE_INSTRUCTION: &str = "You are a writing assistant. Rewrite the user's \
text so that it reads naturally and fluently while keeping its meaning. Reply with the rewritten \
text only.";

/// Translation instruction template.
pub const DEFAULT_TRANSLATE_INSTRUCTION: &str = "You are a translation assistant. Translate the \
following text into {language}. Reply with the translation only.";

/// Language used when a request names none.
pub const DEFAULT_TARGET_LANGUAGE: &str = "Chinese";

/// System instructions used by the LLM pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    /// System instruction for the generate stage.
    pub rewrite: String,
    /// Translation instruction; must contain [`LANGUAGE_PLACEHOLDER`].
    pub translate_template: String,
    /// Language substituted when a request names none.
    pub default_target_language: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            rewrite: DEFAULT_REWRITE_INSTRUCTION.to_owned(),
            translate_template: DEFAULT_TRANSLATE_INSTRUCTION.to_owned(),
            default_target_language: DEFAULT_TARGET_LANGUAGE.to_owned(),
        }
    }
}

impl Instructions {
    /// Renders the translation instruction for `language`, falling back to
    /// the default target language.
    pub fn translate(&self, language: Option<&str>) -> String {
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.default_target_language);
        self.translate_template.replace(LANGUAGE_PLACEHOLDER, language)
    }
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Model for the rewrite stage.
    pub generate_model: ModelId,
    /// Model for the translation stage.
    pub translate_model: ModelId,
    pub instructions: Instructions,
    pub detection_policy: DetectionPolicy,
}
