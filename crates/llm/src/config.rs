//! Connection settings for an OpenAI-compatible endpoint.

use serde::{Deserialize, Serialize};

/// Default request timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// How to reach one chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name used in logs (e.g. "openai").
    pub name: String,

    /// Base URL for the API (e.g. "https://api.openai.com/v1").
    pub base_url: String,

    /// Environment variable that holds the API key. The key itself is never
    /// part of the configuration.
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            name: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
