//! OpenAI-compatible chat-completion provider.
//!
//! [`OpenAiCompatProvider`] posts `{model, messages}` to
//! `{base_url}/chat/completions` with Bearer authentication and returns the
//! decoded JSON body untouched.

use async_trait::async_trait;
use pipeline::{ChatRequest, LlmProvider, ProviderError};
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// An [`LlmProvider`] for any API that follows the OpenAI request format.
pub struct OpenAiCompatProvider {
    config: LlmConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Creates a provider that resolves its API key from
    /// `config.api_key_env` on every request.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self, ProviderError> {
        let http = upstream::build_client(config.timeout_secs)?;
        Ok(Self {
            config,
            http,
            api_key: None,
        })
    }

    /// Creates a provider with an explicit API key, bypassing the
    /// environment.
    pub fn with_api_key(config: LlmConfig, api_key: String) -> Result<Self, ProviderError> {
        let http = upstream::build_client(config.timeout_secs)?;
        Ok(Self {
            config,
            http,
            api_key: Some(api_key),
        })
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<serde_json::Value, ProviderError> {
        let api_key = upstream::resolve_api_key(self.api_key.as_deref(), &self.config.api_key_env)?;

        debug!(
            provider = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let err = upstream::failure(response).await;
            warn!(
                provider = %self.config.name,
                status = status.as_u16(),
                error = %err,
                "chat completion request failed"
            );
            return Err(err);
        }

        let body = upstream::json_body(response).await?;

        debug!(provider = %self.config.name, "chat completion response received");
        Ok(body)
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.config.name)
            .field("base_url", &self.config.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.into(),
            api_key_env: "QUILLGATE_TEST_UNSET_KEY".into(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        let provider = OpenAiCompatProvider::new(config("https://api.example.com/v1/")).unwrap();
        assert_eq!(
            provider.completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn debug_masks_api_key() {
        let provider =
            OpenAiCompatProvider::with_api_key(config("http://localhost"), "sk-secret".into())
                .unwrap();
        let rendered = format!("{provider:?}");
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("sk-secret"));
    }
}
