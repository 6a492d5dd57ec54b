use async_trait::async_trait;
use pipeline::{DetectionService, ProviderError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Connection settings for the detection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Base URL; the client posts to `{base_url}/v1/detectAIDeep`.
    pub base_url: String,
    /// Value of the `x-rapidapi-host` header.
    pub rapidapi_host: String,
    /// Environment variable holding the RapidAPI key.
    pub api_key_env: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gptzero-api.p.rapidapi.com".into(),
            rapidapi_host: "gptzero-api.p.rapidapi.com".into(),
            api_key_env: "RAPIDAPI_KEY".into(),
            timeout_secs: 60,
        }
    }
}

/// GPTZero client over RapidAPI.
pub struct GptZeroClient {
    config: DetectorConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl GptZeroClient {
    /// Creates a client that reads its key from `config.api_key_env` per
    /// request.
    pub fn new(config: DetectorConfig) -> Result<Self, ProviderError> {
        Self::build(config, None)
    }

    /// Creates a client with an explicit key.
    pub fn with_api_key(config: DetectorConfig, api_key: String) -> Result<Self, ProviderError> {
        Self::build(config, Some(api_key))
    }

    fn build(config: DetectorConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let http = upstream::build_client(config.timeout_secs)?;
        Ok(Self {
            config,
            http,
            api_key,
        })
    }

    fn detect_url(&self) -> String {
        format!("{}/v1/detectAIDeep", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DetectionService for GptZeroClient {
    fn name(&self) -> &str {
        "gptzero"
    }

    async fn detect(&self, text: &str) -> Result<serde_json::Value, ProviderError> {
        let api_key = upstream::resolve_api_key(self.api_key.as_deref(), &self.config.api_key_env)?;
        let form = reqwest::multipart::Form::new().text("text", text.to_owned());

        debug!(chars = text.chars().count(), "sending detection request");

        let response = self
            .http
            .post(self.detect_url())
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", &self.config.rapidapi_host)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let err = upstream::failure(response).await;
            warn!(status = status.as_u16(), error = %err, "detection request failed");
            return Err(err);
        }

        upstream::json_body(response).await
    }
}

impl std::fmt::Debug for GptZeroClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GptZeroClient")
            .field("base_url", &self.config.base_url)
            .field("rapidapi_host", &self.config.rapidapi_host)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
