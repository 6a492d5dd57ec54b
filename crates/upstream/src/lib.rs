//! Shared HTTP plumbing for the upstream adapters.
//!
//! The `llm` and `detector` crates talk to different services but handle the
//! transport the same way: a `reqwest` client with a per-request timeout, an
//! API key taken from an explicit value or an environment variable, and
//! non-success responses classified through [`ProviderError::from_status`].

use std::time::Duration;

use pipeline::ProviderError;

/// Builds a client whose requests time out after `timeout_secs`.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("http client: {e}")))
}

/// Explicit key first, then the environment variable `env_var`.
///
/// # Errors
///
/// [`ProviderError::NotConfigured`] when neither yields a non-blank key.
pub fn resolve_api_key(explicit: Option<&str>, env_var: &str) -> Result<String, ProviderError> {
    if let Some(key) = explicit {
        return Ok(key.to_owned());
    }
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ProviderError::NotConfigured(format!("set {env_var} env var")))
}

/// Converts a non-success response into a [`ProviderError`], honouring
/// `Retry-After` and reading the body for quota-exhaustion markers.
pub async fn failure(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();
    ProviderError::from_status(status, retry_after.as_deref(), &body)
}

/// Decodes a success body as JSON.
pub async fn json_body(response: reqwest::Response) -> Result<serde_json::Value, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))
}
