//! Service configuration (`quillgate.toml`).
//!
//! Every field has a default, so a missing file is a valid configuration.
//! Values are validated once at load time; a bad value fails startup with a
//! message naming the offending key.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use detector::DetectorConfig;
use llm::LlmConfig;
use nodes::{
    Instructions, PipelineSettings, RetryConfig, DEFAULT_REWRITE_INSTRUCTION,
    DEFAULT_TARGET_LANGUAGE, DEFAULT_TRANSLATE_INSTRUCTION, LANGUAGE_PLACEHOLDER,
};
use pipeline::{DetectionPolicy, ModelId, DEFAULT_FREE_LIMIT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "quillgate.toml";

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser error with location.
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub quota: QuotaConfig,
    pub store: StoreConfig,
    pub llm: LlmSection,
    pub detector: DetectorConfig,
    pub instructions: InstructionsConfig,
    pub retry: RetrySection,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub listen: SocketAddr,
    /// Header carrying the authenticated identity.
    pub identity_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            identity_header: server::DEFAULT_IDENTITY_HEADER.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Free operations per identity.
    pub free_limit: u32,
    pub detection_policy: DetectionPolicy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_limit: DEFAULT_FREE_LIMIT,
            detection_policy: DetectionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file; ignored by the memory backend.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("quillgate.db"),
        }
    }
}

/// `[llm]`: endpoint settings plus the model used by each stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    #[serde(flatten)]
    pub endpoint: LlmConfig,
    pub generate_model: String,
    pub translate_model: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: LlmConfig::default(),
            generate_model: "gpt-4".into(),
            translate_model: "gpt-4".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionsConfig {
    pub rewrite: String,
    /// Translation template; must contain `{language}`.
    pub translate: String,
    pub default_target_language: String,
}

impl Default for InstructionsConfig {
    fn default() -> Self {
        Self {
            rewrite: DEFAULT_REWRITE_INSTRUCTION.into(),
            translate: DEFAULT_TRANSLATE_INSTRUCTION.into(),
            default_target_language: DEFAULT_TARGET_LANGUAGE.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
    /// OTLP gRPC endpoint (e.g. `http://localhost:4317`). Tracing export is
    /// off when unset.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            otlp_endpoint: None,
            service_name: "quillgate".into(),
        }
    }
}

impl Config {
    /// Loads and validates `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every value the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.quota.free_limit == 0 {
            return invalid("quota.free_limit must be greater than zero".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".into());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms".into());
        }
        if !self.instructions.translate.contains(LANGUAGE_PLACEHOLDER) {
            return invalid(format!(
                "instructions.translate must contain the {LANGUAGE_PLACEHOLDER} placeholder"
            ));
        }
        if self.instructions.rewrite.trim().is_empty() {
            return invalid("instructions.rewrite must not be empty".into());
        }
        if self.instructions.default_target_language.trim().is_empty() {
            return invalid("instructions.default_target_language must not be empty".into());
        }
        if let Err(e) = server::identity_header(&self.server.identity_header) {
            return invalid(format!("server.identity_header: {e}"));
        }
        for (key, value) in [
            ("llm.generate_model", &self.llm.generate_model),
            ("llm.translate_model", &self.llm.translate_model),
        ] {
            if value.trim().is_empty() {
                return invalid(format!("{key} must not be empty"));
            }
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.as_os_str().is_empty() {
            return invalid("store.path is required for the sqlite backend".into());
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        let model = |key: &str, value: &str| {
            ModelId::new(value).ok_or_else(|| ConfigError::Invalid(format!("{key} must not be empty")))
        };
        Ok(PipelineSettings {
            generate_model: model("llm.generate_model", &self.llm.generate_model)?,
            translate_model: model("llm.translate_model", &self.llm.translate_model)?,
            instructions: Instructions {
                rewrite: self.instructions.rewrite.clone(),
                translate_template: self.instructions.translate.clone(),
                default_target_language: self.instructions.default_target_language.clone(),
            },
            detection_policy: self.quota.detection_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.quota.free_limit, 100);
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert_eq!(config.llm.endpoint.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.detector.api_key_env, "RAPIDAPI_KEY");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.identity_header, "x-user-id");
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quillgate.toml");
        std::fs::write(
            &path,
            r#"
[server]
listen = "0.0.0.0:9000"

[quota]
free_limit = 5
detection_policy = "metered"

[llm]
base_url = "http://localhost:11434/v1"
generate_model = "llama3"

[store]
backend = "memory"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.quota.free_limit, 5);
        assert_eq!(config.quota.detection_policy, DetectionPolicy::Metered);
        assert_eq!(config.llm.endpoint.base_url, "http://localhost:11434/v1");
        assert_eq!(config.llm.endpoint.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.llm.generate_model, "llama3");
        assert_eq!(config.llm.translate_model, "gpt-4");
        assert_eq!(config.store.backend, StoreBackend::Memory);

        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.generate_model.as_str(), "llama3");
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let config = Config {
            instructions: InstructionsConfig {
                translate: "Translate this.".into(),
                ..InstructionsConfig::default()
            },
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{language}"), "{err}");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quota.free_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[quota\nfree_limit = 5").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
