//! Error taxonomy and retry-policy types for the Quillgate domain.
//!
//! [`PipelineError`] is what a pipeline run ends with when it does not
//! complete. Component-level errors ([`ProviderError`] for upstream calls,
//! [`StoreError`] for quota/subscription storage) are converted into it at the
//! orchestration boundary.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions implements [`RetryClassification`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Identity;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Only upstream throttling is `Retryable`. Everything else (malformed
/// responses, auth failures, transport errors, storage failures) is
/// `NonRetryable` and propagates on first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt, derived from a
        /// `Retry-After` response header. `None` means apply the caller's own
        /// back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

/// Errors that can tell the retry envelope whether they are worth retrying.
pub trait RetryClassification {
    /// Returns the retry policy for this error value.
    fn retry_policy(&self) -> RetryPolicy;
}

// ---------------------------------------------------------------------------
// Upstream services
// ---------------------------------------------------------------------------

/// The external service a stage talks to. Used for error context and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamService {
    /// The chat-completion LLM service.
    Llm,
    /// The AI-text-detection service.
    Detection,
}

impl std::fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Detection => write!(f, "detection"),
        }
    }
}

// ---------------------------------------------------------------------------
// Component errors
// ---------------------------------------------------------------------------

/// Failure of a single call to an upstream service, as reported by an
/// infrastructure adapter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// The upstream signalled "too many requests" (HTTP 429) for a transient
    /// rate limit.
    #[error("rate limited{}", retry_hint(.retry_after))]
    Throttled {
        /// Suggested wait before retrying, when the upstream supplied one.
        retry_after: Option<Duration>,
    },

    /// The adapter is missing configuration (typically the API key env var).
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The HTTP exchange failed: connection error, timeout, or a non-success
    /// status other than a transient 429.
    #[error("request failed: {0}")]
    Transport(String),

    /// The upstream replied successfully but the body was not valid JSON.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn retry_hint(after: &Option<Duration>) -> String {
    match after {
        Some(d) => format!(": retry after {}ms", d.as_millis()),
        None => String::new(),
    }
}

impl RetryClassification for ProviderError {
    fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Throttled { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::NotConfigured(_) | Self::Transport(_) | Self::InvalidResponse(_) => {
                RetryPolicy::NonRetryable
            }
        }
    }
}

impl ProviderError {
    /// Classifies a non-success HTTP response.
    ///
    /// A 429 is throttling unless the body reports exhausted credits, billing
    /// or quota, which no amount of waiting fixes. Every other status is a
    /// transport failure carrying a bounded excerpt of the body.
    pub fn from_status(status: u16, retry_after: Option<&str>, body: &str) -> Self {
        if status == 429 {
            if is_quota_exhausted(body) {
                let message = error_message(body)
                    .unwrap_or_else(|| "credits exhausted or spending limit reached".to_owned());
                return Self::Transport(format!("HTTP 429: {message}"));
            }
            return Self::Throttled {
                retry_after: retry_after.and_then(parse_retry_after),
            };
        }
        Self::Transport(format!("HTTP {status}: {}", excerpt(body)))
    }
}

/// Parses a numeric `Retry-After` value (seconds, integer or fractional).
///
/// The HTTP-date form is not supported and yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    let plan_quota = lower.contains("exceeded") && lower.contains("quota");
    plan_quota
        || ["exhausted", "spending limit", "credits", "billing", "quota exceeded", "insufficient_quota"]
            .iter()
            .any(|marker| lower.contains(marker))
}

/// Pulls `error.message`, a bare `error` string, or a top-level `message`
/// (the RapidAPI gateway shape) out of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let nested = value.get("error").and_then(|error| {
        error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
    });
    nested
        .or_else(|| value.get("message").and_then(|m| m.as_str()))
        .map(str::to_owned)
}

const BODY_EXCERPT_CHARS: usize = 512;

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

/// Failure of the usage or subscription store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded (e.g. an unparseable timestamp).
    #[error("corrupt record for '{identity}': {message}")]
    CorruptRecord {
        /// Identity whose record is corrupt.
        identity: String,
        /// What was wrong with it.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Every way a pipeline run can end without a result.
///
/// Each variant maps to exactly one caller-visible status; see
/// [`PipelineError::status_code`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// No identity was supplied with the request.
    #[error("Unauthorized")]
    Unauthorized,

    /// The request payload is missing or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Human-readable description of what is wrong.
        message: String,
    },

    /// The free-tier ceiling is reached and the identity is not entitled.
    #[error("Free trial has expired: {identity} reached the limit of {limit} free operations")]
    QuotaExceeded {
        /// The identity that was refused.
        identity: Identity,
        /// The configured free-tier ceiling.
        limit: u32,
    },

    /// Reserved for callers that surface throttling without retrying. Nothing
    /// in the workspace constructs it today: [`Self::from_provider`] reports
    /// throttling that outlasted the retry envelope as [`Self::UpstreamError`].
    #[error("Upstream {service} throttled the request")]
    UpstreamThrottled {
        /// Which service throttled.
        service: UpstreamService,
    },

    /// The upstream replied but without the expected shape.
    #[error("Upstream {service} returned an invalid response: {message}")]
    UpstreamInvalidResponse {
        /// Which service replied.
        service: UpstreamService,
        /// What was missing or wrong.
        message: String,
    },

    /// Transport or HTTP failure talking to the upstream.
    #[error("Upstream {service} request failed: {message}")]
    UpstreamError {
        /// Which service failed.
        service: UpstreamService,
        /// Failure description.
        message: String,
    },

    /// The quota or subscription store failed.
    #[error("Storage failure: {message}")]
    Storage {
        /// Failure description.
        message: String,
    },
}

impl PipelineError {
    /// Convenience constructor for [`Self::InvalidRequest`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Maps an adapter failure to the pipeline taxonomy.
    ///
    /// Throttling that reaches this point has already exhausted the retry
    /// envelope and is therefore reported as an upstream error.
    pub fn from_provider(service: UpstreamService, err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidResponse(message) => {
                Self::UpstreamInvalidResponse { service, message }
            }
            other => Self::UpstreamError {
                service,
                message: other.to_string(),
            },
        }
    }

    /// HTTP status code the caller receives for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::InvalidRequest { .. } => 400,
            Self::QuotaExceeded { .. } => 403,
            Self::UpstreamInvalidResponse { .. } | Self::Storage { .. } => 500,
            Self::UpstreamThrottled { .. } | Self::UpstreamError { .. } => 502,
        }
    }

    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::UpstreamThrottled { .. } => "upstream_throttled",
            Self::UpstreamInvalidResponse { .. } => "upstream_invalid_response",
            Self::UpstreamError { .. } => "upstream_error",
            Self::Storage { .. } => "internal_error",
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
