//! Shared value types for the Quillgate domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (probabilities are in `[0.0, 1.0]`, usage
//! counts never exceed their ceiling) and participate in domain computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, Identity, PriceId, SubscriptionId};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pipeline-supplied instruction.
    System,
    /// End-user input.
    User,
    /// Prior model output.
    Assistant,
}

/// One turn in a conversation sent to the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a message with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ---------------------------------------------------------------------------
// Stage output
// ---------------------------------------------------------------------------

/// Output of one LLM stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    /// The reply text, exactly as the model produced it.
    pub text: String,
    /// The full upstream body, kept opaque for diagnostics.
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Detection findings
// ---------------------------------------------------------------------------

/// Document-level verdict of the detection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Predicted to be AI-generated.
    Ai,
    /// Predicted to be human-written.
    Human,
    /// A mix of both.
    Mixed,
}

impl Classification {
    /// Parses the upstream `predicted_class` value. Returns `None` for
    /// anything outside the three known classes.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ai" => Some(Self::Ai),
            "human" => Some(Self::Human),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// One sentence-level AI-detection result.
///
/// Document-level fields (`classification`, `confidence_category`,
/// `confidence_score`) are repeated on every finding of the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionFinding {
    /// The sentence text as segmented by the upstream.
    pub sentence: String,
    /// Probability in `[0.0, 1.0]` that this sentence was generated.
    pub generated_probability: f64,
    /// Document-level classification.
    pub classification: Classification,
    /// Document-level confidence bucket (e.g. `"high"`).
    pub confidence_category: String,
    /// Document-level confidence score.
    pub confidence_score: f64,
}

// ---------------------------------------------------------------------------
// Usage and subscription
// ---------------------------------------------------------------------------

/// A billing subscription as written by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Subscriber.
    pub identity: Identity,
    /// End of the currently paid period. `None` when the provider never
    /// reported one.
    pub current_period_end: Option<Timestamp>,
    /// Price the subscription is on. `None` means no active plan.
    pub price_id: Option<PriceId>,
    /// Billing-provider customer.
    pub customer_id: Option<CustomerId>,
    /// Billing-provider subscription.
    pub subscription_id: Option<SubscriptionId>,
}

/// Snapshot of an identity's free-tier usage and entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatus {
    /// Chargeable runs completed so far.
    pub count: u32,
    /// Free-tier ceiling.
    pub limit: u32,
    /// Free runs left (`limit - count`, never negative).
    pub remaining: u32,
    /// Whether an active subscription bypasses the ceiling.
    pub entitled: bool,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a [`Timestamp`] from milliseconds since the Unix epoch.
    ///
    /// Returns `None` if the value is outside chrono's representable range.
    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(Self)
    }

    /// Parses an RFC 3339 string (e.g. `"2026-11-01T00:00:00Z"`).
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Milliseconds since the Unix epoch.
    pub fn epoch_millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serialises_lowercase() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_value::<Message>(
            serde_json::json!({"role": "tool", "content": "x"}),
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn classification_parse_is_case_insensitive() {
        assert_eq!(Classification::parse("AI"), Some(Classification::Ai));
        assert_eq!(Classification::parse("human"), Some(Classification::Human));
        assert_eq!(Classification::parse(" Mixed "), Some(Classification::Mixed));
        assert_eq!(Classification::parse("robot"), None);
    }

    #[test]
    fn finding_serialises_camel_case() {
        let finding = DetectionFinding {
            sentence: "One.".into(),
            generated_probability: 0.9,
            classification: Classification::Ai,
            confidence_category: "high".into(),
            confidence_score: 0.97,
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["generatedProbability"], 0.9);
        assert_eq!(json["classification"], "ai");
        assert_eq!(json["confidenceCategory"], "high");
        assert_eq!(json["confidenceScore"], 0.97);
    }

    #[test]
    fn timestamp_epoch_round_trip() {
        let ts = Timestamp::from_epoch_millis(1_700_000_000_000).unwrap();
        assert_eq!(ts.epoch_millis(), 1_700_000_000_000);
    }

    #[test]
    fn timestamp_parses_rfc3339() {
        let ts = Timestamp::parse_rfc3339("2026-11-01T00:00:00Z").unwrap();
        assert_eq!(ts.to_string(), "2026-11-01T00:00:00+00:00");
        assert!(Timestamp::parse_rfc3339("next tuesday").is_none());
    }
}
