//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! an [`Identity`] with a [`PriceId`] even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is blank.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pipeline execution run (one inbound request).
///
/// Generated fresh for every run; recorded on the `pipeline.run` span so all
/// activity from a single request can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`PipelineRunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Opaque authenticated-user handle.
    ///
    /// Supplied per request by the authentication collaborator. Keys both the
    /// usage record and the subscription record; never created or destroyed by
    /// Quillgate.
    Identity
}

string_id! {
    /// LLM model identifier sent verbatim to the chat-completion endpoint
    /// (e.g. `"gpt-4"`).
    ModelId
}

string_id! {
    /// Billing-provider price identifier attached to a subscription.
    ///
    /// Its presence is one half of the entitlement check.
    PriceId
}

string_id! {
    /// Billing-provider customer identifier.
    CustomerId
}

string_id! {
    /// Billing-provider subscription identifier.
    SubscriptionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_is_rejected() {
        assert!(Identity::new("").is_none());
        assert!(Identity::new("   ").is_none());
    }

    #[test]
    fn identity_keeps_raw_value() {
        let id = Identity::new("user_2abc").unwrap();
        assert_eq!(id.as_str(), "user_2abc");
        assert_eq!(id.to_string(), "user_2abc");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(PipelineRunId::new_random(), PipelineRunId::new_random());
    }
}
