//! Immutable conversations handed to the LLM stage runner.
//!
//! A [`Conversation`] is always built fresh from caller input; the caller's
//! message list is borrowed, never mutated. When a pipeline requires a system
//! instruction it appears exactly once, at the front.

use serde::Serialize;

use crate::Message;

/// An ordered, owned list of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation(Vec<Message>);

impl Conversation {
    /// Builds `[system(instruction), ..messages]`.
    ///
    /// Caller messages that repeat the instruction as a system message are
    /// dropped, so re-submitting a conversation never duplicates it.
    pub fn with_instruction(instruction: &str, messages: &[Message]) -> Self {
        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(Message::system(instruction));
        out.extend(
            messages
                .iter()
                .filter(|m| !(m.role == crate::Role::System && m.content == instruction))
                .cloned(),
        );
        Self(out)
    }

    /// Builds the two-message translation conversation:
    /// `[system(instruction), user(text)]`.
    pub fn translation(instruction: &str, text: &str) -> Self {
        Self(vec![Message::system(instruction), Message::user(text)])
    }

    /// Returns the messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the conversation has no messages.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
