//! Generative text service boundary.
//!
//! The core talks to the completion service only through [`TextGenerator`],
//! so every caller can be exercised with a scripted implementation.

mod client;

pub use client::{ChatCompletionClient, GeneratorConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoachError;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Produces free text from a list of chat messages.
///
/// Implementations report transport and service failures as
/// [`CoachError::Generator`]. The returned text is untrusted and must go
/// through [`crate::response`] before use.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoachError>;
}

// Compile-time assertion: TextGenerator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TextGenerator) {}
};

/// A generator that is never reachable. Every call fails.
///
/// Used when no API key is configured so the degradation paths still run.
#[derive(Debug, Clone, Default)]
pub struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, CoachError> {
        Err(CoachError::Generator(
            "no generator configured (set COACH_GENERATOR_API_KEY)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::system("be brief");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
    }

    #[tokio::test]
    async fn unavailable_generator_always_fails() {
        let generator: Box<dyn TextGenerator> = Box::new(UnavailableGenerator);
        let err = generator
            .complete(&[ChatMessage::user("hi")], 0.7, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Generator(_)));
    }
}
