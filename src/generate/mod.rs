//! Artifact generation via the text-generation service.
//!
//! Every generator is a thin wrapper with the same shape: render a prompt,
//! call the service, parse the constrained output, and fall back to a
//! minimal well-formed artifact on any failure. The pipeline never needs
//! per-artifact error handling.

mod chat;
mod key_moments;
mod mindmap;
mod quiz;
mod tags;

pub use chat::{answer_question, ChatTurn, CHAT_FALLBACK_ANSWER};
pub use key_moments::{extract_key_moments, propose_moments, suggest_chapter_count};
pub use mindmap::generate_mindmap;
pub use quiz::{generate_quiz, Quiz, QuizOption, QuizQuestion};
pub use tags::generate_tags;

use crate::error::{MerkeError, Result};
use crate::openai::{create_client, is_api_key_configured};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};

/// Injected capability for the external text-generation service.
///
/// Holds no client when the API key is absent; every call site checks this
/// explicitly and applies its own fallback rather than panicking on a
/// half-configured process.
pub struct TextGenerationClient {
    inner: Option<async_openai::Client<async_openai::config::OpenAIConfig>>,
}

impl TextGenerationClient {
    /// Build from the environment. Unconfigured when `OPENAI_API_KEY` is
    /// missing or empty.
    pub fn from_env() -> Self {
        if is_api_key_configured() {
            Self {
                inner: Some(create_client()),
            }
        } else {
            tracing::warn!("OPENAI_API_KEY not set; text generation is disabled");
            Self { inner: None }
        }
    }

    /// An explicitly unconfigured client, for tests and dry runs.
    pub fn unconfigured() -> Self {
        Self { inner: None }
    }

    /// Whether a service client is available.
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    fn client(&self) -> Result<&async_openai::Client<async_openai::config::OpenAIConfig>> {
        self.inner.as_ref().ok_or(MerkeError::NotConfigured)
    }

    /// Run a chat completion and return the raw text of the first choice.
    pub async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String> {
        self.complete_messages(model, system, &[], user, temperature, false)
            .await
    }

    /// Run a chat completion in JSON-object mode.
    pub async fn complete_json(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String> {
        self.complete_messages(model, system, &[], user, temperature, true)
            .await
    }

    /// Run a chat completion with prior conversation turns interleaved
    /// between the system message and the final user message.
    pub async fn complete_with_history(
        &self,
        model: &str,
        system: &str,
        history: &[ChatTurn],
        user: &str,
        temperature: f32,
    ) -> Result<String> {
        self.complete_messages(model, system, history, user, temperature, false)
            .await
    }

    async fn complete_messages(
        &self,
        model: &str,
        system: &str,
        history: &[ChatTurn],
        user: &str,
        temperature: f32,
        json_mode: bool,
    ) -> Result<String> {
        let client = self.client()?;

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| MerkeError::Generation(e.to_string()))?
                .into(),
        ];
        for turn in history {
            messages.push(turn.to_message()?);
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user.to_string())
                .build()
                .map_err(|e| MerkeError::Generation(e.to_string()))?
                .into(),
        );

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(model)
            .messages(messages)
            .temperature(temperature);
        if json_mode {
            request_builder.response_format(ResponseFormat::JsonObject);
        }

        let request = request_builder
            .build()
            .map_err(|e| MerkeError::Generation(e.to_string()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| MerkeError::OpenAI(format!("Chat completion failed: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| MerkeError::Generation("Empty response from model".to_string()))
    }
}

/// Truncate a string to at most `max_chars` characters, on a char boundary.
///
/// Transcripts can exceed model context limits; generators cap the text
/// they feed into prompts.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_client_errors() {
        let client = TextGenerationClient::unconfigured();
        assert!(!client.is_configured());
        assert!(matches!(client.client(), Err(MerkeError::NotConfigured)));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters are not split mid-codepoint.
        assert_eq!(truncate_chars("æøå", 2), "æø");
    }
}
