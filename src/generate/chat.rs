//! Transcript-grounded chat answers.

use super::{truncate_chars, TextGenerationClient};
use crate::config::Prompts;
use crate::error::{MerkeError, Result};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{instrument, warn};

const MAX_PROMPT_CHARS: usize = 15_000;

/// Fixed apology returned when the service fails mid-conversation.
pub const CHAT_FALLBACK_ANSWER: &str =
    "I'm sorry, I ran into a problem answering that. Please try again.";

/// One prior turn of the conversation, as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// "user" or "assistant"; anything else is treated as "user".
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub(super) fn to_message(&self) -> Result<ChatCompletionRequestMessage> {
        let message = match self.role.as_str() {
            "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
                .content(self.content.clone())
                .build()
                .map_err(|e| MerkeError::Generation(e.to_string()))?
                .into(),
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(self.content.clone())
                .build()
                .map_err(|e| MerkeError::Generation(e.to_string()))?
                .into(),
        };
        Ok(message)
    }
}

/// Answer a question about a video using only its transcript text.
///
/// Never fails: service errors yield the fixed apology string.
#[instrument(skip_all, fields(question = %question))]
pub async fn answer_question(
    client: &TextGenerationClient,
    prompts: &Prompts,
    model: &str,
    full_text: &str,
    question: &str,
    history: &[ChatTurn],
) -> String {
    if full_text.trim().is_empty() {
        return "This video's transcript is empty, so I cannot answer questions about it."
            .to_string();
    }

    let mut vars = HashMap::new();
    vars.insert(
        "transcript".to_string(),
        truncate_chars(full_text, MAX_PROMPT_CHARS).to_string(),
    );
    vars.insert("question".to_string(), question.to_string());

    let user = prompts.render_with_custom(&prompts.chat.user, &vars);

    match client
        .complete_with_history(model, &prompts.chat.system, history, &user, 0.7)
        .await
    {
        Ok(answer) if !answer.trim().is_empty() => answer,
        Ok(_) => CHAT_FALLBACK_ANSWER.to_string(),
        Err(e) => {
            warn!("Chat answer generation failed: {}", e);
            CHAT_FALLBACK_ANSWER.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;

    #[tokio::test]
    async fn test_empty_transcript_answer() {
        let client = TextGenerationClient::unconfigured();
        let answer = answer_question(
            &client,
            &Prompts::default(),
            "gpt-4o-mini",
            "",
            "what is this about?",
            &[],
        )
        .await;
        assert!(answer.contains("transcript is empty"));
    }

    #[tokio::test]
    async fn test_unconfigured_client_apologizes() {
        let client = TextGenerationClient::unconfigured();
        let answer = answer_question(
            &client,
            &Prompts::default(),
            "gpt-4o-mini",
            "some transcript",
            "what is this about?",
            &[],
        )
        .await;
        assert_eq!(answer, CHAT_FALLBACK_ANSWER);
    }

    #[test]
    fn test_chat_turn_roles() {
        let user_turn = ChatTurn {
            role: "user".to_string(),
            content: "hi".to_string(),
        };
        let assistant_turn = ChatTurn {
            role: "assistant".to_string(),
            content: "hello".to_string(),
        };
        assert!(user_turn.to_message().is_ok());
        assert!(assistant_turn.to_message().is_ok());
    }
}
