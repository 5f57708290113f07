//! Quiz generation.

use super::{truncate_chars, TextGenerationClient};
use crate::config::Prompts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{instrument, warn};

const MAX_PROMPT_CHARS: usize = 15_000;

/// A generated quiz for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question_text: String,
    /// "single-choice" or "multiple-choice".
    pub question_type: String,
    #[serde(default)]
    pub options: Vec<QuizOption>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub text: String,
    pub is_correct: bool,
}

impl Quiz {
    /// A valid single-question quiz explaining why generation failed.
    pub fn error_fallback(video_title: &str, reason: &str) -> Self {
        Self {
            title: format!("Quiz for {}", video_title),
            questions: vec![QuizQuestion {
                question_text: reason.to_string(),
                question_type: "single-choice".to_string(),
                options: Vec::new(),
                explanation: String::new(),
            }],
        }
    }
}

/// Generate a quiz from transcript text.
///
/// Never fails: every error path yields a well-formed error quiz.
#[instrument(skip_all, fields(video_title = %video_title))]
pub async fn generate_quiz(
    client: &TextGenerationClient,
    prompts: &Prompts,
    model: &str,
    full_text: &str,
    video_title: &str,
) -> Quiz {
    if full_text.trim().is_empty() {
        return Quiz::error_fallback(video_title, "Quiz generation failed: transcript is empty.");
    }

    let mut vars = HashMap::new();
    vars.insert("title".to_string(), video_title.to_string());
    vars.insert(
        "transcript".to_string(),
        truncate_chars(full_text, MAX_PROMPT_CHARS).to_string(),
    );

    let user = prompts.render_with_custom(&prompts.quiz.user, &vars);

    let raw = match client
        .complete_json(model, &prompts.quiz.system, &user, 0.4)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Quiz generation failed: {}", e);
            return Quiz::error_fallback(video_title, &format!("Quiz generation error: {}", e));
        }
    };

    match serde_json::from_str::<Quiz>(&raw) {
        Ok(quiz) => quiz,
        Err(e) => {
            warn!("Quiz response did not match expected shape: {}", e);
            Quiz::error_fallback(video_title, "Failed to parse quiz data from the model.")
        }
    }
}
