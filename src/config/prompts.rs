//! Prompt templates for Merke.
//!
//! Each artifact generator renders its template with `{{variable}}`
//! substitution. Custom variables from the config file are merged in and
//! can be referenced from any template.

use serde::{Deserialize, Serialize};

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub key_moments: KeyMomentPrompts,
    pub mindmap: MindmapPrompts,
    pub quiz: QuizPrompts,
    pub tags: TagPrompts,
    pub chat: ChatPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for key-moment proposal extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMomentPrompts {
    pub system: String,
    pub user: String,
}

impl Default for KeyMomentPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an assistant that identifies distinct key moments/chapters in a transcript. You return a JSON object with a 'key_moments' key, which is a list of objects, each with 'label' and 'starting_phrase'. The moments should be chronologically ordered and distinct."#.to_string(),

            user: r#"Analyze the following transcript and identify {{num_chapters}} significant and distinct key moments or chapters that are well-distributed throughout the content.
For each key moment:
1. Provide a concise descriptive 'label' (5-10 words) that summarizes the section.
2. Provide the 'starting_phrase' which is the first few words (approx. 10-20 words) of the sentence where this new section or topic begins in the transcript.
   Ensure each 'starting_phrase' is unique and clearly marks the beginning of a different part of the discussion.

Return the result *only* as a JSON object with a single key "key_moments", containing a list of objects, each with "label" and "starting_phrase".
The list of key_moments should ideally be in chronological order based on their appearance in the transcript.
Example:
{"key_moments": [{"label": "Introduction", "starting_phrase": "Welcome everyone to today's session where we will..."}]}
If no distinct key moments can be found, or if the transcript is too short, return {"key_moments": []}.

Transcript:
{{transcript}}"#.to_string(),
        }
    }
}

/// Prompts for mind map generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MindmapPrompts {
    pub system: String,
    pub user: String,
}

impl Default for MindmapPrompts {
    fn default() -> Self {
        Self {
            system: "You generate hierarchical Markdown mind maps from video transcripts.".to_string(),

            user: r#"Based on the following video transcript and its key moments, generate a hierarchical mind map in Markdown format.
The mind map should represent the main ideas, sub-topics, and their relationships.
Use Markdown headings for the main branches (e.g., # Main Idea) and nested lists for sub-topics.
Aim for 2-4 levels of depth. Ensure the structure is clear and logical.

{{key_moments}}

Full Transcript:
{{transcript}}"#.to_string(),
        }
    }
}

/// Prompts for quiz generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizPrompts {
    pub system: String,
    pub user: String,
}

impl Default for QuizPrompts {
    fn default() -> Self {
        Self {
            system: "You are an assistant that generates quizzes in a specific JSON format from video transcripts.".to_string(),

            user: r#"Based on the following video transcript, generate a quiz with 15-20 questions to test understanding of the content.
Include a mix of single-choice and multiple-choice questions.
For each question, provide:
- "question_text": The question itself.
- "question_type": Either "single-choice" or "multiple-choice".
- "options": A list of option objects, each with "text" and "is_correct" (boolean). For single-choice, only one option should be correct.
- "explanation": (Optional) A brief explanation for the correct answer.

Return the result *only* as a JSON object with a "title" (e.g., "Quiz for: [Video Title]") and a "questions" key, where "questions" is a list of question objects as described above.
Example of the "questions" list structure:
[
  {"question_text": "Q1?", "question_type": "single-choice", "options": [{"text": "A", "is_correct": false}, {"text": "B", "is_correct": true}], "explanation": "B is correct because..."},
  {"question_text": "Q2? (Select all)", "question_type": "multiple-choice", "options": [{"text": "X", "is_correct": true}, {"text": "Y", "is_correct": false}, {"text": "Z", "is_correct": true}], "explanation": "X and Z..."}
]
If the transcript is too short or unsuitable for 15-20 questions, generate as many good questions as possible.

Video Title: {{title}}
Transcript:
{{transcript}}"#.to_string(),
        }
    }
}

/// Prompts for tag generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagPrompts {
    pub system: String,
    pub user: String,
}

impl Default for TagPrompts {
    fn default() -> Self {
        Self {
            system: "You suggest topical tags for video transcripts, returned as JSON.".to_string(),

            user: r#"Based on the following video transcript, suggest 5-10 relevant tags or categories.
Each tag should be a single word or a short 2-3 word phrase.
Focus on the main subjects, themes, and key terms discussed.
Return the result *only* as a JSON object with a single key "tags" which is a list of these tag strings.
Example: {"tags": ["Artificial Intelligence", "Machine Learning", "Python", "Data Science"]}
If no relevant tags can be found, return an empty list for the "tags" key: {"tags": []}

Transcript:
{{transcript}}"#.to_string(),
        }
    }
}

/// Prompts for transcript-grounded chat answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a helpful assistant who answers questions based *only* on the provided video transcript.
If the answer cannot be found in the transcript, respond with "I'm sorry, I cannot answer that question based on the provided transcript."
Do not use any outside knowledge."#.to_string(),

            user: r#"Use the following transcript to answer the user's question.

---
TRANSCRIPT CONTEXT:
{{transcript}}
---

USER QUESTION:
{{question}}"#.to_string(),
        }
    }
}

impl Prompts {
    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom
    /// config variables. Provided variables take precedence.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.key_moments.user.is_empty());
        assert!(!prompts.quiz.system.is_empty());
        assert!(prompts.tags.user.contains("{{transcript}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = std::collections::HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_custom_variables_merge() {
        let mut prompts = Prompts::default();
        prompts
            .variables
            .insert("audience".to_string(), "students".to_string());

        let mut vars = std::collections::HashMap::new();
        vars.insert("question".to_string(), "what is this".to_string());

        let rendered =
            prompts.render_with_custom("For {{audience}}: {{question}}", &vars);
        assert_eq!(rendered, "For students: what is this");
    }
}
