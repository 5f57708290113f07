//! Topical tag generation.

use super::{truncate_chars, TextGenerationClient};
use crate::config::Prompts;
use std::collections::HashMap;
use tracing::{instrument, warn};

const MAX_PROMPT_CHARS: usize = 10_000;

/// Generate 5-10 topical tags from transcript text.
///
/// Never fails: any error yields an empty tag list.
#[instrument(skip_all)]
pub async fn generate_tags(
    client: &TextGenerationClient,
    prompts: &Prompts,
    model: &str,
    full_text: &str,
) -> Vec<String> {
    if full_text.trim().is_empty() {
        return Vec::new();
    }

    let mut vars = HashMap::new();
    vars.insert(
        "transcript".to_string(),
        truncate_chars(full_text, MAX_PROMPT_CHARS).to_string(),
    );

    let user = prompts.render_with_custom(&prompts.tags.user, &vars);

    let raw = match client
        .complete_json(model, &prompts.tags.system, &user, 0.3)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Tag generation failed: {}", e);
            return Vec::new();
        }
    };

    parse_tags(&raw)
}

/// Parse the `{"tags": [...]}` response, ignoring non-string entries.
fn parse_tags(raw: &str) -> Vec<String> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Tag response was not valid JSON: {}", e);
            return Vec::new();
        }
    };

    value
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags(r#"{"tags": ["Rust", "Audio Processing", " trimmed "]}"#);
        assert_eq!(tags, vec!["Rust", "Audio Processing", "trimmed"]);
    }

    #[test]
    fn test_parse_tags_tolerates_bad_shapes() {
        assert!(parse_tags("nonsense").is_empty());
        assert!(parse_tags(r#"{"tags": "not a list"}"#).is_empty());
        assert_eq!(parse_tags(r#"{"tags": ["ok", 42, null]}"#), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_unconfigured_client_yields_empty() {
        let client = TextGenerationClient::unconfigured();
        let tags =
            generate_tags(&client, &Prompts::default(), "gpt-4o-mini", "some text").await;
        assert!(tags.is_empty());
    }
}
