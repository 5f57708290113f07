//! Mind map generation.

use super::{truncate_chars, TextGenerationClient};
use crate::config::Prompts;
use crate::transcript::KeyMoment;
use std::collections::HashMap;
use tracing::{instrument, warn};

const MAX_PROMPT_CHARS: usize = 15_000;

/// Generate a hierarchical Markdown mind map from transcript text.
///
/// Never fails: service or parse errors produce an explanatory error
/// document instead.
#[instrument(skip_all)]
pub async fn generate_mindmap(
    client: &TextGenerationClient,
    prompts: &Prompts,
    model: &str,
    full_text: &str,
    key_moments: &[KeyMoment],
) -> String {
    if full_text.trim().is_empty() {
        return "# Mind Map Error\n- Empty transcript.".to_string();
    }

    let key_moments_summary = if key_moments.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = key_moments
            .iter()
            .map(|km| format!("- {} ({})", km.label, km.timestamp_start))
            .collect();
        format!("Key moments:\n{}", lines.join("\n"))
    };

    let mut vars = HashMap::new();
    vars.insert("key_moments".to_string(), key_moments_summary);
    vars.insert(
        "transcript".to_string(),
        truncate_chars(full_text, MAX_PROMPT_CHARS).to_string(),
    );

    let user = prompts.render_with_custom(&prompts.mindmap.user, &vars);

    match client.complete(model, &prompts.mindmap.system, &user, 0.5).await {
        Ok(markdown) if !markdown.trim().is_empty() => markdown,
        Ok(_) => "# Mind Map\n- No content.".to_string(),
        Err(e) => {
            warn!("Mind map generation failed: {}", e);
            format!("# Mind Map Error\n- {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;

    #[tokio::test]
    async fn test_empty_transcript_fallback() {
        let client = TextGenerationClient::unconfigured();
        let result =
            generate_mindmap(&client, &Prompts::default(), "gpt-4o-mini", "  ", &[]).await;
        assert!(result.starts_with("# Mind Map Error"));
    }

    #[tokio::test]
    async fn test_unconfigured_client_fallback() {
        let client = TextGenerationClient::unconfigured();
        let result =
            generate_mindmap(&client, &Prompts::default(), "gpt-4o-mini", "some talk", &[]).await;
        assert!(result.starts_with("# Mind Map Error"));
    }
}
