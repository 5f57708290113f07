//! Key-moment proposal and extraction.
//!
//! The text-generation service proposes (label, starting phrase) pairs for
//! a transcript; the aligner then anchors them to real segment start
//! times. Proposal failures propagate to the caller (the pipeline decides
//! what a failed run means); alignment itself never errors.

use super::{truncate_chars, TextGenerationClient};
use crate::config::Prompts;
use crate::error::Result;
use crate::transcript::{align_key_moments, KeyMoment, ProposedMoment, TranscriptSegment};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Character cap on transcript text fed to the proposal prompt.
const MAX_PROMPT_CHARS: usize = 15_000;

/// Suggest how many chapters to ask for, based on media duration.
pub fn suggest_chapter_count(duration_seconds: f64) -> &'static str {
    let minutes = duration_seconds / 60.0;
    if minutes > 20.0 {
        "7-10"
    } else if minutes < 5.0 {
        "3-5"
    } else {
        "5-7"
    }
}

/// Ask the service for chapter proposals for a transcript.
///
/// Returns an empty list when the response parses but carries no moments
/// or does not match the expected structure; only the service call itself
/// can fail.
#[instrument(skip_all)]
pub async fn propose_moments(
    client: &TextGenerationClient,
    prompts: &Prompts,
    model: &str,
    full_text: &str,
    duration_seconds: f64,
) -> Result<Vec<ProposedMoment>> {
    if full_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut vars = HashMap::new();
    vars.insert(
        "num_chapters".to_string(),
        suggest_chapter_count(duration_seconds).to_string(),
    );
    vars.insert(
        "transcript".to_string(),
        truncate_chars(full_text, MAX_PROMPT_CHARS).to_string(),
    );

    let user = prompts.render_with_custom(&prompts.key_moments.user, &vars);
    let raw = client
        .complete_json(model, &prompts.key_moments.system, &user, 0.3)
        .await?;

    Ok(parse_proposals(&raw))
}

/// Parse the `{"key_moments": [...]}` response, tolerating malformed
/// entries and wrong shapes.
fn parse_proposals(raw: &str) -> Vec<ProposedMoment> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Key-moment response was not valid JSON: {}", e);
            return Vec::new();
        }
    };

    match value.get("key_moments").and_then(|v| v.as_array()) {
        Some(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value::<ProposedMoment>(item.clone()).ok())
            .collect(),
        None => {
            warn!("Key-moment response missing 'key_moments' list");
            Vec::new()
        }
    }
}

/// Full extraction: propose chapters, then align them to segment starts.
#[instrument(skip_all, fields(segments = segments.len()))]
pub async fn extract_key_moments(
    client: &TextGenerationClient,
    prompts: &Prompts,
    model: &str,
    segments: &[TranscriptSegment],
) -> Result<Vec<KeyMoment>> {
    let full_text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    if full_text.trim().is_empty() {
        debug!("Empty transcript text, skipping key-moment extraction");
        return Ok(Vec::new());
    }

    let duration = segments.last().map(|s| s.end).unwrap_or(0.0);
    let proposed = propose_moments(client, prompts, model, &full_text, duration).await?;

    info!("Aligning {} proposed moments", proposed.len());
    Ok(align_key_moments(segments, &proposed))
}
