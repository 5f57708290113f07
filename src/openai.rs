//! Shared OpenAI client construction.

use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Requests to the transcription and generation services can legitimately
/// run for minutes on long uploads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Build an OpenAI client with a bounded request timeout, reading the API
/// key from `OPENAI_API_KEY`.
pub fn create_client() -> Client<OpenAIConfig> {
    let http_client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("Failed to create HTTP client");

    Client::with_config(OpenAIConfig::default()).with_http_client(http_client)
}

/// Whether `OPENAI_API_KEY` is present and non-empty.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|v| !v.is_empty())
}
