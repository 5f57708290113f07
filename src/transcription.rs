//! Speech-to-text transcription.
//!
//! The transcription service is an external collaborator: it takes an audio
//! file and returns time-coded segments. [`Transcriber`] is the seam so the
//! pipeline can be tested without network calls.

use crate::error::{MerkeError, Result};
use crate::openai::create_client;
use crate::transcript::TranscriptSegment;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs, TimestampGranularity};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument};

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file and return segments with timestamps.
    ///
    /// Zero segments is a valid result for silent or empty audio.
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>>;
}

/// OpenAI Whisper-based transcriber.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber with default settings.
    pub fn new() -> Self {
        Self::with_config("whisper-1", None)
    }

    /// Create a new Whisper transcriber with custom configuration.
    pub fn with_config(model: &str, language: Option<&str>) -> Self {
        Self {
            client: create_client(),
            model: model.to_string(),
            language: language.map(|s| s.to_string()),
        }
    }
}

impl Default for WhisperTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
        debug!("Transcribing audio file");

        let file_bytes = tokio::fs::read(audio_path).await?;

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .timestamp_granularities(vec![TimestampGranularity::Segment]);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder
            .build()
            .map_err(|e| MerkeError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| MerkeError::OpenAI(format!("Whisper API error: {}", e)))?;

        // Parse segments from verbose JSON response
        let segments: Vec<TranscriptSegment> = response
            .segments
            .map(|segs| {
                segs.iter()
                    .map(|s| {
                        TranscriptSegment::new(
                            s.start as f64,
                            s.end as f64,
                            s.text.trim().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_else(|| {
                // Fallback: single segment from full text
                if response.text.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![TranscriptSegment::new(
                        0.0,
                        response.duration as f64,
                        response.text.trim().to_string(),
                    )]
                }
            });

        debug!("Transcribed {} segments", segments.len());
        Ok(segments)
    }
}
