//! Video processing orchestration.
//!
//! The pipeline owns the end-to-end flow for one video: extract audio,
//! transcribe, anchor key moments, tag, and persist. Fatal steps (audio
//! extraction, transcription) fail the run and record a placeholder
//! transcript; artifact generation after that point degrades to fallbacks
//! instead of failing.

use crate::config::{Prompts, Settings};
use crate::error::{MerkeError, Result};
use crate::generate::{
    self, answer_question, generate_mindmap, generate_quiz, generate_tags, ChatTurn,
    TextGenerationClient,
};
use crate::media::{cleanup_audio, extract_audio};
use crate::store::{SqliteStore, VideoStatus, VideoUpdate};
use crate::transcript::{StoredTranscript, Transcript};
use crate::transcription::Transcriber;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Orchestrates processing and artifact generation for stored videos.
///
/// Cheap to clone; shared across request handlers and background tasks.
#[derive(Clone)]
pub struct ProcessingPipeline {
    store: Arc<SqliteStore>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<TextGenerationClient>,
    prompts: Arc<Prompts>,
    settings: Arc<Settings>,
}

impl ProcessingPipeline {
    pub fn new(
        store: Arc<SqliteStore>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<TextGenerationClient>,
        prompts: Arc<Prompts>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            transcriber,
            generator,
            prompts,
            settings,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Run the full processing flow for an uploaded video.
    ///
    /// On success the video ends `completed` with its transcript and tags
    /// persisted together. On a fatal failure it ends `failed` with a
    /// placeholder transcript describing the error. The status is always
    /// resolved; this method itself only errors if the store does.
    #[instrument(skip(self))]
    pub async fn process_video(&self, video_id: i64) -> Result<()> {
        self.store.update_video(
            video_id,
            VideoUpdate {
                status: Some(VideoStatus::Processing),
                ..Default::default()
            },
        )?;

        match self.process_inner(video_id).await {
            Ok(()) => {
                info!("Video {} processed successfully", video_id);
                Ok(())
            }
            Err(e) => {
                error!("Processing video {} failed: {}", video_id, e);
                let placeholder =
                    Transcript::placeholder(format!("Processing error: {}", e));
                let stored = StoredTranscript::from(&placeholder);
                self.store.update_video(
                    video_id,
                    VideoUpdate {
                        status: Some(VideoStatus::Failed),
                        transcript: Some(serde_json::to_string(&stored)?),
                        ..Default::default()
                    },
                )?;
                Ok(())
            }
        }
    }

    async fn process_inner(&self, video_id: i64) -> Result<()> {
        let video = self.store.get_video(video_id)?;
        let video_path = Path::new(&video.filepath);
        let timeout = Duration::from_secs(self.settings.audio.extraction_timeout_seconds);

        let audio_path = extract_audio(video_path, timeout).await?;

        let transcribed = self.transcriber.transcribe(&audio_path).await;
        cleanup_audio(&audio_path);
        let segments = transcribed?;

        // Key-moment proposal failures degrade to an empty chapter list;
        // the transcript itself is still worth keeping.
        let key_moments = match generate::extract_key_moments(
            &self.generator,
            &self.prompts,
            &self.settings.generation.structured_model,
            &segments,
        )
        .await
        {
            Ok(moments) => moments,
            Err(e) => {
                warn!("Key-moment extraction failed for video {}: {}", video_id, e);
                Vec::new()
            }
        };

        let transcript = Transcript::new(segments, key_moments);
        let tags = generate_tags(
            &self.generator,
            &self.prompts,
            &self.settings.generation.structured_model,
            &transcript.full_text(),
        )
        .await;

        let stored = StoredTranscript::from(&transcript);
        self.store.update_video(
            video_id,
            VideoUpdate {
                status: Some(VideoStatus::Completed),
                transcript: Some(serde_json::to_string(&stored)?),
                tags: Some(tags),
                ..Default::default()
            },
        )?;

        Ok(())
    }

    /// Generate (or regenerate) the mind map for a completed video.
    #[instrument(skip(self))]
    pub async fn generate_mindmap(&self, video_id: i64) -> Result<String> {
        let transcript = self.require_completed_transcript(video_id)?;

        self.store.update_video(
            video_id,
            VideoUpdate {
                status: Some(VideoStatus::GeneratingMindmap),
                ..Default::default()
            },
        )?;

        let mindmap = generate_mindmap(
            &self.generator,
            &self.prompts,
            &self.settings.generation.text_model,
            &transcript.full_text(),
            &transcript.key_moments,
        )
        .await;

        // The generator never fails, so the video always returns to
        // completed with some document attached.
        self.store.update_video(
            video_id,
            VideoUpdate {
                status: Some(VideoStatus::Completed),
                mindmap: Some(mindmap.clone()),
                ..Default::default()
            },
        )?;

        Ok(mindmap)
    }

    /// Generate (or regenerate) the quiz for a completed video.
    #[instrument(skip(self))]
    pub async fn generate_quiz(&self, video_id: i64) -> Result<generate::Quiz> {
        let video = self.store.get_video(video_id)?;
        let transcript = self.require_completed_transcript(video_id)?;

        self.store.update_video(
            video_id,
            VideoUpdate {
                status: Some(VideoStatus::GeneratingQuiz),
                ..Default::default()
            },
        )?;

        let quiz = generate_quiz(
            &self.generator,
            &self.prompts,
            &self.settings.generation.structured_model,
            &transcript.full_text(),
            &video.filename,
        )
        .await;

        self.store.update_video(
            video_id,
            VideoUpdate {
                status: Some(VideoStatus::Completed),
                quiz: Some(serde_json::to_string(&quiz)?),
                ..Default::default()
            },
        )?;

        Ok(quiz)
    }

    /// Answer a viewer question about a published video, grounded in its
    /// transcript.
    #[instrument(skip(self, question, history))]
    pub async fn answer_chat(
        &self,
        slug: &str,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let video = self.store.get_video_by_slug(slug)?;
        let full_text = video
            .parsed_transcript()?
            .map(|t| t.full_text())
            .unwrap_or_default();

        Ok(answer_question(
            &self.generator,
            &self.prompts,
            &self.settings.generation.text_model,
            &full_text,
            question,
            history,
        )
        .await)
    }

    /// Fetch the video's transcript, requiring `completed` status.
    pub(crate) fn require_completed_transcript(
        &self,
        video_id: i64,
    ) -> Result<StoredTranscript> {
        let video = self.store.get_video(video_id)?;

        if video.status != VideoStatus::Completed {
            return Err(MerkeError::Precondition(format!(
                "Video {} is {}, not completed",
                video_id, video.status
            )));
        }

        video.parsed_transcript()?.ok_or_else(|| {
            MerkeError::Precondition(format!("Video {} has no transcript", video_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptSegment;
    use async_trait::async_trait;

    struct StubTranscriber;

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
            Ok(vec![TranscriptSegment::new(0.0, 5.0, "Hello world")])
        }
    }

    fn pipeline() -> ProcessingPipeline {
        ProcessingPipeline::new(
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(StubTranscriber),
            Arc::new(TextGenerationClient::unconfigured()),
            Arc::new(Prompts::default()),
            Arc::new(Settings::default()),
        )
    }

    fn seed_video(pipeline: &ProcessingPipeline, filepath: &str) -> i64 {
        let project = pipeline.store().create_project("P").unwrap();
        pipeline
            .store()
            .create_video(project.id, "talk.mp4", filepath)
            .unwrap()
            .id
    }

    fn complete_with_transcript(pipeline: &ProcessingPipeline, video_id: i64) {
        let transcript = Transcript::new(
            vec![TranscriptSegment::new(0.0, 5.0, "Hello world")],
            Vec::new(),
        );
        let stored = StoredTranscript::from(&transcript);
        pipeline
            .store()
            .update_video(
                video_id,
                VideoUpdate {
                    status: Some(VideoStatus::Completed),
                    transcript: Some(serde_json::to_string(&stored).unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_fatal_failure_records_placeholder() {
        let pipeline = pipeline();
        let video_id = seed_video(&pipeline, "/tmp/merke-test-does-not-exist.mp4");

        // Extraction fails (missing file, or no ffmpeg at all); either way
        // the run must resolve to `failed` with a diagnostic transcript.
        pipeline.process_video(video_id).await.unwrap();

        let video = pipeline.store().get_video(video_id).unwrap();
        assert_eq!(video.status, VideoStatus::Failed);

        let stored = video.parsed_transcript().unwrap().unwrap();
        assert!(stored.segments.is_empty());
        assert_eq!(stored.key_moments.len(), 1);
        assert!(stored.key_moments[0].label.starts_with("Processing error"));
        assert_eq!(stored.key_moments[0].timestamp_start, "00:00:00.000");
    }

    #[tokio::test]
    async fn test_mindmap_requires_completed_status() {
        let pipeline = pipeline();
        let video_id = seed_video(&pipeline, "/tmp/x.mp4");

        let err = pipeline.generate_mindmap(video_id).await.unwrap_err();
        assert!(matches!(err, MerkeError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_mindmap_fallback_keeps_completed_status() {
        let pipeline = pipeline();
        let video_id = seed_video(&pipeline, "/tmp/x.mp4");
        complete_with_transcript(&pipeline, video_id);

        let mindmap = pipeline.generate_mindmap(video_id).await.unwrap();
        assert!(mindmap.starts_with("# Mind Map Error"));

        let video = pipeline.store().get_video(video_id).unwrap();
        assert_eq!(video.status, VideoStatus::Completed);
        assert_eq!(video.mindmap.as_deref(), Some(mindmap.as_str()));
    }

    #[tokio::test]
    async fn test_quiz_fallback_keeps_completed_status() {
        let pipeline = pipeline();
        let video_id = seed_video(&pipeline, "/tmp/x.mp4");
        complete_with_transcript(&pipeline, video_id);

        let quiz = pipeline.generate_quiz(video_id).await.unwrap();
        assert_eq!(quiz.questions.len(), 1);

        let video = pipeline.store().get_video(video_id).unwrap();
        assert_eq!(video.status, VideoStatus::Completed);
        assert!(video.parsed_quiz().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_chat_requires_published_video() {
        let pipeline = pipeline();
        let err = pipeline
            .answer_chat("no-such-slug", "what?", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MerkeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_chat_on_published_video_falls_back() {
        let pipeline = pipeline();
        let video_id = seed_video(&pipeline, "/tmp/x.mp4");
        complete_with_transcript(&pipeline, video_id);

        let published = pipeline.store().publish_video(video_id).unwrap();
        let slug = published.public_slug.unwrap();

        let answer = pipeline.answer_chat(&slug, "what?", &[]).await.unwrap();
        assert_eq!(answer, generate::CHAT_FALLBACK_ANSWER);
    }
}
