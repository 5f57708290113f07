//! HTTP API server.
//!
//! Provides the REST surface over projects, videos, processing, and the
//! public viewing endpoints. Uploads return immediately; processing and
//! artifact generation run as detached background tasks that clients
//! observe by polling video status.

use crate::config::Settings;
use crate::error::{MerkeError, Result};
use crate::generate::{ChatTurn, Quiz, TextGenerationClient};
use crate::pipeline::ProcessingPipeline;
use crate::store::{SqliteStore, Video, VideoStatus, VideoUpdate};
use crate::transcript::StoredTranscript;
use crate::transcription::WhisperTranscriber;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    pipeline: ProcessingPipeline,
    settings: Arc<Settings>,
}

/// Run the HTTP API server.
pub async fn run_server(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let settings = Arc::new(settings);

    std::fs::create_dir_all(settings.upload_dir())?;

    let store = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
    let transcriber = Arc::new(WhisperTranscriber::with_config(
        &settings.transcription.model,
        settings.transcription.language.as_deref(),
    ));
    let generator = Arc::new(TextGenerationClient::from_env());
    let prompts = Arc::new(settings.prompts());

    let pipeline = ProcessingPipeline::new(
        store,
        transcriber,
        generator,
        prompts,
        settings.clone(),
    );

    let state = Arc::new(AppState {
        pipeline,
        settings: settings.clone(),
    });

    let app = build_app(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Merke API server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the router with CORS and the configured upload size limit.
fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Video uploads dwarf axum's default body cap.
    let max_body_bytes = state.settings.storage.max_upload_mb as usize * 1024 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/videos", post(upload_video).get(list_videos))
        .route("/projects/{id}/videos/{vid}", delete(delete_video))
        .route("/videos/{id}", get(get_video))
        .route("/videos/{id}/tags", put(update_tags))
        .route("/videos/{id}/mindmap", post(request_mindmap))
        .route("/videos/{id}/quiz", post(request_quiz))
        .route("/videos/{id}/publish", post(publish_video))
        .route("/videos/{id}/unpublish", post(unpublish_video))
        .route("/public/videos/{slug}", get(get_public_video))
        .route("/public/videos/{slug}/chat", post(public_chat))
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// === Error mapping ===

/// API-level error: an HTTP status plus a message serialized as
/// `{"error": "..."}`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl From<MerkeError> for ApiError {
    fn from(e: MerkeError) -> Self {
        let status = match &e {
            MerkeError::NotFound(_) => StatusCode::NOT_FOUND,
            MerkeError::Conflict(_) | MerkeError::Precondition(_) => StatusCode::CONFLICT,
            MerkeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// === Request/Response Types ===

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
}

#[derive(Serialize)]
struct ProjectResponse {
    id: i64,
    name: String,
    created_at: String,
}

#[derive(Serialize)]
struct VideoResponse {
    id: i64,
    project_id: i64,
    filename: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<StoredTranscript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mindmap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quiz: Option<Quiz>,
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_slug: Option<String>,
    published: bool,
    uploaded_at: String,
}

#[derive(Serialize)]
struct PublicVideoResponse {
    filename: String,
    project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<StoredTranscript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mindmap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quiz: Option<Quiz>,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct GenerationAccepted {
    status: String,
}

#[derive(Deserialize)]
struct UpdateTagsRequest {
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

impl From<crate::store::Project> for ProjectResponse {
    fn from(p: crate::store::Project) -> Self {
        Self {
            id: p.id,
            name: p.name,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

fn video_response(video: Video) -> Result<VideoResponse> {
    let transcript = video.parsed_transcript()?;
    let quiz = video.parsed_quiz()?;
    Ok(VideoResponse {
        id: video.id,
        project_id: video.project_id,
        filename: video.filename,
        status: video.status.to_string(),
        transcript,
        mindmap: video.mindmap,
        quiz,
        tags: video.tags,
        public_slug: video.public_slug,
        published: video.published,
        uploaded_at: video.uploaded_at.to_rfc3339(),
    })
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectResponse>)> {
    let project = state.pipeline.store().create_project(&req.name)?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ProjectResponse>>> {
    let projects = state.pipeline.store().list_projects()?;
    Ok(Json(projects.into_iter().map(Into::into).collect()))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state.pipeline.store().get_project(project_id)?;
    Ok(Json(project.into()))
}

/// Accept a multipart video upload, persist it under a fresh name, and
/// kick off processing in the background.
async fn upload_video(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<VideoResponse>)> {
    // Validate the project before touching the filesystem.
    state.pipeline.store().get_project(project_id)?;

    // Stream the upload to disk rather than buffering it; videos can run
    // to gigabytes.
    let mut upload: Option<(String, std::path::PathBuf, u64)> = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| MerkeError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.mp4").to_string();
        let stored_path = state
            .settings
            .upload_dir()
            .join(format!("{}.{}", Uuid::new_v4(), file_extension(&filename)));

        let mut file = tokio::fs::File::create(&stored_path)
            .await
            .map_err(MerkeError::Io)?;
        let mut written: u64 = 0;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    written += chunk.len() as u64;
                    file.write_all(&chunk).await.map_err(MerkeError::Io)?;
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&stored_path).await;
                    return Err(MerkeError::InvalidInput(format!(
                        "Failed to read upload: {}",
                        e
                    ))
                    .into());
                }
            }
        }
        file.flush().await.map_err(MerkeError::Io)?;

        upload = Some((filename, stored_path, written));
        break;
    }

    let (filename, stored_path, written) = upload
        .ok_or_else(|| MerkeError::InvalidInput("Missing 'file' field in upload".to_string()))?;
    if written == 0 {
        let _ = tokio::fs::remove_file(&stored_path).await;
        return Err(MerkeError::InvalidInput("Uploaded file is empty".to_string()).into());
    }

    let video = state.pipeline.store().create_video(
        project_id,
        &filename,
        &stored_path.to_string_lossy(),
    )?;
    let video = state.pipeline.store().update_video(
        video.id,
        VideoUpdate {
            status: Some(VideoStatus::Processing),
            ..Default::default()
        },
    )?;

    let pipeline = state.pipeline.clone();
    let video_id = video.id;
    tokio::spawn(async move {
        if let Err(e) = pipeline.process_video(video_id).await {
            error!("Background processing of video {} failed: {}", video_id, e);
        }
    });

    Ok((StatusCode::ACCEPTED, Json(video_response(video)?)))
}

async fn list_videos(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Vec<VideoResponse>>> {
    state.pipeline.store().get_project(project_id)?;
    let videos = state.pipeline.store().list_videos(project_id)?;
    let responses = videos
        .into_iter()
        .map(video_response)
        .collect::<Result<Vec<_>>>()?;
    Ok(Json(responses))
}

async fn delete_video(
    State(state): State<Arc<AppState>>,
    Path((project_id, video_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let video = state.pipeline.store().get_video(video_id)?;
    if video.project_id != project_id {
        return Err(ApiError::forbidden(format!(
            "Video {} does not belong to project {}",
            video_id, project_id
        )));
    }

    state.pipeline.store().delete_video(video_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> ApiResult<Json<VideoResponse>> {
    let video = state.pipeline.store().get_video(video_id)?;
    Ok(Json(video_response(video)?))
}

async fn update_tags(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
    Json(req): Json<UpdateTagsRequest>,
) -> ApiResult<Json<VideoResponse>> {
    let tags: Vec<String> = req
        .tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let video = state.pipeline.store().update_video(
        video_id,
        VideoUpdate {
            tags: Some(tags),
            ..Default::default()
        },
    )?;
    Ok(Json(video_response(video)?))
}

/// Which artifact a generation endpoint kicks off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationKind {
    Mindmap,
    Quiz,
}

impl GenerationKind {
    fn status(self) -> VideoStatus {
        match self {
            GenerationKind::Mindmap => VideoStatus::GeneratingMindmap,
            GenerationKind::Quiz => VideoStatus::GeneratingQuiz,
        }
    }
}

async fn request_mindmap(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<GenerationAccepted>)> {
    spawn_generation(&state, video_id, GenerationKind::Mindmap)
}

async fn request_quiz(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<GenerationAccepted>)> {
    spawn_generation(&state, video_id, GenerationKind::Quiz)
}

/// Common path for the two artifact endpoints: verify the precondition
/// synchronously, then detach the generation task.
fn spawn_generation(
    state: &Arc<AppState>,
    video_id: i64,
    kind: GenerationKind,
) -> ApiResult<(StatusCode, Json<GenerationAccepted>)> {
    state.pipeline.require_completed_transcript(video_id)?;

    let pipeline = state.pipeline.clone();
    let status = kind.status().to_string();
    tokio::spawn(async move {
        let result = match kind {
            GenerationKind::Mindmap => pipeline.generate_mindmap(video_id).await.map(|_| ()),
            GenerationKind::Quiz => pipeline.generate_quiz(video_id).await.map(|_| ()),
        };
        if let Err(e) = result {
            error!("Background generation for video {} failed: {}", video_id, e);
        }
    });

    Ok((StatusCode::ACCEPTED, Json(GenerationAccepted { status })))
}

async fn publish_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> ApiResult<Json<VideoResponse>> {
    let video = state.pipeline.store().publish_video(video_id)?;
    Ok(Json(video_response(video)?))
}

async fn unpublish_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> ApiResult<Json<VideoResponse>> {
    let video = state.pipeline.store().unpublish_video(video_id)?;
    Ok(Json(video_response(video)?))
}

async fn get_public_video(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<PublicVideoResponse>> {
    let video = state.pipeline.store().get_video_by_slug(&slug)?;
    let project = state.pipeline.store().get_project(video.project_id)?;

    let transcript = video.parsed_transcript()?;
    let quiz = video.parsed_quiz()?;

    Ok(Json(PublicVideoResponse {
        filename: video.filename,
        project_name: project.name,
        transcript,
        mindmap: video.mindmap,
        quiz,
        tags: video.tags,
    }))
}

async fn public_chat(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if req.question.trim().is_empty() {
        return Err(MerkeError::InvalidInput("Question is empty".to_string()).into());
    }

    let answer = state
        .pipeline
        .answer_chat(&slug, &req.question, &req.history)
        .await?;
    Ok(Json(ChatResponse { answer }))
}

/// Pull a safe extension from the uploaded filename; anything odd becomes
/// `mp4`.
fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(upload_dir: &std::path::Path) -> (Router, Arc<SqliteStore>) {
        let mut settings = Settings::default();
        settings.storage.upload_dir = upload_dir.to_string_lossy().to_string();
        let settings = Arc::new(settings);

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pipeline = ProcessingPipeline::new(
            store.clone(),
            Arc::new(WhisperTranscriber::new()),
            Arc::new(TextGenerationClient::unconfigured()),
            Arc::new(settings.prompts()),
            settings.clone(),
        );
        let state = Arc::new(AppState { pipeline, settings });
        (build_app(state), store)
    }

    fn multipart_upload(uri: &str, filename: &str, payload: &[u8]) -> Request<Body> {
        let boundary = "merke-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_larger_than_default_body_cap_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store) = test_app(dir.path());
        let project = store.create_project("P").unwrap();

        // 3 MiB: over axum's built-in 2 MB default, well under ours.
        let payload = vec![0u8; 3 * 1024 * 1024];
        let request = multipart_upload(
            &format!("/projects/{}/videos", project.id),
            "lecture.mp4",
            &payload,
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let videos = store.list_videos(project.id).unwrap();
        assert_eq!(videos.len(), 1);
        let stored = std::path::PathBuf::from(&videos[0].filepath);
        assert_eq!(
            std::fs::metadata(&stored).unwrap().len(),
            payload.len() as u64
        );
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store) = test_app(dir.path());
        let project = store.create_project("P").unwrap();

        let request = multipart_upload(
            &format!("/projects/{}/videos", project.id),
            "empty.mp4",
            &[],
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.list_videos(project.id).unwrap().is_empty());
    }

    #[test]
    fn test_generation_kind_status() {
        assert_eq!(
            GenerationKind::Mindmap.status(),
            VideoStatus::GeneratingMindmap
        );
        assert_eq!(GenerationKind::Quiz.status(), VideoStatus::GeneratingQuiz);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("lecture.MP4"), "mp4");
        assert_eq!(file_extension("talk.webm"), "webm");
        assert_eq!(file_extension("no-extension"), "mp4");
        assert_eq!(file_extension("weird.ex!t"), "mp4");
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (MerkeError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (MerkeError::Conflict("x".into()), StatusCode::CONFLICT),
            (MerkeError::Precondition("x".into()), StatusCode::CONFLICT),
            (MerkeError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                MerkeError::Store("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }
}
