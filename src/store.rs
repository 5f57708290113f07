//! SQLite-backed persistence for projects and videos.
//!
//! Uses a single connection behind a mutex; at this scale the store is a
//! simple gateway, not a bottleneck. Transcript and quiz JSON are
//! validated at this boundary: a malformed stored record surfaces as
//! [`MerkeError::MalformedRecord`] rather than silently degrading.

use crate::error::{MerkeError, Result};
use crate::generate::Quiz;
use crate::transcript::StoredTranscript;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Processing state of a video.
///
/// `uploaded → processing → completed | failed`; the generating states are
/// entered from `completed` and always return to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    GeneratingMindmap,
    GeneratingQuiz,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
            VideoStatus::GeneratingMindmap => "generating_mindmap",
            VideoStatus::GeneratingQuiz => "generating_quiz",
        }
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(VideoStatus::Uploaded),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            "generating_mindmap" => Ok(VideoStatus::GeneratingMindmap),
            "generating_quiz" => Ok(VideoStatus::GeneratingQuiz),
            _ => Err(format!("Unknown video status: {}", s)),
        }
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A project groups uploaded videos.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A stored video record.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: i64,
    pub project_id: i64,
    pub filename: String,
    pub filepath: String,
    pub status: VideoStatus,
    /// Durable transcript JSON (the wire contract shape), if transcribed.
    pub transcript: Option<String>,
    /// Mind map Markdown, if generated.
    pub mindmap: Option<String>,
    /// Quiz JSON, if generated.
    pub quiz: Option<String>,
    pub tags: Vec<String>,
    pub public_slug: Option<String>,
    pub published: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl Video {
    /// Parse the stored transcript, validating its shape.
    pub fn parsed_transcript(&self) -> Result<Option<StoredTranscript>> {
        match &self.transcript {
            None => Ok(None),
            Some(json) => serde_json::from_str(json).map(Some).map_err(|e| {
                MerkeError::MalformedRecord(format!("transcript for video {}: {}", self.id, e))
            }),
        }
    }

    /// Parse the stored quiz, validating its shape.
    pub fn parsed_quiz(&self) -> Result<Option<Quiz>> {
        match &self.quiz {
            None => Ok(None),
            Some(json) => serde_json::from_str(json).map(Some).map_err(|e| {
                MerkeError::MalformedRecord(format!("quiz for video {}: {}", self.id, e))
            }),
        }
    }
}

/// Partial update for a video: only `Some` fields are applied.
#[derive(Debug, Default)]
pub struct VideoUpdate {
    pub status: Option<VideoStatus>,
    pub transcript: Option<String>,
    pub mindmap: Option<String>,
    pub quiz: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// SQLite-backed store for projects and videos.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        filename TEXT NOT NULL,
        filepath TEXT NOT NULL,
        status TEXT NOT NULL,
        transcript TEXT,
        mindmap TEXT,
        quiz TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        public_slug TEXT,
        published INTEGER NOT NULL DEFAULT 0,
        uploaded_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_videos_project_id ON videos(project_id);
    CREATE INDEX IF NOT EXISTS idx_videos_public_slug ON videos(public_slug);
"#;

impl SqliteStore {
    /// Open (or create) the store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MerkeError::Store(format!("Failed to acquire lock: {}", e)))
    }

    // === Projects ===

    pub fn create_project(&self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MerkeError::InvalidInput("Project name is empty".into()));
        }

        let conn = self.lock()?;
        let created_at = Utc::now();

        let result = conn.execute(
            "INSERT INTO projects (name, created_at) VALUES (?1, ?2)",
            params![name, created_at.to_rfc3339()],
        );

        match result {
            Ok(_) => Ok(Project {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                created_at,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(MerkeError::Conflict(format!(
                    "Project name already registered: {}",
                    name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_project(&self, project_id: i64) -> Result<Project> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, created_at FROM projects WHERE id = ?1",
            params![project_id],
            map_project,
        )
        .optional()?
        .ok_or_else(|| MerkeError::NotFound(format!("Project {}", project_id)))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, created_at FROM projects ORDER BY id")?;
        let projects = stmt
            .query_map([], map_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    // === Videos ===

    pub fn create_video(
        &self,
        project_id: i64,
        filename: &str,
        filepath: &str,
    ) -> Result<Video> {
        let conn = self.lock()?;
        let uploaded_at = Utc::now();

        conn.execute(
            r#"
            INSERT INTO videos (project_id, filename, filepath, status, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                project_id,
                filename,
                filepath,
                VideoStatus::Uploaded.as_str(),
                uploaded_at.to_rfc3339()
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Created video {} in project {}", id, project_id);

        Ok(Video {
            id,
            project_id,
            filename: filename.to_string(),
            filepath: filepath.to_string(),
            status: VideoStatus::Uploaded,
            transcript: None,
            mindmap: None,
            quiz: None,
            tags: Vec::new(),
            public_slug: None,
            published: false,
            uploaded_at,
        })
    }

    pub fn get_video(&self, video_id: i64) -> Result<Video> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_VIDEO),
            params![video_id],
            map_video,
        )
        .optional()?
        .ok_or_else(|| MerkeError::NotFound(format!("Video {}", video_id)))
    }

    /// Look up a published video by its public slug.
    pub fn get_video_by_slug(&self, slug: &str) -> Result<Video> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{} WHERE public_slug = ?1 AND published = 1", SELECT_VIDEO),
            params![slug],
            map_video,
        )
        .optional()?
        .ok_or_else(|| MerkeError::NotFound(format!("Public video {}", slug)))
    }

    pub fn list_videos(&self, project_id: i64) -> Result<Vec<Video>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE project_id = ?1 ORDER BY id",
            SELECT_VIDEO
        ))?;
        let videos = stmt
            .query_map(params![project_id], map_video)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(videos)
    }

    /// Apply a partial update: only fields set in `update` are written.
    #[instrument(skip(self, update))]
    pub fn update_video(&self, video_id: i64, update: VideoUpdate) -> Result<Video> {
        {
            let conn = self.lock()?;

            if let Some(status) = update.status {
                conn.execute(
                    "UPDATE videos SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), video_id],
                )?;
            }
            if let Some(transcript) = &update.transcript {
                conn.execute(
                    "UPDATE videos SET transcript = ?1 WHERE id = ?2",
                    params![transcript, video_id],
                )?;
            }
            if let Some(mindmap) = &update.mindmap {
                conn.execute(
                    "UPDATE videos SET mindmap = ?1 WHERE id = ?2",
                    params![mindmap, video_id],
                )?;
            }
            if let Some(quiz) = &update.quiz {
                conn.execute(
                    "UPDATE videos SET quiz = ?1 WHERE id = ?2",
                    params![quiz, video_id],
                )?;
            }
            if let Some(tags) = &update.tags {
                conn.execute(
                    "UPDATE videos SET tags = ?1 WHERE id = ?2",
                    params![serde_json::to_string(tags)?, video_id],
                )?;
            }
        }

        self.get_video(video_id)
    }

    /// Delete a video record and best-effort remove its file from disk.
    pub fn delete_video(&self, video_id: i64) -> Result<()> {
        let video = self.get_video(video_id)?;

        let conn = self.lock()?;
        conn.execute("DELETE FROM videos WHERE id = ?1", params![video_id])?;
        drop(conn);

        let path = Path::new(&video.filepath);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove video file {:?}: {}", path, e);
            }
        }

        info!("Deleted video {}", video_id);
        Ok(())
    }

    /// Publish a video: sets the visibility flag and assigns a fresh public
    /// slug only when none exists yet.
    pub fn publish_video(&self, video_id: i64) -> Result<Video> {
        let video = self.get_video(video_id)?;

        let slug = match video.public_slug {
            Some(slug) => slug,
            None => Uuid::new_v4().to_string(),
        };

        let conn = self.lock()?;
        conn.execute(
            "UPDATE videos SET published = 1, public_slug = ?1 WHERE id = ?2",
            params![slug, video_id],
        )?;
        drop(conn);

        self.get_video(video_id)
    }

    /// Unpublish a video, clearing the slug. A later re-publish gets a new
    /// slug, never a reused one.
    pub fn unpublish_video(&self, video_id: i64) -> Result<Video> {
        // Ensure the video exists before updating.
        self.get_video(video_id)?;

        let conn = self.lock()?;
        conn.execute(
            "UPDATE videos SET published = 0, public_slug = NULL WHERE id = ?1",
            params![video_id],
        )?;
        drop(conn);

        self.get_video(video_id)
    }
}

const SELECT_VIDEO: &str = r#"
    SELECT id, project_id, filename, filepath, status, transcript,
           mindmap, quiz, tags, public_slug, published, uploaded_at
    FROM videos
"#;

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_datetime(row.get::<_, String>(2)?, 2)?,
    })
}

fn map_video(row: &Row<'_>) -> rusqlite::Result<Video> {
    let status_str: String = row.get(4)?;
    let status = status_str
        .parse::<VideoStatus>()
        .map_err(|e| conversion_error(4, e))?;

    let tags_json: String = row.get(8)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Video {
        id: row.get(0)?,
        project_id: row.get(1)?,
        filename: row.get(2)?,
        filepath: row.get(3)?,
        status,
        transcript: row.get(5)?,
        mindmap: row.get(6)?,
        quiz: row.get(7)?,
        tags,
        public_slug: row.get(9)?,
        published: row.get::<_, i64>(10)? != 0,
        uploaded_at: parse_datetime(row.get::<_, String>(11)?, 11)?,
    })
}

fn parse_datetime(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e.to_string()))
}

fn conversion_error(column: usize, message: impl ToString) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.to_string().into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    #[test]
    fn test_project_lifecycle() {
        let store = store();
        let project = store.create_project("Lectures").unwrap();
        assert_eq!(project.name, "Lectures");

        let fetched = store.get_project(project.id).unwrap();
        assert_eq!(fetched.name, "Lectures");

        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_project_name_conflicts() {
        let store = store();
        store.create_project("Lectures").unwrap();
        let err = store.create_project("Lectures").unwrap_err();
        assert!(matches!(err, MerkeError::Conflict(_)));
    }

    #[test]
    fn test_missing_project_not_found() {
        let err = store().get_project(42).unwrap_err();
        assert!(matches!(err, MerkeError::NotFound(_)));
    }

    #[test]
    fn test_video_creation_defaults() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let video = store
            .create_video(project.id, "talk.mp4", "/tmp/abc.mp4")
            .unwrap();

        assert_eq!(video.status, VideoStatus::Uploaded);
        assert!(video.transcript.is_none());
        assert!(video.tags.is_empty());
        assert!(!video.published);
    }

    #[test]
    fn test_partial_update_merges_only_set_fields() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let video = store
            .create_video(project.id, "talk.mp4", "/tmp/abc.mp4")
            .unwrap();

        store
            .update_video(
                video.id,
                VideoUpdate {
                    status: Some(VideoStatus::Processing),
                    ..Default::default()
                },
            )
            .unwrap();

        let updated = store
            .update_video(
                video.id,
                VideoUpdate {
                    transcript: Some(r#"{"key_moments":[],"segments":[]}"#.to_string()),
                    tags: Some(vec!["rust".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();

        // Status set earlier survives the second, transcript-only update.
        assert_eq!(updated.status, VideoStatus::Processing);
        assert!(updated.transcript.is_some());
        assert_eq!(updated.tags, vec!["rust"]);
        assert!(updated.mindmap.is_none());
    }

    #[test]
    fn test_publish_assigns_slug_once_and_republish_rotates() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let video = store
            .create_video(project.id, "talk.mp4", "/tmp/abc.mp4")
            .unwrap();

        let published = store.publish_video(video.id).unwrap();
        let slug = published.public_slug.clone().unwrap();
        assert!(published.published);

        // Publishing again keeps the existing slug.
        let republished = store.publish_video(video.id).unwrap();
        assert_eq!(republished.public_slug.as_deref(), Some(slug.as_str()));

        // Unpublish clears it; the next publish mints a fresh one.
        let unpublished = store.unpublish_video(video.id).unwrap();
        assert!(!unpublished.published);
        assert!(unpublished.public_slug.is_none());

        let again = store.publish_video(video.id).unwrap();
        assert_ne!(again.public_slug.as_deref(), Some(slug.as_str()));
    }

    #[test]
    fn test_slug_lookup_respects_published_flag() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let video = store
            .create_video(project.id, "talk.mp4", "/tmp/abc.mp4")
            .unwrap();

        let published = store.publish_video(video.id).unwrap();
        let slug = published.public_slug.unwrap();

        assert!(store.get_video_by_slug(&slug).is_ok());

        store.unpublish_video(video.id).unwrap();
        assert!(matches!(
            store.get_video_by_slug(&slug),
            Err(MerkeError::NotFound(_))
        ));
    }

    #[test]
    fn test_parsed_transcript_validates_shape() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let video = store
            .create_video(project.id, "talk.mp4", "/tmp/abc.mp4")
            .unwrap();

        let ok = store
            .update_video(
                video.id,
                VideoUpdate {
                    transcript: Some(r#"{"key_moments":[],"segments":[]}"#.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(ok.parsed_transcript().unwrap().is_some());

        let bad = store
            .update_video(
                video.id,
                VideoUpdate {
                    transcript: Some("not json".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            bad.parsed_transcript(),
            Err(MerkeError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_delete_video() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let video = store
            .create_video(project.id, "talk.mp4", "/tmp/nonexistent-file.mp4")
            .unwrap();

        store.delete_video(video.id).unwrap();
        assert!(matches!(
            store.get_video(video.id),
            Err(MerkeError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_videos_scoped_to_project() {
        let store = store();
        let a = store.create_project("A").unwrap();
        let b = store.create_project("B").unwrap();
        store.create_video(a.id, "one.mp4", "/tmp/1.mp4").unwrap();
        store.create_video(a.id, "two.mp4", "/tmp/2.mp4").unwrap();
        store.create_video(b.id, "three.mp4", "/tmp/3.mp4").unwrap();

        assert_eq!(store.list_videos(a.id).unwrap().len(), 2);
        assert_eq!(store.list_videos(b.id).unwrap().len(), 1);
    }
}
