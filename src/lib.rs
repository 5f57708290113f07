//! Merke - Video Transcription and Study Artifacts
//!
//! A self-hosted service that turns uploaded videos into navigable,
//! timestamped transcripts and derived study artifacts.
//!
//! The name "Merke" comes from the Norwegian word for "mark," as in
//! marking the moments in a recording worth returning to.
//!
//! # Overview
//!
//! Merke allows you to:
//! - Upload videos into projects and transcribe them with word-level timing
//! - Anchor AI-proposed chapter markers to exact transcript positions
//! - Generate mind maps, quizzes, and topical tags from transcripts
//! - Publish videos for public viewing with transcript-grounded chat
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `media` - Audio extraction from video files
//! - `transcription` - Speech-to-text transcription
//! - `transcript` - Transcript data model and key-moment alignment
//! - `generate` - Artifact generators (key moments, mind map, quiz, tags, chat)
//! - `store` - SQLite persistence for projects and videos
//! - `pipeline` - Processing orchestration
//! - `server` - HTTP API surface
//!
//! # Example
//!
//! ```rust,no_run
//! use merke::config::Settings;
//! use merke::server::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     run_server("127.0.0.1", 8420, settings).await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
pub mod media;
pub mod openai;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod transcript;
pub mod transcription;

pub use error::{MerkeError, Result};
