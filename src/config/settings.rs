//! Configuration settings for Merke.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub audio: AudioSettings,
    pub transcription: TranscriptionSettings,
    pub generation: GenerationSettings,
    pub prompts: PromptSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8420,
            log_level: "info".to_string(),
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
    /// Directory where uploaded videos are kept.
    pub upload_dir: String,
    /// Maximum accepted upload size in megabytes.
    pub max_upload_mb: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.merke/merke.db".to_string(),
            upload_dir: "~/.merke/uploads".to_string(),
            max_upload_mb: 2048,
        }
    }
}

/// Audio extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Wall-clock timeout for the ffmpeg extraction call, in seconds.
    pub extraction_timeout_seconds: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            extraction_timeout_seconds: 600,
        }
    }
}

/// Transcription service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Whisper model to use.
    pub model: String,
    /// Language hint passed to the transcriber, if any.
    pub language: Option<String>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
        }
    }
}

/// Text-generation settings for the artifact generators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Model for structured JSON outputs (key moments, quiz, tags).
    pub structured_model: String,
    /// Model for free-text outputs (mind map, chat answers).
    pub text_model: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            structured_model: "gpt-4o-mini".to_string(),
            text_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MerkeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("merke")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.sqlite_path)
    }

    /// Get the expanded upload directory path.
    pub fn upload_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.upload_dir)
    }

    /// Build the prompt templates with custom variables from config.
    pub fn prompts(&self) -> crate::config::Prompts {
        let mut prompts = crate::config::Prompts::default();
        prompts.variables = self.prompts.variables.clone();
        prompts
    }
}
