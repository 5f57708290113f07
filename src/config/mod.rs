//! Configuration management for Merke.

mod prompts;
mod settings;

pub use prompts::{ChatPrompts, KeyMomentPrompts, MindmapPrompts, Prompts, QuizPrompts, TagPrompts};
pub use settings::{
    AudioSettings, GenerationSettings, PromptSettings, ServerSettings, Settings, StorageSettings,
    TranscriptionSettings,
};
