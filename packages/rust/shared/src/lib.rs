//! Shared types, error model, and configuration for StudyKit.
//!
//! This crate is the foundation depended on by all other StudyKit crates.
//! It provides:
//! - [`StudyKitError`] — the unified error type
//! - Domain types ([`ProcessedBook`], [`TocItem`], [`ChapterElements`], [`QuizQuestion`], [`BookId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, IngestConfig, LibraryConfig, ParserConfig, SessionConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, StudyKitError};
pub use types::{
    ASSESSMENT_TEST_ID, AssessmentTest, BookId, BookManifest, CURRENT_SCHEMA_VERSION,
    ChapterElements, Difficulty, FULL_SECTION_ID, INTRO_SECTION_ID, MediaType, ObjectiveMapItem,
    ProcessedBook, QuizQuestion, SessionUsage, TocItem, TopicStatus, WrittenLab, content_hash,
    section_id,
};
