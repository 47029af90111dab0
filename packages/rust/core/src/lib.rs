//! Core pipeline orchestration and domain logic for StudyKit.
//!
//! This crate ties together acquisition, structure detection, book assembly,
//! and the study-session model into end-to-end workflows (e.g., `ingest`).
//! Books are read back through the directory or the library (`library`).

pub mod acquisition;
pub mod assembler;
pub mod context;
pub mod library;
pub mod pipeline;
pub mod reply;
pub mod session;
pub mod toc;

pub use library::fetch_chapter;
pub use pipeline::{IngestRequest, IngestResult, ProgressReporter, SilentProgress, ingest, process_text};
pub use session::{Clock, MemoryStore, SessionStore, StudySession, SystemClock};
