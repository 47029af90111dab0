//! End-to-end `ingest` pipeline: file → text → structure → book directory → library.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument};

use studykit_shared::{
    AppConfig, BookId, BookManifest, CURRENT_SCHEMA_VERSION, ParserConfig, ProcessedBook, Result,
};
use studykit_storage::Storage;
use studykit_structure::{
    detect_boundaries, isolate_headers, parse_assessment, parse_objective_map, segment,
};

use crate::acquisition;
use crate::assembler;

/// What to ingest and where to put it.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// File or page-text directory to ingest.
    pub source: PathBuf,
    /// Display name (defaults to the file stem).
    pub name: Option<String>,
    /// Root directory for book directories.
    pub output_root: PathBuf,
    /// Library database to record the book in, if any.
    pub db_path: Option<PathBuf>,
    /// Tool version string.
    pub tool_version: String,
}

/// Result of the `ingest` pipeline.
#[derive(Debug)]
pub struct IngestResult {
    pub book_id: BookId,
    pub book_dir: PathBuf,
    pub manifest: BookManifest,
    pub book: ProcessedBook,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &IngestResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &IngestResult) {}
}

/// Structure a document that is already in memory.
///
/// Headers are detected on a copy where fused headers sit on their own line;
/// their offsets are mapped back so sections are sliced from `raw` itself.
/// `raw` becomes the book's `full_text` and the sections concatenate back to
/// it exactly.
#[instrument(skip_all, fields(len = raw.len()))]
pub fn process_text(raw: &str, parser: &ParserConfig) -> ProcessedBook {
    let isolated = isolate_headers(raw);
    let markers = isolated.remap_markers(detect_boundaries(&isolated.text));
    let sections = segment(raw, &markers);
    let assessment = parse_assessment(&isolated.text, parser.max_assessment_questions);
    let objectives = parse_objective_map(raw);

    debug!(
        repaired_headers = isolated.repairs(),
        markers = markers.len(),
        sections = sections.len(),
        assessment_questions = assessment.as_ref().map_or(0, |t| t.questions.len()),
        objectives = objectives.len(),
        "document structured"
    );

    assembler::assemble_book(raw.to_string(), &markers, sections, assessment, objectives)
}

/// Run the full `ingest` pipeline.
///
/// 1. Acquire and validate the raw text
/// 2. Structure it into a [`ProcessedBook`]
/// 3. Write the book directory
/// 4. Record the book and its sections in the library (optional)
#[instrument(skip_all, fields(source = %request.source.display()))]
pub async fn ingest(
    request: &IngestRequest,
    config: &AppConfig,
    progress: &dyn ProgressReporter,
) -> Result<IngestResult> {
    let start = Instant::now();
    let book_id = BookId::new();

    info!(%book_id, "starting ingest pipeline");

    // --- Phase 1: Acquisition ---
    progress.phase("Reading document");
    let document = acquisition::read_document(&request.source, &config.ingest).await?;

    // --- Phase 2: Structuring ---
    progress.phase("Detecting structure");
    let book = process_text(&document.text, &config.parser);

    // --- Phase 3: Book directory ---
    progress.phase("Writing book directory");
    let manifest = BookManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        id: book_id.clone(),
        name: request
            .name
            .clone()
            .unwrap_or_else(|| default_name(&request.source)),
        source_file: request.source.display().to_string(),
        media_type: document.media_type,
        content_hash: document.content_hash,
        tool_version: request.tool_version.clone(),
        created_at: Utc::now(),
        section_count: book.sections.len(),
        has_assessment_test: book.assessment_test.is_some(),
    };
    let book_dir = assembler::write_book_dir(&request.output_root, &manifest, &book)?;

    // --- Phase 4: Library ---
    if let Some(db_path) = &request.db_path {
        progress.phase("Updating library");
        let storage = Storage::open(db_path).await?;
        storage.insert_book(&manifest, Some(&book_dir)).await?;
        storage.insert_sections(&book_id.to_string(), &book).await?;
    }

    let result = IngestResult {
        book_id,
        book_dir,
        manifest,
        book,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        book_id = %result.book_id,
        sections = result.manifest.section_count,
        assessment = result.manifest.has_assessment_test,
        elapsed_ms = result.elapsed.as_millis(),
        "ingest pipeline complete"
    );

    Ok(result)
}

/// Book name derived from the source path.
fn default_name(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}
