//! Book assembly and the on-disk book directory.
//!
//! [`assemble_book`] bundles the structuring results into a
//! [`ProcessedBook`]. [`write_book_dir`] persists it in a layout that lets a
//! reader fetch the TOC and single chapters without parsing the whole book:
//!
//! ```text
//! <root>/<book_id>/
//! ├── manifest.json
//! ├── book.json        full ProcessedBook
//! ├── toc.json
//! └── chapters/
//!     ├── intro.json
//!     ├── section_1.json
//!     └── ...
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use studykit_shared::{
    ASSESSMENT_TEST_ID, AssessmentTest, BookManifest, CURRENT_SCHEMA_VERSION, ChapterElements,
    ObjectiveMapItem, ProcessedBook, Result, StudyKitError, TocItem,
};
use studykit_structure::{ChapterMarker, extract_elements};

use crate::toc::{self, INTRO_TITLE};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const BOOK_FILE: &str = "book.json";
pub const TOC_FILE: &str = "toc.json";
pub const CHAPTERS_DIR: &str = "chapters";

/// Bundle the structuring results into a [`ProcessedBook`]. Elements are
/// mined for every section, so `chapter_elements` has the same keys as
/// `sections`.
#[instrument(skip_all, fields(sections = sections.len(), markers = markers.len()))]
pub fn assemble_book(
    full_text: String,
    markers: &[ChapterMarker],
    sections: IndexMap<String, String>,
    assessment_test: Option<AssessmentTest>,
    objective_map: Vec<ObjectiveMapItem>,
) -> ProcessedBook {
    let toc = toc::build_toc(markers, &sections, assessment_test.as_ref());

    let chapter_elements: IndexMap<String, ChapterElements> = sections
        .iter()
        .map(|(id, text)| (id.clone(), extract_elements(text)))
        .collect();

    let with_elements = chapter_elements.values().filter(|e| !e.is_empty()).count();
    debug!(toc = toc.len(), with_elements, "book assembled");

    ProcessedBook {
        full_text,
        sections,
        toc,
        assessment_test,
        chapter_elements,
        objective_map,
    }
}

// ---------------------------------------------------------------------------
// Persisted form
// ---------------------------------------------------------------------------

/// Contents of `chapters/<id>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterFile {
    pub id: String,
    pub title: String,
    pub text: String,
    pub elements: ChapterElements,
}

/// Write `book` under `<root>/<manifest.id>/` and return the directory.
#[instrument(skip_all, fields(book_id = %manifest.id, root = %root.display()))]
pub fn write_book_dir(root: &Path, manifest: &BookManifest, book: &ProcessedBook) -> Result<PathBuf> {
    let book_dir = root.join(manifest.id.to_string());
    let chapters_dir = book_dir.join(CHAPTERS_DIR);
    std::fs::create_dir_all(&chapters_dir).map_err(|e| StudyKitError::io(&chapters_dir, e))?;

    write_json(&book_dir.join(BOOK_FILE), book)?;
    write_json(&book_dir.join(TOC_FILE), &book.toc)?;

    for (id, text) in &book.sections {
        let chapter = ChapterFile {
            id: id.clone(),
            title: chapter_title(book, id),
            text: text.clone(),
            elements: book.chapter_elements.get(id).cloned().unwrap_or_default(),
        };
        write_json(&chapters_dir.join(format!("{id}.json")), &chapter)?;
    }

    // Manifest last: its presence marks a complete directory.
    write_json(&book_dir.join(MANIFEST_FILE), manifest)?;

    info!(
        path = %book_dir.display(),
        chapters = book.sections.len(),
        "book directory written"
    );
    Ok(book_dir)
}

pub fn load_manifest(book_dir: &Path) -> Result<BookManifest> {
    read_json(&book_dir.join(MANIFEST_FILE))
}

/// Load only the TOC.
pub fn load_toc(book_dir: &Path) -> Result<Vec<TocItem>> {
    read_json(&book_dir.join(TOC_FILE))
}

/// Load a single chapter without touching `book.json`.
pub fn load_chapter(book_dir: &Path, section_id: &str) -> Result<ChapterFile> {
    if section_id.is_empty()
        || !section_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(StudyKitError::validation(format!(
            "invalid section id '{section_id}'"
        )));
    }

    let path = book_dir.join(CHAPTERS_DIR).join(format!("{section_id}.json"));
    if !path.exists() {
        return Err(StudyKitError::validation(format!(
            "chapter '{section_id}' not found in {}",
            book_dir.display()
        )));
    }
    read_json(&path)
}

/// Load the full book.
pub fn load_book(book_dir: &Path) -> Result<ProcessedBook> {
    read_json(&book_dir.join(BOOK_FILE))
}

/// Verify that a book directory is complete and readable by this version.
pub fn validate_book_dir(book_dir: &Path) -> Result<BookManifest> {
    for file in [MANIFEST_FILE, BOOK_FILE, TOC_FILE] {
        if !book_dir.join(file).exists() {
            return Err(StudyKitError::validation(format!("missing {file}")));
        }
    }
    if !book_dir.join(CHAPTERS_DIR).is_dir() {
        return Err(StudyKitError::validation(format!("missing {CHAPTERS_DIR}/ directory")));
    }

    let manifest = load_manifest(book_dir)?;
    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(StudyKitError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    let toc = load_toc(book_dir)?;
    for item in toc.iter().filter(|item| item.id != ASSESSMENT_TEST_ID) {
        let path = book_dir.join(CHAPTERS_DIR).join(format!("{}.json", item.id));
        if !path.exists() {
            return Err(StudyKitError::validation(format!(
                "TOC entry '{}' has no chapter file",
                item.id
            )));
        }
    }

    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn chapter_title(book: &ProcessedBook, id: &str) -> String {
    match book.toc_item(id) {
        Some(item) => item.title.clone(),
        None if id == studykit_shared::INTRO_SECTION_ID => INTRO_TITLE.to_string(),
        None => id.to_string(),
    }
}

/// Write pretty JSON via a temp file and rename.
fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| StudyKitError::validation(format!("JSON serialization failed: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| StudyKitError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| StudyKitError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| StudyKitError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        StudyKitError::validation(format!("invalid {}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
