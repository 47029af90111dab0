//! Reading chapters back from a book directory or from the library.

use std::path::Path;

use tracing::{debug, instrument};

use studykit_shared::{Result, StudyKitError};
use studykit_storage::Storage;

use crate::assembler::{self, ChapterFile, MANIFEST_FILE};

/// Fetch one chapter of `book`, which is a book directory or a book id.
///
/// The directory's chapter file is preferred. When there is no directory, or
/// the chapter file cannot be read, the section body is fetched from
/// `library` on its own, without loading the rest of the book.
#[instrument(skip_all, fields(book = book, section_id = section_id))]
pub async fn fetch_chapter(
    book: &str,
    section_id: &str,
    library: Option<&Storage>,
) -> Result<ChapterFile> {
    let dir = Path::new(book);
    let book_id = if dir.join(MANIFEST_FILE).is_file() {
        let manifest = assembler::load_manifest(dir)?;
        match (assembler::load_chapter(dir, section_id), library) {
            (Ok(chapter), _) => return Ok(chapter),
            (Err(e), None) => return Err(e),
            (Err(e), Some(_)) => debug!(error = %e, "chapter file unavailable, trying library"),
        }
        manifest.id.to_string()
    } else {
        book.to_string()
    };

    let Some(storage) = library else {
        return Err(StudyKitError::validation(format!(
            "'{book}' is not a book directory and no library is available"
        )));
    };

    let section = storage
        .get_section(&book_id, section_id)
        .await?
        .ok_or_else(|| {
            StudyKitError::validation(format!(
                "section '{section_id}' not found for book '{book_id}'"
            ))
        })?;

    debug!(position = section.position, "chapter fetched from library");
    Ok(ChapterFile {
        id: section.id,
        title: section.title,
        text: section.text,
        elements: section.elements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use studykit_shared::{
        BookId, BookManifest, CURRENT_SCHEMA_VERSION, MediaType, ParserConfig, ProcessedBook,
    };

    const TEXT: &str = "Preface\nChapter 1: Start\nTip: Breathe.\nChapter 2: Next\nbody\n";

    struct Fixture {
        root: PathBuf,
        book_dir: PathBuf,
        book_id: String,
        book: ProcessedBook,
        storage: Storage,
    }

    async fn fixture() -> Fixture {
        let root = std::env::temp_dir().join(format!("sk-library-test-{}", uuid::Uuid::now_v7()));
        let book = crate::process_text(TEXT, &ParserConfig::default());
        let manifest = BookManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: BookId::new(),
            name: "Library Test".into(),
            source_file: "test.txt".into(),
            media_type: MediaType::PlainText,
            content_hash: studykit_shared::content_hash(TEXT.as_bytes()),
            tool_version: "test".into(),
            created_at: Utc::now(),
            section_count: book.sections.len(),
            has_assessment_test: false,
        };
        let book_dir = assembler::write_book_dir(&root, &manifest, &book).unwrap();

        let storage = Storage::open(&root.join("library.db")).await.unwrap();
        let book_id = manifest.id.to_string();
        storage.insert_book(&manifest, Some(&book_dir)).await.unwrap();
        storage.insert_sections(&book_id, &book).await.unwrap();

        Fixture {
            root,
            book_dir,
            book_id,
            book,
            storage,
        }
    }

    #[tokio::test]
    async fn reads_chapter_file_from_directory() {
        let f = fixture().await;
        let dir = f.book_dir.to_string_lossy().into_owned();

        let chapter = fetch_chapter(&dir, "section_1", None).await.unwrap();
        assert_eq!(chapter.title, "Chapter 1: Start");
        assert_eq!(chapter.text, f.book.sections["section_1"]);

        let _ = std::fs::remove_dir_all(&f.root);
    }

    #[tokio::test]
    async fn falls_back_to_library_when_chapter_file_is_gone() {
        let f = fixture().await;
        let dir = f.book_dir.to_string_lossy().into_owned();
        std::fs::remove_file(f.book_dir.join(assembler::CHAPTERS_DIR).join("section_1.json")).unwrap();

        assert!(fetch_chapter(&dir, "section_1", None).await.is_err());

        let chapter = fetch_chapter(&dir, "section_1", Some(&f.storage)).await.unwrap();
        assert_eq!(chapter.id, "section_1");
        assert_eq!(chapter.title, "Chapter 1: Start");
        assert_eq!(chapter.elements.tips, vec!["Breathe.".to_string()]);

        let _ = std::fs::remove_dir_all(&f.root);
    }

    #[tokio::test]
    async fn book_id_reads_from_library() {
        let f = fixture().await;

        let chapter = fetch_chapter(&f.book_id, "section_2", Some(&f.storage)).await.unwrap();
        assert_eq!(chapter.text, f.book.sections["section_2"]);

        let err = fetch_chapter(&f.book_id, "section_9", Some(&f.storage)).await.unwrap_err();
        assert!(err.to_string().contains("section_9"));

        let err = fetch_chapter(&f.book_id, "section_2", None).await.unwrap_err();
        assert!(err.to_string().contains("no library"));

        let _ = std::fs::remove_dir_all(&f.root);
    }
}
