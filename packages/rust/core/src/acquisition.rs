//! Raw text acquisition.
//!
//! Produces the single document string the structuring pipeline works on:
//! - `.txt` / `.md` / `.markdown` files are read whole
//! - a directory of extracted page-text files is read as PDF pages, fetched
//!   concurrently and merged in page order
//!
//! Input is validated before anything is parsed: empty, oversized, and
//! unsupported inputs are rejected.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use studykit_shared::{IngestConfig, MediaType, Result, StudyKitError, content_hash};

/// The acquired document: one text, its media type, and a hash of the text.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source: PathBuf,
    pub media_type: MediaType,
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub content_hash: String,
}

/// Text of one page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Detect the media type of `path`. Directories are page-text PDFs.
pub fn detect_media_type(path: &Path) -> Result<MediaType> {
    if path.is_dir() {
        return Ok(MediaType::PdfPages);
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => Ok(MediaType::PlainText),
        "md" | "markdown" => Ok(MediaType::Markdown),
        "pdf" => Err(StudyKitError::rejected(
            "unsupported media type: PDF files must be supplied as a directory of extracted page text",
        )),
        "" => Err(StudyKitError::rejected("unsupported media type: file has no extension")),
        other => Err(StudyKitError::rejected(format!("unsupported media type: .{other}"))),
    }
}

/// Reject empty and oversized input.
pub fn check_size(len: u64, max_bytes: u64) -> Result<()> {
    if len == 0 {
        return Err(StudyKitError::rejected("file is empty"));
    }
    if len > max_bytes {
        return Err(StudyKitError::rejected(format!(
            "file is too large ({len} bytes, limit {max_bytes})"
        )));
    }
    Ok(())
}

fn decode(bytes: Vec<u8>, origin: &Path) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        StudyKitError::Extraction(format!("{} is not valid UTF-8: {e}", origin.display()))
    })
}

/// Join pages in page-number order, each followed by a newline. The result
/// does not depend on the order pages arrived in.
pub fn concat_pages(mut pages: Vec<PageText>) -> String {
    pages.sort_by_key(|p| p.number);
    let len = pages.iter().map(|p| p.text.len() + 1).sum();
    pages.iter().fold(String::with_capacity(len), |mut out, page| {
        out.push_str(&page.text);
        out.push('\n');
        out
    })
}

// ---------------------------------------------------------------------------
// Page sources
// ---------------------------------------------------------------------------

/// Something that can hand out page text by number (1-based).
pub trait PageSource: Send + Sync + 'static {
    fn page_count(&self) -> usize;

    /// Blocking read of one page.
    fn page_text(&self, number: u32) -> Result<String>;
}

/// Fetch every page of `source` with at most `concurrency` reads in flight.
/// Any failed page fails the whole fetch.
#[instrument(skip_all, fields(pages = source.page_count(), concurrency = concurrency))]
pub async fn fetch_pages<S: PageSource>(source: Arc<S>, concurrency: usize) -> Result<Vec<PageText>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let count = source.page_count();
    let mut handles = Vec::with_capacity(count);

    for number in 1..=count as u32 {
        let sem = semaphore.clone();
        let src = source.clone();
        handles.push(tokio::spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| StudyKitError::Extraction(format!("page {number}: {e}")))?;
            tokio::task::spawn_blocking(move || src.page_text(number))
                .await
                .map_err(|e| StudyKitError::Extraction(format!("page {number}: {e}")))?
                .map(|text| PageText { number, text })
        }));
    }

    let mut pages = Vec::with_capacity(count);
    for handle in handles {
        let page = handle
            .await
            .map_err(|e| StudyKitError::Extraction(format!("page task failed: {e}")))??;
        pages.push(page);
    }

    debug!(pages = pages.len(), "pages fetched");
    Ok(pages)
}

/// Trailing page number of a file stem (`page-11` → 11).
static PAGE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("page number regex"));

fn page_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    PAGE_NUMBER_RE.captures(stem)?.get(1)?.as_str().parse().ok()
}

/// Page text files in a directory, one page per `*.txt` file, ordered by the
/// page number at the end of the file stem. Files without a number follow
/// the numbered ones, by file name.
#[derive(Debug, Clone)]
pub struct DirectoryPageSource {
    files: Vec<PathBuf>,
}

impl DirectoryPageSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| StudyKitError::io(dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StudyKitError::io(dir, e))?.path();
            let is_txt = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
            if path.is_file() && is_txt {
                files.push(path);
            }
        }
        let mut keyed: Vec<(Option<u64>, PathBuf)> =
            files.into_iter().map(|p| (page_number(&p), p)).collect();
        keyed.sort_by(|(a, pa), (b, pb)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b).then_with(|| pa.cmp(pb)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => pa.cmp(pb),
        });

        for pair in keyed.windows(2) {
            if let (Some(a), Some(b)) = (pair[0].0, pair[1].0) {
                if a == b {
                    return Err(StudyKitError::rejected(format!(
                        "page {a} appears twice: {} and {}",
                        pair[0].1.display(),
                        pair[1].1.display()
                    )));
                }
            }
        }

        Ok(Self {
            files: keyed.into_iter().map(|(_, p)| p).collect(),
        })
    }

    /// Combined size of all page files.
    pub fn total_bytes(&self) -> Result<u64> {
        self.files.iter().try_fold(0u64, |acc, path| {
            let len = std::fs::metadata(path)
                .map_err(|e| StudyKitError::io(path, e))?
                .len();
            Ok(acc + len)
        })
    }
}

impl PageSource for DirectoryPageSource {
    fn page_count(&self) -> usize {
        self.files.len()
    }

    fn page_text(&self, number: u32) -> Result<String> {
        let path = number
            .checked_sub(1)
            .and_then(|i| self.files.get(i as usize))
            .ok_or_else(|| StudyKitError::Extraction(format!("page {number} out of range")))?;
        let bytes = std::fs::read(path).map_err(|e| StudyKitError::io(path, e))?;
        decode(bytes, path)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Acquire the document at `path`.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn read_document(path: &Path, config: &IngestConfig) -> Result<RawDocument> {
    let media_type = detect_media_type(path)?;

    let text = match media_type {
        MediaType::PdfPages => {
            let source = DirectoryPageSource::open(path)?;
            if source.page_count() == 0 {
                return Err(StudyKitError::rejected(format!(
                    "no page text files found in {}",
                    path.display()
                )));
            }
            check_size(source.total_bytes()?, config.max_input_bytes)?;
            let pages = fetch_pages(Arc::new(source), config.page_concurrency).await?;
            concat_pages(pages)
        }
        MediaType::PlainText | MediaType::Markdown => {
            let len = tokio::fs::metadata(path)
                .await
                .map_err(|e| StudyKitError::io(path, e))?
                .len();
            check_size(len, config.max_input_bytes)?;
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| StudyKitError::io(path, e))?;
            decode(bytes, path)?
        }
    };

    let content_hash = content_hash(text.as_bytes());
    info!(%media_type, bytes = text.len(), "document acquired");

    Ok(RawDocument {
        source: path.to_path_buf(),
        media_type,
        text,
        content_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sk-acquire-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Pages whose reads finish in reverse order.
    struct SlowPages(Vec<&'static str>);

    impl PageSource for SlowPages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn page_text(&self, number: u32) -> Result<String> {
            let remaining = self.0.len() as u64 - u64::from(number);
            std::thread::sleep(Duration::from_millis(remaining * 10));
            Ok(self.0[number as usize - 1].to_string())
        }
    }

    struct BrokenPage;

    impl PageSource for BrokenPage {
        fn page_count(&self) -> usize {
            3
        }

        fn page_text(&self, number: u32) -> Result<String> {
            if number == 2 {
                Err(StudyKitError::Extraction("page 2 unreadable".into()))
            } else {
                Ok(format!("page {number}"))
            }
        }
    }

    #[test]
    fn media_type_from_extension() {
        assert_eq!(detect_media_type(Path::new("book.txt")).unwrap(), MediaType::PlainText);
        assert_eq!(detect_media_type(Path::new("book.MD")).unwrap(), MediaType::Markdown);
        assert!(detect_media_type(Path::new("book.pdf")).unwrap_err().is_input_rejection());
        assert!(detect_media_type(Path::new("book.epub")).unwrap_err().is_input_rejection());
    }

    #[test]
    fn size_checks() {
        assert!(check_size(0, 10).unwrap_err().to_string().contains("file is empty"));
        assert!(check_size(11, 10).unwrap_err().to_string().contains("file is too large"));
        assert!(check_size(10, 10).is_ok());
    }

    #[test]
    fn concat_is_independent_of_arrival_order() {
        let pages = vec![
            PageText { number: 2, text: "two".into() },
            PageText { number: 1, text: "one".into() },
            PageText { number: 3, text: "three".into() },
        ];
        let mut reversed = pages.clone();
        reversed.reverse();
        assert_eq!(concat_pages(pages), "one\ntwo\nthree\n");
        assert_eq!(concat_pages(reversed), "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn concurrent_fetch_merges_in_page_order() {
        let source = Arc::new(SlowPages(vec!["a", "b", "c", "d"]));
        let pages = fetch_pages(source, 4).await.unwrap();
        assert_eq!(concat_pages(pages), "a\nb\nc\nd\n");
    }

    #[tokio::test]
    async fn one_failed_page_fails_the_fetch() {
        let err = fetch_pages(Arc::new(BrokenPage), 2).await.unwrap_err();
        assert!(matches!(err, StudyKitError::Extraction(_)));
    }

    #[tokio::test]
    async fn reads_text_file() {
        let tmp = temp_dir();
        let path = tmp.join("guide.txt");
        std::fs::write(&path, "Chapter 1: Start\nbody\n").unwrap();

        let doc = read_document(&path, &IngestConfig::default()).await.unwrap();
        assert_eq!(doc.media_type, MediaType::PlainText);
        assert_eq!(doc.text, "Chapter 1: Start\nbody\n");
        assert_eq!(doc.content_hash, content_hash(doc.text.as_bytes()));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_files() {
        let tmp = temp_dir();
        let empty = tmp.join("empty.txt");
        std::fs::write(&empty, "").unwrap();
        let err = read_document(&empty, &IngestConfig::default()).await.unwrap_err();
        assert!(err.is_input_rejection());

        let big = tmp.join("big.md");
        std::fs::write(&big, "x".repeat(64)).unwrap();
        let config = IngestConfig {
            max_input_bytes: 16,
            ..IngestConfig::default()
        };
        let err = read_document(&big, &config).await.unwrap_err();
        assert!(err.to_string().contains("too large"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_extraction_failure() {
        let tmp = temp_dir();
        let path = tmp.join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x41]).unwrap();

        let err = read_document(&path, &IngestConfig::default()).await.unwrap_err();
        assert!(matches!(err, StudyKitError::Extraction(_)));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn reads_page_directory_in_page_order() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("page-002.txt"), "Chapter 1: Start").unwrap();
        std::fs::write(tmp.join("page-001.txt"), "Preface").unwrap();
        std::fs::write(tmp.join("notes.json"), "{}").unwrap();

        let doc = read_document(&tmp, &IngestConfig::default()).await.unwrap();
        assert_eq!(doc.media_type, MediaType::PdfPages);
        assert_eq!(doc.text, "Preface\nChapter 1: Start\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn unpadded_page_names_sort_numerically() {
        let tmp = temp_dir();
        for n in 1..=11 {
            std::fs::write(tmp.join(format!("page-{n}.txt")), format!("P{n}")).unwrap();
        }
        std::fs::write(tmp.join("cover.txt"), "Cover").unwrap();

        let doc = read_document(&tmp, &IngestConfig::default()).await.unwrap();
        let expected: String = (1..=11).map(|n| format!("P{n}\n")).chain(["Cover\n".to_string()]).collect();
        assert_eq!(doc.text, expected);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn duplicate_page_numbers_are_rejected() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("page-1.txt"), "a").unwrap();
        std::fs::write(tmp.join("page-01.txt"), "b").unwrap();

        let err = DirectoryPageSource::open(&tmp).unwrap_err();
        assert!(err.is_input_rejection());
        assert!(err.to_string().contains("page 1 appears twice"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
