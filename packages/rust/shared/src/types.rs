//! Core domain types for StudyKit processed books.
//!
//! Everything a consumer reads from an ingested study guide lives here:
//! the [`ProcessedBook`] aggregate, its TOC, mined chapter elements, and quiz
//! questions. JSON field names are camelCase, which is also the persisted form.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Current schema version for the persisted book format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Section id for text preceding the first detected header.
pub const INTRO_SECTION_ID: &str = "intro";

/// Section id used when no header was detected at all.
pub const FULL_SECTION_ID: &str = "full";

/// TOC id of the assessment test entry.
pub const ASSESSMENT_TEST_ID: &str = "assessment_test";

/// Section id for the chapter with the given ordinal (`section_<n>`).
pub fn section_id(ordinal: u32) -> String {
    format!("section_{ordinal}")
}

/// Hex-encoded SHA-256 of the given bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// BookId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for book identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub Uuid);

impl BookId {
    /// Generate a new time-sortable book identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Declared media type of an ingested source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "text/plain")]
    PlainText,
    #[serde(rename = "text/markdown")]
    Markdown,
    /// PDF supplied as already-extracted page text.
    #[serde(rename = "application/pdf")]
    PdfPages,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::PdfPages => "application/pdf",
        }
    }

    /// Inverse of [`MediaType::as_str`].
    pub fn from_mime(s: &str) -> Option<Self> {
        match s {
            "text/plain" => Some(Self::PlainText),
            "text/markdown" => Some(Self::Markdown),
            "application/pdf" => Some(Self::PdfPages),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TOC
// ---------------------------------------------------------------------------

/// Reading progress of a TOC entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TopicStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!(
                "unknown status '{other}': expected not_started, in_progress, or completed"
            )),
        }
    }
}

/// A single navigable entry in a book's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocItem {
    /// Section id this entry points at (or `assessment_test`).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Nesting level, 1 for top-level entries.
    pub level: u8,
    pub status: TopicStatus,
    /// Nested child entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocItem>,
}

impl TocItem {
    /// A top-level, not-yet-started entry.
    pub fn top_level(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            level: 1,
            status: TopicStatus::NotStarted,
            children: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Quiz questions and assessment test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    /// Correct answer letter as printed (e.g. `"B"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl QuizQuestion {
    /// True when `correct_index`, if set, points inside `options`.
    pub fn answer_is_consistent(&self) -> bool {
        self.correct_index.is_none_or(|i| i < self.options.len())
    }
}

/// The bounded block of numbered questions preceding the main body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentTest {
    pub id: String,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

// ---------------------------------------------------------------------------
// Chapter elements
// ---------------------------------------------------------------------------

/// A written-lab prompt, optionally with its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenLab {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Secondary study artifacts mined from one section. Every list is always
/// present; an all-empty value means "nothing to show".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterElements {
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub summaries: Vec<String>,
    #[serde(default)]
    pub study_essentials: Vec<String>,
    #[serde(default)]
    pub written_labs: Vec<WrittenLab>,
    #[serde(default)]
    pub review_questions: Vec<QuizQuestion>,
}

impl ChapterElements {
    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
            && self.summaries.is_empty()
            && self.study_essentials.is_empty()
            && self.written_labs.is_empty()
            && self.review_questions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Objective map
// ---------------------------------------------------------------------------

/// One exam objective and the chapters that cover it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveMapItem {
    /// Dotted objective number, e.g. `1.2` or `3.1.4`.
    pub domain_id: String,
    pub description: String,
    pub chapters: Vec<u32>,
}

impl ObjectiveMapItem {
    /// Leading component of the objective number (`"1.2"` → `"1"`).
    pub fn domain(&self) -> &str {
        self.domain_id
            .split_once('.')
            .map_or(self.domain_id.as_str(), |(domain, _)| domain)
    }
}

// ---------------------------------------------------------------------------
// ProcessedBook
// ---------------------------------------------------------------------------

/// The structured result of ingesting one study guide.
///
/// Sections are kept in document order, so concatenating their texts
/// reproduces `full_text` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedBook {
    pub full_text: String,
    pub sections: IndexMap<String, String>,
    pub toc: Vec<TocItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_test: Option<AssessmentTest>,
    #[serde(default)]
    pub chapter_elements: IndexMap<String, ChapterElements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objective_map: Vec<ObjectiveMapItem>,
}

impl ProcessedBook {
    /// Text of one section, if it exists.
    pub fn section(&self, id: &str) -> Option<&str> {
        self.sections.get(id).map(String::as_str)
    }

    /// Look up a top-level TOC entry by id.
    pub fn toc_item(&self, id: &str) -> Option<&TocItem> {
        self.toc.iter().find(|item| item.id == id)
    }

    /// Concatenate all sections in document order.
    pub fn reassemble(&self) -> String {
        self.sections.values().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// BookManifest
// ---------------------------------------------------------------------------

/// The `manifest.json` stored at the root of each persisted book directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub id: BookId,
    /// Human-readable name.
    pub name: String,
    /// Path of the ingested file or page directory.
    pub source_file: String,
    pub media_type: MediaType,
    /// SHA-256 of the raw document text.
    pub content_hash: String,
    /// Tool version that processed the book.
    pub tool_version: String,
    pub created_at: DateTime<Utc>,
    pub section_count: usize,
    pub has_assessment_test: bool,
}

// ---------------------------------------------------------------------------
// Session usage
// ---------------------------------------------------------------------------

/// Per-credential counters for a study session. The credential itself is
/// never stored, only its SHA-256 fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUsage {
    pub fingerprint: String,
    pub book_id: String,
    /// Prompts sent to the model, including the opening prompt.
    pub exchanges: u32,
    /// Characters of prompt text sent so far.
    pub prompt_chars: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exchange_at: Option<DateTime<Utc>>,
}

impl SessionUsage {
    pub fn new(fingerprint: impl Into<String>, book_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            book_id: book_id.into(),
            exchanges: 0,
            prompt_chars: 0,
            started_at: now,
            last_exchange_at: None,
        }
    }
}
