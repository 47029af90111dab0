//! Text structuring heuristics for study-guide documents.
//!
//! - [`preprocess`]: move fused chapter headers onto their own line
//! - [`scanner`]: line tokenizer with explicit scan states
//! - [`boundaries`]: chapter/domain/module marker detection
//! - [`segment`]: split text into `intro` / `section_<n>` / `full`
//! - [`assessment`]: assessment test window and question parsing
//! - [`elements`]: tips, summaries and written labs per section
//! - [`objective`]: exam objective map (objective → chapters)

pub mod assessment;
pub mod boundaries;
pub mod elements;
pub mod objective;
pub mod preprocess;
pub mod scanner;
pub mod segment;

pub use assessment::{ANSWER_KEY_PLACEHOLDER, ASSESSMENT_TITLE, DEFAULT_MAX_QUESTIONS, parse_assessment};
pub use boundaries::{ChapterMarker, detect_boundaries};
pub use elements::extract_elements;
pub use objective::{group_by_domain, parse_objective_map};
pub use preprocess::{IsolatedText, isolate_headers};
pub use scanner::{HeaderKeyword, ScanState, Scanner, Token};
pub use segment::segment;
