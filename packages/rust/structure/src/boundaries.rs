//! Chapter boundary detection.
//!
//! Collects line-start headers from the [`Scanner`], keeps the first
//! occurrence of every ordinal (repeated running headers collapse), and
//! returns markers sorted by ordinal with strictly increasing offsets.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::scanner::{HeaderKeyword, Scanner, Token};

/// Detected position and identity of a chapter-like heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterMarker {
    pub keyword: HeaderKeyword,
    pub ordinal: u32,
    /// Ordinal as written in the source.
    pub label: String,
    /// Captured title; empty when the header line had none.
    pub title: String,
    /// Byte offset of the header keyword in the text.
    pub offset: usize,
}

impl ChapterMarker {
    /// Display title: `"Chapter 1: Title"`, or `"Chapter 1"` without a title.
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            format!("{} {}", self.keyword.as_str(), self.label)
        } else {
            format!("{} {}: {}", self.keyword.as_str(), self.label, self.title)
        }
    }
}

/// Find chapter markers in (preprocessed) text.
///
/// Returns an empty list when the document has no headers; callers fall back
/// to a single `full` section.
#[instrument(skip_all, fields(text_len = text.len()))]
pub fn detect_boundaries(text: &str) -> Vec<ChapterMarker> {
    let mut seen: HashSet<u32> = HashSet::new();
    let mut markers: Vec<ChapterMarker> = Vec::new();
    let mut duplicates = 0usize;

    for token in Scanner::new(text) {
        let Token::Header(header) = token else {
            continue;
        };
        if !seen.insert(header.ordinal) {
            duplicates += 1;
            continue;
        }
        markers.push(ChapterMarker {
            keyword: header.keyword,
            ordinal: header.ordinal,
            label: header.label.to_string(),
            title: header.title.to_string(),
            offset: header.offset,
        });
    }

    markers.sort_by_key(|m| m.ordinal);

    // Sections are cut between consecutive markers, so a marker whose offset
    // does not advance past the previous one cannot be kept.
    let mut ordered: Vec<ChapterMarker> = Vec::with_capacity(markers.len());
    for marker in markers {
        match ordered.last() {
            Some(prev) if marker.offset <= prev.offset => {
                debug!(
                    ordinal = marker.ordinal,
                    offset = marker.offset,
                    prev_ordinal = prev.ordinal,
                    "dropping out-of-order marker"
                );
            }
            _ => ordered.push(marker),
        }
    }

    debug!(markers = ordered.len(), duplicates, "boundary detection complete");
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_headers_with_offsets() {
        let text = "\nIntroduction text.\n\nChapter 1: The Beginning\nContent of chapter 1.\n\nChapter 2: The Middle\nContent of chapter 2.\n";
        let markers = detect_boundaries(text);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].ordinal, 1);
        assert_eq!(markers[0].title, "The Beginning");
        assert!(text[markers[0].offset..].starts_with("Chapter 1"));
        assert!(text[markers[1].offset..].starts_with("Chapter 2"));
    }

    #[test]
    fn repeated_running_header_yields_one_marker() {
        let text = "Chapter 3: Risk\nbody\nChapter 3: Risk\nmore body\n";
        let markers = detect_boundaries(text);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].ordinal, 3);
        assert_eq!(markers[0].offset, 0);
    }

    #[test]
    fn back_references_are_never_captured() {
        let text = "Chapter 1: Start\nThis is discussed later (see Chapter 5) in the text.\n";
        let markers = detect_boundaries(text);
        assert_eq!(markers.len(), 1);
        assert!(markers.iter().all(|m| m.ordinal != 5));
    }

    #[test]
    fn no_headers_is_not_an_error() {
        assert!(detect_boundaries("Just some plain text without any chapter headers.").is_empty());
    }

    #[test]
    fn mixed_keywords_share_ordinal_space() {
        let text = "Domain 1: Governance\nx\nChapter 1: Again\ny\nModule 2 Assets\n";
        let markers = detect_boundaries(text);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].keyword, HeaderKeyword::Domain);
        assert_eq!(markers[1].keyword, HeaderKeyword::Module);
    }

    #[test]
    fn out_of_order_markers_are_dropped() {
        // Chapter 2 appears before chapter 1 in the text.
        let text = "Chapter 2: Early mention\nChapter 1: Real start\nChapter 3: Next\n";
        let markers = detect_boundaries(text);
        let ordinals: Vec<u32> = markers.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![1, 3]);
        assert!(markers.windows(2).all(|w| w[0].offset < w[1].offset));
    }

    #[test]
    fn display_title_falls_back_to_keyword_and_label() {
        let text = "Chapter IV\nbody\n";
        let markers = detect_boundaries(text);
        assert_eq!(markers[0].ordinal, 4);
        assert_eq!(markers[0].display_title(), "Chapter IV");
    }
}
