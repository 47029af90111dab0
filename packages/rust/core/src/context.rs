//! Book context for the model session.
//!
//! The model gets the book's full text when it fits in `limit` characters.
//! Longer books are cut at the latest safe breakpoint within `lookback`
//! characters before the limit, preferring a chapter start, then a paragraph
//! break, then a sentence end. Without any of those, the cut is made at the
//! limit itself (on a char boundary). A notice is appended to cut text.

use std::borrow::Cow;

use tracing::{debug, instrument};

use studykit_shared::{INTRO_SECTION_ID, ProcessedBook};

/// Appended to the context whenever the book text was cut.
pub const TRUNCATION_NOTICE: &str = "\n...[Content Truncated for Memory]...";

/// Where the text was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breakpoint {
    /// Not cut at all.
    Whole,
    Chapter,
    Paragraph,
    Sentence,
    Hard,
}

#[derive(Debug, Clone)]
pub struct ContextWindow<'a> {
    pub text: Cow<'a, str>,
    pub breakpoint: Breakpoint,
    /// Byte length of the book text kept (before the notice).
    pub kept_bytes: usize,
}

impl ContextWindow<'_> {
    pub fn is_truncated(&self) -> bool {
        self.breakpoint != Breakpoint::Whole
    }
}

/// Build the context text for `book`. `limit` and `lookback` count chars.
#[instrument(skip_all, fields(limit = limit, lookback = lookback, len = book.full_text.len()))]
pub fn context_window(book: &ProcessedBook, limit: usize, lookback: usize) -> ContextWindow<'_> {
    let text = book.full_text.as_str();

    // Byte offset of the `limit`-th char, or None when the text fits.
    let Some(limit_byte) = text.char_indices().nth(limit).map(|(i, _)| i) else {
        return ContextWindow {
            text: Cow::Borrowed(text),
            breakpoint: Breakpoint::Whole,
            kept_bytes: text.len(),
        };
    };

    let window_start = text
        .char_indices()
        .nth(limit.saturating_sub(lookback))
        .map_or(0, |(i, _)| i);

    let (cut, breakpoint) = chapter_break(book, window_start, limit_byte)
        .map(|c| (c, Breakpoint::Chapter))
        .or_else(|| paragraph_break(text, window_start, limit_byte).map(|c| (c, Breakpoint::Paragraph)))
        .or_else(|| sentence_break(text, window_start, limit_byte).map(|c| (c, Breakpoint::Sentence)))
        .unwrap_or((limit_byte, Breakpoint::Hard));

    debug!(cut, ?breakpoint, "context truncated");

    let mut out = String::with_capacity(cut + TRUNCATION_NOTICE.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_NOTICE);

    ContextWindow {
        text: Cow::Owned(out),
        breakpoint,
        kept_bytes: cut,
    }
}

/// Latest chapter start in `[start, end]`, excluding offset 0.
fn chapter_break(book: &ProcessedBook, start: usize, end: usize) -> Option<usize> {
    let mut offset = 0;
    let mut best = None;
    for (id, body) in &book.sections {
        if id != INTRO_SECTION_ID && offset > 0 && (start..=end).contains(&offset) {
            best = Some(offset);
        }
        offset += body.len();
        if offset > end {
            break;
        }
    }
    best
}

/// Just after the last `\n\n` in the window.
fn paragraph_break(text: &str, start: usize, end: usize) -> Option<usize> {
    text[start..end].rfind("\n\n").map(|i| start + i + 1)
}

/// Just after the last `.`, `!` or `?` that is followed by whitespace.
fn sentence_break(text: &str, start: usize, end: usize) -> Option<usize> {
    text[start..end]
        .char_indices()
        .filter(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[start + i + 1..]
                    .chars()
                    .next()
                    .is_some_and(char::is_whitespace)
        })
        .map(|(i, _)| start + i + 1)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn book(sections: &[(&str, &str)]) -> ProcessedBook {
        let sections: IndexMap<String, String> = sections
            .iter()
            .map(|(id, body)| (id.to_string(), body.to_string()))
            .collect();
        ProcessedBook {
            full_text: sections.values().map(String::as_str).collect(),
            sections,
            toc: vec![],
            assessment_test: None,
            chapter_elements: IndexMap::new(),
            objective_map: Vec::new(),
        }
    }

    fn kept<'a>(window: &'a ContextWindow<'_>) -> &'a str {
        &window.text[..window.kept_bytes]
    }

    #[test]
    fn short_book_is_passed_whole() {
        let b = book(&[("full", "A short book.")]);
        let window = context_window(&b, 100, 50);
        assert!(!window.is_truncated());
        assert!(matches!(window.text, Cow::Borrowed(_)));
        assert_eq!(window.text, "A short book.");
    }

    #[test]
    fn prefers_chapter_boundary() {
        let b = book(&[
            ("intro", "Intro text here.\n\n"),
            ("section_1", "Chapter 1: A\nFirst chapter. More words.\n\n"),
            ("section_2", "Chapter 2: B\nSecond chapter body that is long.\n"),
        ]);
        let limit = b.full_text.len() - 10;
        let window = context_window(&b, limit, limit);

        assert_eq!(window.breakpoint, Breakpoint::Chapter);
        assert!(kept(&window).ends_with("More words.\n\n"));
        assert!(window.text.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn falls_back_to_paragraph_then_sentence() {
        let b = book(&[("full", "First para.\n\nSecond para goes on. And on and on")]);
        let window = context_window(&b, 30, 30);
        assert_eq!(window.breakpoint, Breakpoint::Paragraph);
        assert_eq!(kept(&window), "First para.\n");

        let b = book(&[("full", "One sentence. Two sentence. Three goes on")]);
        let window = context_window(&b, 35, 35);
        assert_eq!(window.breakpoint, Breakpoint::Sentence);
        assert_eq!(kept(&window), "One sentence. Two sentence.");
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        let b = book(&[("full", "ééééééééééééééééééééé")]);
        let window = context_window(&b, 5, 2);
        assert_eq!(window.breakpoint, Breakpoint::Hard);
        assert_eq!(kept(&window), "ééééé");
    }

    #[test]
    fn breakpoints_outside_lookback_are_ignored() {
        let b = book(&[("full", "Early. xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx")]);
        let window = context_window(&b, 40, 5);
        assert_eq!(window.breakpoint, Breakpoint::Hard);
        assert_eq!(kept(&window).chars().count(), 40);
    }

    #[test]
    fn book_is_not_mutated() {
        let b = book(&[("intro", "Intro.\n"), ("section_1", "Chapter 1\nBody text. More.\n")]);
        let before = b.clone();
        let _ = context_window(&b, 10, 10);
        assert_eq!(b, before);
    }
}
