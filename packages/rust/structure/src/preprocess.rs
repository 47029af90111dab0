//! Header repair for text whose line breaks were lost during extraction.
//!
//! PDF text extraction often fuses a chapter header onto the previous
//! sentence (`"...end of intro. Chapter 1: The Beginning ..."`). Header
//! detection is line-anchored, so those headers are moved onto their own line
//! in a working copy. The positions of the inserted newlines are kept, so
//! offsets found in the copy can be mapped back onto the untouched input.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::boundaries::ChapterMarker;

/// `Chapter|Domain|Module`, an arabic or roman ordinal, then either a colon or
/// a capitalized word.
static FUSED_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Chapter|Domain|Module)[ \t]+(?:\d+|[IVXLCDM]+)(?:[ \t]*:|[ \t]+[A-Z])")
        .expect("fused header regex")
});

/// Working copy with every header on its own line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedText {
    /// The repaired text.
    pub text: String,
    /// Input offsets at which a newline was inserted, ascending.
    inserted_at: Vec<usize>,
}

impl IsolatedText {
    /// Number of newlines inserted.
    pub fn repairs(&self) -> usize {
        self.inserted_at.len()
    }

    /// Map an offset in [`IsolatedText::text`] back to the input.
    ///
    /// The `k`-th inserted newline sits at `inserted_at[k] + k` in the copy;
    /// every newline before `offset` shifts it by one.
    pub fn original_offset(&self, offset: usize) -> usize {
        let mut shift = 0;
        for (k, &at) in self.inserted_at.iter().enumerate() {
            if at + k < offset {
                shift += 1;
            } else {
                break;
            }
        }
        offset - shift
    }

    /// Rewrite marker offsets found in the copy so they index the input.
    pub fn remap_markers(&self, markers: Vec<ChapterMarker>) -> Vec<ChapterMarker> {
        markers
            .into_iter()
            .map(|mut marker| {
                marker.offset = self.original_offset(marker.offset);
                marker
            })
            .collect()
    }
}

/// Insert a newline before every header that is not already at a line start.
pub fn isolate_headers(text: &str) -> IsolatedText {
    let mut out = String::with_capacity(text.len() + 64);
    let mut last = 0;
    let mut inserted_at = Vec::new();

    for m in FUSED_HEADER_RE.find_iter(text) {
        if at_line_start(text, m.start()) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push('\n');
        last = m.start();
        inserted_at.push(m.start());
    }
    out.push_str(&text[last..]);

    if !inserted_at.is_empty() {
        debug!(repaired = inserted_at.len(), "isolated fused headers");
    }

    IsolatedText {
        text: out,
        inserted_at,
    }
}

/// True when only spaces or tabs separate `pos` from the previous newline
/// (or the start of the text).
fn at_line_start(text: &str, pos: usize) -> bool {
    text[..pos]
        .chars()
        .rev()
        .take_while(|c| *c != '\n')
        .all(|c| c == ' ' || c == '\t')
}
