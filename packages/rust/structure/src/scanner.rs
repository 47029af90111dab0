//! Line tokenizer shared by the boundary detector and the assessment parser.
//!
//! The scanner walks a document line by line and moves between three states:
//! - [`ScanState::Scanning`]: ordinary prose, nothing recognized yet
//! - [`ScanState::InHeaderMatch`]: a line starts with a header keyword and the
//!   tokenizer is consuming keyword, ordinal, separator and title
//! - [`ScanState::InAssessmentWindow`]: the line lies inside the assessment
//!   window handed to [`Scanner::windowed`]
//!
//! Headers are only ever recognized at a line start (after optional spaces or
//! tabs). Mid-sentence references such as "see Chapter 5" never reach the
//! header tokenizer.

use std::ops::Range;

use tracing::trace;

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// One line of the document, without its line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Byte offset of the first character of the line.
    pub offset: usize,
    pub text: &'a str,
}

/// Split `text` into lines, tracking byte offsets. `\r\n` endings are
/// stripped along with `\n`.
pub fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let line = Line {
            offset,
            text: raw.trim_end_matches('\n').trim_end_matches('\r'),
        };
        offset += raw.len();
        line
    })
}

// ---------------------------------------------------------------------------
// Header tokens
// ---------------------------------------------------------------------------

/// Keywords that introduce a chapter-like header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKeyword {
    Chapter,
    Domain,
    Module,
}

impl HeaderKeyword {
    pub const ALL: [HeaderKeyword; 3] = [Self::Chapter, Self::Domain, Self::Module];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chapter => "Chapter",
            Self::Domain => "Domain",
            Self::Module => "Module",
        }
    }
}

/// A header recognized at a line start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderToken<'a> {
    pub keyword: HeaderKeyword,
    /// Ordinal as written (`"3"`, `"III"`).
    pub label: &'a str,
    pub ordinal: u32,
    /// Title text after the ordinal; empty when the header has none.
    pub title: &'a str,
    /// Byte offset of the keyword.
    pub offset: usize,
}

/// Parse an arabic or upper-case roman ordinal.
pub fn parse_ordinal(label: &str) -> Option<u32> {
    if label.bytes().all(|b| b.is_ascii_digit()) {
        return label.parse().ok();
    }
    roman_to_u32(label)
}

/// Convert a canonical upper-case roman numeral. Returns `None` for
/// malformed numerals such as `IIII` or `VX`.
fn roman_to_u32(s: &str) -> Option<u32> {
    fn value(c: u8) -> Option<u32> {
        Some(match c {
            b'I' => 1,
            b'V' => 5,
            b'X' => 10,
            b'L' => 50,
            b'C' => 100,
            b'D' => 500,
            b'M' => 1000,
            _ => return None,
        })
    }

    if s.is_empty() {
        return None;
    }

    let mut total = 0u32;
    let mut largest = 0u32;
    for &b in s.as_bytes().iter().rev() {
        let v = value(b)?;
        if v < largest {
            total = total.checked_sub(v)?;
        } else {
            total = total.checked_add(v)?;
            largest = v;
        }
    }

    // Reject non-canonical spellings by re-encoding.
    (total > 0 && u32_to_roman(total) == s).then_some(total)
}

fn u32_to_roman(mut n: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, glyph) in TABLE {
        while n >= value {
            out.push_str(glyph);
            n -= value;
        }
    }
    out
}

/// Tokenize a header at the start of `line`.
///
/// Grammar: `[ \t]* KEYWORD [ \t]+ ORDINAL ( [ \t]* ':' TITLE? | [ \t]+ TITLE | EOL )`.
/// Anything else after the ordinal (`"Chapter 5)"`, `"Chapter 12abc"`) is not a header.
pub fn tokenize_header<'a>(line: &Line<'a>) -> Option<HeaderToken<'a>> {
    let rest = line.text.trim_start_matches([' ', '\t']);
    let indent = line.text.len() - rest.len();

    let keyword = HeaderKeyword::ALL
        .into_iter()
        .find(|k| rest.starts_with(k.as_str()))?;
    let cur = &rest[keyword.as_str().len()..];

    let after_ws = cur.trim_start_matches([' ', '\t']);
    if after_ws.len() == cur.len() {
        return None;
    }
    let cur = after_ws;

    let ordinal_len = if cur.starts_with(|c: char| c.is_ascii_digit()) {
        cur.bytes().take_while(u8::is_ascii_digit).count()
    } else {
        cur.bytes().take_while(|b| b"IVXLCDM".contains(b)).count()
    };
    if ordinal_len == 0 {
        return None;
    }
    let (label, tail) = cur.split_at(ordinal_len);
    let ordinal = parse_ordinal(label)?;

    let trimmed = tail.trim_start_matches([' ', '\t']);
    let title = if trimmed.is_empty() {
        ""
    } else if let Some(after_colon) = trimmed.strip_prefix(':') {
        after_colon.trim()
    } else if trimmed.len() < tail.len() {
        trimmed.trim_end()
    } else {
        return None;
    };

    Some(HeaderToken {
        keyword,
        label,
        ordinal,
        title,
        offset: line.offset + indent,
    })
}

fn starts_with_keyword(text: &str) -> bool {
    let rest = text.trim_start_matches([' ', '\t']);
    HeaderKeyword::ALL
        .iter()
        .any(|k| rest.starts_with(k.as_str()))
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Where the scanner currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    InHeaderMatch,
    InAssessmentWindow,
}

/// Tokens emitted by the [`Scanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// A header at a line start.
    Header(HeaderToken<'a>),
    /// A line (or the clipped part of one) inside the assessment window.
    WindowLine(Line<'a>),
}

/// Line-oriented tokenizer with explicit state.
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    state: ScanState,
    window: Option<Range<usize>>,
}

impl<'a> Scanner<'a> {
    /// Scan the whole document for headers.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            state: ScanState::Scanning,
            window: None,
        }
    }

    /// Scan starting at the assessment window. Lines inside `window` are
    /// emitted as [`Token::WindowLine`]; after the window, header scanning
    /// resumes.
    pub fn windowed(text: &'a str, window: Range<usize>) -> Self {
        let start = window.start.min(text.len());
        Self {
            text,
            pos: start,
            state: ScanState::Scanning,
            window: Some(start..window.end.min(text.len())),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    fn transition(&mut self, next: ScanState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, pos = self.pos, "scanner transition");
            self.state = next;
        }
    }

    /// Next raw line from `pos`, clipped to `limit`.
    fn next_line(&mut self, limit: usize) -> Option<Line<'a>> {
        if self.pos >= limit {
            return None;
        }
        let start = self.pos;
        let slice = &self.text[start..limit];
        let (raw_len, body) = match slice.find('\n') {
            Some(i) => (i + 1, &slice[..i]),
            None => (slice.len(), slice),
        };
        self.pos = start + raw_len;
        Some(Line {
            offset: start,
            text: body.trim_end_matches('\r'),
        })
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(window) = self.window.clone() {
            if self.pos < window.end {
                self.transition(ScanState::InAssessmentWindow);
                if let Some(line) = self.next_line(window.end) {
                    return Some(Token::WindowLine(line));
                }
            }
            self.window = None;
            self.transition(ScanState::Scanning);
        }

        while let Some(line) = self.next_line(self.text.len()) {
            if !starts_with_keyword(line.text) {
                continue;
            }
            self.transition(ScanState::InHeaderMatch);
            let token = tokenize_header(&line);
            self.transition(ScanState::Scanning);
            if let Some(header) = token {
                return Some(Token::Header(header));
            }
        }

        None
    }
}
