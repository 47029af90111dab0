//! Study-element mining for a single section.
//!
//! Each extractor is independent and fails soft: a section that matches
//! nothing yields a [`ChapterElements`] with all lists empty.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{instrument, trace};

use studykit_shared::{ChapterElements, WrittenLab};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `Tip: text` or `Note: text`, text running to end of line.
static TIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Tip|Note):[ \t]*([^\r\n]*)").expect("tip regex")
});

/// Start of a summary / exam-essentials block.
static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Summary|Essentials)\b[ \t]*:?").expect("summary regex")
});

/// Keywords that close a summary block.
static STRUCTURAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Chapter|Review|Written)\b").expect("structural regex")
});

/// `Written Lab` marker with an optional lab number.
static WRITTEN_LAB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bWritten Labs?\b[ \t]*(?:\d+[.:)]?)?[ \t]*([^\r\n]*)").expect("written lab regex")
});

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Mine tips, the summary block, and the first written lab from `text`.
#[instrument(skip_all, fields(len = text.len()))]
pub fn extract_elements(text: &str) -> ChapterElements {
    let mut elements = ChapterElements {
        tips: extract_tips(text),
        ..ChapterElements::default()
    };

    if let Some(block) = extract_summary(text) {
        if block.from_summary_keyword {
            elements.summaries.push(block.text.clone());
        }
        elements.study_essentials.push(block.text);
    }

    if let Some(question) = extract_written_lab(text) {
        elements.written_labs.push(WrittenLab {
            question,
            answer: None,
        });
    }

    trace!(
        tips = elements.tips.len(),
        essentials = elements.study_essentials.len(),
        labs = elements.written_labs.len(),
        "elements extracted"
    );

    elements
}

/// Every tip or note, in order of appearance.
fn extract_tips(text: &str) -> Vec<String> {
    TIP_RE
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|tip| !tip.is_empty())
        .collect()
}

struct SummaryBlock {
    text: String,
    from_summary_keyword: bool,
}

/// The first `Summary` / `Essentials` block, up to the next structural
/// keyword or the end of the section.
fn extract_summary(text: &str) -> Option<SummaryBlock> {
    let caps = SUMMARY_RE.captures(text)?;
    let body_start = caps.get(0)?.end();
    let body = &text[body_start..];
    let end = STRUCTURAL_RE.find(body).map_or(body.len(), |m| m.start());

    let block = body[..end].trim();
    if block.is_empty() {
        return None;
    }

    Some(SummaryBlock {
        text: block.to_string(),
        from_summary_keyword: &caps[1] == "Summary",
    })
}

/// The prompt following the first `Written Lab` marker. When the marker line
/// carries no prompt, the next non-empty line is used.
fn extract_written_lab(text: &str) -> Option<String> {
    let caps = WRITTEN_LAB_RE.captures(text)?;
    let inline = caps[1].trim();
    if !inline.is_empty() {
        return Some(inline.to_string());
    }

    let after = &text[caps.get(0)?.end()..];
    after
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tip_summary_and_lab() {
        let text = "Chapter 1: Security Governance\nTip: Remember this for the exam.\nSummary: This is the summary.\nWritten Lab 1. Describe the CIA triad.\n";
        let elements = extract_elements(text);
        assert_eq!(elements.tips, vec!["Remember this for the exam."]);
        assert_eq!(elements.study_essentials, vec!["This is the summary."]);
        assert_eq!(elements.summaries, vec!["This is the summary."]);
        assert_eq!(elements.written_labs.len(), 1);
        assert_eq!(elements.written_labs[0].question, "Describe the CIA triad.");
        assert!(elements.review_questions.is_empty());
    }

    #[test]
    fn collects_every_tip_and_note_in_order() {
        let text = "Note: first\nbody Tip: second\nTip:   \nNote: third  \n";
        assert_eq!(extract_elements(text).tips, vec!["first", "second", "third"]);
    }

    #[test]
    fn essentials_block_runs_to_next_structural_keyword() {
        let text = "Exam Essentials\nKnow the CIA triad.\nUnderstand due care.\n\nReview Questions\n1. Q?";
        let elements = extract_elements(text);
        assert_eq!(
            elements.study_essentials,
            vec!["Know the CIA triad.\nUnderstand due care."]
        );
        assert!(elements.summaries.is_empty());
    }

    #[test]
    fn summary_runs_to_section_end() {
        let elements = extract_elements("Summary\nEverything important.\n");
        assert_eq!(elements.study_essentials, vec!["Everything important."]);
    }

    #[test]
    fn only_first_summary_and_lab_are_captured() {
        let text = "Summary: one\nWritten Lab\n\n1. Explain risk.\nSummary: two\nWritten Lab 2. Other.\n";
        let elements = extract_elements(text);
        assert_eq!(elements.study_essentials, vec!["one"]);
        assert_eq!(elements.written_labs.len(), 1);
        assert_eq!(elements.written_labs[0].question, "1. Explain risk.");
    }

    #[test]
    fn section_without_elements_is_all_empty() {
        let elements = extract_elements("Plain prose with nothing special.");
        assert!(elements.is_empty());
    }
}
