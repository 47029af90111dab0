//! Assessment test extraction.
//!
//! The assessment test is the block of numbered multiple-choice questions
//! that precedes chapter 1 in most certification study guides. The window
//! runs from the first "Assessment Test" to the first "Chapter 1" after it
//! (case-insensitive), or to the end of the document.
//!
//! Inside the window:
//! - `<n>. text` opens a question
//! - `A. text` .. `H. text` lines become options
//! - other lines continue the question stem or the last option
//!
//! When the window contains "Answers to Assessment Test", only the text before
//! it holds questions and the remainder is read as an answer key
//! (`<n>. <letter>. explanation`).

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use studykit_shared::{ASSESSMENT_TEST_ID, AssessmentTest, QuizQuestion};

use crate::scanner::{Line, Scanner, Token, lines};

/// Title given to the extracted assessment test.
pub const ASSESSMENT_TITLE: &str = "Assessment Test";

/// Explanation stored when no answer key entry is available.
pub const ANSWER_KEY_PLACEHOLDER: &str =
    "Answer and explanation are provided in the book's assessment test answer key.";

/// Default cap on extracted questions.
pub const DEFAULT_MAX_QUESTIONS: usize = 40;

const START_MARKER: &str = "assessment test";
const END_MARKER: &str = "chapter 1";
const ANSWERS_MARKER: &str = "answers to assessment test";

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

static QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.\s+(\S.*)$").expect("question regex"));

static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-H])\.\s+(.*)$").expect("option regex"));

static INLINE_OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)([A-H])\.\s").expect("inline option regex"));

static ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.\s*([A-H])\b\.?\s*(.*)$").expect("answer regex")
});

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// Byte range of the assessment window, or `None` when the document has no
/// "Assessment Test" marker.
pub fn find_window(text: &str) -> Option<Range<usize>> {
    // ASCII lowercasing keeps byte offsets identical.
    let lower = text.to_ascii_lowercase();
    let start = lower.find(START_MARKER)?;
    let search_from = start + START_MARKER.len();

    let end = lower[search_from..]
        .match_indices(END_MARKER)
        .map(|(i, _)| search_from + i)
        .find(|&i| {
            !lower[i + END_MARKER.len()..]
                .starts_with(|c: char| c.is_ascii_digit())
        })
        .unwrap_or(text.len());

    (end >= start).then_some(start..end)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract the assessment test, capped at `max_questions`.
///
/// Returns `None` when there is no window or no question could be recovered.
#[instrument(skip_all, fields(text_len = text.len(), max_questions = max_questions))]
pub fn parse_assessment(text: &str, max_questions: usize) -> Option<AssessmentTest> {
    let window = find_window(text)?;

    let lower_window = text[window.clone()].to_ascii_lowercase();
    let questions_end = lower_window
        .find(ANSWERS_MARKER)
        .map_or(window.end, |i| window.start + i);

    let mut builder = QuestionBuilder::new(max_questions);
    for token in Scanner::windowed(text, window.start..questions_end) {
        let Token::WindowLine(line) = token else {
            break;
        };
        builder.feed(&line);
        if builder.is_full() {
            debug!(max_questions, "assessment question cap reached");
            break;
        }
    }
    let drafts = builder.finish();

    let answers = if questions_end < window.end {
        parse_answer_key(&text[questions_end..window.end])
    } else {
        HashMap::new()
    };

    let questions: Vec<QuizQuestion> = drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| {
            let number = draft.number;
            draft.into_question(i + 1, answers.get(&number))
        })
        .collect();

    debug!(
        window_start = window.start,
        window_end = window.end,
        questions = questions.len(),
        answers = answers.len(),
        "assessment parse complete"
    );

    if questions.is_empty() {
        return None;
    }

    Some(AssessmentTest {
        id: ASSESSMENT_TEST_ID.to_string(),
        title: ASSESSMENT_TITLE.to_string(),
        questions,
    })
}

/// A question being accumulated line by line.
#[derive(Debug)]
struct Draft {
    number: u32,
    stem: String,
    options: Vec<String>,
}

impl Draft {
    fn into_question(self, index: usize, answer: Option<&AnswerEntry>) -> QuizQuestion {
        let (question, options) = if self.options.is_empty() {
            split_inline_options(&self.stem).unwrap_or((self.stem, Vec::new()))
        } else {
            (self.stem, self.options)
        };

        let mut quiz = QuizQuestion {
            id: format!("assessment_q{index}"),
            question,
            options,
            correct_index: None,
            correct_answer: None,
            explanation: ANSWER_KEY_PLACEHOLDER.to_string(),
            domain: None,
            difficulty: None,
        };

        if let Some(entry) = answer {
            let idx = usize::from(entry.letter - b'A');
            quiz.correct_answer = Some(char::from(entry.letter).to_string());
            quiz.correct_index = (idx < quiz.options.len()).then_some(idx);
            if !entry.explanation.is_empty() {
                quiz.explanation = entry.explanation.clone();
            }
        }

        quiz
    }
}

/// Line-driven question accumulator.
struct QuestionBuilder {
    max: usize,
    done: Vec<Draft>,
    current: Option<Draft>,
}

impl QuestionBuilder {
    fn new(max: usize) -> Self {
        Self {
            max,
            done: Vec::new(),
            current: None,
        }
    }

    fn is_full(&self) -> bool {
        self.done.len() >= self.max
    }

    fn feed(&mut self, line: &Line<'_>) {
        let trimmed = line.text.trim();
        if trimmed.is_empty() {
            return;
        }

        if let Some(caps) = QUESTION_RE.captures(trimmed) {
            self.flush();
            if self.is_full() {
                return;
            }
            self.current = Some(Draft {
                number: caps[1].parse().unwrap_or(0),
                stem: caps[2].trim().to_string(),
                options: Vec::new(),
            });
            return;
        }

        // Preamble lines before the first question are ignored.
        let Some(draft) = self.current.as_mut() else {
            return;
        };

        if let Some(caps) = OPTION_RE.captures(trimmed) {
            draft.options.push(caps[2].trim().to_string());
        } else if let Some(last) = draft.options.last_mut() {
            last.push(' ');
            last.push_str(trimmed);
        } else {
            draft.stem.push(' ');
            draft.stem.push_str(trimmed);
        }
    }

    fn flush(&mut self) {
        if let Some(draft) = self.current.take() {
            if self.done.len() < self.max {
                self.done.push(draft);
            }
        }
    }

    fn finish(mut self) -> Vec<Draft> {
        self.flush();
        self.done
    }
}

/// Split `"Stem? A. one B. two"` into stem and options. Letters must appear
/// in order starting at `A`; at least two options are required.
fn split_inline_options(stem: &str) -> Option<(String, Vec<String>)> {
    let mut cuts: Vec<(usize, usize)> = Vec::new();
    let mut expected = b'A';

    for caps in INLINE_OPTION_RE.captures_iter(stem) {
        let (Some(letter), Some(whole)) = (caps.get(1), caps.get(0)) else {
            continue;
        };
        if letter.as_str().as_bytes()[0] != expected {
            continue;
        }
        cuts.push((letter.start(), whole.end()));
        expected += 1;
    }

    if cuts.len() < 2 {
        return None;
    }

    let question = stem[..cuts[0].0].trim();
    if question.is_empty() {
        return None;
    }

    let options = cuts
        .iter()
        .enumerate()
        .map(|(i, &(_, content_start))| {
            let end = cuts.get(i + 1).map_or(stem.len(), |next| next.0);
            stem[content_start..end].trim().to_string()
        })
        .collect();

    Some((question.to_string(), options))
}

// ---------------------------------------------------------------------------
// Answer key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct AnswerEntry {
    letter: u8,
    explanation: String,
}

/// Parse `<n>. <letter>. explanation` lines; other lines continue the
/// previous explanation.
fn parse_answer_key(text: &str) -> HashMap<u32, AnswerEntry> {
    let mut answers: HashMap<u32, AnswerEntry> = HashMap::new();
    let mut last: Option<u32> = None;

    for line in lines(text).skip(1) {
        let trimmed = line.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = ANSWER_RE.captures(trimmed) {
            let Ok(number) = caps[1].parse::<u32>() else {
                continue;
            };
            answers.entry(number).or_insert_with(|| AnswerEntry {
                letter: caps[2].as_bytes()[0],
                explanation: caps[3].trim().to_string(),
            });
            last = Some(number);
        } else if let Some(entry) = last.and_then(|n| answers.get_mut(&n)) {
            if !entry.explanation.is_empty() {
                entry.explanation.push(' ');
            }
            entry.explanation.push_str(trimmed);
        }
    }

    answers
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\nAssessment Test\n1. What is the CIA triad?\nA. Confidentiality, Integrity, Availability\nB. Cat, Ice, Apple\nC. Car, Igloo, Ant\nD. None of the above\n2. Another question.\nChapter 1: Security Governance\n        ";

    #[test]
    fn extracts_two_questions_before_chapter_one() {
        let test = parse_assessment(SAMPLE, DEFAULT_MAX_QUESTIONS).expect("assessment test");
        assert_eq!(test.id, ASSESSMENT_TEST_ID);
        assert_eq!(test.questions.len(), 2);

        let first = &test.questions[0];
        assert_eq!(first.id, "assessment_q1");
        assert_eq!(first.question, "What is the CIA triad?");
        assert_eq!(first.options.len(), 4);
        assert_eq!(first.options[0], "Confidentiality, Integrity, Availability");

        let second = &test.questions[1];
        assert_eq!(second.question, "Another question.");
        assert!(second.options.is_empty());
        assert_eq!(second.explanation, ANSWER_KEY_PLACEHOLDER);
    }

    #[test]
    fn window_is_case_insensitive_and_skips_chapter_ten() {
        let text = "ASSESSMENT TEST\n1. See chapter 10 for this.\nA. x\nB. y\nCHAPTER 1 Intro\n";
        let window = find_window(text).unwrap();
        assert_eq!(window.start, 0);
        assert!(text[window.end..].starts_with("CHAPTER 1 Intro"));
    }

    #[test]
    fn window_runs_to_end_without_chapter_one() {
        let text = "Assessment Test\n1. Only question?\n";
        assert_eq!(find_window(text), Some(0..text.len()));
    }

    #[test]
    fn no_marker_means_no_test() {
        assert!(parse_assessment("1. A numbered line\nA. option\n", 40).is_none());
    }

    #[test]
    fn window_without_questions_is_not_found() {
        assert!(parse_assessment("Assessment Test\nNo questions here.\nChapter 1: Go\n", 40).is_none());
    }

    #[test]
    fn question_count_is_capped() {
        let mut text = String::from("Assessment Test\n");
        for n in 1..=50 {
            text.push_str(&format!("{n}. Question {n}?\nA. yes\nB. no\n"));
        }
        let test = parse_assessment(&text, 40).unwrap();
        assert_eq!(test.questions.len(), 40);
        assert_eq!(test.questions[39].question, "Question 40?");
    }

    #[test]
    fn continuation_lines_join_stem_and_options() {
        let text = "Assessment Test\nIntro words.\n1. Which control is\nbest here?\nA. First\noption text\nB. Second\n";
        let test = parse_assessment(text, 40).unwrap();
        let q = &test.questions[0];
        assert_eq!(q.question, "Which control is best here?");
        assert_eq!(q.options, vec!["First option text", "Second"]);
    }

    #[test]
    fn inline_options_are_split() {
        let text = "Assessment Test\n1. Which is a hash? A. AES B. SHA-256 C. RSA D. DES\n";
        let test = parse_assessment(text, 40).unwrap();
        let q = &test.questions[0];
        assert_eq!(q.question, "Which is a hash?");
        assert_eq!(q.options, vec!["AES", "SHA-256", "RSA", "DES"]);
    }

    #[test]
    fn answer_key_sets_correct_answer_and_explanation() {
        let text = "Assessment Test\n1. Pick one\nA. alpha\nB. beta\n2. No options here\nAnswers to Assessment Test\n1. B. Beta is right\nbecause reasons.\n2. C. Out of range.\nChapter 1: Start\n";
        let test = parse_assessment(text, 40).unwrap();
        assert_eq!(test.questions.len(), 2);

        let first = &test.questions[0];
        assert_eq!(first.correct_index, Some(1));
        assert_eq!(first.correct_answer.as_deref(), Some("B"));
        assert_eq!(first.explanation, "Beta is right because reasons.");
        assert!(first.answer_is_consistent());

        let second = &test.questions[1];
        assert_eq!(second.correct_index, None);
        assert_eq!(second.correct_answer.as_deref(), Some("C"));
        assert!(second.answer_is_consistent());
    }

    #[test]
    fn answer_key_lines_ignore_crlf() {
        let key = parse_answer_key("Answers to Assessment Test\r\n1. A. First\r\n  continued\r\n\r\n2. D\r\n");
        assert_eq!(key.len(), 2);
        assert_eq!(key[&1].letter, b'A');
        assert_eq!(key[&1].explanation, "First continued");
        assert_eq!(key[&2].letter, b'D');
        assert!(key[&2].explanation.is_empty());
    }
}
