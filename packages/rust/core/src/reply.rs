//! Parsing of model replies.
//!
//! The model answers in markdown and may embed fenced ```json blocks holding
//! a quiz or a concept visualization. A reply is split into an ordered list
//! of [`ReplyBlock`]s. A fenced block that does not match either schema, or a
//! quiz whose `correctIndex` does not point at one of its options, is kept
//! as plain text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use studykit_shared::QuizQuestion;

static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("json fence regex"));

/// A quiz generated by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizPayload {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

impl QuizPayload {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.questions.is_empty() {
            return Err("quiz has no questions".into());
        }
        for q in &self.questions {
            if q.options.is_empty() {
                return Err(format!("question '{}' has no options", q.id));
            }
            match q.correct_index {
                Some(i) if i < q.options.len() => {}
                Some(i) => {
                    return Err(format!(
                        "question '{}' has correctIndex {i} but {} options",
                        q.id,
                        q.options.len()
                    ));
                }
                None => return Err(format!("question '{}' has no correctIndex", q.id)),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualizationTag {
    #[serde(rename = "visualization")]
    Visualization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagramType {
    MermaidFlowchart,
    MermaidSequence,
    Ascii,
}

/// A diagram explaining a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptVisualization {
    #[serde(rename = "type")]
    pub tag: VisualizationTag,
    pub title: String,
    #[serde(default)]
    pub purpose: String,
    pub diagram_type: DiagramType,
    pub diagram_code: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Visualization(ConceptVisualization),
    Quiz(QuizPayload),
}

/// One piece of a parsed reply, in reply order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBlock {
    Quiz(QuizPayload),
    Visualization(ConceptVisualization),
    PlainText(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub blocks: Vec<ReplyBlock>,
}

impl ParsedReply {
    /// The first quiz in the reply.
    pub fn quiz(&self) -> Option<&QuizPayload> {
        self.blocks.iter().find_map(|b| match b {
            ReplyBlock::Quiz(q) => Some(q),
            _ => None,
        })
    }

    pub fn visualizations(&self) -> impl Iterator<Item = &ConceptVisualization> {
        self.blocks.iter().filter_map(|b| match b {
            ReplyBlock::Visualization(v) => Some(v),
            _ => None,
        })
    }

    /// All plain-text pieces joined by blank lines.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ReplyBlock::PlainText(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Split a raw model reply into blocks.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let mut blocks = Vec::new();
    let mut last = 0;

    for caps in JSON_FENCE_RE.captures_iter(raw) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_text(&mut blocks, &raw[last..whole.start()]);
        last = whole.end();

        match parse_payload(body.as_str()) {
            Ok(block) => blocks.push(block),
            Err(reason) => {
                warn!(%reason, "fenced JSON block kept as text");
                push_text(&mut blocks, whole.as_str());
            }
        }
    }
    push_text(&mut blocks, &raw[last..]);

    debug!(blocks = blocks.len(), "reply parsed");
    ParsedReply { blocks }
}

fn parse_payload(json: &str) -> std::result::Result<ReplyBlock, String> {
    match serde_json::from_str::<Payload>(json).map_err(|e| e.to_string())? {
        Payload::Visualization(v) => Ok(ReplyBlock::Visualization(v)),
        Payload::Quiz(q) => {
            q.validate()?;
            Ok(ReplyBlock::Quiz(q))
        }
    }
}

fn push_text(blocks: &mut Vec<ReplyBlock>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        blocks.push(ReplyBlock::PlainText(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ: &str = r#"```json
{
  "title": "Domain 1 Quiz",
  "questions": [
    {
      "id": "1",
      "question": "Which principle ensures data is not altered?",
      "options": ["A. Confidentiality", "B. Integrity", "C. Availability", "D. Privacy"],
      "correctIndex": 1,
      "explanation": "Integrity protects against unauthorized modification.",
      "difficulty": "medium",
      "domain": "Security and Risk Management"
    }
  ]
}
```"#;

    const VIZ: &str = r#"```json
{"type": "visualization", "title": "CIA Triad", "purpose": "Shows the three goals", "diagramType": "mermaid-flowchart", "diagramCode": "graph TD; C-->I; I-->A;"}
```"#;

    #[test]
    fn splits_text_quiz_and_visualization() {
        let raw = format!("Here is your quiz.\n\n{QUIZ}\n\nAnd a diagram:\n{VIZ}\nGood luck!");
        let reply = parse_reply(&raw);

        assert_eq!(reply.blocks.len(), 5);
        assert_eq!(reply.blocks[0], ReplyBlock::PlainText("Here is your quiz.".into()));

        let quiz = reply.quiz().expect("quiz");
        assert_eq!(quiz.title, "Domain 1 Quiz");
        assert_eq!(quiz.questions[0].correct_index, Some(1));

        let viz: Vec<_> = reply.visualizations().collect();
        assert_eq!(viz.len(), 1);
        assert_eq!(viz[0].diagram_type, DiagramType::MermaidFlowchart);

        assert_eq!(reply.text(), "Here is your quiz.\n\nAnd a diagram:\n\nGood luck!");
    }

    #[test]
    fn out_of_range_correct_index_is_rejected() {
        let raw = QUIZ.replace("\"correctIndex\": 1", "\"correctIndex\": 7");
        let reply = parse_reply(&raw);
        assert!(reply.quiz().is_none());
        assert!(matches!(&reply.blocks[0], ReplyBlock::PlainText(t) if t.contains("correctIndex")));
    }

    #[test]
    fn invalid_json_stays_plain_text() {
        let reply = parse_reply("Intro\n```json\n{not json}\n```\n");
        assert_eq!(reply.blocks.len(), 2);
        assert!(reply.blocks.iter().all(|b| matches!(b, ReplyBlock::PlainText(_))));
    }

    #[test]
    fn unknown_diagram_type_is_not_a_visualization() {
        let raw = VIZ.replace("mermaid-flowchart", "svg");
        let reply = parse_reply(&raw);
        assert_eq!(reply.visualizations().count(), 0);
    }

    #[test]
    fn reply_without_blocks_is_one_text_block() {
        let reply = parse_reply("  Just an explanation.  ");
        assert_eq!(reply.blocks, vec![ReplyBlock::PlainText("Just an explanation.".into())]);
        assert!(parse_reply("   ").blocks.is_empty());
    }
}
