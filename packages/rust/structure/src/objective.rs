//! Exam objective map mining.
//!
//! Study guides open with a table mapping each exam objective to the
//! chapters covering it, one objective per line:
//!
//! ```text
//! 1.1 Understand and apply concepts of confidentiality 1, 3
//! 1.2.1 Evaluate security governance principles       2
//! ```

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, instrument};

use studykit_shared::ObjectiveMapItem;

/// Descriptions at least this long are table noise, not an objective.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Dotted objective id, description, comma-separated chapter list, one line.
static OBJECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(\d+(?:\.\d+)+)[ \t]+(.+?)[ \t]+(\d+(?:[ \t]*,[ \t]*\d+)*)[ \t]*\r?$")
        .expect("objective regex")
});

/// Every objective line in `text`, in document order.
#[instrument(skip_all, fields(len = text.len()))]
pub fn parse_objective_map(text: &str) -> Vec<ObjectiveMapItem> {
    let mut items = Vec::new();
    let mut rejected = 0usize;

    for caps in OBJECTIVE_RE.captures_iter(text) {
        if caps[2].chars().count() >= MAX_DESCRIPTION_CHARS {
            rejected += 1;
            continue;
        }
        let chapters: Option<Vec<u32>> = caps[3].split(',').map(|c| c.trim().parse().ok()).collect();
        let Some(chapters) = chapters else {
            rejected += 1;
            continue;
        };

        items.push(ObjectiveMapItem {
            domain_id: caps[1].to_string(),
            description: caps[2].split_whitespace().collect::<Vec<_>>().join(" "),
            chapters,
        });
    }

    debug!(objectives = items.len(), rejected, "objective map parsed");
    items
}

/// Objectives grouped by top-level domain, domains in first-seen order.
pub fn group_by_domain(items: &[ObjectiveMapItem]) -> IndexMap<&str, Vec<&ObjectiveMapItem>> {
    let mut groups: IndexMap<&str, Vec<&ObjectiveMapItem>> = IndexMap::new();
    for item in items {
        groups.entry(item.domain()).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_multi_chapter_lines() {
        let text = "Objective Map\n\
1.1 Understand and apply concepts of confidentiality, integrity and availability 1\n\
1.2 Evaluate and apply security governance principles 1, 2,3\n\
\t2.1.4 Identify and classify information   5\n";
        let items = parse_objective_map(text);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].domain_id, "1.1");
        assert_eq!(
            items[0].description,
            "Understand and apply concepts of confidentiality, integrity and availability"
        );
        assert_eq!(items[0].chapters, vec![1]);
        assert_eq!(items[1].chapters, vec![1, 2, 3]);
        assert_eq!(items[2].domain_id, "2.1.4");
        assert_eq!(items[2].description, "Identify and classify information");
        assert_eq!(items[2].chapters, vec![5]);
    }

    #[test]
    fn over_long_descriptions_are_rejected() {
        let long = "x".repeat(MAX_DESCRIPTION_CHARS);
        let text = format!("1.1 {long} 3\n1.2 Short one 4\n");
        let items = parse_objective_map(&text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].domain_id, "1.2");

        let just_under = "y".repeat(MAX_DESCRIPTION_CHARS - 1);
        assert_eq!(parse_objective_map(&format!("1.1 {just_under} 3")).len(), 1);
    }

    #[test]
    fn numbered_questions_and_prose_are_not_objectives() {
        let text = "1. What is the CIA triad? 2\nSee section 1.2 of chapter 4\nChapter 3: Risk\n";
        assert!(parse_objective_map(text).is_empty());
    }

    #[test]
    fn groups_by_top_level_domain() {
        let items = parse_objective_map("1.1 A 1\n2.1 B 4\n1.2 C 2\n");
        let groups = group_by_domain(&items);

        let domains: Vec<&str> = groups.keys().copied().collect();
        assert_eq!(domains, vec!["1", "2"]);
        assert_eq!(groups["1"].len(), 2);
        assert_eq!(groups["1"][1].description, "C");
    }
}
