//! Slice the document into sections between consecutive markers.

use indexmap::IndexMap;
use tracing::{debug, instrument};

use studykit_shared::{FULL_SECTION_ID, INTRO_SECTION_ID, section_id};

use crate::boundaries::ChapterMarker;

/// Split `text` into sections, in document order.
///
/// - text before the first marker becomes `intro` (only if non-empty)
/// - marker `i` runs to marker `i + 1`, the last one to the end of the text
/// - without markers the whole text is one `full` section
///
/// Concatenating the returned values reproduces `text` exactly.
#[instrument(skip_all, fields(markers = markers.len()))]
pub fn segment(text: &str, markers: &[ChapterMarker]) -> IndexMap<String, String> {
    let mut sections = IndexMap::with_capacity(markers.len() + 1);

    let Some(first) = markers.first() else {
        sections.insert(FULL_SECTION_ID.to_string(), text.to_string());
        debug!("no markers, single full section");
        return sections;
    };

    if first.offset > 0 {
        sections.insert(INTRO_SECTION_ID.to_string(), text[..first.offset].to_string());
    }

    for (i, marker) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map_or(text.len(), |next| next.offset);
        sections.insert(section_id(marker.ordinal), text[marker.offset..end].to_string());
    }

    debug!(sections = sections.len(), "segmentation complete");
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundaries::detect_boundaries;

    #[test]
    fn fallback_single_full_section() {
        let text = "Just some plain text without any chapter headers.";
        let sections = segment(text, &[]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[FULL_SECTION_ID], text);
    }

    #[test]
    fn intro_and_chapters_partition_text() {
        let text = "Preface\nChapter 1: A\none\nChapter 2: B\ntwo\n";
        let markers = detect_boundaries(text);
        let sections = segment(text, &markers);

        let ids: Vec<&str> = sections.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["intro", "section_1", "section_2"]);
        assert_eq!(sections["intro"], "Preface\n");
        assert_eq!(sections["section_2"], "Chapter 2: B\ntwo\n");
        assert_eq!(sections.values().map(String::as_str).collect::<String>(), text);
    }

    #[test]
    fn no_intro_when_first_marker_at_start() {
        let text = "Chapter 1: A\nbody";
        let sections = segment(text, &detect_boundaries(text));
        assert!(!sections.contains_key(INTRO_SECTION_ID));
        assert_eq!(sections["section_1"], text);
    }
}
