//! TOC (Table of Contents) builder.
//!
//! Turns detected chapter markers into the flat, level-1 navigation list
//! stored in `toc.json`: the assessment test first, then the introduction,
//! then one entry per chapter in ordinal order.

use indexmap::IndexMap;
use tracing::{debug, instrument};

use studykit_shared::{
    ASSESSMENT_TEST_ID, AssessmentTest, FULL_SECTION_ID, INTRO_SECTION_ID, TocItem, section_id,
};
use studykit_structure::ChapterMarker;

/// Title of the introduction entry.
pub const INTRO_TITLE: &str = "Introduction";

/// Title of the single entry used when no chapters were detected.
pub const FULL_DOCUMENT_TITLE: &str = "Full Document";

/// Build the TOC for a segmented document.
///
/// The introduction is listed only when its text has non-whitespace content;
/// the section itself is kept either way.
#[instrument(skip_all, fields(markers = markers.len(), has_assessment = assessment.is_some()))]
pub fn build_toc(
    markers: &[ChapterMarker],
    sections: &IndexMap<String, String>,
    assessment: Option<&AssessmentTest>,
) -> Vec<TocItem> {
    let mut toc = Vec::with_capacity(markers.len() + 2);

    if let Some(test) = assessment {
        toc.push(TocItem::top_level(ASSESSMENT_TEST_ID, test.title.clone()));
    }

    if markers.is_empty() {
        toc.push(TocItem::top_level(FULL_SECTION_ID, FULL_DOCUMENT_TITLE));
        debug!("no chapters, single full-document entry");
        return toc;
    }

    let has_intro = sections
        .get(INTRO_SECTION_ID)
        .is_some_and(|text| !text.trim().is_empty());
    if has_intro {
        toc.push(TocItem::top_level(INTRO_SECTION_ID, INTRO_TITLE));
    }

    toc.extend(
        markers
            .iter()
            .map(|m| TocItem::top_level(section_id(m.ordinal), m.display_title())),
    );

    debug!(entries = toc.len(), "TOC built");
    toc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
