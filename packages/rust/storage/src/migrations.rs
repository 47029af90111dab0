//! Schema migrations for the StudyKit library database.
//!
//! Applied in ascending version order when a read-write handle is opened.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: books, sections, toc_progress, session_usage",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per ingested book
CREATE TABLE IF NOT EXISTS books (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    source_file         TEXT NOT NULL,
    media_type          TEXT NOT NULL,
    content_hash        TEXT NOT NULL,
    tool_version        TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    section_count       INTEGER NOT NULL,
    has_assessment_test INTEGER NOT NULL,
    book_dir            TEXT
);

CREATE INDEX IF NOT EXISTS idx_books_content_hash ON books(content_hash);

-- Section bodies, fetched one at a time on demand
CREATE TABLE IF NOT EXISTS sections (
    book_id       TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    section_id    TEXT NOT NULL,
    position      INTEGER NOT NULL,
    title         TEXT NOT NULL,
    body          TEXT NOT NULL,
    elements_json TEXT NOT NULL,
    PRIMARY KEY (book_id, section_id)
);

CREATE INDEX IF NOT EXISTS idx_sections_position ON sections(book_id, position);

-- Reading progress per TOC item
CREATE TABLE IF NOT EXISTS toc_progress (
    book_id    TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    item_id    TEXT NOT NULL,
    status     TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (book_id, item_id)
);

-- Study-session counters keyed by credential fingerprint
CREATE TABLE IF NOT EXISTS session_usage (
    fingerprint      TEXT PRIMARY KEY,
    book_id          TEXT NOT NULL,
    exchanges        INTEGER NOT NULL,
    prompt_chars     INTEGER NOT NULL,
    started_at       TEXT NOT NULL,
    last_exchange_at TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
