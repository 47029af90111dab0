//! libSQL storage layer for the StudyKit library.
//!
//! The [`Storage`] struct wraps a local libSQL database holding ingested book
//! metadata, section bodies (fetched one at a time), per-item TOC progress,
//! and study-session usage counters.
//!
//! **Access rules:**
//! - `studykit ingest` / `library progress`: read-write via [`Storage::open`]
//! - listing and inspection: read-only via [`Storage::open_readonly`]

mod migrations;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use studykit_shared::{
    BookId, BookManifest, ChapterElements, MediaType, ProcessedBook, Result, SessionUsage,
    StudyKitError, TopicStatus,
};
use tracing::{debug, info, instrument};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A library entry: the book's manifest plus where its files were written.
#[derive(Debug, Clone)]
pub struct BookRecord {
    pub manifest: BookManifest,
    /// Persisted book directory, when one was written.
    pub book_dir: Option<PathBuf>,
}

/// One section body as stored in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSection {
    pub id: String,
    pub title: String,
    /// Zero-based position in document order.
    pub position: usize,
    pub text: String,
    pub elements: ChapterElements,
}

fn storage_err(e: impl std::fmt::Display) -> StudyKitError {
    StudyKitError::Storage(e.to_string())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StudyKitError::Storage(format!("invalid date '{s}': {e}")))
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StudyKitError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StudyKitError::Storage(format!(
                "library database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        StudyKitError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(StudyKitError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Books
    // -----------------------------------------------------------------------

    /// Record a newly ingested book.
    #[instrument(skip_all, fields(book_id = %manifest.id))]
    pub async fn insert_book(&self, manifest: &BookManifest, book_dir: Option<&Path>) -> Result<()> {
        self.check_writable()?;
        let book_dir = book_dir.map(|p| p.display().to_string());
        self.conn
            .execute(
                "INSERT INTO books (id, name, source_file, media_type, content_hash, tool_version,
                                    created_at, section_count, has_assessment_test, book_dir)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    manifest.id.to_string(),
                    manifest.name.as_str(),
                    manifest.source_file.as_str(),
                    manifest.media_type.as_str(),
                    manifest.content_hash.as_str(),
                    manifest.tool_version.as_str(),
                    manifest.created_at.to_rfc3339(),
                    manifest.section_count as i64,
                    i64::from(manifest.has_assessment_test),
                    book_dir,
                ],
            )
            .await
            .map_err(storage_err)?;
        debug!("book inserted");
        Ok(())
    }

    /// Get a book by id.
    pub async fn get_book(&self, id: &str) -> Result<Option<BookRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, source_file, media_type, content_hash, tool_version,
                        created_at, section_count, has_assessment_test, book_dir
                 FROM books WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_book(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All books, oldest first.
    pub async fn list_books(&self) -> Result<Vec<BookRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, source_file, media_type, content_hash, tool_version,
                        created_at, section_count, has_assessment_test, book_dir
                 FROM books ORDER BY created_at, id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_book(&row)?);
        }
        Ok(results)
    }

    /// Remove a book together with its sections and progress. Returns `false`
    /// when no such book existed.
    #[instrument(skip(self))]
    pub async fn delete_book(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute("DELETE FROM sections WHERE book_id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        tx.execute("DELETE FROM toc_progress WHERE book_id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        let removed = tx
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(removed > 0)
    }

    // -----------------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------------

    /// Store every section of `book` in document order, replacing any
    /// previous rows for `book_id`. Returns the number of sections written.
    #[instrument(skip(self, book), fields(sections = book.sections.len()))]
    pub async fn insert_sections(&self, book_id: &str, book: &ProcessedBook) -> Result<usize> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute("DELETE FROM sections WHERE book_id = ?1", params![book_id])
            .await
            .map_err(storage_err)?;

        for (position, (id, text)) in book.sections.iter().enumerate() {
            let title = book
                .toc_item(id)
                .map_or_else(|| id.clone(), |item| item.title.clone());
            let elements = book.chapter_elements.get(id).cloned().unwrap_or_default();
            let elements_json = serde_json::to_string(&elements).map_err(storage_err)?;

            tx.execute(
                "INSERT INTO sections (book_id, section_id, position, title, body, elements_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    book_id,
                    id.as_str(),
                    position as i64,
                    title,
                    text.as_str(),
                    elements_json
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!("sections stored");
        Ok(book.sections.len())
    }

    /// Fetch one section body.
    pub async fn get_section(&self, book_id: &str, section_id: &str) -> Result<Option<StoredSection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT section_id, title, position, body, elements_json
                 FROM sections WHERE book_id = ?1 AND section_id = ?2",
                params![book_id, section_id],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };

        let elements_json: String = row.get(4).map_err(storage_err)?;
        Ok(Some(StoredSection {
            id: row.get::<String>(0).map_err(storage_err)?,
            title: row.get::<String>(1).map_err(storage_err)?,
            position: row.get::<i64>(2).map_err(storage_err)? as usize,
            text: row.get::<String>(3).map_err(storage_err)?,
            elements: serde_json::from_str(&elements_json).map_err(storage_err)?,
        }))
    }

    /// Section ids of a book in document order.
    pub async fn list_section_ids(&self, book_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT section_id FROM sections WHERE book_id = ?1 ORDER BY position",
                params![book_id],
            )
            .await
            .map_err(storage_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            ids.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // TOC progress
    // -----------------------------------------------------------------------

    /// Set the reading status of one TOC item.
    pub async fn set_item_status(&self, book_id: &str, item_id: &str, status: TopicStatus) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO toc_progress (book_id, item_id, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(book_id, item_id) DO UPDATE SET
                   status = excluded.status,
                   updated_at = excluded.updated_at",
                params![book_id, item_id, status.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Recorded statuses for a book. Items never touched are absent and read
    /// as [`TopicStatus::NotStarted`].
    pub async fn item_statuses(&self, book_id: &str) -> Result<HashMap<String, TopicStatus>> {
        let mut rows = self
            .conn
            .query(
                "SELECT item_id, status FROM toc_progress WHERE book_id = ?1",
                params![book_id],
            )
            .await
            .map_err(storage_err)?;

        let mut statuses = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let item: String = row.get(0).map_err(storage_err)?;
            let status: String = row.get(1).map_err(storage_err)?;
            let status = status.parse::<TopicStatus>().map_err(StudyKitError::Storage)?;
            statuses.insert(item, status);
        }
        Ok(statuses)
    }

    // -----------------------------------------------------------------------
    // Session usage
    // -----------------------------------------------------------------------

    /// Load the counters stored for a credential fingerprint.
    pub async fn load_usage(&self, fingerprint: &str) -> Result<Option<SessionUsage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fingerprint, book_id, exchanges, prompt_chars, started_at, last_exchange_at
                 FROM session_usage WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };

        let started_at: String = row.get(4).map_err(storage_err)?;
        let last_exchange_at = match row.get::<String>(5).ok() {
            Some(s) => Some(parse_time(&s)?),
            None => None,
        };

        Ok(Some(SessionUsage {
            fingerprint: row.get::<String>(0).map_err(storage_err)?,
            book_id: row.get::<String>(1).map_err(storage_err)?,
            exchanges: row.get::<i64>(2).map_err(storage_err)? as u32,
            prompt_chars: row.get::<i64>(3).map_err(storage_err)? as u64,
            started_at: parse_time(&started_at)?,
            last_exchange_at,
        }))
    }

    /// Insert or replace the counters for `usage.fingerprint`.
    pub async fn save_usage(&self, usage: &SessionUsage) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO session_usage (fingerprint, book_id, exchanges, prompt_chars, started_at, last_exchange_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                   book_id = excluded.book_id,
                   exchanges = excluded.exchanges,
                   prompt_chars = excluded.prompt_chars,
                   started_at = excluded.started_at,
                   last_exchange_at = excluded.last_exchange_at",
                params![
                    usage.fingerprint.as_str(),
                    usage.book_id.as_str(),
                    i64::from(usage.exchanges),
                    usage.prompt_chars as i64,
                    usage.started_at.to_rfc3339(),
                    usage.last_exchange_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Drop the counters for a fingerprint. Returns `false` if none existed.
    pub async fn delete_usage(&self, fingerprint: &str) -> Result<bool> {
        self.check_writable()?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM session_usage WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;
        Ok(removed > 0)
    }
}

/// Convert a `books` row to a [`BookRecord`].
fn row_to_book(row: &libsql::Row) -> Result<BookRecord> {
    let id: String = row.get(0).map_err(storage_err)?;
    let media_type: String = row.get(3).map_err(storage_err)?;
    let created_at: String = row.get(6).map_err(storage_err)?;

    let manifest = BookManifest {
        schema_version: studykit_shared::CURRENT_SCHEMA_VERSION,
        id: id
            .parse::<BookId>()
            .map_err(|e| StudyKitError::Storage(format!("invalid book id '{id}': {e}")))?,
        name: row.get::<String>(1).map_err(storage_err)?,
        source_file: row.get::<String>(2).map_err(storage_err)?,
        media_type: MediaType::from_mime(&media_type).ok_or_else(|| {
            StudyKitError::Storage(format!("unknown media type '{media_type}'"))
        })?,
        content_hash: row.get::<String>(4).map_err(storage_err)?,
        tool_version: row.get::<String>(5).map_err(storage_err)?,
        created_at: parse_time(&created_at)?,
        section_count: row.get::<i64>(7).map_err(storage_err)? as usize,
        has_assessment_test: row.get::<i64>(8).map_err(storage_err)? != 0,
    };

    Ok(BookRecord {
        manifest,
        book_dir: row.get::<String>(9).ok().map(PathBuf::from),
    })
}
