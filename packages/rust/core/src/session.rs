//! Study session state for one credential and one book.
//!
//! A [`StudySession`] owns the truncated book context and the usage counters
//! of the credential it was started with. The credential is identified by its
//! SHA-256 fingerprint only. Counters are persisted through a
//! [`SessionStore`] after every change, stamped by an injected [`Clock`].

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use studykit_shared::{
    ProcessedBook, Result, SessionConfig, SessionUsage, StudyKitError, content_hash,
};
use studykit_storage::Storage;

use crate::context::context_window;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Persistence for session usage counters.
#[allow(async_fn_in_trait)]
pub trait SessionStore {
    async fn load_usage(&self, fingerprint: &str) -> Result<Option<SessionUsage>>;
    async fn save_usage(&self, usage: &SessionUsage) -> Result<()>;
    async fn delete_usage(&self, fingerprint: &str) -> Result<bool>;
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    async fn load_usage(&self, fingerprint: &str) -> Result<Option<SessionUsage>> {
        (**self).load_usage(fingerprint).await
    }

    async fn save_usage(&self, usage: &SessionUsage) -> Result<()> {
        (**self).save_usage(usage).await
    }

    async fn delete_usage(&self, fingerprint: &str) -> Result<bool> {
        (**self).delete_usage(fingerprint).await
    }
}

impl SessionStore for Storage {
    async fn load_usage(&self, fingerprint: &str) -> Result<Option<SessionUsage>> {
        Storage::load_usage(self, fingerprint).await
    }

    async fn save_usage(&self, usage: &SessionUsage) -> Result<()> {
        Storage::save_usage(self, usage).await
    }

    async fn delete_usage(&self, fingerprint: &str) -> Result<bool> {
        Storage::delete_usage(self, fingerprint).await
    }
}

/// In-process store, for tests and one-off runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    usage: Mutex<HashMap<String, SessionUsage>>,
}

impl MemoryStore {
    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionUsage>>> {
        self.usage
            .lock()
            .map_err(|_| StudyKitError::Session("usage store lock poisoned".into()))
    }
}

impl SessionStore for MemoryStore {
    async fn load_usage(&self, fingerprint: &str) -> Result<Option<SessionUsage>> {
        Ok(self.map()?.get(fingerprint).cloned())
    }

    async fn save_usage(&self, usage: &SessionUsage) -> Result<()> {
        self.map()?.insert(usage.fingerprint.clone(), usage.clone());
        Ok(())
    }

    async fn delete_usage(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.map()?.remove(fingerprint).is_some())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// SHA-256 fingerprint of a credential.
pub fn fingerprint(credential: &str) -> String {
    content_hash(credential.as_bytes())
}

pub struct StudySession<C: Clock, S: SessionStore> {
    clock: C,
    store: S,
    usage: SessionUsage,
    context: String,
    truncated: bool,
}

impl<C: Clock, S: SessionStore> StudySession<C, S> {
    /// Start (or resume) the session for `credential` on `book`.
    ///
    /// Stored counters are reused when they belong to the same book; a
    /// different book starts from zero.
    #[instrument(skip_all, fields(book_id = book_id))]
    pub async fn start(
        credential: &str,
        book_id: &str,
        book: &ProcessedBook,
        config: &SessionConfig,
        clock: C,
        store: S,
    ) -> Result<Self> {
        if credential.trim().is_empty() {
            return Err(StudyKitError::Session("credential is empty".into()));
        }
        let fp = fingerprint(credential);

        let usage = match store.load_usage(&fp).await? {
            Some(existing) if existing.book_id == book_id => {
                debug!(exchanges = existing.exchanges, "resuming session usage");
                existing
            }
            _ => SessionUsage::new(fp, book_id, clock.now()),
        };
        store.save_usage(&usage).await?;

        let window = context_window(book, config.context_char_limit, config.breakpoint_lookback);
        let truncated = window.is_truncated();
        let context = window.text.into_owned();

        info!(context_chars = context.len(), truncated, "session started");

        Ok(Self {
            clock,
            store,
            usage,
            context,
            truncated,
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.usage.fingerprint
    }

    pub fn usage(&self) -> &SessionUsage {
        &self.usage
    }

    /// Book text handed to the model.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn context_truncated(&self) -> bool {
        self.truncated
    }

    /// First message of a session: the book content.
    pub fn opening_prompt(&self) -> String {
        format!(
            "Here is the content of the study guide I am using. Please ingest this into your \
             knowledge base for our session.\n\n--- BEGIN BOOK CONTENT ---\n{}\n--- END BOOK CONTENT ---",
            self.context
        )
    }

    /// A question about a passage the reader selected.
    pub fn selection_prompt(&self, passage: &str, question: &str) -> String {
        format!(
            "The user selected the following passage from their study guide. Focus your answer on \
             clarifying this passage, giving examples, and relating it to exam thinking. Do NOT ignore it.\n\n\
             Selected passage:\n\"\"\"{}\"\"\"\n\nUser question:\n{}\n",
            passage.trim(),
            question.trim()
        )
    }

    /// Count one prompt sent to the model and persist the counters.
    pub async fn record_exchange(&mut self, prompt: &str) -> Result<&SessionUsage> {
        self.usage.exchanges += 1;
        self.usage.prompt_chars += prompt.chars().count() as u64;
        self.usage.last_exchange_at = Some(self.clock.now());
        self.store.save_usage(&self.usage).await?;
        debug!(exchanges = self.usage.exchanges, "exchange recorded");
        Ok(&self.usage)
    }

    /// End the session and forget its counters.
    pub async fn reset(self) -> Result<()> {
        self.store.delete_usage(&self.usage.fingerprint).await?;
        info!("session reset");
        Ok(())
    }
}
