//! Ingestion orchestrator.
//!
//! Coordinates the log store, note store, summarizer, embedder and search index,
//! and is the single boundary the MCP tools and the CLI call into.
//!
//! A session id is ABSENT until its first ingest and EXISTING afterwards; delete
//! only sets the tombstone. Ingest, update and delete are serialized per id.
//! Storage is written before the index, so a provider failure after the log
//! append leaves the log ahead of its metadata until the next ingest recomputes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::{MnemosConfig, ModelDimensions};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::index::{MemoryEntry, SearchIndex, SearchOptions, SessionEntry, SqliteIndex};
use crate::storage::log::{chunk_count, reported_total_chunks, FileLogStore, LogStore};
use crate::storage::note_format::{validate_tags, validate_title};
use crate::storage::notes::{generate_note_id, FileNoteStore, NoteStore, NOTE_ID_PREFIX};
use crate::storage::validate_id;
use crate::summarize::{self, Summarizer, Summary};
use crate::types::{
    now_rfc3339, parse_timestamp, EntryKind, Message, Note, NotePatch, ReadResult, SearchResult,
    SearchType, SessionMeta,
};

/// Attempts at drawing an unused note id before giving up.
const NOTE_ID_ATTEMPTS: usize = 5;

/// A batch of messages to append to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInput {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub id: String,
    /// `true` when this call took the session from ABSENT to EXISTING.
    pub created: bool,
    pub message_count: usize,
    pub chunk_count: usize,
    pub summary: String,
    pub key_facts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub sessions: usize,
    pub notes: usize,
    /// Sessions whose metadata was missing and had to be recomputed.
    pub recomputed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub sessions: usize,
    pub deleted_sessions: usize,
    /// Sessions with a log but no metadata yet.
    pub pending_sessions: usize,
    pub messages: usize,
    pub notes: usize,
    pub deleted_notes: usize,
}

pub struct Orchestrator {
    logs: Arc<dyn LogStore>,
    notes: Arc<dyn NoteStore>,
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    summarizer: Arc<dyn Summarizer>,
    chunk_size: usize,
    default_limit: usize,
    locks: IdLocks,
    closed: AtomicBool,
}

impl Orchestrator {
    /// Assemble from explicit backends. Initializes the index.
    pub fn new(
        logs: Arc<dyn LogStore>,
        notes: Arc<dyn NoteStore>,
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        config: &MnemosConfig,
    ) -> Result<Self> {
        if config.storage.chunk_size == 0 {
            return Err(Error::Validation("chunk size must be at least 1".into()));
        }
        if config.retrieval.default_limit == 0 {
            return Err(Error::Validation("default search limit must be at least 1".into()));
        }
        index.init()?;
        Ok(Self {
            logs,
            notes,
            index,
            embedder,
            summarizer,
            chunk_size: config.storage.chunk_size,
            default_limit: config.retrieval.default_limit,
            locks: IdLocks::default(),
            closed: AtomicBool::new(false),
        })
    }

    /// Wire the file stores, the SQLite index and the configured providers under
    /// the configured root. Fails early if the embedding model cannot be loaded.
    pub fn open(config: &MnemosConfig, dimensions: &ModelDimensions) -> anyhow::Result<Self> {
        let dim = config.embedding.resolve_dimensions(dimensions)?;
        let embedder = embedding::create_provider(&config.embedding, dim)?;
        Self::assemble(config, dim, Arc::from(embedder))
    }

    /// Like [`open`](Self::open), but the embedding model is only loaded when a
    /// call first needs it. For commands that read storage without embedding.
    pub fn open_deferred(config: &MnemosConfig, dimensions: &ModelDimensions) -> anyhow::Result<Self> {
        let dim = config.embedding.resolve_dimensions(dimensions)?;
        let embedder = embedding::DeferredProvider::new(&config.embedding, dim);
        Self::assemble(config, dim, Arc::new(embedder))
    }

    fn assemble(
        config: &MnemosConfig,
        dim: usize,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        let root = config.resolved_root();
        let logs = FileLogStore::open(&root)?;
        let notes = FileNoteStore::open(&root)?;
        let summarizer = summarize::create_summarizer(&config.summarizer)?;
        let index = SqliteIndex::new(
            config.index_path(),
            dim,
            config.embedding.model.clone(),
            &config.retrieval,
        );

        tracing::info!(
            root = %root.display(),
            embedder = embedder.name(),
            summarizer = summarizer.name(),
            dimensions = dim,
            "orchestrator ready"
        );

        Ok(Self::new(
            Arc::new(logs),
            Arc::new(notes),
            Arc::new(index),
            embedder,
            Arc::from(summarizer),
            config,
        )?)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Append `input.messages` to the session and refresh its summary, metadata
    /// and index entry.
    ///
    /// Messages are always appended; callers send only messages not yet ingested.
    /// An existing session may be ingested with no messages to recompute its
    /// derived state.
    pub async fn ingest_session(&self, input: SessionInput) -> Result<IngestResult> {
        self.ensure_open()?;
        validate_session_input(&input)?;
        let entry = self.locks.entry(&input.id);
        let _guard = entry.lock().await;
        self.ensure_open()?;
        self.ingest_locked(input).await
    }

    async fn ingest_locked(&self, input: SessionInput) -> Result<IngestResult> {
        let SessionInput {
            id,
            messages: new_messages,
            channel,
            user_id,
        } = input;

        let logs = Arc::clone(&self.logs);
        let lookup_id = id.clone();
        let (previous, log_exists) = blocking(move || {
            Ok((logs.get_meta(&lookup_id)?, logs.exists(&lookup_id)?))
        })
        .await?;

        let created = previous.is_none() && !log_exists;
        if created && new_messages.is_empty() {
            return Err(Error::Validation(format!(
                "session {id} does not exist; the first ingest needs at least one message"
            )));
        }

        let logs = Arc::clone(&self.logs);
        let append_id = id.clone();
        let appended = new_messages.len();
        let messages = blocking(move || {
            if !new_messages.is_empty() {
                logs.append(&append_id, &new_messages)?;
            }
            logs.read_all(&append_id)
        })
        .await?;

        let Summary { summary, key_facts } = self.summarize(&messages).await?;
        let embedding = self.embed(summary.clone()).await?;

        let now = now_rfc3339();
        let message_count = messages.len();
        let meta = match previous {
            Some(prev) => SessionMeta {
                id: id.clone(),
                summary,
                key_facts,
                chunk_count: chunk_count(message_count, self.chunk_size),
                message_count,
                channel: channel.or(prev.channel),
                user_id: user_id.or(prev.user_id),
                created_at: prev.created_at,
                updated_at: later_of(now, prev.updated_at),
                deleted: prev.deleted,
            },
            None => SessionMeta {
                id: id.clone(),
                summary,
                key_facts,
                chunk_count: chunk_count(message_count, self.chunk_size),
                message_count,
                channel,
                user_id,
                created_at: now.clone(),
                updated_at: now,
                deleted: false,
            },
        };

        let logs = Arc::clone(&self.logs);
        let index = Arc::clone(&self.index);
        let entry = session_entry(&meta, embedding);
        let meta = blocking(move || {
            logs.set_meta(&meta)?;
            upsert_session(index.as_ref(), &entry, !created)?;
            Ok(meta)
        })
        .await?;

        tracing::info!(
            id = %meta.id,
            created,
            appended,
            message_count = meta.message_count,
            chunk_count = meta.chunk_count,
            "session ingested"
        );

        Ok(IngestResult {
            id: meta.id,
            created,
            message_count: meta.message_count,
            chunk_count: meta.chunk_count,
            summary: meta.summary,
            key_facts: meta.key_facts,
        })
    }

    // ── Search & read ─────────────────────────────────────────────────────────

    /// Hybrid search over sessions and/or notes. `limit` defaults to the
    /// configured limit.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        search_type: SearchType,
    ) -> Result<Vec<SearchResult>> {
        self.ensure_open()?;
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(Error::Validation("limit must be at least 1".into()));
        }
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }

        let embedding = self.embed(query.to_string()).await?;
        let index = Arc::clone(&self.index);
        let query_text = query.to_string();
        let options = SearchOptions { limit, search_type };
        let results = blocking(move || index.search(&query_text, &embedding, &options)).await?;

        tracing::debug!(query = %query, limit, results = results.len(), "search complete");
        Ok(results)
    }

    /// Read a chunk of a session (default chunk 0) or a whole note.
    ///
    /// A chunk index at or past the session's chunk count is a `Validation`
    /// error; notes only have chunk 0.
    pub async fn read(&self, id: &str, chunk: Option<usize>) -> Result<ReadResult> {
        validate_id(id)?;
        if is_note_id(id) {
            if let Some(chunk) = chunk.filter(|&c| c > 0) {
                return Err(Error::Validation(format!(
                    "note {id} has a single chunk; chunk {chunk} does not exist"
                )));
            }
            let notes = Arc::clone(&self.notes);
            let note_id = id.to_string();
            let note = blocking(move || notes.read(&note_id))
                .await?
                .ok_or_else(|| Error::NotFound(format!("note {id}")))?;
            return Ok(ReadResult {
                id: note.id,
                kind: EntryKind::Memory,
                messages: None,
                content: Some(note.content),
                chunk_index: 0,
                total_chunks: 1,
                summary: note.title.clone(),
                title: Some(note.title),
                tags: Some(note.tags),
                key_facts: None,
                deleted: note.deleted,
            });
        }

        let logs = Arc::clone(&self.logs);
        let session_id = id.to_string();
        let chunk_index = chunk.unwrap_or(0);
        let chunk_size = self.chunk_size;
        let (meta, messages, total_chunks) = blocking(move || {
            if !logs.exists(&session_id)? {
                return Err(Error::NotFound(format!("session {session_id}")));
            }
            let meta = logs.get_meta(&session_id)?;
            let message_count = match &meta {
                Some(meta) => meta.message_count,
                None => logs.read_all(&session_id)?.len(),
            };
            let total_chunks = reported_total_chunks(message_count, chunk_size);
            if chunk_index >= total_chunks {
                return Err(Error::Validation(format!(
                    "session {session_id} has {total_chunks} chunk(s); chunk {chunk_index} does not exist"
                )));
            }
            let messages = logs.read_chunk(&session_id, chunk_index, chunk_size)?;
            Ok((meta, messages, total_chunks))
        })
        .await?;

        let (summary, key_facts, deleted) = match meta {
            Some(meta) => (meta.summary, meta.key_facts, meta.deleted),
            None => (String::new(), Vec::new(), false),
        };
        Ok(ReadResult {
            id: id.to_string(),
            kind: EntryKind::Session,
            messages: Some(messages),
            content: None,
            chunk_index,
            total_chunks,
            summary,
            title: None,
            tags: None,
            key_facts: Some(key_facts),
            deleted,
        })
    }

    // ── Notes ─────────────────────────────────────────────────────────────────

    /// Create a note under a freshly generated id and index it.
    pub async fn write(&self, input: NoteInput) -> Result<Note> {
        self.ensure_open()?;
        validate_title(&input.title)?;
        validate_tags(&input.tags)?;

        let embedding = self.embed(input.content.clone()).await?;
        let notes = Arc::clone(&self.notes);
        let index = Arc::clone(&self.index);
        let note = blocking(move || {
            for _ in 0..NOTE_ID_ATTEMPTS {
                let id = generate_note_id();
                if notes.exists(&id)? {
                    tracing::debug!(id = %id, "note id collision, retrying");
                    continue;
                }
                let now = now_rfc3339();
                let note = Note {
                    id,
                    title: input.title,
                    content: input.content,
                    tags: input.tags,
                    created_at: now.clone(),
                    updated_at: now,
                    deleted: false,
                };
                notes.create(&note)?;
                index.index_memory(&memory_entry(&note, embedding))?;
                return Ok(note);
            }
            Err(Error::storage(
                "failed to allocate note id",
                format!("{NOTE_ID_ATTEMPTS} generated ids were already taken"),
            ))
        })
        .await?;

        tracing::info!(id = %note.id, tags = note.tags.len(), "note written");
        Ok(note)
    }

    /// Merge `patch` into an existing note and refresh its index entry.
    pub async fn update(&self, id: &str, patch: NotePatch) -> Result<Note> {
        validate_id(id)?;
        if patch.is_empty() {
            return Err(Error::Validation("update needs a title, content or tags".into()));
        }
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(tags) = &patch.tags {
            validate_tags(tags)?;
        }
        if !is_note_id(id) {
            return Err(Error::NotFound(format!("note {id}")));
        }
        self.ensure_open()?;

        let entry = self.locks.entry(id);
        let _guard = entry.lock().await;
        self.ensure_open()?;
        self.update_locked(id, patch).await
    }

    async fn update_locked(&self, id: &str, patch: NotePatch) -> Result<Note> {
        let notes = Arc::clone(&self.notes);
        let note_id = id.to_string();
        let current = blocking(move || notes.read(&note_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {id}")))?;

        let content = patch.content.clone().unwrap_or(current.content);
        let embedding = self.embed(content).await?;

        let notes = Arc::clone(&self.notes);
        let index = Arc::clone(&self.index);
        let note_id = id.to_string();
        let note = blocking(move || {
            let note = notes.update(&note_id, &patch)?;
            upsert_memory(index.as_ref(), &memory_entry(&note, embedding))?;
            Ok(note)
        })
        .await?;

        tracing::info!(id = %note.id, "note updated");
        Ok(note)
    }

    /// Soft-delete a note or a session: set the tombstone in storage, then in the index.
    pub async fn delete(&self, id: &str) -> Result<DeleteResult> {
        self.ensure_open()?;
        validate_id(id)?;
        let entry = self.locks.entry(id);
        let _guard = entry.lock().await;
        self.ensure_open()?;
        self.delete_locked(id).await
    }

    async fn delete_locked(&self, id: &str) -> Result<DeleteResult> {
        let kind = if is_note_id(id) {
            EntryKind::Memory
        } else {
            EntryKind::Session
        };
        let logs = Arc::clone(&self.logs);
        let notes = Arc::clone(&self.notes);
        let index = Arc::clone(&self.index);
        let target = id.to_string();

        blocking(move || {
            match kind {
                EntryKind::Memory => {
                    notes.delete(&target)?;
                }
                EntryKind::Session => {
                    let Some(mut meta) = logs.get_meta(&target)? else {
                        if logs.exists(&target)? {
                            return Err(Error::Validation(format!(
                                "session {target} has no metadata yet; ingest it before deleting"
                            )));
                        }
                        return Err(Error::NotFound(format!("session {target}")));
                    };
                    meta.deleted = true;
                    meta.updated_at = later_of(now_rfc3339(), meta.updated_at);
                    logs.set_meta(&meta)?;
                }
            }
            match index.remove(&target) {
                Err(Error::NotFound(_)) => {
                    tracing::warn!(id = %target, "deleted record had no index entry");
                    Ok(())
                }
                other => other,
            }
        })
        .await?;

        tracing::info!(id = %id, kind = %kind, "record deleted");
        Ok(DeleteResult {
            id: id.to_string(),
            kind,
            deleted: true,
        })
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Rebuild every index entry from storage, including tombstones.
    ///
    /// Sessions with a log but no metadata are recomputed as a full ingest of
    /// their existing log. `progress` is called with `(done, total)`.
    pub async fn reindex<F>(&self, mut progress: F) -> Result<ReindexReport>
    where
        F: FnMut(usize, usize) + Send,
    {
        self.ensure_open()?;
        let logs = Arc::clone(&self.logs);
        let notes = Arc::clone(&self.notes);
        let (session_ids, note_ids) =
            blocking(move || Ok((logs.list()?, notes.list_ids()?))).await?;

        let total = session_ids.len() + note_ids.len();
        let mut report = ReindexReport::default();
        let mut done = 0;

        for id in session_ids {
            let recomputed = {
                let entry = self.locks.entry(&id);
                let _guard = entry.lock().await;
                self.ensure_open()?;
                self.reindex_session(&id).await?
            };
            if recomputed {
                report.recomputed += 1;
            }
            report.sessions += 1;
            done += 1;
            progress(done, total);
        }

        for id in note_ids {
            let notes = Arc::clone(&self.notes);
            let note_id = id.clone();
            let Some(note) = blocking(move || notes.read(&note_id)).await? else {
                continue;
            };
            let embedding = self.embed(note.content.clone()).await?;
            let index = Arc::clone(&self.index);
            blocking(move || upsert_memory(index.as_ref(), &memory_entry(&note, embedding))).await?;
            report.notes += 1;
            done += 1;
            progress(done, total);
        }

        tracing::info!(
            sessions = report.sessions,
            notes = report.notes,
            recomputed = report.recomputed,
            "reindex complete"
        );
        Ok(report)
    }

    /// Returns `true` if the session had to be recomputed.
    async fn reindex_session(&self, id: &str) -> Result<bool> {
        let logs = Arc::clone(&self.logs);
        let session_id = id.to_string();
        let meta = blocking(move || logs.get_meta(&session_id)).await?;
        let Some(meta) = meta else {
            tracing::warn!(id = %id, "session has no metadata, recomputing");
            self.ingest_locked(SessionInput {
                id: id.to_string(),
                messages: Vec::new(),
                channel: None,
                user_id: None,
            })
            .await?;
            return Ok(true);
        };

        let embedding = self.embed(meta.summary.clone()).await?;
        let index = Arc::clone(&self.index);
        let entry = session_entry(&meta, embedding);
        blocking(move || upsert_session(index.as_ref(), &entry, true)).await?;
        Ok(false)
    }

    /// Counts read from storage (the source of truth).
    pub async fn stats(&self) -> Result<Stats> {
        let logs = Arc::clone(&self.logs);
        let notes = Arc::clone(&self.notes);
        blocking(move || {
            let mut stats = Stats::default();
            for id in logs.list()? {
                match logs.get_meta(&id)? {
                    Some(meta) => {
                        stats.sessions += 1;
                        stats.messages += meta.message_count;
                        if meta.deleted {
                            stats.deleted_sessions += 1;
                        }
                    }
                    None => stats.pending_sessions += 1,
                }
            }
            for id in notes.list_ids()? {
                if let Some(note) = notes.read(&id)? {
                    stats.notes += 1;
                    if note.deleted {
                        stats.deleted_notes += 1;
                    }
                }
            }
            Ok(stats)
        })
        .await
    }

    /// Close the index. Later index-backed calls fail with `Storage`.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let index = Arc::clone(&self.index);
        blocking(move || index.close()).await?;
        tracing::info!("orchestrator closed");
        Ok(())
    }

    // ── Providers ─────────────────────────────────────────────────────────────

    async fn summarize(&self, messages: &[Message]) -> Result<Summary> {
        self.summarizer
            .summarize(messages)
            .await
            .map_err(|e| Error::provider(self.summarizer.name(), e))
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        blocking(move || {
            let vector = embedder
                .embed(&text)
                .map_err(|e| Error::provider(embedder.name(), e))?;
            if vector.len() != embedder.dimensions() {
                return Err(Error::provider(
                    embedder.name(),
                    format!(
                        "embedding has {} dimensions, expected {}",
                        vector.len(),
                        embedder.dimensions()
                    ),
                ));
            }
            Ok(vector)
        })
        .await
    }

    /// Mutating and index-backed calls fail before touching storage once closed.
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::storage("orchestrator", "orchestrator is closed"));
        }
        Ok(())
    }
}

// ── Per-id serialization ──────────────────────────────────────────────────────

type IdLockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per id, created on demand and dropped when unused.
#[derive(Default)]
struct IdLocks {
    map: Mutex<IdLockMap>,
}

impl IdLocks {
    fn entry(&self, id: &str) -> IdLockEntry<'_> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = Arc::clone(map.entry(id.to_string()).or_default());
        IdLockEntry {
            locks: self,
            id: id.to_string(),
            handle,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A registered interest in an id's lock. Dropping it, including when the
/// owning future is cancelled mid-wait, removes the map entry once no other
/// task holds or waits on it.
struct IdLockEntry<'a> {
    locks: &'a IdLocks,
    id: String,
    handle: Arc<tokio::sync::Mutex<()>>,
}

impl IdLockEntry<'_> {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.handle.lock().await
    }
}

impl Drop for IdLockEntry<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this entry are the only owners left.
        if map
            .get(&self.id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.handle) && Arc::strong_count(lock) == 2)
        {
            map.remove(&self.id);
        }
    }
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

fn is_note_id(id: &str) -> bool {
    id.starts_with(NOTE_ID_PREFIX)
}

fn validate_session_input(input: &SessionInput) -> Result<()> {
    validate_id(&input.id)?;
    if is_note_id(&input.id) {
        return Err(Error::Validation(format!(
            "session ids must not start with the note prefix {NOTE_ID_PREFIX:?}: {}",
            input.id
        )));
    }
    for (i, message) in input.messages.iter().enumerate() {
        if let Some(ts) = &message.timestamp {
            if parse_timestamp(ts).is_none() {
                return Err(Error::Validation(format!(
                    "message {i} has an invalid RFC 3339 timestamp: {ts}"
                )));
            }
        }
    }
    Ok(())
}

/// The later of two RFC 3339 timestamps, keeping `updatedAt` non-decreasing.
fn later_of(now: String, previous: String) -> String {
    match (parse_timestamp(&now), parse_timestamp(&previous)) {
        (Some(n), Some(p)) if p > n => previous,
        _ => now,
    }
}

fn session_entry(meta: &SessionMeta, embedding: Vec<f32>) -> SessionEntry {
    SessionEntry {
        id: meta.id.clone(),
        summary: meta.summary.clone(),
        key_facts: meta.key_facts.clone(),
        embedding,
        chunk_count: meta.chunk_count,
        message_count: meta.message_count,
        channel: meta.channel.clone(),
        user_id: meta.user_id.clone(),
        created_at: meta.created_at.clone(),
        updated_at: meta.updated_at.clone(),
        deleted: meta.deleted,
    }
}

fn memory_entry(note: &Note, embedding: Vec<f32>) -> MemoryEntry {
    MemoryEntry {
        id: note.id.clone(),
        title: note.title.clone(),
        content: note.content.clone(),
        tags: note.tags.clone(),
        embedding,
        created_at: note.created_at.clone(),
        updated_at: note.updated_at.clone(),
        deleted: note.deleted,
    }
}

/// Update when the entry is expected to exist, insert otherwise; either way a
/// missing or stale entry is repaired.
fn upsert_session(index: &dyn SearchIndex, entry: &SessionEntry, expect_existing: bool) -> Result<()> {
    if expect_existing {
        return match index.update_session(entry) {
            Err(Error::NotFound(_)) => {
                tracing::warn!(id = %entry.id, "session missing from index, re-adding");
                index.index_session(entry)
            }
            other => other,
        };
    }
    if index.contains(&entry.id)?.is_some() {
        tracing::warn!(id = %entry.id, "stale index entry for new session, replacing");
        return index.update_session(entry);
    }
    index.index_session(entry)
}

fn upsert_memory(index: &dyn SearchIndex, entry: &MemoryEntry) -> Result<()> {
    match index.update_memory(entry) {
        Err(Error::NotFound(_)) => {
            tracing::warn!(id = %entry.id, "note missing from index, re-adding");
            index.index_memory(entry)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn later_of_keeps_the_newer_timestamp() {
        let older = "2026-01-01T00:00:00.000Z".to_string();
        let newer = "2026-06-01T00:00:00.000Z".to_string();
        assert_eq!(later_of(newer.clone(), older.clone()), newer);
        assert_eq!(later_of(older, newer.clone()), newer);
    }

    #[test]
    fn session_input_rejects_note_prefix() {
        let input = SessionInput {
            id: "mem_deadbeef".into(),
            messages: vec![Message::new(Role::User, "hi")],
            channel: None,
            user_id: None,
        };
        assert!(matches!(validate_session_input(&input), Err(Error::Validation(_))));
    }

    #[test]
    fn session_input_rejects_bad_timestamp() {
        let mut message = Message::new(Role::User, "hi");
        message.timestamp = Some("yesterday".into());
        let input = SessionInput {
            id: "s1".into(),
            messages: vec![message],
            channel: None,
            user_id: None,
        };
        assert!(matches!(validate_session_input(&input), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn id_lock_entry_is_removed_when_last_user_leaves() {
        let locks = IdLocks::default();
        let first = locks.entry("s1");
        let second = locks.entry("s1");
        assert_eq!(locks.len(), 1);
        drop(first);
        assert_eq!(locks.len(), 1);
        drop(second);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_its_entry() {
        let locks = IdLocks::default();
        let holder = locks.entry("s1");
        let held = holder.lock().await;

        let waited = tokio::time::timeout(std::time::Duration::from_millis(20), async {
            let entry = locks.entry("s1");
            let _guard = entry.lock().await;
        })
        .await;
        assert!(waited.is_err(), "waiter should still be blocked");
        assert_eq!(locks.len(), 1);

        drop(held);
        drop(holder);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn session_input_parses_camel_case() {
        let json = r#"{"id":"s1","messages":[{"role":"user","content":"hi"}],"userId":"u7"}"#;
        let input: SessionInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.user_id.as_deref(), Some("u7"));
        assert_eq!(input.messages.len(), 1);
        assert!(input.channel.is_none());
    }
}
