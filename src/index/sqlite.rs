//! SQLite-backed [`SearchIndex`]: FTS5 for BM25 relevance, sqlite-vec for vector KNN.
//!
//! Each collection is a plain table whose rowid drives an external-content FTS5 table,
//! plus a vec0 table keyed by id. Inserts and updates touch all three inside one
//! transaction. An entry has FTS and vector rows exactly when it is not tombstoned:
//! removal drops them and keeps the plain row, so deleted entries never take KNN slots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{
    combined_distance, compare_results, escape_fts_query, normalize_score, MemoryEntry,
    SearchIndex, SearchOptions, SessionEntry,
};
use crate::config::RetrievalConfig;
use crate::db::{self, migrations};
use crate::embedding::{embedding_from_bytes, embedding_to_bytes, l2_distance};
use crate::error::{Error, Result};
use crate::types::{EntryKind, SearchResult};

/// sqlite-vec refuses KNN queries with a larger `k`.
const MAX_KNN_K: usize = 4096;

#[derive(Clone, Copy)]
struct Collection {
    table: &'static str,
    fts: &'static str,
    vec: &'static str,
    text_column: &'static str,
}

const SESSIONS: Collection = Collection {
    table: "sessions",
    fts: "sessions_fts",
    vec: "sessions_vec",
    text_column: "summary",
};

const MEMORIES: Collection = Collection {
    table: "memories",
    fts: "memories_fts",
    vec: "memories_vec",
    text_column: "content",
};

enum Location {
    File(PathBuf),
    Memory,
}

enum State {
    Pending,
    Open(Connection),
    Closed,
}

/// Signals gathered for one candidate before hydration.
#[derive(Debug, Default, Clone, Copy)]
struct Candidate {
    distance: Option<f64>,
    bm25: Option<f64>,
}

pub struct SqliteIndex {
    location: Location,
    dimensions: usize,
    model: String,
    lexical_weight: f64,
    candidate_multiplier: usize,
    state: Mutex<State>,
}

impl SqliteIndex {
    /// Index stored at `path`. Nothing is opened until [`SearchIndex::init`].
    pub fn new(
        path: impl Into<PathBuf>,
        dimensions: usize,
        model: impl Into<String>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self::with_location(Location::File(path.into()), dimensions, model.into(), retrieval)
    }

    /// Index held entirely in memory; contents vanish on close.
    pub fn in_memory(dimensions: usize, model: impl Into<String>, retrieval: &RetrievalConfig) -> Self {
        Self::with_location(Location::Memory, dimensions, model.into(), retrieval)
    }

    fn with_location(
        location: Location,
        dimensions: usize,
        model: String,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            location,
            dimensions,
            model,
            lexical_weight: retrieval.lexical_weight,
            candidate_multiplier: retrieval.candidate_multiplier.max(1),
            state: Mutex::new(State::Pending),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::storage("index lock poisoned", e.to_string()))
    }

    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut state = self.lock()?;
        match &mut *state {
            State::Open(conn) => op(conn),
            State::Pending => Err(Error::storage("search index", "index is not initialized")),
            State::Closed => Err(Error::storage("search index", "index is closed")),
        }
    }

    fn open_connection(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => db::open_database(path, self.dimensions),
            Location::Memory => db::open_memory_database(self.dimensions),
        }
        .map_err(|e| Error::storage("failed to open search index", e))?;

        migrations::init_embedding_dimensions(&conn, self.dimensions)?;
        let stored = migrations::get_embedding_dimensions(&conn)?;
        if let Some(stored) = stored.filter(|&s| s != self.dimensions) {
            return Err(Error::Validation(format!(
                "index was built with {stored}-dimensional embeddings but the provider produces {}; \
                 remove the index file and run `mnemos reindex`",
                self.dimensions
            )));
        }

        match migrations::get_embedding_model(&conn)? {
            Some(stored) if stored != self.model => {
                tracing::warn!(
                    stored = %stored,
                    configured = %self.model,
                    "embedding model changed, run `mnemos reindex` to refresh vectors"
                );
            }
            _ => {}
        }
        migrations::set_embedding_model(&conn, &self.model)?;
        Ok(conn)
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::Validation(format!(
                "embedding has {} dimensions, index expects {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(())
    }

    fn candidate_limit(&self, limit: usize) -> usize {
        limit.saturating_mul(self.candidate_multiplier).min(MAX_KNN_K)
    }

    fn gather_candidates(
        &self,
        conn: &Connection,
        collection: Collection,
        query_text: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<HashMap<String, Candidate>> {
        let k = self.candidate_limit(limit);

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for (id, distance) in vector_search(conn, collection, query_embedding, k)? {
            candidates.entry(id).or_default().distance = Some(distance);
        }

        let fts_query = escape_fts_query(query_text);
        if !fts_query.is_empty() {
            for (id, rank) in fts_search(conn, collection, &fts_query, k)? {
                candidates.entry(id).or_default().bm25 = Some(rank);
            }
        }

        // Lexical-only hits still need a vector distance.
        for (id, candidate) in candidates.iter_mut() {
            if candidate.distance.is_none() {
                candidate.distance = stored_distance(conn, collection, id, query_embedding)?;
            }
        }
        Ok(candidates)
    }

    fn search_sessions(
        &self,
        conn: &Connection,
        query_text: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let candidates =
            self.gather_candidates(conn, SESSIONS, query_text, query_embedding, limit)?;
        let mut stmt = conn.prepare(
            "SELECT summary, chunk_count, channel, user_id, updated_at \
             FROM sessions WHERE id = ?1 AND deleted = 0",
        )?;

        let mut results = Vec::with_capacity(candidates.len());
        for (id, candidate) in candidates {
            let Some(distance) = candidate.distance else {
                tracing::debug!(id = %id, "session candidate has no vector, skipping");
                continue;
            };
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .optional()?;
            let Some((summary, chunk_count, channel, user_id, updated_at)) = row else {
                continue;
            };
            let score = normalize_score(combined_distance(
                distance,
                candidate.bm25,
                self.lexical_weight,
            ));
            results.push(SearchResult {
                id,
                kind: EntryKind::Session,
                text: summary,
                score,
                chunks: usize::try_from(chunk_count).unwrap_or(0).max(1),
                timestamp: updated_at,
                title: None,
                tags: None,
                channel,
                user_id,
            });
        }
        Ok(results)
    }

    fn search_memories(
        &self,
        conn: &Connection,
        query_text: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let candidates =
            self.gather_candidates(conn, MEMORIES, query_text, query_embedding, limit)?;
        let mut stmt = conn.prepare(
            "SELECT title, content, tags, updated_at FROM memories WHERE id = ?1 AND deleted = 0",
        )?;

        let mut results = Vec::with_capacity(candidates.len());
        for (id, candidate) in candidates {
            let Some(distance) = candidate.distance else {
                tracing::debug!(id = %id, "memory candidate has no vector, skipping");
                continue;
            };
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .optional()?;
            let Some((title, content, tags, updated_at)) = row else {
                continue;
            };
            let score = normalize_score(combined_distance(
                distance,
                candidate.bm25,
                self.lexical_weight,
            ));
            results.push(SearchResult {
                id,
                kind: EntryKind::Memory,
                text: content,
                score,
                chunks: 1,
                timestamp: updated_at,
                title: Some(title),
                tags: Some(decode_list(&tags)),
                channel: None,
                user_id: None,
            });
        }
        Ok(results)
    }
}

impl SearchIndex for SqliteIndex {
    fn init(&self) -> Result<()> {
        let mut state = self.lock()?;
        match *state {
            State::Open(_) => {}
            State::Closed => return Err(Error::storage("search index", "index is closed")),
            State::Pending => {
                let conn = self.open_connection()?;
                *state = State::Open(conn);
                tracing::debug!(dimensions = self.dimensions, model = %self.model, "search index ready");
            }
        }
        Ok(())
    }

    fn index_session(&self, entry: &SessionEntry) -> Result<()> {
        self.check_dimensions(&entry.embedding)?;
        let key_facts = encode_list(&entry.key_facts)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            ensure_absent(&tx, SESSIONS, &entry.id)?;
            tx.execute(
                "INSERT INTO sessions (id, summary, key_facts, chunk_count, message_count, \
                 channel, user_id, created_at, updated_at, deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.id,
                    entry.summary,
                    key_facts,
                    entry.chunk_count as i64,
                    entry.message_count as i64,
                    entry.channel,
                    entry.user_id,
                    entry.created_at,
                    entry.updated_at,
                    entry.deleted,
                ],
            )?;
            if !entry.deleted {
                let rowid = tx.last_insert_rowid();
                attach(&tx, SESSIONS, rowid, &entry.summary, &entry.id, &entry.embedding)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn index_memory(&self, entry: &MemoryEntry) -> Result<()> {
        self.check_dimensions(&entry.embedding)?;
        let tags = encode_list(&entry.tags)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            ensure_absent(&tx, MEMORIES, &entry.id)?;
            tx.execute(
                "INSERT INTO memories (id, title, content, tags, created_at, updated_at, deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id,
                    entry.title,
                    entry.content,
                    tags,
                    entry.created_at,
                    entry.updated_at,
                    entry.deleted,
                ],
            )?;
            if !entry.deleted {
                let rowid = tx.last_insert_rowid();
                attach(&tx, MEMORIES, rowid, &entry.content, &entry.id, &entry.embedding)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn update_session(&self, entry: &SessionEntry) -> Result<()> {
        self.check_dimensions(&entry.embedding)?;
        let key_facts = encode_list(&entry.key_facts)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = indexed_row(&tx, SESSIONS, &entry.id)?;
            if !current.deleted {
                detach(&tx, SESSIONS, &current, &entry.id)?;
            }
            tx.execute(
                "UPDATE sessions SET summary = ?2, key_facts = ?3, chunk_count = ?4, \
                 message_count = ?5, channel = ?6, user_id = ?7, updated_at = ?8, deleted = ?9 \
                 WHERE id = ?1",
                params![
                    entry.id,
                    entry.summary,
                    key_facts,
                    entry.chunk_count as i64,
                    entry.message_count as i64,
                    entry.channel,
                    entry.user_id,
                    entry.updated_at,
                    entry.deleted,
                ],
            )?;
            if !entry.deleted {
                attach(&tx, SESSIONS, current.rowid, &entry.summary, &entry.id, &entry.embedding)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn update_memory(&self, entry: &MemoryEntry) -> Result<()> {
        self.check_dimensions(&entry.embedding)?;
        let tags = encode_list(&entry.tags)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = indexed_row(&tx, MEMORIES, &entry.id)?;
            if !current.deleted {
                detach(&tx, MEMORIES, &current, &entry.id)?;
            }
            tx.execute(
                "UPDATE memories SET title = ?2, content = ?3, tags = ?4, updated_at = ?5, \
                 deleted = ?6 WHERE id = ?1",
                params![
                    entry.id,
                    entry.title,
                    entry.content,
                    tags,
                    entry.updated_at,
                    entry.deleted,
                ],
            )?;
            if !entry.deleted {
                attach(&tx, MEMORIES, current.rowid, &entry.content, &entry.id, &entry.embedding)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for collection in [SESSIONS, MEMORIES] {
                let current = match indexed_row(&tx, collection, id) {
                    Ok(current) => current,
                    Err(Error::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                };
                if !current.deleted {
                    detach(&tx, collection, &current, id)?;
                    tx.execute(
                        &format!("UPDATE {} SET deleted = 1 WHERE id = ?1", collection.table),
                        params![id],
                    )?;
                }
                tx.commit()?;
                tracing::debug!(id = %id, table = collection.table, "index entry tombstoned");
                return Ok(());
            }
            Err(Error::NotFound(format!("index entry {id}")))
        })
    }

    fn search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if options.limit == 0 {
            return Err(Error::Validation("search limit must be at least 1".into()));
        }
        self.check_dimensions(query_embedding)?;

        self.with_conn(|conn| {
            let mut results = Vec::new();
            if options.search_type.includes(EntryKind::Session) {
                results.extend(self.search_sessions(conn, query_text, query_embedding, options.limit)?);
            }
            if options.search_type.includes(EntryKind::Memory) {
                results.extend(self.search_memories(conn, query_text, query_embedding, options.limit)?);
            }
            results.sort_by(compare_results);
            results.truncate(options.limit);
            Ok(results)
        })
    }

    fn contains(&self, id: &str) -> Result<Option<EntryKind>> {
        self.with_conn(|conn| {
            if row_exists(conn, SESSIONS, id)? {
                return Ok(Some(EntryKind::Session));
            }
            if row_exists(conn, MEMORIES, id)? {
                return Ok(Some(EntryKind::Memory));
            }
            Ok(None)
        })
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        if let State::Open(conn) = std::mem::replace(&mut *state, State::Closed) {
            conn.close()
                .map_err(|(_, e)| Error::storage("failed to close search index", e))?;
            tracing::debug!("search index closed");
        }
        Ok(())
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn encode_list(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| Error::storage("failed to encode list column", e))
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_exists(conn: &Connection, collection: Collection, id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", collection.table),
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn ensure_absent(tx: &Transaction<'_>, collection: Collection, id: &str) -> Result<()> {
    if row_exists(tx, collection, id)? {
        return Err(Error::Validation(format!(
            "{id} is already indexed in {}",
            collection.table
        )));
    }
    Ok(())
}

/// The stored state of an entry that decides which FTS and vector rows it owns.
struct IndexedRow {
    rowid: i64,
    text: String,
    deleted: bool,
}

/// `NotFound` if the entry was never indexed.
fn indexed_row(tx: &Transaction<'_>, collection: Collection, id: &str) -> Result<IndexedRow> {
    tx.query_row(
        &format!(
            "SELECT rowid, {}, deleted FROM {} WHERE id = ?1",
            collection.text_column, collection.table
        ),
        params![id],
        |row| {
            Ok(IndexedRow {
                rowid: row.get(0)?,
                text: row.get(1)?,
                deleted: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("index entry {id}")))
}

/// Make a live entry searchable.
fn attach(
    tx: &Transaction<'_>,
    collection: Collection,
    rowid: i64,
    text: &str,
    id: &str,
    embedding: &[f32],
) -> Result<()> {
    fts_insert(tx, collection, rowid, text, id)?;
    vec_insert(tx, collection, id, embedding)
}

/// Drop a live entry's FTS terms and vector. Only valid while it is attached.
fn detach(tx: &Transaction<'_>, collection: Collection, current: &IndexedRow, id: &str) -> Result<()> {
    fts_delete(tx, collection, current.rowid, &current.text, id)?;
    tx.execute(
        &format!("DELETE FROM {} WHERE id = ?1", collection.vec),
        params![id],
    )?;
    Ok(())
}

fn fts_insert(
    tx: &Transaction<'_>,
    collection: Collection,
    rowid: i64,
    text: &str,
    id: &str,
) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO {fts} (rowid, {col}, id) VALUES (?1, ?2, ?3)",
            fts = collection.fts,
            col = collection.text_column
        ),
        params![rowid, text, id],
    )?;
    Ok(())
}

/// External-content FTS5 tables need the old values to drop their terms.
fn fts_delete(
    tx: &Transaction<'_>,
    collection: Collection,
    rowid: i64,
    old_text: &str,
    id: &str,
) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO {fts} ({fts}, rowid, {col}, id) VALUES ('delete', ?1, ?2, ?3)",
            fts = collection.fts,
            col = collection.text_column
        ),
        params![rowid, old_text, id],
    )?;
    Ok(())
}

fn vec_insert(tx: &Transaction<'_>, collection: Collection, id: &str, embedding: &[f32]) -> Result<()> {
    tx.execute(
        &format!("INSERT INTO {} (id, embedding) VALUES (?1, ?2)", collection.vec),
        params![id, embedding_to_bytes(embedding)],
    )?;
    Ok(())
}

/// Vector KNN via sqlite-vec. Distances are L2.
fn vector_search(
    conn: &Connection,
    collection: Collection,
    embedding: &[f32],
    k: usize,
) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, distance FROM {} WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        collection.vec
    ))?;
    let results = stmt
        .query_map(params![embedding_to_bytes(embedding), k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(results)
}

/// BM25 MATCH over the collection's text. `rank` is negative; lower is better.
fn fts_search(
    conn: &Connection,
    collection: Collection,
    fts_query: &str,
    k: usize,
) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, rank FROM {fts} WHERE {fts} MATCH ?1 ORDER BY rank LIMIT ?2",
        fts = collection.fts
    ))?;
    let results = stmt
        .query_map(params![fts_query, k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(results)
}

fn stored_distance(
    conn: &Connection,
    collection: Collection,
    id: &str,
    query_embedding: &[f32],
) -> Result<Option<f64>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            &format!("SELECT embedding FROM {} WHERE id = ?1", collection.vec),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(blob.map(|bytes| l2_distance(&embedding_from_bytes(&bytes), query_embedding)))
}
