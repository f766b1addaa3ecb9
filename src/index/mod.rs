//! Hybrid search index.
//!
//! Two collections (`sessions`, `memories`) that are each searchable by BM25 keyword
//! relevance and vector distance. Per candidate the two signals fold into one distance,
//! [`normalize_score`] maps it into `(0, 1]`, and both collections merge into one ranking.
//!
//! The index is a projection of storage, not the source of truth.

pub mod sqlite;

use std::cmp::Ordering;

use crate::error::Result;
use crate::types::{parse_timestamp, EntryKind, SearchResult, SearchType};

pub use sqlite::SqliteIndex;

/// Denormalized index row for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub id: String,
    pub summary: String,
    pub key_facts: Vec<String>,
    pub embedding: Vec<f32>,
    pub chunk_count: usize,
    pub message_count: usize,
    pub channel: Option<String>,
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
}

/// Denormalized index row for a note.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: usize,
    pub search_type: SearchType,
}

/// Index contract. All methods fail with `Storage` after [`close`](Self::close).
pub trait SearchIndex: Send + Sync {
    /// Prepare the collections. Idempotent.
    fn init(&self) -> Result<()>;

    /// Insert a new entry; `Validation` if the id is already indexed.
    fn index_session(&self, entry: &SessionEntry) -> Result<()>;
    fn index_memory(&self, entry: &MemoryEntry) -> Result<()>;

    /// Replace text, embedding and metadata; `NotFound` if not indexed.
    fn update_session(&self, entry: &SessionEntry) -> Result<()>;
    fn update_memory(&self, entry: &MemoryEntry) -> Result<()>;

    /// Set the tombstone on the entry; `NotFound` if neither collection has it.
    fn remove(&self, id: &str) -> Result<()>;

    /// Ranked, deduplicated, `limit`-bounded results across targeted collections.
    fn search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>>;

    /// Which collection holds `id`, tombstoned or not.
    fn contains(&self, id: &str) -> Result<Option<EntryKind>>;

    /// Release the underlying connection.
    fn close(&self) -> Result<()>;
}

/// Map a distance into `(0, 1]`: `0 ⇒ 1`, strictly decreasing.
pub fn normalize_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Fold a lexical match into the vector distance.
///
/// `bm25` is FTS5's rank (negative, more negative = better), `None` when the
/// entry did not match the query terms. The lexical signal `b / (1 + b)` lies in
/// `[0, 1)` and shrinks the distance by up to a factor of `1 + lexical_weight`.
pub fn combined_distance(vector_distance: f64, bm25: Option<f64>, lexical_weight: f64) -> f64 {
    let lexical = bm25
        .map(|rank| {
            let b = (-rank).max(0.0);
            b / (1.0 + b)
        })
        .unwrap_or(0.0);
    vector_distance.max(0.0) / (1.0 + lexical_weight * lexical)
}

/// Score descending, then more recent `updatedAt`, then id for a stable order.
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (parse_timestamp(&a.timestamp), parse_timestamp(&b.timestamp)) {
            (Some(ta), Some(tb)) => tb.cmp(&ta),
            _ => b.timestamp.cmp(&a.timestamp),
        })
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Each whitespace-delimited word becomes a quoted term; terms are OR-ed so an
/// entry matching any word is a lexical candidate and BM25 favours entries that
/// match more of them.
pub fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.replace('"', ""))
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
