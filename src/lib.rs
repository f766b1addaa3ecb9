//! Session and note memory for AI agents, served over MCP.
//!
//! mnemos keeps two kinds of records under one storage root:
//!
//! | Record | Storage | Searchable text |
//! |--------|---------|-----------------|
//! | **Session** | append-only JSONL log + JSON metadata | generated summary |
//! | **Note** | one markdown file | note content |
//!
//! Both are projected into a SQLite index that combines FTS5 BM25 relevance with
//! [sqlite-vec](https://github.com/asg017/sqlite-vec) vector distance into a single
//! ranking. Sessions are read back in fixed-size chunks.
//!
//! # Modules
//!
//! - [`storage`]: session logs, metadata records, and note files (the source of truth)
//! - [`index`]: the hybrid search index over sessions and notes
//! - [`orchestrator`]: ingest, search, read, write, update, delete
//! - [`embedding`] / [`summarize`]: provider capabilities
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite schema, migrations, and health checks

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod storage;
pub mod summarize;
pub mod types;

pub use error::{Error, Result};
