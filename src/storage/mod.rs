//! File-backed source-of-truth storage.
//!
//! - [`log`]: append-only JSONL session logs plus JSON metadata records
//! - [`notes`]: one markdown file per agent-written note
//! - [`note_format`]: the note file format (heading, body, footer)

pub mod log;
pub mod note_format;
pub mod notes;

use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Longest id accepted for a session or note.
pub const MAX_ID_LEN: usize = 128;

/// Reject ids that are not safe to use as a file stem.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation("id must not be empty".into()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(Error::Validation(format!(
            "id must be at most {MAX_ID_LEN} bytes, got {}",
            id.len()
        )));
    }
    if id.starts_with('.') {
        return Err(Error::Validation(format!("id must not start with '.': {id}")));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::Validation(format!(
            "id contains invalid character {c:?}: {id}"
        )));
    }
    Ok(())
}

/// Write `contents` to a sibling temp file, fsync it, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    };
    write().map_err(|e| Error::storage(format!("failed to write {}", path.display()), e))
}

pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::storage(format!("failed to create directory {}", path.display()), e))
}
