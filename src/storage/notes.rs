//! Note store: one markdown file per note under `memories/`.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{now_rfc3339, Note, NotePatch};

use super::note_format::{self, validate_tags, validate_title};
use super::{ensure_dir, validate_id, write_atomic};

/// Prefix of every generated note id.
pub const NOTE_ID_PREFIX: &str = "mem_";

/// Generate a note id: [`NOTE_ID_PREFIX`] plus 8 hex chars from the random tail of a UUID v7.
///
/// Collisions are unlikely but possible; callers check [`NoteStore::exists`].
pub fn generate_note_id() -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    format!("{NOTE_ID_PREFIX}{}", &uuid[uuid.len() - 8..])
}

/// Storage contract for notes. Per-id serialization is the caller's job.
pub trait NoteStore: Send + Sync {
    /// Persist a new note. `Validation` if the id is already taken.
    fn create(&self, note: &Note) -> Result<()>;

    /// `None` if no note has this id. Deleted notes are returned.
    fn read(&self, id: &str) -> Result<Option<Note>>;

    /// Merge `patch` into the note and refresh `updated_at`.
    fn update(&self, id: &str, patch: &NotePatch) -> Result<Note>;

    /// Soft delete: set the tombstone and refresh `updated_at`.
    fn delete(&self, id: &str) -> Result<Note>;

    /// Non-deleted notes, sorted by id.
    fn list(&self) -> Result<Vec<Note>>;

    /// Includes deleted notes.
    fn exists(&self, id: &str) -> Result<bool>;

    /// Every stored id, deleted or not.
    fn list_ids(&self) -> Result<Vec<String>>;
}

/// [`NoteStore`] over a directory of `.md` files.
pub struct FileNoteStore {
    dir: PathBuf,
}

impl FileNoteStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join("memories");
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.md"))
    }

    fn write(&self, note: &Note) -> Result<()> {
        write_atomic(&self.path(&note.id), note_format::format(note).as_bytes())
    }

    fn require(&self, id: &str) -> Result<Note> {
        self.read(id)?
            .ok_or_else(|| Error::NotFound(format!("note not found: {id}")))
    }
}

/// `now`, but never earlier than `previous` so `updated_at` stays monotonic.
fn refreshed_timestamp(previous: &str) -> String {
    let now = now_rfc3339();
    match (
        crate::types::parse_timestamp(&now),
        crate::types::parse_timestamp(previous),
    ) {
        (Some(n), Some(p)) if p > n => previous.to_string(),
        _ => now,
    }
}

impl NoteStore for FileNoteStore {
    fn create(&self, note: &Note) -> Result<()> {
        validate_id(&note.id)?;
        note_format::validate_note(note)?;

        let path = self.path(&note.id);
        let text = note_format::format(note);
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Validation(format!("note already exists: {}", note.id)));
            }
            Err(e) => return Err(Error::storage(format!("failed to create note {}", note.id), e)),
        };
        file.write_all(text.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::storage(format!("failed to write note {}", note.id), e))?;
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<Note>> {
        validate_id(id)?;
        let text = match std::fs::read_to_string(self.path(id)) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(format!("failed to read note {id}"), e)),
        };
        note_format::parse(id, &text).map(Some)
    }

    fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(tags) = &patch.tags {
            validate_tags(tags)?;
        }
        let mut note = self.require(id)?;
        if let Some(title) = &patch.title {
            note.title = title.clone();
        }
        if let Some(content) = &patch.content {
            note.content = content.clone();
        }
        if let Some(tags) = &patch.tags {
            note.tags = tags.clone();
        }
        note.updated_at = refreshed_timestamp(&note.updated_at);
        self.write(&note)?;
        Ok(note)
    }

    fn delete(&self, id: &str) -> Result<Note> {
        let mut note = self.require(id)?;
        note.deleted = true;
        note.updated_at = refreshed_timestamp(&note.updated_at);
        self.write(&note)?;
        Ok(note)
    }

    fn list(&self) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        for id in self.list_ids()? {
            if let Some(note) = self.read(&id)? {
                if !note.deleted {
                    notes.push(note);
                }
            }
        }
        Ok(notes)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        Ok(self.path(id).exists())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            Error::storage(format!("failed to list {}", self.dir.display()), e)
        })?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage("failed to read directory entry", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
