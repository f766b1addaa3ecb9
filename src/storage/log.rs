//! Chunked, append-only session log store.
//!
//! Each session has `sessions/<id>.jsonl` (one [`Message`] per line, never rewritten)
//! and `sessions/<id>.meta.json` (the [`SessionMeta`] record, overwritten on every ingest).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Message, SessionMeta};

use super::{ensure_dir, validate_id, write_atomic};

const LOG_EXT: &str = "jsonl";
const META_SUFFIX: &str = ".meta.json";

/// Number of chunks needed to hold `message_count` messages.
pub fn chunk_count(message_count: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    message_count.div_ceil(chunk_size)
}

/// Chunk count as shown to readers: an empty session still has one (empty) chunk.
pub fn reported_total_chunks(message_count: usize, chunk_size: usize) -> usize {
    chunk_count(message_count, chunk_size).max(1)
}

/// Storage contract for session logs and their metadata.
///
/// Appends for the same id must be serialized by the caller.
pub trait LogStore: Send + Sync {
    /// Append messages to the end of the log, creating it if absent.
    fn append(&self, id: &str, messages: &[Message]) -> Result<()>;

    /// Messages `[chunk_index * chunk_size, chunk_index * chunk_size + chunk_size)`.
    /// Empty when past the end; `NotFound` when the log does not exist.
    fn read_chunk(&self, id: &str, chunk_index: usize, chunk_size: usize) -> Result<Vec<Message>>;

    /// The full ordered log.
    fn read_all(&self, id: &str) -> Result<Vec<Message>>;

    /// The metadata record, or `None` if none has been written yet.
    fn get_meta(&self, id: &str) -> Result<Option<SessionMeta>>;

    fn set_meta(&self, meta: &SessionMeta) -> Result<()>;

    fn exists(&self, id: &str) -> Result<bool>;

    /// All known session ids, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// [`LogStore`] over a directory of JSONL files.
pub struct FileLogStore {
    dir: PathBuf,
}

impl FileLogStore {
    /// Open (creating if needed) the `sessions/` directory under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join("sessions");
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    fn log_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{LOG_EXT}"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{META_SUFFIX}"))
    }

    fn open_log(&self, id: &str) -> Result<BufReader<File>> {
        validate_id(id)?;
        let path = self.log_path(id);
        match File::open(&path) {
            Ok(file) => Ok(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("session log not found: {id}")))
            }
            Err(e) => Err(Error::storage(format!("failed to open log for {id}"), e)),
        }
    }

    /// Iterate parsed lines, skipping blank ones.
    fn scan<F>(&self, id: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, Message) -> bool,
    {
        let reader = self.open_log(id)?;
        let mut index = 0usize;
        for (line_no, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| Error::storage(format!("failed to read log for {id}"), e))?;
            if line.trim().is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(&line).map_err(|e| {
                Error::storage(format!("corrupt log line {} for {id}", line_no + 1), e)
            })?;
            if !visit(index, message) {
                break;
            }
            index += 1;
        }
        Ok(())
    }
}

impl LogStore for FileLogStore {
    fn append(&self, id: &str, messages: &[Message]) -> Result<()> {
        validate_id(id)?;
        if messages.is_empty() {
            return Ok(());
        }

        // Serialize everything first so a bad message never leaves a partial append.
        let mut buf = Vec::new();
        for message in messages {
            serde_json::to_writer(&mut buf, message)
                .map_err(|e| Error::storage(format!("failed to encode message for {id}"), e))?;
            buf.push(b'\n');
        }

        let path = self.log_path(id);
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(&buf)?;
            file.sync_data()
        };
        write().map_err(|e| Error::storage(format!("failed to append to log for {id}"), e))?;

        tracing::debug!(id, appended = messages.len(), "log appended");
        Ok(())
    }

    fn read_chunk(&self, id: &str, chunk_index: usize, chunk_size: usize) -> Result<Vec<Message>> {
        if chunk_size == 0 {
            return Err(Error::Validation("chunk size must be at least 1".into()));
        }
        let start = chunk_index.saturating_mul(chunk_size);
        let end = start.saturating_add(chunk_size);
        let mut chunk = Vec::new();
        self.scan(id, |index, message| {
            if index >= start {
                chunk.push(message);
            }
            index + 1 < end
        })?;
        Ok(chunk)
    }

    fn read_all(&self, id: &str) -> Result<Vec<Message>> {
        let mut all = Vec::new();
        self.scan(id, |_, message| {
            all.push(message);
            true
        })?;
        Ok(all)
    }

    fn get_meta(&self, id: &str) -> Result<Option<SessionMeta>> {
        validate_id(id)?;
        let path = self.meta_path(id);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(format!("failed to read metadata for {id}"), e)),
        };
        let meta = serde_json::from_slice(&contents)
            .map_err(|e| Error::storage(format!("corrupt metadata for {id}"), e))?;
        Ok(Some(meta))
    }

    fn set_meta(&self, meta: &SessionMeta) -> Result<()> {
        validate_id(&meta.id)?;
        let json = serde_json::to_vec_pretty(meta)
            .map_err(|e| Error::storage(format!("failed to encode metadata for {}", meta.id), e))?;
        write_atomic(&self.meta_path(&meta.id), &json)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        Ok(self.log_path(id).exists())
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            Error::storage(format!("failed to list {}", self.dir.display()), e)
        })?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage("failed to read directory entry", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXT) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileLogStore) {
        let tmp = TempDir::new().unwrap();
        let store = FileLogStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<Message> {
        range
            .map(|i| Message::new(Role::User, format!("message {i}")))
            .collect()
    }

    #[test]
    fn chunk_count_is_ceiling() {
        assert_eq!(chunk_count(0, 50), 0);
        assert_eq!(chunk_count(1, 50), 1);
        assert_eq!(chunk_count(50, 50), 1);
        assert_eq!(chunk_count(51, 50), 2);
        assert_eq!(chunk_count(100, 50), 2);
        assert_eq!(chunk_count(7, 3), 3);
        for m in 0..200 {
            for c in 1..20 {
                let expected = (m as f64 / c as f64).ceil() as usize;
                assert_eq!(chunk_count(m, c), expected, "m={m} c={c}");
            }
        }
    }

    #[test]
    fn empty_session_reports_one_chunk() {
        assert_eq!(reported_total_chunks(0, 50), 1);
        assert_eq!(reported_total_chunks(51, 50), 2);
    }

    #[test]
    fn append_then_read_all_preserves_order() {
        let (_tmp, store) = store();
        store.append("s1", &numbered(0..3)).unwrap();
        store.append("s1", &numbered(3..5)).unwrap();

        let all = store.read_all("s1").unwrap();
        assert_eq!(all, numbered(0..5));
    }

    #[test]
    fn log_is_one_json_object_per_line() {
        let (tmp, store) = store();
        store.append("s1", &numbered(0..2)).unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("sessions/s1.jsonl")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(raw.ends_with('\n'));
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.is_object());
        }
    }

    #[test]
    fn read_chunk_slices_by_index() {
        let (_tmp, store) = store();
        store.append("s1", &numbered(0..51)).unwrap();

        assert_eq!(store.read_chunk("s1", 0, 50).unwrap(), numbered(0..50));
        assert_eq!(store.read_chunk("s1", 1, 50).unwrap(), numbered(50..51));
        assert!(store.read_chunk("s1", 2, 50).unwrap().is_empty());
    }

    #[test]
    fn read_chunk_missing_log_is_not_found() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.read_chunk("nope", 0, 50),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn meta_absent_until_written() {
        let (_tmp, store) = store();
        assert!(store.get_meta("s1").unwrap().is_none());

        let meta = SessionMeta {
            id: "s1".into(),
            summary: "a chat".into(),
            key_facts: vec![],
            chunk_count: 1,
            message_count: 2,
            channel: Some("cli".into()),
            user_id: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
            deleted: false,
        };
        store.set_meta(&meta).unwrap();
        assert_eq!(store.get_meta("s1").unwrap(), Some(meta.clone()));

        let updated = SessionMeta {
            summary: "a longer chat".into(),
            ..meta
        };
        store.set_meta(&updated).unwrap();
        assert_eq!(store.get_meta("s1").unwrap().unwrap().summary, "a longer chat");
    }

    #[test]
    fn exists_and_list() {
        let (_tmp, store) = store();
        assert!(!store.exists("b").unwrap());
        store.append("b", &numbered(0..1)).unwrap();
        store.append("a", &numbered(0..1)).unwrap();
        assert!(store.exists("b").unwrap());
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn invalid_id_rejected_before_write() {
        let (tmp, store) = store();
        let result = store.append("../escape", &numbered(0..1));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(!tmp.path().join("escape.jsonl").exists());
    }

    #[test]
    fn concurrent_appends_to_different_ids() {
        let (_tmp, store) = store();
        let store = std::sync::Arc::new(store);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("s{t}");
                    for i in 0..25 {
                        store.append(&id, &numbered(i..i + 1)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for t in 0..4 {
            assert_eq!(store.read_all(&format!("s{t}")).unwrap(), numbered(0..25));
        }
    }
}
