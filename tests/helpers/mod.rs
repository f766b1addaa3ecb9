#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mnemos::config::MnemosConfig;
use mnemos::embedding::EmbeddingProvider;
use mnemos::index::{SearchIndex, SqliteIndex};
use mnemos::orchestrator::Orchestrator;
use mnemos::storage::log::{FileLogStore, LogStore};
use mnemos::storage::notes::FileNoteStore;
use mnemos::summarize::{Summarizer, Summary};
use mnemos::types::{Message, Role};
use tempfile::TempDir;

/// Width of the fake embedder's vectors.
pub const TEST_DIM: usize = 32;

/// Deterministic embedding with a spike at position `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIM];
    v[seed % TEST_DIM] = 1.0;
    v
}

/// Bag-of-words embedder: each lowercase word is hashed into a bucket, then the
/// vector is L2-normalized. Identical texts embed identically and shared words
/// pull vectors together.
pub struct FakeEmbedder;

impl EmbeddingProvider for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; TEST_DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            v[bucket as usize % TEST_DIM] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        TEST_DIM
    }
}

/// Embedder that always fails, for provider-error paths.
pub struct BrokenEmbedder;

impl EmbeddingProvider for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding backend unavailable")
    }

    fn dimensions(&self) -> usize {
        TEST_DIM
    }
}

/// Summary = every message's content joined with spaces; facts = user messages.
/// Can be switched into a failing mode.
#[derive(Default)]
pub struct FakeSummarizer {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeSummarizer {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    fn name(&self) -> &str {
        "fake-summarizer"
    }

    async fn summarize(&self, messages: &[Message]) -> anyhow::Result<Summary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("summarizer timed out");
        }
        Ok(Summary {
            summary: messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            key_facts: messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .collect(),
        })
    }
}

/// An orchestrator over a temp root, with handles to its parts for assertions.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: MnemosConfig,
    pub logs: Arc<FileLogStore>,
    pub index: Arc<SqliteIndex>,
    pub summarizer: Arc<FakeSummarizer>,
    pub orchestrator: Orchestrator,
}

pub fn test_config(dir: &TempDir, chunk_size: usize) -> MnemosConfig {
    let mut config = MnemosConfig::default();
    config.storage.root = dir.path().to_string_lossy().into_owned();
    config.storage.chunk_size = chunk_size;
    config.embedding.model = "fake".into();
    config.embedding.dimensions = Some(TEST_DIM);
    config
}

pub fn test_env() -> TestEnv {
    test_env_with(50, Arc::new(FakeEmbedder))
}

pub fn test_env_with(chunk_size: usize, embedder: Arc<dyn EmbeddingProvider>) -> TestEnv {
    test_env_in(TempDir::new().unwrap(), chunk_size, embedder)
}

/// Build an environment over an existing root, e.g. to reopen after a close.
pub fn test_env_in(dir: TempDir, chunk_size: usize, embedder: Arc<dyn EmbeddingProvider>) -> TestEnv {
    let config = test_config(&dir, chunk_size);

    let logs = Arc::new(FileLogStore::open(dir.path()).unwrap());
    let notes = Arc::new(FileNoteStore::open(dir.path()).unwrap());
    let index = Arc::new(SqliteIndex::new(
        config.index_path(),
        TEST_DIM,
        "fake",
        &config.retrieval,
    ));
    let summarizer = Arc::new(FakeSummarizer::default());

    let orchestrator = Orchestrator::new(
        Arc::clone(&logs) as Arc<dyn LogStore>,
        notes,
        Arc::clone(&index) as Arc<dyn SearchIndex>,
        embedder,
        Arc::clone(&summarizer) as Arc<dyn Summarizer>,
        &config,
    )
    .unwrap();

    TestEnv {
        dir,
        config,
        logs,
        index,
        summarizer,
        orchestrator,
    }
}

pub fn user(content: &str) -> Message {
    Message::new(Role::User, content)
}

pub fn assistant(content: &str) -> Message {
    Message::new(Role::Assistant, content)
}

/// `count` alternating user/assistant messages numbered from `start`.
pub fn numbered_messages(start: usize, count: usize) -> Vec<Message> {
    (start..start + count)
        .map(|i| {
            if i % 2 == 0 {
                user(&format!("message {i}"))
            } else {
                assistant(&format!("message {i}"))
            }
        })
        .collect()
}
