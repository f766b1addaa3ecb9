//! Text-to-vector embedding capability.
//!
//! Provides the [`EmbeddingProvider`] trait and a local implementation running
//! all-MiniLM-L6-v2 through ONNX Runtime. The provider is created via
//! [`create_provider`] from configuration; its width comes from the
//! [`ModelDimensions`](crate::config::ModelDimensions) table.

pub mod local;

use std::sync::{Arc, Mutex};

use anyhow::Result;

/// Trait for embedding text into vectors.
///
/// Implementations produce vectors of exactly [`dimensions`](Self::dimensions) floats.
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name used to tag errors (e.g. `"local"`).
    fn name(&self) -> &str;

    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Width of every vector this provider returns.
    fn dimensions(&self) -> usize;
}

/// Create an embedding provider from config.
///
/// Currently only `"local"` is supported (ONNX Runtime + a sentence-transformers model).
/// Returns an error if model files are not found; run `mnemos model download` first.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
    dimensions: usize,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config, dimensions)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}

/// Provider that builds the configured backend on first use.
///
/// `name` and `dimensions` come from configuration, so commands that never embed
/// (reading a session, printing stats) work without the model files present.
pub struct DeferredProvider {
    config: crate::config::EmbeddingConfig,
    dimensions: usize,
    inner: Mutex<Option<Arc<dyn EmbeddingProvider>>>,
}

impl DeferredProvider {
    pub fn new(config: &crate::config::EmbeddingConfig, dimensions: usize) -> Self {
        Self {
            config: config.clone(),
            dimensions,
            inner: Mutex::new(None),
        }
    }

    fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding provider lock poisoned"))?;
        if let Some(provider) = inner.as_ref() {
            return Ok(Arc::clone(provider));
        }
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::from(create_provider(&self.config, self.dimensions)?);
        *inner = Some(Arc::clone(&provider));
        tracing::debug!(provider = %self.config.provider, "embedding provider loaded on demand");
        Ok(provider)
    }
}

impl EmbeddingProvider for DeferredProvider {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.provider()?.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.provider()?.embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Inverse of [`embedding_to_bytes`] for vectors read back from vec0.
pub fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Euclidean distance; the metric vec0 uses by default.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
