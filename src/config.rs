use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MnemosConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub summarizer: SummarizerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `sessions/`, `memories/` and `index.db`.
    pub root: String,
    pub chunk_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    /// Overrides the [`ModelDimensions`] lookup for models it does not know.
    pub dimensions: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummarizerConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub lexical_weight: f64,
    pub candidate_multiplier: usize,
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            summarizer: SummarizerConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7411,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_mnemos_dir().to_string_lossy().into_owned(),
            chunk_size: 50,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_mnemos_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            dimensions: None,
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: "extractive".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com".into(),
            api_key: None,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            lexical_weight: 1.0,
            candidate_multiplier: 3,
        }
    }
}

/// Immutable model-name → embedding-width table, built once at startup.
#[derive(Debug, Clone)]
pub struct ModelDimensions(HashMap<String, usize>);

impl ModelDimensions {
    pub fn new(entries: impl IntoIterator<Item = (String, usize)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn get(&self, model: &str) -> Option<usize> {
        self.0.get(model).copied()
    }
}

impl Default for ModelDimensions {
    fn default() -> Self {
        Self::new(
            [
                ("all-MiniLM-L6-v2", 384),
                ("all-MiniLM-L12-v2", 384),
                ("bge-small-en-v1.5", 384),
                ("bge-base-en-v1.5", 768),
                ("nomic-embed-text", 768),
                ("text-embedding-3-small", 1536),
                ("text-embedding-3-large", 3072),
            ]
            .into_iter()
            .map(|(name, dim)| (name.to_string(), dim)),
        )
    }
}

impl EmbeddingConfig {
    /// Explicit `dimensions` wins; otherwise the model must be in the table.
    pub fn resolve_dimensions(&self, table: &ModelDimensions) -> Result<usize> {
        match self.dimensions.or_else(|| table.get(&self.model)) {
            Some(0) => bail!("embedding dimensions must be positive"),
            Some(dim) => Ok(dim),
            None => bail!(
                "unknown embedding model '{}': set embedding.dimensions explicitly",
                self.model
            ),
        }
    }
}

/// Returns `~/.mnemos/`
pub fn default_mnemos_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemos")
}

/// Returns the default config file path: `~/.mnemos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemos_dir().join("config.toml")
}

impl MnemosConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemosConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate(&ModelDimensions::default())?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MNEMOS_ROOT, MNEMOS_LOG_LEVEL, MNEMOS_CHUNK_SIZE, MNEMOS_SUMMARIZER_API_KEY).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("MNEMOS_ROOT") {
            self.storage.root = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_CHUNK_SIZE") {
            self.storage.chunk_size = val
                .parse()
                .with_context(|| format!("MNEMOS_CHUNK_SIZE is not an integer: {val}"))?;
        }
        if let Ok(val) = std::env::var("MNEMOS_SUMMARIZER_API_KEY") {
            self.summarizer.api_key = Some(val);
        }
        Ok(())
    }

    pub fn validate(&self, dimensions: &ModelDimensions) -> Result<()> {
        if self.storage.chunk_size == 0 {
            bail!("storage.chunk_size must be at least 1");
        }
        if self.retrieval.default_limit == 0 {
            bail!("retrieval.default_limit must be at least 1");
        }
        if self.retrieval.candidate_multiplier == 0 {
            bail!("retrieval.candidate_multiplier must be at least 1");
        }
        if !(self.retrieval.lexical_weight >= 0.0) {
            bail!("retrieval.lexical_weight must be non-negative");
        }
        self.embedding.resolve_dimensions(dimensions)?;
        Ok(())
    }

    /// Resolve the storage root, expanding `~` if needed.
    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }

    pub fn index_path(&self) -> PathBuf {
        self.resolved_root().join("index.db")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
