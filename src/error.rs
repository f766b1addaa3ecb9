//! Error kinds surfaced at the orchestrator boundary.
//!
//! Storage and index code maps its I/O and SQLite failures into [`Error::Storage`];
//! the orchestrator tags provider failures with the provider name.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// An id was absent where existence is required.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input did not match the required shape or range.
    #[error("validation failed: {0}")]
    Validation(String),

    /// File or index I/O failed.
    #[error("storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    /// An embedding or summarization capability failed.
    #[error("provider error ({provider}): {source}")]
    Provider {
        provider: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Provider {
            provider: provider.into(),
            source: source.into(),
        }
    }

    /// Short machine-readable kind, used as a prefix in tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Storage { .. } => "storage",
            Self::Provider { .. } => "provider",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::storage("index query failed", e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::storage("blocking task failed", e)
    }
}
