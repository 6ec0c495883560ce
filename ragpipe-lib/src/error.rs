//! Error types for ragpipe

use thiserror::Error;

/// Result type alias for ragpipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ragpipe operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid settings or arguments; never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A collaborator (index, store, web provider) could not be reached
    #[error("{dependency} unavailable: {reason}")]
    Unavailable {
        dependency: &'static str,
        reason: String,
    },

    /// A chunk or document is missing required content or metadata
    #[error("data error: {0}")]
    Data(String),

    /// Failed to load or run the embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to store or retrieve from vector store
    #[error("store error: {0}")]
    Store(String),

    /// Web search provider returned an error
    #[error("web search error: {0}")]
    WebSearch(String),

    /// Answer generation failed
    #[error("generation error: {0}")]
    Generation(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Configuration errors are reported immediately and never degraded.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub(crate) fn unavailable(dependency: &'static str, reason: impl Into<String>) -> Self {
        Error::Unavailable {
            dependency,
            reason: reason.into(),
        }
    }
}
