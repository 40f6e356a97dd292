//! Error types for vocabulary resolution, download and tokenizer construction

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::task::JoinError;

/// Result type for tokenizer operations
pub type TokenizerResult<T> = Result<T, TokenizerError>;

/// Unified error type for the tokenizer registry
#[derive(Error, Debug)]
pub enum TokenizerError {
    /// No vocabulary descriptor is registered under this id
    #[error("Unknown model: {model_id}")]
    UnknownModel { model_id: String },

    /// The vocabulary source could not be reached or returned a failure status
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Downloaded or cached bytes do not match the descriptor's content hash
    #[error("Integrity check failed for {model_id}: expected sha256 {expected}, got {actual}")]
    Integrity {
        model_id: String,
        expected: String,
        actual: String,
    },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The vocabulary file was readable but not a usable vocabulary
    #[error("Invalid vocabulary for {model_id}: {message}")]
    VocabularyFormat { model_id: String, message: String },

    #[error("Encoding failed for {model_id}: {message}")]
    Encoding { model_id: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Tokenizer not initialized")]
    NotInitialized,

    /// A blocking hash, publish or build task was cancelled before it finished
    #[error("Background task cancelled: {message}")]
    Cancelled { message: String },
}

impl TokenizerError {
    pub(crate) fn unknown_model(model_id: &str) -> Self {
        Self::UnknownModel {
            model_id: model_id.to_string(),
        }
    }

    pub(crate) fn network(url: &str, message: impl ToString) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn vocabulary_format(model_id: &str, message: impl ToString) -> Self {
        Self::VocabularyFormat {
            model_id: model_id.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn configuration(message: impl ToString) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    /// Adapter for `map_err` on io results touching `path`
    pub(crate) fn filesystem(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Adapter for `map_err` on `spawn_blocking` joins.
    ///
    /// A panic inside the task is resumed on the caller; only cancellation,
    /// which happens when the runtime shuts down, becomes an error.
    pub(crate) fn task_failed(err: JoinError) -> Self {
        if err.is_panic() {
            std::panic::resume_unwind(err.into_panic());
        }
        Self::Cancelled {
            message: err.to_string(),
        }
    }

    /// Whether repeating the same request may succeed without a configuration change.
    ///
    /// Integrity failures count as retryable because a retry re-downloads the file.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Integrity { .. } | Self::Filesystem { .. }
        )
    }
}
