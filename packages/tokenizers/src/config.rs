//! Configuration for the tokenizer registry

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::descriptor::VocabularyDescriptor;
use crate::error::{TokenizerError, TokenizerResult};

/// Environment variable selecting the default tokenizer
pub const ENV_DEFAULT_MODEL: &str = "FLUENT_AI_TOKENIZER";
/// Environment variable overriding the vocabulary cache directory
pub const ENV_CACHE_DIR: &str = "FLUENT_AI_TOKENIZER_CACHE_DIR";
/// Environment variable overriding the request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "FLUENT_AI_TOKENIZER_TIMEOUT_SECS";

/// Configuration for the tokenizer registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Tokenizer loaded by `setup` when nothing is loaded yet
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Directory holding verified vocabulary files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Whole-request timeout for vocabulary downloads
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extra vocabularies registered next to the built-in ones
    #[serde(default)]
    pub vocabularies: Vec<VocabularyDescriptor>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("fluent_ai")
        .join("tokenizers")
}

fn default_request_timeout_secs() -> u64 {
    300 // 5 minutes, o200k_base is ~3.6 MB
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("fluent-ai-tokenizers/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            cache_dir: default_cache_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            vocabularies: Vec::new(),
        }
    }
}

impl TokenizerConfig {
    /// Create a new config with the default model set
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            ..Default::default()
        }
    }

    /// Load a JSON config file; absent fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> TokenizerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(TokenizerError::filesystem(path))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> TokenizerResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| TokenizerError::configuration(format!("invalid tokenizer config: {}", e)))
    }

    /// Defaults overlaid with the `FLUENT_AI_TOKENIZER*` environment variables
    pub fn from_env() -> TokenizerResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply the `FLUENT_AI_TOKENIZER*` environment variables on top of `self`
    pub fn with_env_overrides(self) -> TokenizerResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> TokenizerResult<Self> {
        if let Some(model) = lookup(ENV_DEFAULT_MODEL).filter(|v| !v.trim().is_empty()) {
            self.default_model = model.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| {
                TokenizerError::configuration(format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT_SECS, secs))
            })?;
        }
        Ok(self)
    }

    /// Builder pattern: set the default model
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Builder pattern: set the cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Builder pattern: set the request timeout
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Builder pattern: register an extra vocabulary
    pub fn with_vocabulary(mut self, descriptor: VocabularyDescriptor) -> Self {
        self.vocabularies.push(descriptor);
        self
    }
}
