//! Lazily loaded BPE tokenizers for fluent-ai
//!
//! Vocabulary files for the OpenAI encodings are several megabytes and live on a
//! CDN, so they are downloaded on first use, verified against a pinned SHA-256
//! digest, and kept in a local cache directory. A [`TokenizerRegistry`] keeps
//! one tokenizer loaded at a time and only rebuilds it when a different model is
//! requested.
//!
//! ## Usage
//! ```rust,no_run
//! use fluent_ai_tokenizers::{TokenizerConfig, TokenizerRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = TokenizerRegistry::new(&TokenizerConfig::from_env()?)?;
//!
//!     // Loads the configured default (gpt-4o) unless something is already loaded
//!     registry.setup_from_config().await?;
//!
//!     // Switches to cl100k_base; repeated calls reuse the loaded instance
//!     let tokenizer = registry.get("gpt-3.5").await?;
//!     println!("{} tokens", tokenizer.count("Hello, world!")?);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod registry;
pub mod source;
pub mod tokenizer;

pub use config::TokenizerConfig;
pub use descriptor::{DescriptorTable, Encoding, VocabularyDescriptor, VocabularyFormat};
pub use error::{TokenizerError, TokenizerResult};
pub use fetch::{CacheStatus, FetchStats, VerifiedVocabulary, VocabularyFetcher};
pub use registry::{RegistryState, TokenizerRegistry};
pub use source::{HttpSource, StaticSource, VocabularySource};
pub use tokenizer::{EncodeStats, Encoder, TokenizerHandle};
