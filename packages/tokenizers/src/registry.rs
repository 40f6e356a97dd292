//! Single-slot tokenizer registry
//!
//! Holds at most one loaded tokenizer. [`TokenizerRegistry::get`] makes sure
//! exactly the requested type is loaded, replacing whatever was there;
//! [`TokenizerRegistry::setup`] only makes sure *something* is loaded and never
//! switches an existing slot.
//!
//! The check-then-construct sequence runs under an async mutex, so concurrent
//! callers never build two tokenizers for the same slot at once.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::TokenizerConfig;
use crate::descriptor::{DescriptorTable, VocabularyDescriptor};
use crate::error::{TokenizerError, TokenizerResult};
use crate::fetch::VocabularyFetcher;
use crate::source::HttpSource;
use crate::tokenizer::{self, TokenizerHandle};

/// Observable state of the slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    Empty,
    Loaded(String),
}

pub struct TokenizerRegistry {
    descriptors: Arc<DescriptorTable>,
    fetcher: VocabularyFetcher,
    default_model: String,
    slot: Mutex<Option<TokenizerHandle>>,
}

impl std::fmt::Debug for TokenizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerRegistry")
            .field("default_model", &self.default_model)
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

impl TokenizerRegistry {
    /// Registry over the built-in vocabularies plus `config.vocabularies`, downloading over HTTPS
    pub fn new(config: &TokenizerConfig) -> TokenizerResult<Self> {
        let mut descriptors = DescriptorTable::builtin();
        for descriptor in &config.vocabularies {
            descriptors.register(descriptor.clone())?;
        }

        let source = HttpSource::new(config)?;
        let fetcher = VocabularyFetcher::new(config.cache_dir.clone(), Arc::new(source));
        Ok(Self::with_parts(descriptors, fetcher, config.default_model.clone()))
    }

    pub fn with_parts(
        descriptors: DescriptorTable,
        fetcher: VocabularyFetcher,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            descriptors: Arc::new(descriptors),
            fetcher,
            default_model: default_model.into(),
            slot: Mutex::new(None),
        }
    }

    #[inline(always)]
    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    #[inline(always)]
    pub fn fetcher(&self) -> &VocabularyFetcher {
        &self.fetcher
    }

    #[inline(always)]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Return the tokenizer for `type_id`, loading it if a different one (or none) is cached.
    ///
    /// Unknown ids fail before any network or disk access. If construction fails
    /// the previously loaded tokenizer, if any, stays in place.
    #[instrument(skip(self))]
    pub async fn get(&self, type_id: &str) -> TokenizerResult<TokenizerHandle> {
        let descriptor = self.descriptors.lookup(type_id)?;

        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            if handle.type_id() == type_id {
                debug!("tokenizer already loaded");
                return Ok(handle.clone());
            }
        }
        self.load_into(&mut slot, descriptor).await
    }

    /// Load `configured_type` only if nothing is loaded yet; otherwise return what is loaded
    #[instrument(skip(self))]
    pub async fn setup(&self, configured_type: &str) -> TokenizerResult<TokenizerHandle> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            debug!(loaded = handle.type_id(), "tokenizer already initialized");
            return Ok(handle.clone());
        }

        let descriptor = self.descriptors.lookup(configured_type)?;
        self.load_into(&mut slot, descriptor).await
    }

    async fn load_into(
        &self,
        slot: &mut Option<TokenizerHandle>,
        descriptor: &VocabularyDescriptor,
    ) -> TokenizerResult<TokenizerHandle> {
        let vocabulary = self.fetcher.load(descriptor).await?;

        let owned = descriptor.clone();
        let handle = tokio::task::spawn_blocking(move || tokenizer::build(&vocabulary, &owned))
            .await
            .map_err(TokenizerError::task_failed)??;

        match slot.replace(handle.clone()) {
            Some(previous) => info!(previous = previous.type_id(), current = handle.type_id(), "replaced tokenizer"),
            None => info!(current = handle.type_id(), "loaded tokenizer"),
        }
        Ok(handle)
    }

    /// [`setup`](Self::setup) with the configured default model
    pub async fn setup_from_config(&self) -> TokenizerResult<TokenizerHandle> {
        let model = self.default_model.clone();
        self.setup(&model).await
    }

    pub async fn current(&self) -> Option<TokenizerHandle> {
        self.slot.lock().await.clone()
    }

    pub async fn state(&self) -> RegistryState {
        match self.slot.lock().await.as_ref() {
            Some(handle) => RegistryState::Loaded(handle.type_id().to_string()),
            None => RegistryState::Empty,
        }
    }

    /// Encode with whatever tokenizer is loaded
    pub async fn encode(&self, text: &str) -> TokenizerResult<Vec<u32>> {
        self.current().await.ok_or(TokenizerError::NotInitialized)?.encode(text)
    }

    pub async fn count(&self, text: &str) -> TokenizerResult<usize> {
        self.current().await.ok_or(TokenizerError::NotInitialized)?.count(text)
    }

    /// Drop the loaded tokenizer and return to `Empty`. Outstanding handles stay usable.
    pub async fn teardown(&self) -> Option<TokenizerHandle> {
        let previous = self.slot.lock().await.take();
        if let Some(handle) = &previous {
            info!(type_id = handle.type_id(), "tokenizer released");
        }
        previous
    }
}
