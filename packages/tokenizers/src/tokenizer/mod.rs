//! Tokenizer construction from verified vocabulary bytes
//!
//! The merge algorithms themselves come from `tiktoken-rs` and Hugging Face
//! `tokenizers`; this module only selects the backend for a descriptor's
//! [`VocabularyFormat`] and wraps it in a shareable [`TokenizerHandle`].

mod huggingface;
mod tiktoken;

use std::fmt;
use std::sync::Arc;

pub use huggingface::HuggingFaceEncoder;
pub use tiktoken::{parse_ranks, TiktokenEncoder};

use crate::descriptor::{VocabularyDescriptor, VocabularyFormat};
use crate::error::TokenizerResult;
use crate::fetch::VerifiedVocabulary;

/// Text to token ids for one loaded vocabulary.
///
/// `encode` is deterministic for a given vocabulary and input.
pub trait Encoder: Send + Sync {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<u32>>;

    /// Equal to `encode(text)?.len()`
    fn count(&self, text: &str) -> TokenizerResult<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// Token ids plus the counts callers usually want next to them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeStats {
    pub tokens: Vec<u32>,
    pub num_tokens: usize,
    pub num_chars: usize,
}

struct HandleInner {
    type_id: String,
    encoder: Box<dyn Encoder>,
}

/// Shared reference to a loaded tokenizer.
///
/// Clones point at the same instance; compare with [`TokenizerHandle::ptr_eq`].
#[derive(Clone)]
pub struct TokenizerHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for TokenizerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizerHandle")
            .field("type_id", &self.inner.type_id)
            .finish_non_exhaustive()
    }
}

impl TokenizerHandle {
    pub fn new(type_id: impl Into<String>, encoder: impl Encoder + 'static) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                type_id: type_id.into(),
                encoder: Box::new(encoder),
            }),
        }
    }

    /// Model id of the descriptor this tokenizer was built from
    #[inline(always)]
    pub fn type_id(&self) -> &str {
        &self.inner.type_id
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline(always)]
    pub fn encode(&self, text: &str) -> TokenizerResult<Vec<u32>> {
        self.inner.encoder.encode(text)
    }

    #[inline(always)]
    pub fn count(&self, text: &str) -> TokenizerResult<usize> {
        self.inner.encoder.count(text)
    }

    pub fn encode_with_stats(&self, text: &str) -> TokenizerResult<EncodeStats> {
        let tokens = self.encode(text)?;
        Ok(EncodeStats {
            num_tokens: tokens.len(),
            num_chars: text.chars().count(),
            tokens,
        })
    }
}

/// Build the tokenizer for `descriptor` from the in-memory bytes the fetcher hashed.
///
/// The cache file is not read again, so later changes to it cannot reach the handle.
pub fn build(vocabulary: &VerifiedVocabulary, descriptor: &VocabularyDescriptor) -> TokenizerResult<TokenizerHandle> {
    let contents = vocabulary.bytes();
    let handle = match descriptor.format() {
        VocabularyFormat::Tiktoken { encoding } => TokenizerHandle::new(
            descriptor.model_id(),
            TiktokenEncoder::from_bytes(contents, descriptor, encoding)?,
        ),
        VocabularyFormat::HuggingFace => TokenizerHandle::new(
            descriptor.model_id(),
            HuggingFaceEncoder::from_bytes(contents, descriptor)?,
        ),
    };
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chars;

    impl Encoder for Chars {
        fn encode(&self, text: &str) -> TokenizerResult<Vec<u32>> {
            Ok(text.chars().map(|c| c as u32).collect())
        }
    }

    #[test]
    fn test_handle_identity() {
        let a = TokenizerHandle::new("chars", Chars);
        let b = a.clone();
        let c = TokenizerHandle::new("chars", Chars);

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.type_id(), "chars");
    }

    #[test]
    fn test_default_count_and_stats() {
        let handle = TokenizerHandle::new("chars", Chars);
        assert_eq!(handle.count("héllo").unwrap(), 5);

        let stats = handle.encode_with_stats("ab").unwrap();
        assert_eq!(stats.tokens, vec![97, 98]);
        assert_eq!(stats.num_tokens, 2);
        assert_eq!(stats.num_chars, 2);
    }
}
