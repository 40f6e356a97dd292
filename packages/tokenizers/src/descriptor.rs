//! Vocabulary descriptor table
//!
//! Maps a model identifier to the remote vocabulary it tokenizes with: where to
//! download it, the SHA-256 digest the bytes must match, and the reserved special
//! tokens layered on top of the base ranks. The table is built once at startup
//! (built-ins plus explicit registrations) and is read-only afterwards.

use std::collections::{BTreeMap, HashSet};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{TokenizerError, TokenizerResult};

pub const ENDOFTEXT: &str = "<|endoftext|>";
pub const FIM_PREFIX: &str = "<|fim_prefix|>";
pub const FIM_MIDDLE: &str = "<|fim_middle|>";
pub const FIM_SUFFIX: &str = "<|fim_suffix|>";
pub const ENDOFPROMPT: &str = "<|endofprompt|>";

const CL100K_BASE_URL: &str = "https://openaipublic.blob.core.windows.net/encodings/cl100k_base.tiktoken";
const CL100K_BASE_SHA256: &str = "223921b76ee99bde995b7ff738513eef100fb51d18c93597a113bcf3c7a1a8b7";

const O200K_BASE_URL: &str = "https://openaipublic.blob.core.windows.net/encodings/o200k_base.tiktoken";
const O200K_BASE_SHA256: &str = "446a9538cb6c348e3516120d7c08b09f57c36495e2acfffe59a5bf8b0cfb1a2d";

const CL100K_BASE_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

const O200K_BASE_PATTERN: &str = concat!(
    r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|\p{N}{1,3}",
    r"| ?[^\s\p{L}\p{N}]+[\r\n/]*",
    r"|\s*[\r\n]+",
    r"|\s+(?!\S)",
    r"|\s+",
);

/// Known tiktoken rank-file encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Cl100kBase,
    O200kBase,
}

impl Encoding {
    #[inline(always)]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::O200kBase => "o200k_base",
        }
    }

    /// Pre-tokenization regex splitting text into pieces before BPE merges
    #[inline(always)]
    pub const fn pattern(&self) -> &'static str {
        match self {
            Self::Cl100kBase => CL100K_BASE_PATTERN,
            Self::O200kBase => O200K_BASE_PATTERN,
        }
    }
}

/// On-disk format of a vocabulary file, selecting the tokenizer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyFormat {
    /// `base64(token) rank` lines as published for the OpenAI encodings
    Tiktoken { encoding: Encoding },
    /// A Hugging Face `tokenizer.json`
    HuggingFace,
}

impl VocabularyFormat {
    #[inline(always)]
    pub const fn file_extension(&self) -> &'static str {
        match self {
            Self::Tiktoken { .. } => "tiktoken",
            Self::HuggingFace => "json",
        }
    }
}

/// Where a model's vocabulary lives and how to trust it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyDescriptor {
    model_id: String,
    source_url: String,
    /// Lowercase hex SHA-256 of the vocabulary file
    content_hash: String,
    #[serde(default)]
    special_tokens: BTreeMap<String, u32>,
    format: VocabularyFormat,
}

impl VocabularyDescriptor {
    pub fn new(
        model_id: impl Into<String>,
        format: VocabularyFormat,
        source_url: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            source_url: source_url.into(),
            content_hash: content_hash.into().to_ascii_lowercase(),
            special_tokens: BTreeMap::new(),
            format,
        }
    }

    /// Builder pattern: reserve a special token id
    pub fn with_special_token(mut self, token: impl Into<String>, id: u32) -> Self {
        self.special_tokens.insert(token.into(), id);
        self
    }

    /// Builder pattern: point the descriptor at a different copy of the vocabulary
    pub fn with_source(mut self, source_url: impl Into<String>, content_hash: impl Into<String>) -> Self {
        self.source_url = source_url.into();
        self.content_hash = content_hash.into().to_ascii_lowercase();
        self
    }

    /// Builder pattern: rename the descriptor
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    #[inline(always)]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline(always)]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    #[inline(always)]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    #[inline(always)]
    pub fn special_tokens(&self) -> &BTreeMap<String, u32> {
        &self.special_tokens
    }

    #[inline(always)]
    pub fn format(&self) -> VocabularyFormat {
        self.format
    }

    /// Cache file name for this descriptor.
    ///
    /// Bytes outside `[A-Za-z0-9.-]` are written as `_` plus two hex digits, so
    /// `org/model` becomes `org_2fmodel.json` and `org_model` becomes
    /// `org_5fmodel.json`. Distinct model ids never share a file.
    pub fn file_name(&self) -> String {
        let mut stem = String::with_capacity(self.model_id.len());
        for byte in self.model_id.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-') {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("_{:02x}", byte));
            }
        }
        format!("{}.{}", stem, self.format.file_extension())
    }

    /// Check the invariants every registered descriptor must hold
    pub fn validate(&self) -> TokenizerResult<()> {
        if self.model_id.trim().is_empty() {
            return Err(TokenizerError::configuration("descriptor model_id is empty"));
        }

        let url = Url::parse(&self.source_url).map_err(|e| {
            TokenizerError::configuration(format!(
                "{}: invalid source url {}: {}",
                self.model_id, self.source_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TokenizerError::configuration(format!(
                "{}: unsupported url scheme {}",
                self.model_id,
                url.scheme()
            )));
        }

        if self.content_hash.len() != 64 || !self.content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TokenizerError::configuration(format!(
                "{}: content hash must be 64 hex digits of sha256, got {:?}",
                self.model_id, self.content_hash
            )));
        }

        let mut seen = HashSet::with_capacity(self.special_tokens.len());
        for (token, id) in &self.special_tokens {
            if !seen.insert(*id) {
                return Err(TokenizerError::configuration(format!(
                    "{}: special token {} reuses id {}",
                    self.model_id, token, id
                )));
            }
        }

        Ok(())
    }
}

fn cl100k_base(model_id: &str) -> VocabularyDescriptor {
    VocabularyDescriptor::new(
        model_id,
        VocabularyFormat::Tiktoken {
            encoding: Encoding::Cl100kBase,
        },
        CL100K_BASE_URL,
        CL100K_BASE_SHA256,
    )
    .with_special_token(ENDOFTEXT, 100257)
    .with_special_token(FIM_PREFIX, 100258)
    .with_special_token(FIM_MIDDLE, 100259)
    .with_special_token(FIM_SUFFIX, 100260)
    .with_special_token(ENDOFPROMPT, 100276)
}

fn o200k_base(model_id: &str) -> VocabularyDescriptor {
    VocabularyDescriptor::new(
        model_id,
        VocabularyFormat::Tiktoken {
            encoding: Encoding::O200kBase,
        },
        O200K_BASE_URL,
        O200K_BASE_SHA256,
    )
    .with_special_token(ENDOFTEXT, 199999)
    .with_special_token(ENDOFPROMPT, 200018)
}

/// Read-only lookup from model id to descriptor
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    descriptors: BTreeMap<String, VocabularyDescriptor>,
}

impl DescriptorTable {
    /// An empty table; use [`DescriptorTable::builtin`] for the stock vocabularies
    pub fn new() -> Self {
        Self::default()
    }

    /// The OpenAI vocabularies known out of the box
    pub fn builtin() -> Self {
        let descriptors = [o200k_base("gpt-4o"), cl100k_base("gpt-4"), cl100k_base("gpt-3.5")]
            .into_iter()
            .map(|d| (d.model_id.clone(), d))
            .collect();
        Self { descriptors }
    }

    /// Build a table from an explicit list, rejecting duplicates and invalid entries
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = VocabularyDescriptor>,
    ) -> TokenizerResult<Self> {
        let mut table = Self::new();
        for descriptor in descriptors {
            table.register(descriptor)?;
        }
        Ok(table)
    }

    /// Startup-time registration of an additional vocabulary
    pub fn register(&mut self, descriptor: VocabularyDescriptor) -> TokenizerResult<()> {
        descriptor.validate()?;
        if self.descriptors.contains_key(descriptor.model_id()) {
            return Err(TokenizerError::configuration(format!(
                "duplicate vocabulary descriptor for {}",
                descriptor.model_id()
            )));
        }

        // Case-insensitive filesystems would fold these onto one cache entry
        let file_name = descriptor.file_name().to_ascii_lowercase();
        if let Some(existing) = self
            .descriptors
            .values()
            .find(|d| d.file_name().to_ascii_lowercase() == file_name)
        {
            return Err(TokenizerError::configuration(format!(
                "{} would share cache file {} with {}",
                descriptor.model_id(),
                descriptor.file_name(),
                existing.model_id()
            )));
        }
        self.descriptors.insert(descriptor.model_id.clone(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, model_id: &str) -> TokenizerResult<&VocabularyDescriptor> {
        self.descriptors
            .get(model_id)
            .ok_or_else(|| TokenizerError::unknown_model(model_id))
    }

    #[inline(always)]
    pub fn contains(&self, model_id: &str) -> bool {
        self.descriptors.contains_key(model_id)
    }

    /// Registered model ids in sorted order
    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VocabularyDescriptor> {
        self.descriptors.values()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
