#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fluent_ai_tokenizers::fetch::sha256_hex;
use fluent_ai_tokenizers::{
    DescriptorTable, StaticSource, TokenizerRegistry, VocabularyDescriptor, VocabularyFetcher,
};
use tempfile::TempDir;

pub const GPT35_URL: &str = "https://vocab.test/cl100k_tiny.tiktoken";
pub const GPT4O_URL: &str = "https://vocab.test/o200k_tiny.tiktoken";
pub const BROKEN_URL: &str = "https://vocab.test/unreachable.tiktoken";

/// All 256 single bytes at rank == byte value, plus merges up to "hello" at 259
pub fn tiny_rank_file() -> Vec<u8> {
    let mut lines: Vec<String> = (0u16..256)
        .map(|b| format!("{} {}", STANDARD.encode([b as u8]), b))
        .collect();
    for (rank, token) in ["he", "ll", "llo", "hello"].iter().enumerate() {
        lines.push(format!("{} {}", STANDARD.encode(token.as_bytes()), 256 + rank));
    }
    lines.join("\n").into_bytes()
}

/// Built-in descriptor for `model_id`, repointed at the tiny test vocabulary
pub fn tiny_descriptor(model_id: &str, url: &str) -> VocabularyDescriptor {
    DescriptorTable::builtin()
        .lookup(model_id)
        .unwrap()
        .clone()
        .with_source(url, sha256_hex(&tiny_rank_file()))
}

pub struct Fixture {
    pub cache: TempDir,
    pub source: Arc<StaticSource>,
    pub registry: TokenizerRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        let source = Arc::new(
            StaticSource::new()
                .with_body(GPT35_URL, tiny_rank_file())
                .with_body(GPT4O_URL, tiny_rank_file()),
        );
        Self::with_source(source)
    }

    pub fn with_source(source: Arc<StaticSource>) -> Self {
        let cache = tempfile::tempdir().unwrap();
        let descriptors = DescriptorTable::from_descriptors([
            tiny_descriptor("gpt-3.5", GPT35_URL),
            tiny_descriptor("gpt-4o", GPT4O_URL),
            tiny_descriptor("gpt-4", BROKEN_URL),
        ])
        .unwrap();
        let fetcher = VocabularyFetcher::new(cache.path(), source.clone());
        let registry = TokenizerRegistry::with_parts(descriptors, fetcher, "gpt-4o");
        Self {
            cache,
            source,
            registry,
        }
    }

    pub fn cache_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.cache.path())
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
