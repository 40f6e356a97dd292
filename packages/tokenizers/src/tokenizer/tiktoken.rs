//! Backend for `.tiktoken` rank files

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tiktoken_rs::CoreBPE;
use tracing::debug;

use super::Encoder;
use crate::descriptor::{Encoding, VocabularyDescriptor};
use crate::error::{TokenizerError, TokenizerResult};

/// Parse `base64(token) SP rank` lines into a token -> rank table.
///
/// Blank lines are skipped. Duplicate tokens or ranks are rejected since the
/// merge table must be a bijection.
pub fn parse_ranks(model_id: &str, contents: &[u8]) -> TokenizerResult<HashMap<Vec<u8>, u32>> {
    let text = std::str::from_utf8(contents)
        .map_err(|e| TokenizerError::vocabulary_format(model_id, format!("not utf-8: {}", e)))?;

    let mut ranks = HashMap::new();
    let mut seen_ranks = HashSet::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;

        let (token, rank) = line.split_once(' ').ok_or_else(|| {
            TokenizerError::vocabulary_format(model_id, format!("line {}: expected `<base64> <rank>`", line_no))
        })?;
        let token = STANDARD.decode(token).map_err(|e| {
            TokenizerError::vocabulary_format(model_id, format!("line {}: bad base64: {}", line_no, e))
        })?;
        let rank: u32 = rank.trim().parse().map_err(|e| {
            TokenizerError::vocabulary_format(model_id, format!("line {}: bad rank: {}", line_no, e))
        })?;

        if !seen_ranks.insert(rank) {
            return Err(TokenizerError::vocabulary_format(
                model_id,
                format!("line {}: rank {} assigned twice", line_no, rank),
            ));
        }
        if ranks.insert(token, rank).is_some() {
            return Err(TokenizerError::vocabulary_format(
                model_id,
                format!("line {}: token listed twice", line_no),
            ));
        }
    }

    if ranks.is_empty() {
        return Err(TokenizerError::vocabulary_format(model_id, "empty rank file"));
    }
    Ok(ranks)
}

pub struct TiktokenEncoder {
    bpe: CoreBPE,
}

impl TiktokenEncoder {
    pub fn from_bytes(contents: &[u8], descriptor: &VocabularyDescriptor, encoding: Encoding) -> TokenizerResult<Self> {
        let model_id = descriptor.model_id();
        let ranks = parse_ranks(model_id, contents)?;

        let base_ids: HashSet<u32> = ranks.values().copied().collect();
        for (token, id) in descriptor.special_tokens() {
            if base_ids.contains(id) {
                return Err(TokenizerError::vocabulary_format(
                    model_id,
                    format!("special token {} id {} collides with a base rank", token, id),
                ));
            }
        }

        debug!(
            model_id,
            encoding = encoding.name(),
            ranks = ranks.len(),
            special_tokens = descriptor.special_tokens().len(),
            "building BPE"
        );

        let bpe = CoreBPE::new(
            ranks.into_iter().map(|(token, rank)| (token, rank as _)).collect(),
            descriptor
                .special_tokens()
                .iter()
                .map(|(token, id)| (token.clone(), *id as _))
                .collect(),
            encoding.pattern(),
        )
        .map_err(|e| TokenizerError::vocabulary_format(model_id, e))?;

        Ok(Self { bpe })
    }
}

impl Encoder for TiktokenEncoder {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<u32>> {
        Ok(self
            .bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|token| token as u32)
            .collect())
    }

    fn count(&self, text: &str) -> TokenizerResult<usize> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}
