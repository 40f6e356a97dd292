//! Backend for Hugging Face `tokenizer.json` files

use tokenizers::Tokenizer;

use super::Encoder;
use crate::descriptor::VocabularyDescriptor;
use crate::error::{TokenizerError, TokenizerResult};

pub struct HuggingFaceEncoder {
    model_id: String,
    tokenizer: Tokenizer,
}

impl HuggingFaceEncoder {
    /// Parse a `tokenizer.json` and check every descriptor special token resolves to its reserved id
    pub fn from_bytes(contents: &[u8], descriptor: &VocabularyDescriptor) -> TokenizerResult<Self> {
        let model_id = descriptor.model_id();
        let tokenizer = Tokenizer::from_bytes(contents).map_err(|e| TokenizerError::vocabulary_format(model_id, e))?;

        for (token, id) in descriptor.special_tokens() {
            match tokenizer.token_to_id(token) {
                Some(found) if found == *id => {}
                found => {
                    return Err(TokenizerError::vocabulary_format(
                        model_id,
                        format!("special token {} should be id {}, vocabulary has {:?}", token, id, found),
                    ))
                }
            }
        }

        Ok(Self {
            model_id: model_id.to_string(),
            tokenizer,
        })
    }
}

impl Encoder for HuggingFaceEncoder {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, false).map_err(|e| TokenizerError::Encoding {
            model_id: self.model_id.clone(),
            message: e.to_string(),
        })?;
        Ok(encoding.get_ids().to_vec())
    }
}
