//! IPADIC analyzer backed by lindera.
//!
//! IPADIC carries readings and part of speech but no pitch accent, so tokens from
//! this analyzer never set `accent_type`.

use lindera::tokenizer::{Tokenizer as LinderaTokenizer, TokenizerConfig as LinderaConfig};

use super::{AnalyzerError, AnalyzerToken, MorphAnalyzer};
use crate::util::kana::normalize_reading;

// IPADIC の素性列: 品詞, 品詞細分類1-3, 活用型, 活用形, 原形, 読み, 発音
const POS_INDEX: usize = 0;
const READING_INDEX: usize = 7;

pub struct LinderaAnalyzer {
    tokenizer: LinderaTokenizer,
}

impl LinderaAnalyzer {
    /// # Errors
    /// Returns `AnalyzerError::Unavailable` when the dictionary cannot be loaded.
    pub fn new() -> Result<Self, AnalyzerError> {
        let tokenizer = LinderaTokenizer::from_config(LinderaConfig::default())
            .map_err(|error| AnalyzerError::Unavailable(error.to_string()))?;
        Ok(Self { tokenizer })
    }
}

impl std::fmt::Debug for LinderaAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinderaAnalyzer").finish()
    }
}

impl MorphAnalyzer for LinderaAnalyzer {
    fn tokenize(&self, text: &str) -> Result<Vec<AnalyzerToken>, AnalyzerError> {
        let raw_tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|error| AnalyzerError::Failed(error.to_string()))?;

        let mut tokens = Vec::with_capacity(raw_tokens.len());
        let mut cursor = 0;
        for mut token in raw_tokens {
            let surface = token.get_text().to_string();
            let len = surface.chars().count();
            let details: Vec<String> = token
                .get_details()
                .map(|details| details.iter().map(|item| item.to_string()).collect())
                .unwrap_or_default();

            let reading = details
                .get(READING_INDEX)
                .filter(|value| value.as_str() != "*")
                .map(|value| normalize_reading(value))
                .unwrap_or_default();
            let part_of_speech = details
                .get(POS_INDEX)
                .filter(|value| value.as_str() != "*" && value.as_str() != "UNK")
                .cloned();

            tokens.push(AnalyzerToken {
                surface,
                start: cursor,
                end: cursor + len,
                reading,
                accent_type: None,
                accent_connection: None,
                part_of_speech,
            });
            cursor += len;
        }
        Ok(tokens)
    }
}
