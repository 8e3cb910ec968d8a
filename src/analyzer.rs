//! 形態素解析器の抽象。
//!
//! パイプラインは具体的な解析器を知らず、`MorphAnalyzer` の四つの操作だけを使う。
//! 既定実装は `tokenize` から残り三つを組み立てる。

pub mod dictionary;
#[cfg(feature = "ipadic")]
pub mod lindera;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::util::kana::{hiragana_to_katakana, normalize_katakana};

/// 解析器が返す一区間。オフセットは char 単位で `text[start..end] == surface`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerToken {
    pub surface: String,
    pub start: usize,
    pub end: usize,
    pub reading: String,
    pub accent_type: Option<u16>,
    pub accent_connection: Option<String>,
    pub part_of_speech: Option<String>,
}

impl AnalyzerToken {
    /// 読みが空でなく、漢字が残っていないか。
    #[must_use]
    pub fn has_usable_reading(&self) -> bool {
        !self.reading.trim().is_empty() && !crate::util::kana::contains_cjk(&self.reading)
    }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("morphological analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("morphological analysis failed: {0}")]
    Failed(String),
}

/// 形態素解析器の能力。
pub trait MorphAnalyzer: Send + Sync {
    /// 本文を区間列に分割する。
    ///
    /// # Errors
    /// 解析に失敗した場合はエラーを返す。
    fn tokenize(&self, text: &str) -> Result<Vec<AnalyzerToken>, AnalyzerError>;

    /// 基底文字列に対して辞書が持つ読みの候補。
    ///
    /// # Errors
    /// 解析に失敗した場合はエラーを返す。
    fn reading_variants(&self, base: &str) -> Result<BTreeSet<String>, AnalyzerError> {
        let reading = self.to_reading_text(base)?;
        let mut variants = BTreeSet::new();
        if !reading.is_empty() {
            variants.insert(reading);
        }
        Ok(variants)
    }

    /// 本文全体を片仮名の読みに変換する。読みのない区間は表層のまま残る。
    ///
    /// # Errors
    /// 解析に失敗した場合はエラーを返す。
    fn to_reading_text(&self, text: &str) -> Result<String, AnalyzerError> {
        let tokens = self.tokenize(text)?;
        Ok(join_readings(text, &tokens))
    }

    /// 読みと、アクセント情報付きの区間列を同時に返す。
    ///
    /// # Errors
    /// 解析に失敗した場合はエラーを返す。
    fn to_reading_with_pitch(
        &self,
        text: &str,
    ) -> Result<(String, Vec<AnalyzerToken>), AnalyzerError> {
        let tokens = self.tokenize(text)?;
        let reading = join_readings(text, &tokens);
        Ok((reading, tokens))
    }
}

/// 解析器で読みが得られなかった文字の最終手段。
pub trait KanaConverter: Send + Sync {
    fn to_katakana(&self, text: &str) -> Option<String>;
}

/// 区間の読み（なければ表層）と区間外の文字を順に連結する。
pub(crate) fn join_readings(text: &str, tokens: &[AnalyzerToken]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for token in tokens {
        if token.start < cursor || token.end > chars.len() {
            continue;
        }
        out.extend(&chars[cursor..token.start]);
        if token.reading.is_empty() {
            out.push_str(&token.surface);
        } else {
            out.push_str(&token.reading);
        }
        cursor = token.end;
    }
    out.extend(&chars[cursor.min(chars.len())..]);
    normalize_katakana(&hiragana_to_katakana(&out))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SplitAnalyzer;

    impl MorphAnalyzer for SplitAnalyzer {
        fn tokenize(&self, text: &str) -> Result<Vec<AnalyzerToken>, AnalyzerError> {
            if text.starts_with("赤鉛筆") {
                return Ok(vec![
                    AnalyzerToken {
                        surface: "赤".to_string(),
                        start: 0,
                        end: 1,
                        reading: "あか".to_string(),
                        ..AnalyzerToken::default()
                    },
                    AnalyzerToken {
                        surface: "鉛筆".to_string(),
                        start: 1,
                        end: 3,
                        reading: "エンピツ".to_string(),
                        ..AnalyzerToken::default()
                    },
                ]);
            }
            Err(AnalyzerError::Failed(format!("unknown text: {text}")))
        }
    }

    #[test]
    fn default_reading_text_joins_gaps_and_readings() {
        let reading = SplitAnalyzer.to_reading_text("赤鉛筆で").expect("reading");
        assert_eq!(reading, "アカエンピツデ");
    }

    #[test]
    fn default_variants_wrap_reading_text() {
        let variants = SplitAnalyzer.reading_variants("赤鉛筆").expect("variants");
        assert_eq!(variants.into_iter().collect::<Vec<_>>(), vec!["アカエンピツ"]);
    }

    #[test]
    fn errors_propagate_from_tokenize() {
        assert!(SplitAnalyzer.to_reading_with_pitch("青").is_err());
    }

    #[test]
    fn usable_reading_rejects_empty_and_kanji() {
        let mut token = AnalyzerToken {
            surface: "鉛".to_string(),
            ..AnalyzerToken::default()
        };
        assert!(!token.has_usable_reading());
        token.reading = "鉛".to_string();
        assert!(!token.has_usable_reading());
        token.reading = "ナマリ".to_string();
        assert!(token.has_usable_reading());
    }
}
