/// ルビ・コーパス・伝播由来のトークンにアクセント情報を補う。
///
/// 表層ごとの問い合わせ結果は呼び出し側が持つ `PitchCache` に溜める。
/// キャッシュは書籍や章をまたいで共有しない。
use rustc_hash::FxHashMap;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::analyzer::MorphAnalyzer;
use crate::token::{ReadingSource, Token};
use crate::util::kana::normalize_katakana;

/// 解析器が一語として返したアクセント情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchEntry {
    pub reading: String,
    pub accent_type: u16,
    pub accent_connection: Option<String>,
    pub part_of_speech: Option<String>,
}

#[derive(Debug, Default)]
pub struct PitchCache {
    entries: FxHashMap<String, Option<PitchEntry>>,
    lookups: usize,
}

impl PitchCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析器への問い合わせ回数。
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_or_lookup(&mut self, surface: &str, analyzer: &dyn MorphAnalyzer) -> Option<&PitchEntry> {
        let key: String = surface.nfkc().collect();
        if !self.entries.contains_key(&key) {
            self.lookups += 1;
            let entry = lookup_surface(surface, analyzer);
            self.entries.insert(key.clone(), entry);
        }
        self.entries.get(&key).and_then(Option::as_ref)
    }
}

/// 表層を一語として読ませ、アクセント付きの一語が返ったときだけ採る。
fn lookup_surface(surface: &str, analyzer: &dyn MorphAnalyzer) -> Option<PitchEntry> {
    if surface.is_empty() {
        return None;
    }
    let (reading_text, tokens) = match analyzer.to_reading_with_pitch(surface) {
        Ok(result) => result,
        Err(error) => {
            debug!(surface, error = %error, "pitch lookup failed");
            return None;
        }
    };
    let [token] = tokens.as_slice() else {
        return None;
    };
    let accent_type = token.accent_type?;
    if token.reading.is_empty() {
        return None;
    }
    let whole = normalize_katakana(reading_text.trim());
    if whole.is_empty() || normalize_katakana(&token.reading) != whole {
        return None;
    }
    Some(PitchEntry {
        reading: whole,
        accent_type,
        accent_connection: token.accent_connection.clone(),
        part_of_speech: token.part_of_speech.clone(),
    })
}

/// アクセントのないトークンに辞書のアクセントを写す。写した件数を返す。
///
/// 解析器由来のトークン、読みのないトークン、辞書の読みとトークンの読みが
/// 一致しないトークンは触らない。トークンの読み自体は変更しない。
pub fn enrich(tokens: &mut [Token], analyzer: &dyn MorphAnalyzer, cache: &mut PitchCache) -> usize {
    let mut filled = 0;
    for token in tokens.iter_mut() {
        if token.accent_type.is_some()
            || token.reading.is_empty()
            || token.surface.is_empty()
            || token.reading_source == ReadingSource::Unidic
        {
            continue;
        }
        let reading = normalize_katakana(&token.reading);
        if reading.is_empty() {
            continue;
        }
        let Some(entry) = cache.get_or_lookup(&token.surface, analyzer) else {
            continue;
        };
        if entry.reading != reading {
            continue;
        }
        token.accent_type = Some(entry.accent_type);
        token.accent_connection.clone_from(&entry.accent_connection);
        if entry.part_of_speech.is_some() {
            token.part_of_speech.clone_from(&entry.part_of_speech);
        }
        filled += 1;
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::dictionary::{DictionaryAnalyzer, DictionaryEntry};

    fn analyzer() -> DictionaryAnalyzer {
        DictionaryAnalyzer::new()
            .with_entry(
                "馬締",
                DictionaryEntry::new("マジメ")
                    .with_accent(0)
                    .with_connection("C1")
                    .with_pos("名詞"),
            )
            .with_entry("東京", DictionaryEntry::new("トウキョウ").with_accent(0))
            .with_word("温水", "オンスイ")
    }

    #[test]
    fn repeated_surfaces_cost_one_lookup() {
        let analyzer = analyzer();
        let mut tokens = vec![
            Token::new("馬締", "マジメ", ReadingSource::Propagation, 0, 2),
            Token::new("馬締", "マジメ", ReadingSource::Ruby, 5, 7),
            Token::new("馬締", "マジメ", ReadingSource::Corpus, 9, 11),
        ];
        let mut cache = PitchCache::new();
        assert_eq!(enrich(&mut tokens, &analyzer, &mut cache), 3);
        assert_eq!(analyzer.pitch_calls(), 1);
        assert_eq!(cache.lookups(), 1);
        for token in &tokens {
            assert_eq!(token.accent_type, Some(0));
            assert_eq!(token.accent_connection.as_deref(), Some("C1"));
            assert_eq!(token.part_of_speech.as_deref(), Some("名詞"));
            assert_eq!(token.reading, "マジメ");
        }
    }

    #[test]
    fn analyzer_tokens_and_mismatched_readings_are_left_alone() {
        let analyzer = analyzer();
        let mut tokens = vec![
            Token::new("東京", "トウキョウ", ReadingSource::Unidic, 0, 2),
            Token::new("東京", "トウケイ", ReadingSource::Propagation, 3, 5),
            Token::new("温水", "ヌクミズ", ReadingSource::Ruby, 6, 8),
        ];
        let mut cache = PitchCache::new();
        assert_eq!(enrich(&mut tokens, &analyzer, &mut cache), 0);
        assert!(tokens.iter().all(|t| t.accent_type.is_none()));
        assert_eq!(tokens[1].reading, "トウケイ");
        // 温水 は一語で返るがアクセントがないので採らない
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn multi_token_lookups_are_rejected() {
        let analyzer = analyzer();
        let mut tokens = vec![Token::new("馬締東京", "マジメトウキョウ", ReadingSource::Ruby, 0, 4)];
        let mut cache = PitchCache::new();
        assert_eq!(enrich(&mut tokens, &analyzer, &mut cache), 0);
        assert!(tokens[0].accent_type.is_none());
    }
}
