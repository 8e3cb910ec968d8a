//! 章全体のトークン化と変換後テキストの生成。
//!
//! 出所の優先順位はルビ、`unique` 層、`common` 層、形態素解析器の順。
//! 上位の出所が覆った範囲に解析器の区間は入らない。部分的に覆われた
//! 解析器の区間は、覆われていない漢字だけを一文字ずつ読む。

use std::ops::Range;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::analyzer::{AnalyzerError, AnalyzerToken, KanaConverter, MorphAnalyzer};
use crate::mapping::{BaseMapping, Tier};
use crate::markup::{ChapterMarkup, RubySpan};
use crate::token::{ReadingSource, Token};
use crate::tracker::ruby_reading;
use crate::util::kana::{
    contains_cjk, is_cjk, is_kana_string, normalize_katakana, normalize_reading, render_plain,
};

/// 元テキストの char 単位の被覆状況。
#[derive(Debug, Clone)]
struct Coverage {
    taken: Vec<bool>,
}

impl Coverage {
    fn new(len: usize) -> Self {
        Self {
            taken: vec![false; len],
        }
    }

    fn is_free(&self, start: usize, end: usize) -> bool {
        start < end && end <= self.taken.len() && self.taken[start..end].iter().all(|t| !t)
    }

    fn is_taken(&self, idx: usize) -> bool {
        self.taken.get(idx).copied().unwrap_or(true)
    }

    fn mark(&mut self, start: usize, end: usize) {
        for slot in &mut self.taken[start..end] {
            *slot = true;
        }
    }

    fn free_runs(&self) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut run_start = None;
        for (idx, taken) in self.taken.iter().enumerate() {
            match (taken, run_start) {
                (false, None) => run_start = Some(idx),
                (true, Some(start)) => {
                    runs.push(start..idx);
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            runs.push(start..self.taken.len());
        }
        runs
    }
}

pub struct TokenBuilder<'a> {
    analyzer: &'a dyn MorphAnalyzer,
    mapping: &'a BaseMapping,
    kana: Option<&'a dyn KanaConverter>,
}

impl<'a> TokenBuilder<'a> {
    #[must_use]
    pub fn new(analyzer: &'a dyn MorphAnalyzer, mapping: &'a BaseMapping) -> Self {
        Self {
            analyzer,
            mapping,
            kana: None,
        }
    }

    /// 一文字読みの最終手段を設定する。
    #[must_use]
    pub fn with_kana_converter(mut self, kana: &'a dyn KanaConverter) -> Self {
        self.kana = Some(kana);
        self
    }

    /// # Errors
    /// 本文の形態素解析に失敗した場合は `AnalyzerError` を返す。
    pub fn build(&self, markup: &ChapterMarkup) -> Result<Vec<Token>, AnalyzerError> {
        let original = markup.original_text();
        self.build_from_text(&original, &markup.ruby_spans())
    }

    /// 元テキストとルビ位置からトークン列を作る。トークンは元テキスト順に並ぶ。
    ///
    /// # Errors
    /// 本文の形態素解析に失敗した場合は `AnalyzerError` を返す。
    pub fn build_from_text(
        &self,
        original: &str,
        ruby_spans: &[RubySpan],
    ) -> Result<Vec<Token>, AnalyzerError> {
        let chars: Vec<char> = original.chars().collect();
        let mut coverage = Coverage::new(chars.len());
        let mut tokens: Vec<Token> = Vec::new();

        for span in ruby_spans {
            let end = span.end.min(chars.len());
            let start = span.start.min(end);
            if !coverage.is_free(start, end) {
                continue;
            }
            let reading = ruby_reading(&span.reading);
            if reading.is_empty() {
                continue;
            }
            let surface: String = chars[start..end].iter().collect();
            let mut token = Token::new(surface, reading, ReadingSource::Ruby, start, end);
            token.fallback_reading = self.analyzer_fallback(&token.surface, &token.reading);
            tokens.push(token);
            coverage.mark(start, end);
        }

        for tier in [Tier::Unique, Tier::Common] {
            for run in coverage.free_runs() {
                for hit in self.mapping.find_matches(&chars, run, tier) {
                    if !coverage.is_free(hit.start, hit.end) {
                        continue;
                    }
                    let surface: String = chars[hit.start..hit.end].iter().collect();
                    tokens.push(Token::new(
                        surface,
                        hit.entry.reading.clone(),
                        hit.entry.source,
                        hit.start,
                        hit.end,
                    ));
                    coverage.mark(hit.start, hit.end);
                }
            }
        }

        for raw in self.analyzer.tokenize(original)? {
            if raw.start >= raw.end
                || raw.end > chars.len()
                || chars[raw.start..raw.end].iter().copied().ne(raw.surface.chars())
            {
                debug!(surface = %raw.surface, start = raw.start, end = raw.end, "analyzer span does not match text");
                continue;
            }
            if coverage.is_free(raw.start, raw.end)
                && let Some(token) = analyzer_token(&raw)
            {
                tokens.push(token);
                coverage.mark(raw.start, raw.end);
                continue;
            }
            for idx in raw.start..raw.end {
                self.fill_char(&chars, idx, &mut coverage, &mut tokens);
            }
        }

        // 解析器が区間を返さなかった漢字
        for idx in 0..chars.len() {
            self.fill_char(&chars, idx, &mut coverage, &mut tokens);
        }

        tokens.sort_by_key(|token| (token.original_start, token.original_end));
        Ok(tokens)
    }

    /// ルビ表層の辞書読み。ルビの読みと異なる場合だけ返す。
    fn analyzer_fallback(&self, surface: &str, reading: &str) -> Option<String> {
        let fallback = normalize_reading(&self.analyzer.to_reading_text(surface).ok()?);
        (!fallback.is_empty() && !contains_cjk(&fallback) && fallback != reading).then_some(fallback)
    }

    fn fill_char(&self, chars: &[char], idx: usize, coverage: &mut Coverage, tokens: &mut Vec<Token>) {
        if coverage.is_taken(idx) || !is_cjk(chars[idx]) {
            return;
        }
        match self.char_reading(chars[idx], idx, tokens) {
            Some(reading) => {
                tokens.push(Token::new(
                    chars[idx].to_string(),
                    reading,
                    ReadingSource::Unidic,
                    idx,
                    idx + 1,
                ));
                coverage.mark(idx, idx + 1);
            }
            None => debug!(ch = %chars[idx], offset = idx, "no reading for character"),
        }
    }

    /// 一文字の読み。再解析、仮名変換の順に試す。`々` は直前の一文字読みを繰り返す。
    fn char_reading(&self, ch: char, idx: usize, tokens: &[Token]) -> Option<String> {
        if ch == '々'
            && let Some(prev) = tokens
                .iter()
                .find(|token| token.original_end == idx && token.original_len() == 1)
            && !prev.reading.is_empty()
        {
            return Some(prev.reading.clone());
        }

        let single = ch.to_string();
        if let Ok(found) = self.analyzer.tokenize(&single)
            && let Some(token) = found.iter().find(|token| token.has_usable_reading())
        {
            let reading = normalize_reading(&token.reading);
            if !reading.is_empty() {
                return Some(reading);
            }
        }

        let converted = normalize_reading(&self.kana?.to_katakana(&single)?);
        (!converted.is_empty() && !contains_cjk(&converted)).then_some(converted)
    }
}

/// 被覆されていない解析器区間をトークンにする。一文字読みに回すべきなら `None`。
fn analyzer_token(raw: &AnalyzerToken) -> Option<Token> {
    let reading = if contains_cjk(&raw.surface) {
        if !raw.has_usable_reading() {
            return None;
        }
        normalize_reading(&raw.reading)
    } else if is_kana_string(&raw.surface) {
        normalize_reading(&raw.surface)
    } else {
        return None;
    };
    if reading.is_empty() {
        return None;
    }
    let mut token = Token::new(
        raw.surface.clone(),
        reading,
        ReadingSource::Unidic,
        raw.start,
        raw.end,
    );
    token.accent_type = raw.accent_type;
    token.accent_connection = raw.accent_connection.clone();
    token.part_of_speech = raw.part_of_speech.clone();
    Some(token)
}

/// トークン列から変換後テキストを組み立て、変換後オフセットを設定する。
///
/// `preserve_unambiguous` が真なら、章内で読みが一通りしかない解析器由来の
/// 漢字表層は書き換えずに残す。結果の前後の空白は取り除く。
#[must_use]
pub fn render(original: &str, mut tokens: Vec<Token>, preserve_unambiguous: bool) -> (String, Vec<Token>) {
    let chars: Vec<char> = original.chars().collect();
    tokens.sort_by_key(|token| (token.original_start, token.original_end));

    let ambiguous = if preserve_unambiguous {
        ambiguous_surfaces(&tokens)
    } else {
        FxHashMap::default()
    };

    let mut out = String::with_capacity(original.len() * 2);
    let mut out_len = 0;
    let mut cursor = 0;
    let mut kept: Vec<Token> = Vec::with_capacity(tokens.len());

    for mut token in tokens {
        if token.original_start < cursor || token.original_end > chars.len() {
            debug!(surface = %token.surface, start = token.original_start, "dropping overlapping token");
            continue;
        }
        if token.original_start > cursor {
            let gap: String = chars[cursor..token.original_start].iter().collect();
            let rendered = render_plain(&gap);
            out_len += rendered.chars().count();
            out.push_str(&rendered);
        }

        let preserve = preserve_unambiguous
            && token.reading_source == ReadingSource::Unidic
            && contains_cjk(&token.surface)
            && ambiguous.get(token.surface.as_str()) == Some(&false);
        let emitted = if preserve {
            token.surface.clone()
        } else {
            let emitted = normalize_katakana(token.spoken());
            token.reading.clone_from(&emitted);
            emitted
        };

        token.transformed_start = out_len;
        out_len += emitted.chars().count();
        token.transformed_end = out_len;
        out.push_str(&emitted);
        cursor = token.original_end;
        kept.push(token);
    }
    if cursor < chars.len() {
        let tail: String = chars[cursor..].iter().collect();
        out.push_str(&render_plain(&tail));
    }

    trim_transformed(&out, kept)
}

/// 表層ごとに、章内で読みが割れているか。
fn ambiguous_surfaces(tokens: &[Token]) -> FxHashMap<String, bool> {
    let mut first: FxHashMap<&str, &str> = FxHashMap::default();
    let mut ambiguous: FxHashMap<String, bool> = FxHashMap::default();
    for token in tokens {
        let reading = *first.entry(token.surface.as_str()).or_insert(token.spoken());
        *ambiguous.entry(token.surface.clone()).or_insert(false) |= reading != token.spoken();
    }
    ambiguous
}

fn trim_transformed(text: &str, mut tokens: Vec<Token>) -> (String, Vec<Token>) {
    let leading = text.chars().take_while(|ch| ch.is_whitespace()).count();
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if leading > 0 || trimmed.len() != text.len() {
        for token in &mut tokens {
            token.transformed_start = token.transformed_start.saturating_sub(leading).min(len);
            token.transformed_end = token.transformed_end.saturating_sub(leading).min(len);
        }
    }
    (trimmed.to_string(), tokens)
}
