//! Longest-base-first matching over char slices, plus the adjacency guards.

use std::ops::Range;

use aho_corasick::{AhoCorasick, MatchKind};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::util::kana::is_cjk;

/// Aho-Corasick automaton over one tier's bases.
#[derive(Debug, Clone, Default)]
pub(crate) struct TierMatcher {
    automaton: Option<AhoCorasick>,
}

/// A raw hit: char offsets plus the index of the matched pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawMatch {
    pub start: usize,
    pub end: usize,
    pub pattern: usize,
}

impl TierMatcher {
    pub(crate) fn new(patterns: &[&str]) -> Self {
        if patterns.is_empty() {
            return Self::default();
        }
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(patterns);
        match automaton {
            Ok(automaton) => Self {
                automaton: Some(automaton),
            },
            Err(error) => {
                warn!(error = %error, patterns = patterns.len(), "failed to build mapping automaton");
                Self::default()
            }
        }
    }

    /// Non-overlapping leftmost-longest matches inside `range` of `chars`.
    pub(crate) fn find(&self, chars: &[char], range: Range<usize>) -> Vec<RawMatch> {
        let Some(automaton) = &self.automaton else {
            return Vec::new();
        };
        if range.start >= range.end {
            return Vec::new();
        }
        let window = FoldedWindow::new(&chars[range.clone()]);
        automaton
            .find_iter(&window.text)
            .filter_map(|hit| {
                let (start, end) = window.char_span(hit.start(), hit.end())?;
                Some(RawMatch {
                    start: range.start + start,
                    end: range.start + end,
                    pattern: hit.pattern().as_usize(),
                })
            })
            .collect()
    }
}

/// NFKC で畳み込んだ検索窓。基底は NFKC 済みなので、全角英数字の本文にも当たる。
struct FoldedWindow {
    text: String,
    // 元の i 文字目の畳み込み結果が始まるバイト位置。末尾に全長を持つ。
    starts: Vec<usize>,
}

impl FoldedWindow {
    fn new(chars: &[char]) -> Self {
        let mut text = String::with_capacity(chars.len() * 3);
        let mut starts = Vec::with_capacity(chars.len() + 1);
        for ch in chars {
            starts.push(text.len());
            text.extend(std::iter::once(*ch).nfkc());
        }
        starts.push(text.len());
        Self { text, starts }
    }

    /// 畳み込み後のバイト範囲を元の文字範囲に戻す。一文字の展開の途中で
    /// 切れる範囲は `None`。
    fn char_span(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let first = self.starts.binary_search(&start).ok()?;
        let last = self.starts.binary_search(&end).ok()?;
        (first < last).then_some((first, last))
    }
}

/// 半角・全角どちらの英数字も単語の一部とみなす。
fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || (('\u{FF10}'..='\u{FF5A}').contains(&ch) && ch.is_alphanumeric())
}

/// Rejects matches that would split a number, a single-kanji compound, or an
/// alphanumeric word.
pub(crate) fn match_allowed(chars: &[char], start: usize, end: usize) -> bool {
    if start >= end || end > chars.len() {
        return false;
    }
    let prev = start.checked_sub(1).map(|idx| chars[idx]);
    let next = chars.get(end).copied();
    let first = chars[start];
    let last = chars[end - 1];

    if first.is_numeric() && prev.is_some_and(char::is_numeric) {
        return false;
    }
    if last.is_numeric() && next.is_some_and(char::is_numeric) {
        return false;
    }

    if end - start == 1 {
        if prev.is_some_and(|ch| ch != '\n' && is_cjk(ch)) || next.is_some_and(is_cjk) {
            return false;
        }
        if is_word_char(first) && (prev.is_some_and(is_word_char) || next.is_some_and(is_word_char)) {
            return false;
        }
    }
    true
}
