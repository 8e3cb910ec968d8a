/// ルビ注記からの証拠収集。
///
/// 章ごとに集計し、書籍全体の集計へ統合する。コーパス辞書の証拠は
/// 書籍内に観測のない基底文字列に限って取り込む。
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use super::accumulator::{Observation, ReadingAccumulator};
use super::corpus::CorpusDictionary;
use crate::markup::{ChapterMarkup, MarkupNode};
use crate::token::ReadingSource;
use crate::util::kana::{
    contains_cjk, is_kana, is_kana_string, is_single_kanji_base, looks_like_ascii_word,
    normalize_base, normalize_reading,
};

/// 送り仮名として記録する最大文字数。
const MAX_SUFFIX_CHARS: usize = 4;

/// 正規化済みのルビ対。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubyPair {
    pub base: String,
    pub reading: String,
    pub raw_reading: String,
}

impl RubyPair {
    /// 基底と読みを正規化する。証拠として使えない対は `None`。
    #[must_use]
    pub fn normalize(base: &str, reading: &str) -> Option<Self> {
        let base = normalize_base(base);
        if base.is_empty() || !(contains_cjk(&base) || looks_like_ascii_word(&base)) {
            return None;
        }
        let normalized = normalize_reading(reading);
        if normalized.is_empty() || !is_kana_string(&normalized) {
            return None;
        }
        Some(Self {
            base,
            reading: normalized,
            raw_reading: reading.trim().to_string(),
        })
    }

    fn is_single_kanji(&self) -> bool {
        is_single_kanji_base(&self.base)
    }
}

/// 一章分の集計。
#[derive(Debug, Clone, Default)]
pub struct ChapterEvidence {
    accumulators: FxHashMap<String, ReadingAccumulator>,
}

impl ChapterEvidence {
    #[must_use]
    pub fn get(&self, base: &str) -> Option<&ReadingAccumulator> {
        self.accumulators.get(base)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    fn register(&mut self, base: &str, reading: &str, raw_reading: &str, suffix: &str) {
        self.accumulators
            .entry(base.to_string())
            .or_default()
            .register(&Observation {
                base,
                reading,
                raw_reading,
                suffix,
                prefix: "",
                count: 1,
            });
    }
}

/// 章のルビ注記を集計する。
///
/// 単漢字ルビが二つ以上連続する場合は、連結した基底と読みを
/// 複合語として別に登録する。
#[must_use]
pub fn collect_chapter(markup: &ChapterMarkup) -> ChapterEvidence {
    let nodes = &markup.nodes;
    let pairs: Vec<Option<RubyPair>> = nodes
        .iter()
        .map(|node| match node {
            MarkupNode::Ruby { base, reading } => RubyPair::normalize(base, reading),
            MarkupNode::Text { .. } => None,
        })
        .collect();

    let mut evidence = ChapterEvidence::default();
    let mut skipped = 0_usize;

    for (idx, node) in nodes.iter().enumerate() {
        if !matches!(node, MarkupNode::Ruby { .. }) {
            continue;
        }
        let Some(pair) = &pairs[idx] else {
            skipped += 1;
            continue;
        };

        let suffix = kana_suffix_after(nodes, idx);
        evidence.register(&pair.base, &pair.reading, &pair.raw_reading, &suffix);

        if !pair.is_single_kanji() || previous_is_single_kanji_ruby(nodes, &pairs, idx) {
            continue;
        }
        let group = single_kanji_run(nodes, &pairs, idx);
        if group.len() < 2 {
            continue;
        }
        let mut base = String::new();
        let mut reading = String::new();
        let mut raw_reading = String::new();
        for &member in &group {
            if let Some(member_pair) = &pairs[member] {
                base.push_str(&member_pair.base);
                reading.push_str(&member_pair.reading);
                raw_reading.push_str(&member_pair.raw_reading);
            }
        }
        let last = group.last().copied().unwrap_or(idx);
        let compound_suffix = kana_suffix_after(nodes, last);
        evidence.register(&base, &reading, &raw_reading, &compound_suffix);
    }

    if skipped > 0 {
        debug!(chapter = %markup.id, skipped, "skipped ruby pairs without usable evidence");
    }
    evidence
}

fn previous_significant(nodes: &[MarkupNode], idx: usize) -> Option<usize> {
    (0..idx).rev().find(|&pos| !nodes[pos].is_whitespace_text())
}

fn previous_is_single_kanji_ruby(
    nodes: &[MarkupNode],
    pairs: &[Option<RubyPair>],
    idx: usize,
) -> bool {
    previous_significant(nodes, idx)
        .and_then(|pos| pairs[pos].as_ref())
        .is_some_and(RubyPair::is_single_kanji)
}

/// `start` から始まる単漢字ルビの連続（空白だけのテキストは読み飛ばす）。
fn single_kanji_run(nodes: &[MarkupNode], pairs: &[Option<RubyPair>], start: usize) -> Vec<usize> {
    let mut group = vec![start];
    let mut pos = start + 1;
    while pos < nodes.len() {
        if nodes[pos].is_whitespace_text() {
            pos += 1;
            continue;
        }
        match &pairs[pos] {
            Some(pair) if pair.is_single_kanji() => {
                group.push(pos);
                pos += 1;
            }
            _ => break,
        }
    }
    group
}

/// ルビ直後のテキストに続く仮名の並び。
fn kana_suffix_after(nodes: &[MarkupNode], idx: usize) -> String {
    match nodes.get(idx + 1) {
        Some(MarkupNode::Text { text }) => text
            .chars()
            .take_while(|&ch| is_kana(ch) && ch != '・')
            .take(MAX_SUFFIX_CHARS)
            .collect(),
        _ => String::new(),
    }
}

/// 書籍全体の証拠。書籍内の観測とコーパス由来の観測を分けて持つ。
#[derive(Debug, Clone, Default)]
pub struct BookEvidence {
    in_book: BTreeMap<String, ReadingAccumulator>,
    corpus: BTreeMap<String, ReadingAccumulator>,
}

impl BookEvidence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 章の集計をまとめて作る。
    #[must_use]
    pub fn from_chapters<'a>(chapters: impl IntoIterator<Item = &'a ChapterMarkup>) -> Self {
        let mut book = Self::new();
        let mut chapter_count = 0_usize;
        for chapter in chapters {
            book.merge_chapter(collect_chapter(chapter));
            chapter_count += 1;
        }
        info!(
            chapters = chapter_count,
            bases = book.in_book.len(),
            "collected ruby evidence"
        );
        book
    }

    pub fn merge_chapter(&mut self, chapter: ChapterEvidence) {
        for (base, accumulator) in chapter.accumulators {
            self.in_book
                .entry(base)
                .or_default()
                .merge_from(&accumulator);
        }
    }

    /// コーパスの証拠を取り込む。書籍内で観測済みの基底は対象外。
    pub fn merge_corpus(&mut self, corpus: &CorpusDictionary) {
        let mut merged = 0_usize;
        for (base, accumulator) in corpus.accumulators() {
            if self.in_book.get(base).is_some_and(|acc| acc.total() > 0) {
                continue;
            }
            self.corpus
                .entry(base.clone())
                .or_default()
                .merge_from(accumulator);
            merged += 1;
        }
        debug!(merged, "merged corpus evidence");
    }

    /// 選択に使う全エントリ。書籍内の証拠を先に、次にコーパスの証拠を返す。
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ReadingAccumulator, ReadingSource)> {
        self.in_book
            .iter()
            .map(|(base, acc)| (base.as_str(), acc, ReadingSource::Propagation))
            .chain(
                self.corpus
                    .iter()
                    .map(|(base, acc)| (base.as_str(), acc, ReadingSource::Corpus)),
            )
    }

    #[must_use]
    pub fn in_book(&self) -> &BTreeMap<String, ReadingAccumulator> {
        &self.in_book
    }

    #[must_use]
    pub fn get(&self, base: &str) -> Option<&ReadingAccumulator> {
        self.in_book.get(base).or_else(|| self.corpus.get(base))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.in_book.len() + self.corpus.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
