/// 証拠の集計から二層のマッピングを選ぶ。
///
/// `fast` は集計の占有率だけで判定し、`advanced` は形態素解析器の
/// 辞書読みと突き合わせる。`advanced` で解析器がなければ、章の処理に
/// 入る前に構築時点で失敗する。
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::context::ContextRule;
use super::{BaseMapping, MappingEntry, Tier};
use crate::analyzer::MorphAnalyzer;
use crate::evidence::{BookEvidence, ReadingAccumulator, ReadingStats};
use crate::token::ReadingSource;
use crate::util::kana::{
    differs_only_by_small_kana, is_cjk, looks_like_ascii_word, normalize_reading,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Fast,
    Advanced,
}

impl fmt::Display for ReadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => f.write_str("fast"),
            Self::Advanced => f.write_str("advanced"),
        }
    }
}

impl FromStr for ReadingMode {
    type Err = SelectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "advanced" => Ok(Self::Advanced),
            other => Err(SelectionError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("advanced reading mode requires a morphological analyzer")]
    AnalyzerUnavailable,
    #[error("unknown reading mode: {0}")]
    UnknownMode(String),
}

/// 選択の閾値。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SelectionThresholds {
    pub fast_unique_share: f64,
    pub fast_unique_min_total: u64,
    pub fast_common_share: f64,
    pub fast_common_min_total: u64,
    pub conflict_share: f64,
    pub name_share: f64,
    pub evidence_share: f64,
    pub evidence_min_total: u64,
    pub context_min_share: f64,
    pub max_suffix_samples: usize,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            fast_unique_share: 0.95,
            fast_unique_min_total: 2,
            fast_common_share: 0.90,
            fast_common_min_total: 3,
            conflict_share: 0.30,
            name_share: 0.90,
            evidence_share: 0.95,
            evidence_min_total: 3,
            context_min_share: 0.10,
            max_suffix_samples: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Accept(Tier, String),
    Reject(&'static str),
}

pub struct MappingSelector<'a> {
    mode: ReadingMode,
    thresholds: SelectionThresholds,
    analyzer: Option<&'a dyn MorphAnalyzer>,
}

impl fmt::Debug for MappingSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingSelector")
            .field("mode", &self.mode)
            .field("thresholds", &self.thresholds)
            .field("analyzer", &self.analyzer.is_some())
            .finish()
    }
}

impl<'a> MappingSelector<'a> {
    /// # Errors
    /// `advanced` で解析器が渡されなかった場合は `SelectionError::AnalyzerUnavailable`。
    pub fn new(
        mode: ReadingMode,
        thresholds: SelectionThresholds,
        analyzer: Option<&'a dyn MorphAnalyzer>,
    ) -> Result<Self, SelectionError> {
        if mode == ReadingMode::Advanced && analyzer.is_none() {
            return Err(SelectionError::AnalyzerUnavailable);
        }
        Ok(Self {
            mode,
            thresholds,
            analyzer,
        })
    }

    #[must_use]
    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    /// 書籍全体の証拠からマッピングを構築する。
    #[must_use]
    pub fn select(&self, evidence: &BookEvidence) -> BaseMapping {
        let mut unique = BTreeMap::new();
        let mut common = BTreeMap::new();
        let mut rules = BTreeMap::new();
        let mut rejected = 0_usize;

        for (base, acc, source) in evidence.entries() {
            match self.decide(base, acc) {
                Decision::Accept(tier, reading) => {
                    if let Some(rule) =
                        ContextRule::derive(acc, tier, self.thresholds.context_min_share)
                    {
                        rules.insert(base.to_string(), rule);
                    }
                    let entry = MappingEntry::new(reading, source);
                    match tier {
                        Tier::Unique => unique.insert(base.to_string(), entry),
                        Tier::Common => common.insert(base.to_string(), entry),
                    };
                }
                Decision::Reject(reason) => {
                    rejected += 1;
                    debug!(base, reason, "mapping candidate rejected");
                }
            }
        }

        info!(
            mode = %self.mode,
            unique = unique.len(),
            common = common.len(),
            rules = rules.len(),
            rejected,
            "selected reading mappings"
        );
        BaseMapping::new(unique, common, rules)
    }

    fn decide(&self, base: &str, acc: &ReadingAccumulator) -> Decision {
        let Some(stats) = acc.stats() else {
            return Decision::Reject("no evidence");
        };
        if acc.single_kanji_only() {
            return Decision::Reject("single kanji");
        }
        if looks_like_ascii_word(base) {
            return Decision::Accept(Tier::Unique, stats.reading.to_string());
        }
        if looks_like_translation(&stats) {
            return Decision::Reject("translation gloss");
        }
        if stats.alt_share >= self.thresholds.conflict_share {
            return Decision::Reject("conflicting readings");
        }

        match (self.mode, self.analyzer) {
            (ReadingMode::Advanced, Some(analyzer)) => {
                self.decide_advanced(base, acc, &stats, analyzer)
            }
            _ => self.decide_fast(&stats),
        }
    }

    fn decide_fast(&self, stats: &ReadingStats<'_>) -> Decision {
        let t = &self.thresholds;
        if stats.total >= t.fast_unique_min_total && stats.share >= t.fast_unique_share {
            Decision::Accept(Tier::Unique, stats.reading.to_string())
        } else if stats.total >= t.fast_common_min_total && stats.share >= t.fast_common_share {
            Decision::Accept(Tier::Common, stats.reading.to_string())
        } else {
            Decision::Reject("insufficient share")
        }
    }

    fn decide_advanced(
        &self,
        base: &str,
        acc: &ReadingAccumulator,
        stats: &ReadingStats<'_>,
        analyzer: &dyn MorphAnalyzer,
    ) -> Decision {
        let variants = self.dictionary_variants(base, acc, analyzer);
        if variants.contains(stats.reading) {
            return Decision::Accept(Tier::Unique, stats.reading.to_string());
        }
        if let Some(variant) = variants
            .iter()
            .find(|variant| differs_only_by_small_kana(stats.reading, variant))
        {
            return Decision::Accept(Tier::Unique, variant.clone());
        }

        let t = &self.thresholds;
        if looks_like_name(base, stats) && stats.share >= t.name_share {
            return Decision::Accept(Tier::Unique, stats.reading.to_string());
        }
        if stats.total >= t.evidence_min_total && stats.share >= t.evidence_share {
            return Decision::Accept(Tier::Unique, stats.reading.to_string());
        }
        Decision::Reject("dictionary disagrees")
    }

    /// 辞書の読み候補。送り仮名付きで読ませた結果から送り仮名を外したものも含める。
    fn dictionary_variants(
        &self,
        base: &str,
        acc: &ReadingAccumulator,
        analyzer: &dyn MorphAnalyzer,
    ) -> BTreeSet<String> {
        let mut variants: BTreeSet<String> = analyzer
            .reading_variants(base)
            .unwrap_or_default()
            .into_iter()
            .map(|variant| normalize_reading(&variant))
            .filter(|variant| !variant.is_empty())
            .collect();

        for suffix in acc
            .suffix_samples()
            .iter()
            .take(self.thresholds.max_suffix_samples)
        {
            let Ok(full) = analyzer.to_reading_text(&format!("{base}{suffix}")) else {
                continue;
            };
            let full = normalize_reading(&full);
            let suffix_reading = normalize_reading(suffix);
            if let Some(stripped) = full.strip_suffix(suffix_reading.as_str())
                && !stripped.is_empty()
            {
                variants.insert(stripped.to_string());
            }
        }
        variants
    }
}

/// ルビが発音ではなく訳語（ラテン文字、中黒、平仮名なしの長い長音語）に見えるか。
fn looks_like_translation(stats: &ReadingStats<'_>) -> bool {
    let flags = stats.flags;
    flags.has_latin
        || flags.has_middle_dot
        || (!flags.has_hiragana && flags.has_long_mark && stats.reading.chars().count() >= 4)
}

/// 2〜4文字の漢字で、平仮名か長音符を含む読みを持つ人名らしい基底か。
fn looks_like_name(base: &str, stats: &ReadingStats<'_>) -> bool {
    let len = base.chars().count();
    let flags = stats.flags;
    (2..=4).contains(&len)
        && base.chars().all(is_cjk)
        && !flags.has_latin
        && !flags.has_middle_dot
        && (flags.has_hiragana || flags.has_long_mark)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::dictionary::DictionaryAnalyzer;
    use crate::evidence::{CorpusDictionary, CorpusEntry};
    use crate::markup::ChapterMarkup;

    fn repeat(chapter: ChapterMarkup, times: usize) -> Vec<ChapterMarkup> {
        (0..times)
            .map(|idx| {
                let mut copy = chapter.clone();
                copy.id = format!("c{idx}");
                copy
            })
            .collect()
    }

    #[test]
    fn advanced_without_analyzer_fails_fast() {
        let err = MappingSelector::new(ReadingMode::Advanced, SelectionThresholds::default(), None)
            .expect_err("must fail");
        assert!(matches!(err, SelectionError::AnalyzerUnavailable));
    }

    #[test]
    fn compound_reading_beats_dictionary_reading() {
        let chapters = repeat(
            ChapterMarkup::new("c")
                .ruby("温", "ぬく")
                .ruby("水", "みず")
                .text("は言った"),
            3,
        );
        let evidence = BookEvidence::from_chapters(&chapters);
        let analyzer = DictionaryAnalyzer::new().with_word("温水", "オンスイ");
        let selector = MappingSelector::new(
            ReadingMode::Advanced,
            SelectionThresholds::default(),
            Some(&analyzer),
        )
        .expect("selector");
        let mapping = selector.select(&evidence);

        let entry = mapping.unique().get("温水").expect("温水 mapped");
        assert_eq!(entry.reading, "ヌクミズ");
        assert_eq!(entry.source, ReadingSource::Propagation);
        assert!(!mapping.unique().contains_key("温"));
    }

    #[test]
    fn single_occurrence_name_is_promoted() {
        let evidence =
            BookEvidence::from_chapters(&[ChapterMarkup::new("c1").ruby("馬締", "まじめ")]);
        let analyzer = DictionaryAnalyzer::new().with_word("馬締", "ウマジメ");
        let selector = MappingSelector::new(
            ReadingMode::Advanced,
            SelectionThresholds::default(),
            Some(&analyzer),
        )
        .expect("selector");
        let mapping = selector.select(&evidence);
        assert_eq!(
            mapping.unique().get("馬締").map(|e| e.reading.as_str()),
            Some("マジメ")
        );
    }

    #[test]
    fn small_kana_mismatch_takes_dictionary_spelling() {
        let chapters = repeat(ChapterMarkup::new("c").ruby("学校", "ガツコウ"), 1);
        let evidence = BookEvidence::from_chapters(&chapters);
        let analyzer = DictionaryAnalyzer::new().with_word("学校", "ガッコウ");
        let selector = MappingSelector::new(
            ReadingMode::Advanced,
            SelectionThresholds::default(),
            Some(&analyzer),
        )
        .expect("selector");
        let mapping = selector.select(&evidence);
        assert_eq!(
            mapping.unique().get("学校").map(|e| e.reading.as_str()),
            Some("ガッコウ")
        );
    }

    #[test]
    fn suffix_variants_match_okurigana_readings() {
        let chapters = repeat(ChapterMarkup::new("c").ruby("行", "イ").text("く"), 1);
        let mut evidence = BookEvidence::from_chapters(&chapters);
        // 単漢字は昇格しないので複合語で確かめる
        let chapter = ChapterMarkup::new("d").ruby("見送", "ミオク").text("る");
        evidence.merge_chapter(crate::evidence::collect_chapter(&chapter));
        let analyzer = DictionaryAnalyzer::new().with_word("見送る", "ミオクル");
        let selector = MappingSelector::new(
            ReadingMode::Advanced,
            SelectionThresholds::default(),
            Some(&analyzer),
        )
        .expect("selector");
        let mapping = selector.select(&evidence);
        assert_eq!(
            mapping.unique().get("見送").map(|e| e.reading.as_str()),
            Some("ミオク")
        );
        assert!(!mapping.unique().contains_key("行"));
    }

    #[test]
    fn fast_mode_tiers_by_share_and_total() {
        let mut chapters = repeat(ChapterMarkup::new("c").ruby("東京", "とうきょう").text("の"), 9);
        chapters.push(ChapterMarkup::new("x").ruby("東京", "とうけい"));
        chapters.extend(repeat(ChapterMarkup::new("c").ruby("鉛筆", "えんぴつ"), 2));
        chapters.push(ChapterMarkup::new("y").ruby("大阪", "おおさか"));
        let evidence = BookEvidence::from_chapters(&chapters);
        let selector =
            MappingSelector::new(ReadingMode::Fast, SelectionThresholds::default(), None)
                .expect("selector");
        let mapping = selector.select(&evidence);

        assert_eq!(
            mapping.unique().get("鉛筆").map(|e| e.reading.as_str()),
            Some("エンピツ")
        );
        assert_eq!(
            mapping.common().get("東京").map(|e| e.reading.as_str()),
            Some("トウキョウ")
        );
        assert!(mapping.context_rule("東京").is_some());
        assert!(!mapping.unique().contains_key("大阪"));
        assert!(!mapping.common().contains_key("大阪"));
    }

    #[test]
    fn translation_glosses_and_conflicts_are_rejected() {
        let mut chapters = repeat(ChapterMarkup::new("c").ruby("魔導書", "グリモワール"), 3);
        chapters.extend(repeat(ChapterMarkup::new("c").ruby("剣士", "ソード・マン"), 3));
        chapters.extend(repeat(ChapterMarkup::new("c").ruby("上手", "じょうず"), 2));
        chapters.extend(repeat(ChapterMarkup::new("c").ruby("上手", "かみて"), 1));
        let evidence = BookEvidence::from_chapters(&chapters);
        let selector =
            MappingSelector::new(ReadingMode::Fast, SelectionThresholds::default(), None)
                .expect("selector");
        let mapping = selector.select(&evidence);
        assert!(mapping.is_empty());
    }

    #[test]
    fn ascii_words_go_straight_to_unique() {
        let evidence = BookEvidence::from_chapters(&[ChapterMarkup::new("c").ruby("Alice", "アリス")]);
        let selector =
            MappingSelector::new(ReadingMode::Fast, SelectionThresholds::default(), None)
                .expect("selector");
        let mapping = selector.select(&evidence);
        assert_eq!(
            mapping.unique().get("Alice").map(|e| e.reading.as_str()),
            Some("アリス")
        );
    }

    #[test]
    fn corpus_entries_carry_corpus_source() {
        let mut evidence = BookEvidence::new();
        evidence.merge_corpus(&CorpusDictionary::from_entries(vec![CorpusEntry::new(
            "東京",
            "トウキョウ",
            40,
        )]));
        let selector =
            MappingSelector::new(ReadingMode::Fast, SelectionThresholds::default(), None)
                .expect("selector");
        let mapping = selector.select(&evidence);
        assert_eq!(
            mapping.unique().get("東京").map(|e| e.source),
            Some(ReadingSource::Corpus)
        );
    }

    #[test]
    fn reading_mode_parses_case_insensitively() {
        assert_eq!("Advanced".parse::<ReadingMode>().ok(), Some(ReadingMode::Advanced));
        assert!("turbo".parse::<ReadingMode>().is_err());
    }
}
