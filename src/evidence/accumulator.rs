/// 基底文字列ごとの読み証拠の集計。
///
/// ルビとコーパスの観測を同じ型に集約し、後段の選択ロジックが
/// 出所を区別せずに扱えるようにする。
use smallvec::SmallVec;
use unicode_normalization::UnicodeNormalization;

use crate::util::kana::{is_hiragana, is_single_kanji_base};

pub const MAX_SUFFIX_SAMPLES: usize = 12;
pub const MAX_SUFFIX_CONTEXTS: usize = 8;
pub const MAX_PREFIX_SAMPLES: usize = 12;
pub const MAX_PREFIX_CONTEXTS: usize = 6;

/// 読みの見た目に関するフラグ。翻訳ルビの判定に使う。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingFlags {
    pub has_hiragana: bool,
    pub has_latin: bool,
    pub has_middle_dot: bool,
    pub has_long_mark: bool,
}

impl ReadingFlags {
    /// 正規化前の読み（ルビに書かれたままの形）からフラグを作る。
    #[must_use]
    pub fn observe(raw: &str) -> Self {
        Self {
            has_hiragana: raw.chars().any(is_hiragana),
            has_latin: raw.chars().any(is_latin),
            has_middle_dot: raw.contains('・'),
            has_long_mark: raw.contains('ー'),
        }
    }

    fn merge(&mut self, other: Self) {
        self.has_hiragana |= other.has_hiragana;
        self.has_latin |= other.has_latin;
        self.has_middle_dot |= other.has_middle_dot;
        self.has_long_mark |= other.has_long_mark;
    }
}

fn is_latin(ch: char) -> bool {
    ch.is_ascii_alphabetic()
        || matches!(ch as u32, 0x00C0..=0x024F | 0x1E00..=0x1EFF | 0xFF21..=0xFF3A | 0xFF41..=0xFF5A)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingCount {
    pub reading: String,
    pub count: u64,
    pub flags: ReadingFlags,
}

/// 前後文脈の出現回数（挿入順を保つ）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextCounts {
    entries: Vec<(String, u64)>,
}

impl ContextCounts {
    pub fn add(&mut self, value: &str, count: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|(v, _)| v == value) {
            entry.1 += count;
        } else {
            self.entries.push((value.to_string(), count));
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// 回数の多い順。同数なら先に観測した方を先にする。
    #[must_use]
    pub fn most_common(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut sorted: Vec<(&str, u64)> = self
            .entries
            .iter()
            .map(|(value, count)| (value.as_str(), *count))
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(limit);
        sorted
    }

    fn merge(&mut self, other: &Self) {
        for (value, count) in &other.entries {
            self.add(value, *count);
        }
    }
}

/// ルビ一件分の観測。
#[derive(Debug, Clone, Default)]
pub struct Observation<'a> {
    pub base: &'a str,
    pub reading: &'a str,
    pub raw_reading: &'a str,
    pub suffix: &'a str,
    pub prefix: &'a str,
    pub count: u64,
}

/// 一つの基底文字列に対する読みの集計。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingAccumulator {
    readings: SmallVec<[ReadingCount; 2]>,
    total: u64,
    single_kanji_only: Option<bool>,
    suffixes: ContextCounts,
    suffix_samples: Vec<String>,
    prefixes: ContextCounts,
    prefix_samples: Vec<String>,
}

/// 優勢な読みとその占有率。
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingStats<'a> {
    pub reading: &'a str,
    pub count: u64,
    pub total: u64,
    pub share: f64,
    pub alt_share: f64,
    pub flags: ReadingFlags,
}

impl ReadingAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 観測を一件登録する。空の読みは無視する。
    pub fn register(&mut self, observation: &Observation<'_>) {
        if observation.reading.is_empty() || observation.count == 0 {
            return;
        }
        let flags = ReadingFlags::observe(observation.raw_reading);
        self.add_reading(observation.reading, observation.count, flags);
        self.total += observation.count;

        let single = is_single_kanji_base(observation.base);
        self.single_kanji_only = Some(self.single_kanji_only.unwrap_or(true) && single);

        if !observation.suffix.is_empty() {
            self.add_suffix(observation.suffix, observation.count);
        }
        if !observation.prefix.is_empty() {
            self.add_prefix(observation.prefix, observation.count);
        }
    }

    fn add_reading(&mut self, reading: &str, count: u64, flags: ReadingFlags) {
        if let Some(entry) = self.readings.iter_mut().find(|entry| entry.reading == reading) {
            entry.count += count;
            entry.flags.merge(flags);
        } else {
            self.readings.push(ReadingCount {
                reading: reading.to_string(),
                count,
                flags,
            });
        }
    }

    pub fn add_suffix(&mut self, suffix: &str, count: u64) {
        self.suffixes.add(suffix, count);
        push_sample(&mut self.suffix_samples, suffix, MAX_SUFFIX_SAMPLES);
    }

    /// 前置文脈は NFKC で揃えて記録する。
    pub fn add_prefix(&mut self, prefix: &str, count: u64) {
        let normalized: String = prefix.nfkc().collect();
        if normalized.is_empty() {
            return;
        }
        self.prefixes.add(&normalized, count);
        push_sample(&mut self.prefix_samples, &normalized, MAX_PREFIX_SAMPLES);
    }

    /// 別の集計を取り込む。単漢字フラグは論理積で合成する。
    pub fn merge_from(&mut self, other: &Self) {
        for entry in &other.readings {
            self.add_reading(&entry.reading, entry.count, entry.flags);
        }
        self.total += other.total;
        self.single_kanji_only = match (self.single_kanji_only, other.single_kanji_only) {
            (Some(left), Some(right)) => Some(left && right),
            (left, right) => left.or(right),
        };
        self.suffixes.merge(&other.suffixes);
        for sample in &other.suffix_samples {
            push_sample(&mut self.suffix_samples, sample, MAX_SUFFIX_SAMPLES);
        }
        self.prefixes.merge(&other.prefixes);
        for sample in &other.prefix_samples {
            push_sample(&mut self.prefix_samples, sample, MAX_PREFIX_SAMPLES);
        }
    }

    pub(crate) fn set_single_kanji_only(&mut self, value: bool) {
        self.single_kanji_only = Some(value);
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// すべての観測が漢字一文字だったか。観測がなければ偽。
    #[must_use]
    pub fn single_kanji_only(&self) -> bool {
        self.single_kanji_only.unwrap_or(false)
    }

    #[must_use]
    pub fn readings(&self) -> &[ReadingCount] {
        &self.readings
    }

    #[must_use]
    pub fn count_of(&self, reading: &str) -> u64 {
        self.readings
            .iter()
            .find(|entry| entry.reading == reading)
            .map_or(0, |entry| entry.count)
    }

    /// 最多の読み。同数なら先に観測した読みを採る。
    #[must_use]
    pub fn dominant(&self) -> Option<&ReadingCount> {
        self.readings
            .iter()
            .fold(None, |best: Option<&ReadingCount>, entry| match best {
                Some(current) if current.count >= entry.count => Some(current),
                _ => Some(entry),
            })
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> Option<ReadingStats<'_>> {
        let dominant = self.dominant()?;
        if self.total == 0 {
            return None;
        }
        let alt = self
            .readings
            .iter()
            .filter(|entry| !std::ptr::eq(*entry, dominant))
            .map(|entry| entry.count)
            .max()
            .unwrap_or(0);
        Some(ReadingStats {
            reading: &dominant.reading,
            count: dominant.count,
            total: self.total,
            share: dominant.count as f64 / self.total as f64,
            alt_share: alt as f64 / self.total as f64,
            flags: dominant.flags,
        })
    }

    #[must_use]
    pub fn suffixes(&self) -> &ContextCounts {
        &self.suffixes
    }

    #[must_use]
    pub fn suffix_samples(&self) -> &[String] {
        &self.suffix_samples
    }

    #[must_use]
    pub fn prefixes(&self) -> &ContextCounts {
        &self.prefixes
    }

    #[must_use]
    pub fn prefix_samples(&self) -> &[String] {
        &self.prefix_samples
    }
}

/// 観測順に上限まで残す。同じ値も観測の回数だけ入る。
fn push_sample(samples: &mut Vec<String>, value: &str, limit: usize) {
    if samples.len() < limit {
        samples.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe<'a>(base: &'a str, reading: &'a str, suffix: &'a str) -> Observation<'a> {
        Observation {
            base,
            reading,
            raw_reading: reading,
            suffix,
            count: 1,
            ..Observation::default()
        }
    }

    #[test]
    fn register_counts_readings_and_suffixes() {
        let mut acc = ReadingAccumulator::new();
        acc.register(&observe("東", "アズマ", "の"));
        acc.register(&observe("東", "アズマ", "の"));
        acc.register(&observe("東", "ヒガシ", ""));

        assert_eq!(acc.total(), 3);
        assert_eq!(acc.count_of("アズマ"), 2);
        assert!(acc.single_kanji_only());
        assert_eq!(acc.suffixes().most_common(8), vec![("の", 2)]);
        assert_eq!(acc.suffix_samples(), ["の".to_string(), "の".to_string()]);

        let stats = acc.stats().expect("stats");
        assert_eq!(stats.reading, "アズマ");
        assert!((stats.share - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.alt_share - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn single_kanji_flag_is_and_combined() {
        let mut acc = ReadingAccumulator::new();
        acc.register(&observe("温", "ヌク", ""));
        let mut compound = ReadingAccumulator::new();
        compound.register(&observe("温水", "ヌクミズ", ""));
        acc.merge_from(&compound);
        assert!(!acc.single_kanji_only());
        assert_eq!(acc.total(), 2);
    }

    #[test]
    fn dominant_tie_keeps_first_seen() {
        let mut acc = ReadingAccumulator::new();
        acc.register(&observe("日", "ニチ", ""));
        acc.register(&observe("日", "ヒ", ""));
        assert_eq!(acc.dominant().map(|d| d.reading.as_str()), Some("ニチ"));
    }

    #[test]
    fn flags_mark_translation_glosses() {
        let flags = ReadingFlags::observe("ジョン・スミス");
        assert!(flags.has_middle_dot);
        assert!(!flags.has_long_mark);
        let flags = ReadingFlags::observe("まじめ");
        assert!(flags.has_hiragana);
        let flags = ReadingFlags::observe("Zero");
        assert!(flags.has_latin);
    }

    #[test]
    fn flags_come_from_the_reading_as_written() {
        // 半角の長音記号は NFKC で「ー」になるが、書かれたままの形では長音扱いしない
        let mut acc = ReadingAccumulator::new();
        acc.register(&Observation {
            base: "珈琲",
            reading: "コーヒー",
            raw_reading: "ｺｰﾋｰ",
            count: 1,
            ..Observation::default()
        });
        let flags = acc.dominant().map(|dominant| dominant.flags).expect("dominant");
        assert!(!flags.has_long_mark);
        assert!(!flags.has_hiragana);
    }

    #[test]
    fn samples_keep_repeats_up_to_the_cap() {
        let mut acc = ReadingAccumulator::new();
        for _ in 0..15 {
            acc.register(&observe("東", "アズマ", "の"));
        }
        assert_eq!(acc.suffix_samples().len(), MAX_SUFFIX_SAMPLES);
        assert!(acc.suffix_samples().iter().all(|sample| sample == "の"));
        assert_eq!(acc.suffixes().most_common(8), vec![("の", 15)]);
    }

    #[test]
    fn prefixes_are_nfkc_normalized() {
        let mut acc = ReadingAccumulator::new();
        acc.register(&Observation {
            base: "日",
            reading: "ニチ",
            raw_reading: "ニチ",
            prefix: "１",
            count: 2,
            ..Observation::default()
        });
        assert_eq!(acc.prefixes().most_common(6), vec![("1", 2)]);
    }

    #[test]
    fn empty_readings_are_ignored() {
        let mut acc = ReadingAccumulator::new();
        acc.register(&observe("空", "", ""));
        assert!(acc.is_empty());
        assert!(acc.stats().is_none());
    }
}
