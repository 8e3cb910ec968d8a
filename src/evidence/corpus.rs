/// 外部コーパス辞書の読み込み。
///
/// 大規模コーパスから事前集計された「基底 → 優勢な読み」と前後文脈の一覧。
/// 読めないエントリは黙って捨てる（証拠であって契約ではない）。
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::accumulator::{Observation, ReadingAccumulator};
use crate::util::kana::{is_single_kanji_base, normalize_base, normalize_reading};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read corpus dictionary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus dictionary {path} is not a JSON list: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `{value, count}` の文脈エントリ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub base: String,
    pub reading: String,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suffixes: Vec<ContextEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<ContextEntry>,
}

impl CorpusEntry {
    #[must_use]
    pub fn new(base: impl Into<String>, reading: impl Into<String>, count: u64) -> Self {
        Self {
            base: base.into(),
            reading: reading.into(),
            count,
            suffix: None,
            suffixes: Vec::new(),
            prefixes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_suffix(mut self, value: impl Into<String>, count: u64) -> Self {
        self.suffixes.push(ContextEntry {
            value: value.into(),
            count,
        });
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, value: impl Into<String>, count: u64) -> Self {
        self.prefixes.push(ContextEntry {
            value: value.into(),
            count,
        });
        self
    }

    /// 集計に変換する。基底か読みが空、または件数が0なら `None`。
    fn to_accumulator(&self) -> Option<(String, ReadingAccumulator)> {
        let base = normalize_base(&self.base);
        let reading = normalize_reading(&self.reading);
        if base.is_empty() || reading.is_empty() || self.count == 0 {
            return None;
        }

        let mut acc = ReadingAccumulator::new();
        acc.register(&Observation {
            base: &base,
            reading: &reading,
            raw_reading: &self.reading,
            count: self.count,
            ..Observation::default()
        });

        if self.suffixes.is_empty() {
            if let Some(suffix) = self.suffix.as_deref().filter(|s| !s.is_empty()) {
                acc.add_suffix(suffix, self.count);
            }
        } else {
            for entry in self.suffixes.iter().filter(|e| !e.value.is_empty() && e.count > 0) {
                acc.add_suffix(&entry.value, entry.count);
            }
        }
        for entry in self.prefixes.iter().filter(|e| !e.value.is_empty() && e.count > 0) {
            acc.add_prefix(&entry.value, entry.count);
        }
        acc.set_single_kanji_only(is_single_kanji_base(&base));
        Some((base, acc))
    }
}

/// 基底文字列ごとに集計済みのコーパス辞書。
#[derive(Debug, Clone, Default)]
pub struct CorpusDictionary {
    accumulators: FxHashMap<String, ReadingAccumulator>,
}

impl CorpusDictionary {
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = CorpusEntry>) -> Self {
        let mut accumulators: FxHashMap<String, ReadingAccumulator> = FxHashMap::default();
        for entry in entries {
            if let Some((base, acc)) = entry.to_accumulator() {
                accumulators.entry(base).or_default().merge_from(&acc);
            }
        }
        Self { accumulators }
    }

    /// JSON 配列から読み込む。形の合わないエントリは読み飛ばす。
    ///
    /// # Errors
    /// ファイルが読めない、または JSON 配列でない場合はエラーを返す。
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let raw = fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(|source| CorpusError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let total = values.len();
        let entries: Vec<CorpusEntry> = values
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        let dropped = total - entries.len();
        let dictionary = Self::from_entries(entries);
        debug!(
            path = %path.display(),
            entries = total,
            dropped,
            bases = dictionary.len(),
            "loaded corpus dictionary"
        );
        Ok(dictionary)
    }

    /// 読み込みに失敗したら警告して空の辞書を返す。
    #[must_use]
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(dictionary) => dictionary,
            Err(error) => {
                warn!(error = %error, "corpus dictionary unavailable; continuing without it");
                Self::default()
            }
        }
    }

    pub fn accumulators(&self) -> impl Iterator<Item = (&String, &ReadingAccumulator)> {
        self.accumulators.iter()
    }

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
}
