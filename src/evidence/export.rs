/// 検査ツール向けのルビ証拠の書き出し。
///
/// マッピングの採否とは独立に、書籍内の集計をそのまま一覧にする。
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::accumulator::{MAX_PREFIX_CONTEXTS, MAX_SUFFIX_CONTEXTS};
use super::collector::BookEvidence;
use super::corpus::ContextEntry;
use crate::analyzer::MorphAnalyzer;
use crate::token::write_atomically;
use crate::util::kana::{differs_only_by_small_kana, normalize_reading};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubyEvidenceEntry {
    pub base: String,
    pub reading: String,
    pub count: u64,
    pub suffix: String,
    pub suffixes: Vec<ContextEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<ContextEntry>,
}

/// 書籍内の証拠を件数の多い順（同数は基底の辞書順）に並べる。
///
/// 解析器があり、その読みが小書きの違いだけで異なる場合は解析器の表記で出す。
#[must_use]
pub fn export_evidence(
    evidence: &BookEvidence,
    analyzer: Option<&dyn MorphAnalyzer>,
) -> Vec<RubyEvidenceEntry> {
    let mut entries: Vec<RubyEvidenceEntry> = evidence
        .in_book()
        .iter()
        .filter_map(|(base, acc)| {
            let dominant = acc.dominant()?;
            let mut reading = dominant.reading.clone();
            if let Some(analyzer) = analyzer
                && let Ok(dictionary) = analyzer.to_reading_text(base)
            {
                let dictionary = normalize_reading(&dictionary);
                if differs_only_by_small_kana(&reading, &dictionary) {
                    reading = dictionary;
                }
            }
            let suffixes: Vec<ContextEntry> = acc
                .suffixes()
                .most_common(MAX_SUFFIX_CONTEXTS)
                .into_iter()
                .map(|(value, count)| ContextEntry {
                    value: value.to_string(),
                    count,
                })
                .collect();
            let prefixes: Vec<ContextEntry> = acc
                .prefixes()
                .most_common(MAX_PREFIX_CONTEXTS)
                .into_iter()
                .map(|(value, count)| ContextEntry {
                    value: value.to_string(),
                    count,
                })
                .collect();
            Some(RubyEvidenceEntry {
                base: base.clone(),
                reading,
                count: dominant.count,
                suffix: acc.suffix_samples().first().cloned().unwrap_or_default(),
                suffixes,
                prefixes,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.base.cmp(&b.base)));
    entries
}

/// 一覧を JSON で書き出す。
///
/// # Errors
/// 書き込みに失敗した場合はエラーを返す。
pub fn write_evidence(path: &Path, entries: &[RubyEvidenceEntry]) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(entries)?;
    write_atomically(path, &body)?;
    Ok(())
}
