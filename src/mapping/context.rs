/// 文脈によるマッピング適用の制約。
///
/// 前置文脈・後置文脈の証拠から導いた述語の組。述語は種類ごとに
/// どの層（unique/common）を制約するかが決まっている。
/// 形式は版付きで、新しい述語は `ContextPredicate` に追加する。
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::Tier;
use crate::evidence::ReadingAccumulator;
use crate::evidence::accumulator::{MAX_PREFIX_CONTEXTS, MAX_SUFFIX_CONTEXTS};
use crate::util::kana::{NUMERIC_PREFIX_CHARS, hiragana_to_katakana, is_cjk};

pub const CONTEXT_RULE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPredicate {
    /// 直前の数字列（空白は読み飛ばす）が既知の接頭辞のいずれかであること。
    NumericPrefix { prefixes: Vec<String>, max_len: usize },
    /// 直後が既知の仮名接尾辞のいずれかで始まること。
    KanaSuffix { suffixes: Vec<String> },
    /// 前後に漢字が隣接しないこと。
    StandaloneWord,
}

impl ContextPredicate {
    /// この述語が制約する層か。
    #[must_use]
    pub fn gates(&self, tier: Tier) -> bool {
        match self {
            Self::NumericPrefix { .. } => true,
            Self::KanaSuffix { .. } | Self::StandaloneWord => tier == Tier::Common,
        }
    }

    #[must_use]
    pub fn holds(&self, chars: &[char], start: usize, end: usize) -> bool {
        match self {
            Self::NumericPrefix { prefixes, max_len } => {
                let prefix = numeric_prefix_before(chars, start, *max_len);
                !prefix.is_empty() && prefixes.iter().any(|known| *known == prefix)
            }
            Self::KanaSuffix { suffixes } => {
                let following: String = chars[end.min(chars.len())..]
                    .iter()
                    .take(suffixes.iter().map(|s| s.chars().count()).max().unwrap_or(0))
                    .collect();
                let following = hiragana_to_katakana(&following);
                suffixes
                    .iter()
                    .any(|suffix| following.starts_with(&hiragana_to_katakana(suffix)))
            }
            Self::StandaloneWord => {
                let prev = start.checked_sub(1).map(|idx| chars[idx]);
                let next = chars.get(end).copied();
                !prev.is_some_and(is_cjk) && !next.is_some_and(is_cjk)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRule {
    pub version: u32,
    pub predicates: Vec<ContextPredicate>,
}

impl ContextRule {
    #[must_use]
    pub fn new(predicates: Vec<ContextPredicate>) -> Self {
        Self {
            version: CONTEXT_RULE_VERSION,
            predicates,
        }
    }

    /// 層に関係するすべての述語が成り立つか。未知の版は常に不許可。
    #[must_use]
    pub fn allows(&self, chars: &[char], start: usize, end: usize, tier: Tier) -> bool {
        if self.version != CONTEXT_RULE_VERSION {
            return false;
        }
        self.predicates
            .iter()
            .filter(|predicate| predicate.gates(tier))
            .all(|predicate| predicate.holds(chars, start, end))
    }

    /// 集計の文脈証拠から規則を導く。制約がなければ `None`。
    ///
    /// # Arguments
    /// * `acc` - 基底文字列の集計
    /// * `tier` - 採用された層
    /// * `min_share` - 文脈として採る最低占有率
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn derive(acc: &ReadingAccumulator, tier: Tier, min_share: f64) -> Option<Self> {
        let mut predicates = Vec::new();

        let prefix_total = acc.prefixes().total();
        if prefix_total > 0 {
            let prefixes: Vec<String> = acc
                .prefixes()
                .most_common(MAX_PREFIX_CONTEXTS)
                .into_iter()
                .filter(|(_, count)| *count as f64 / prefix_total as f64 >= min_share)
                .map(|(value, _)| value.to_string())
                .collect();
            let numeric = !prefixes.is_empty()
                && prefixes
                    .iter()
                    .all(|prefix| prefix.chars().all(|ch| NUMERIC_PREFIX_CHARS.contains(ch)));
            if numeric {
                let max_len = prefixes
                    .iter()
                    .map(|prefix| prefix.chars().count())
                    .max()
                    .unwrap_or(0);
                predicates.push(ContextPredicate::NumericPrefix { prefixes, max_len });
            }
        }

        if tier == Tier::Common {
            let suffix_total = acc.suffixes().total();
            let suffixes: Vec<String> = if suffix_total == 0 {
                Vec::new()
            } else {
                acc.suffixes()
                    .most_common(MAX_SUFFIX_CONTEXTS)
                    .into_iter()
                    .filter(|(_, count)| *count as f64 / suffix_total as f64 >= min_share)
                    .map(|(value, _)| value.to_string())
                    .collect()
            };
            if suffixes.is_empty() {
                predicates.push(ContextPredicate::StandaloneWord);
            } else {
                predicates.push(ContextPredicate::KanaSuffix { suffixes });
            }
        }

        (!predicates.is_empty()).then(|| Self::new(predicates))
    }
}

/// `start` 直前の数字列を最大 `max_len` 文字まで取り出し、NFKC で返す。
fn numeric_prefix_before(chars: &[char], start: usize, max_len: usize) -> String {
    let mut pos = start.min(chars.len());
    while pos > 0 && chars[pos - 1].is_whitespace() {
        pos -= 1;
    }
    let mut collected = Vec::new();
    while pos > 0 && collected.len() < max_len && NUMERIC_PREFIX_CHARS.contains(chars[pos - 1]) {
        collected.push(chars[pos - 1]);
        pos -= 1;
    }
    collected.reverse();
    collected.into_iter().collect::<String>().nfkc().collect()
}
