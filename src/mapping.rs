//! 書籍単位の「基底 → 読み」マッピング。
//!
//! 信頼度の高い `unique` 層と、文脈制約付きで適用する `common` 層を持つ。
//! 書籍ごとに一度だけ構築し、以降は全章で読み取り専用に共有する。

pub mod context;
pub(crate) mod matcher;
pub mod selector;

use std::collections::BTreeMap;
use std::ops::Range;

use self::context::ContextRule;
use self::matcher::{TierMatcher, match_allowed};
use crate::token::ReadingSource;

pub use self::selector::{MappingSelector, ReadingMode, SelectionError, SelectionThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Unique,
    Common,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub reading: String,
    pub source: ReadingSource,
}

impl MappingEntry {
    #[must_use]
    pub fn new(reading: impl Into<String>, source: ReadingSource) -> Self {
        Self {
            reading: reading.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TierMapping {
    entries: BTreeMap<String, MappingEntry>,
    // matcher のパターン番号と対応する基底
    bases: Vec<String>,
    matcher: TierMatcher,
}

impl TierMapping {
    fn new(entries: BTreeMap<String, MappingEntry>) -> Self {
        let bases: Vec<String> = entries
            .keys()
            .filter(|base| !base.is_empty())
            .cloned()
            .collect();
        let patterns: Vec<&str> = bases.iter().map(String::as_str).collect();
        let matcher = TierMatcher::new(&patterns);
        Self {
            entries,
            bases,
            matcher,
        }
    }
}

/// 適用可能と判定された一致。オフセットは char 単位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingMatch<'a> {
    pub start: usize,
    pub end: usize,
    pub base: &'a str,
    pub entry: &'a MappingEntry,
    pub tier: Tier,
}

/// 二層のマッピングと文脈規則。
#[derive(Debug, Clone, Default)]
pub struct BaseMapping {
    unique: TierMapping,
    common: TierMapping,
    context_rules: BTreeMap<String, ContextRule>,
}

impl BaseMapping {
    #[must_use]
    pub fn new(
        unique: BTreeMap<String, MappingEntry>,
        common: BTreeMap<String, MappingEntry>,
        context_rules: BTreeMap<String, ContextRule>,
    ) -> Self {
        Self {
            unique: TierMapping::new(unique),
            common: TierMapping::new(common),
            context_rules,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn unique(&self) -> &BTreeMap<String, MappingEntry> {
        &self.unique.entries
    }

    #[must_use]
    pub fn common(&self) -> &BTreeMap<String, MappingEntry> {
        &self.common.entries
    }

    #[must_use]
    pub fn context_rule(&self, base: &str) -> Option<&ContextRule> {
        self.context_rules.get(base)
    }

    #[must_use]
    pub fn context_rules(&self) -> &BTreeMap<String, ContextRule> {
        &self.context_rules
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unique.entries.is_empty() && self.common.entries.is_empty()
    }

    /// `range` 内の一致を最長優先・左から順に返す。
    ///
    /// 隣接ガードと文脈規則を通ったものだけを返す。ガードは `range` の外側の
    /// 文字も参照する。
    #[must_use]
    pub fn find_matches(&self, chars: &[char], range: Range<usize>, tier: Tier) -> Vec<MappingMatch<'_>> {
        let mapping = match tier {
            Tier::Unique => &self.unique,
            Tier::Common => &self.common,
        };
        mapping
            .matcher
            .find(chars, range)
            .into_iter()
            .filter_map(|hit| {
                let base = mapping.bases.get(hit.pattern)?;
                let entry = mapping.entries.get(base)?;
                if !match_allowed(chars, hit.start, hit.end) {
                    return None;
                }
                if let Some(rule) = self.context_rules.get(base)
                    && !rule.allows(chars, hit.start, hit.end, tier)
                {
                    return None;
                }
                Some(MappingMatch {
                    start: hit.start,
                    end: hit.end,
                    base,
                    entry,
                    tier,
                })
            })
            .collect()
    }
}
