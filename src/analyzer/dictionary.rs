//! In-memory dictionary analyzer.
//!
//! Greedy longest-match segmentation over a user dictionary. Useful for small
//! user dictionaries and as a deterministic analyzer in tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashMap;

use super::{AnalyzerError, AnalyzerToken, MorphAnalyzer};
use crate::util::kana::{is_cjk, is_kana, normalize_reading};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub reading: String,
    pub accent_type: Option<u16>,
    pub accent_connection: Option<String>,
    pub part_of_speech: Option<String>,
}

impl DictionaryEntry {
    #[must_use]
    pub fn new(reading: impl Into<String>) -> Self {
        Self {
            reading: reading.into(),
            accent_type: None,
            accent_connection: None,
            part_of_speech: None,
        }
    }

    #[must_use]
    pub fn with_accent(mut self, accent: u16) -> Self {
        self.accent_type = Some(accent);
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.accent_connection = Some(connection.into());
        self
    }

    #[must_use]
    pub fn with_pos(mut self, pos: impl Into<String>) -> Self {
        self.part_of_speech = Some(pos.into());
        self
    }
}

/// Surface → entries. The first entry of a surface is used for segmentation;
/// the rest only show up in `reading_variants`.
#[derive(Debug, Default)]
pub struct DictionaryAnalyzer {
    entries: FxHashMap<String, Vec<DictionaryEntry>>,
    max_len: usize,
    pitch_calls: AtomicUsize,
}

impl DictionaryAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a surface with a plain reading.
    #[must_use]
    pub fn with_word(self, surface: &str, reading: &str) -> Self {
        self.with_entry(surface, DictionaryEntry::new(reading))
    }

    #[must_use]
    pub fn with_entry(mut self, surface: &str, entry: DictionaryEntry) -> Self {
        self.insert(surface, entry);
        self
    }

    pub fn insert(&mut self, surface: &str, entry: DictionaryEntry) {
        if surface.is_empty() {
            return;
        }
        self.max_len = self.max_len.max(surface.chars().count());
        self.entries
            .entry(surface.to_string())
            .or_default()
            .push(entry);
    }

    /// Number of `to_reading_with_pitch` calls served so far.
    #[must_use]
    pub fn pitch_calls(&self) -> usize {
        self.pitch_calls.load(Ordering::Relaxed)
    }

    fn longest_entry_at(&self, chars: &[char], start: usize) -> Option<(usize, &DictionaryEntry)> {
        let limit = self.max_len.min(chars.len() - start);
        (1..=limit).rev().find_map(|len| {
            let candidate: String = chars[start..start + len].iter().collect();
            self.entries
                .get(&candidate)
                .and_then(|entries| entries.first())
                .map(|entry| (len, entry))
        })
    }
}

impl MorphAnalyzer for DictionaryAnalyzer {
    fn tokenize(&self, text: &str) -> Result<Vec<AnalyzerToken>, AnalyzerError> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = Vec::new();
        let mut idx = 0;

        while idx < chars.len() {
            if let Some((len, entry)) = self.longest_entry_at(&chars, idx) {
                tokens.push(AnalyzerToken {
                    surface: chars[idx..idx + len].iter().collect(),
                    start: idx,
                    end: idx + len,
                    reading: normalize_reading(&entry.reading),
                    accent_type: entry.accent_type,
                    accent_connection: entry.accent_connection.clone(),
                    part_of_speech: entry.part_of_speech.clone(),
                });
                idx += len;
                continue;
            }

            let ch = chars[idx];
            if ch.is_whitespace() {
                idx += 1;
                continue;
            }
            if is_cjk(ch) {
                // 未登録の漢字は読みなしの一文字区間
                tokens.push(AnalyzerToken {
                    surface: ch.to_string(),
                    start: idx,
                    end: idx + 1,
                    ..AnalyzerToken::default()
                });
                idx += 1;
                continue;
            }

            let kana = is_kana(ch);
            let run = chars[idx..]
                .iter()
                .take_while(|&&c| {
                    is_kana(c) == kana && !is_cjk(c) && !c.is_whitespace()
                })
                .count()
                .max(1);
            let surface: String = chars[idx..idx + run].iter().collect();
            let reading = if kana {
                normalize_reading(&surface)
            } else {
                surface.clone()
            };
            tokens.push(AnalyzerToken {
                surface,
                start: idx,
                end: idx + run,
                reading,
                ..AnalyzerToken::default()
            });
            idx += run;
        }

        Ok(tokens)
    }

    fn reading_variants(&self, base: &str) -> Result<BTreeSet<String>, AnalyzerError> {
        if let Some(entries) = self.entries.get(base) {
            return Ok(entries
                .iter()
                .map(|entry| normalize_reading(&entry.reading))
                .filter(|reading| !reading.is_empty())
                .collect());
        }
        let reading = self.to_reading_text(base)?;
        let mut variants = BTreeSet::new();
        if !reading.is_empty() && !crate::util::kana::contains_cjk(&reading) {
            variants.insert(reading);
        }
        Ok(variants)
    }

    fn to_reading_with_pitch(
        &self,
        text: &str,
    ) -> Result<(String, Vec<AnalyzerToken>), AnalyzerError> {
        self.pitch_calls.fetch_add(1, Ordering::Relaxed);
        let tokens = self.tokenize(text)?;
        let reading = super::join_readings(text, &tokens);
        Ok((reading, tokens))
    }
}
