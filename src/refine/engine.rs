//! 変換後テキストへの上書きルール適用。
//!
//! マッチはトークン境界にちょうど揃ったものだけを採る。トークンの間の
//! 地の文だけに掛かるマッチや、トークンの途中で切れるマッチは無視する。
//! 元テキスト側のオフセットと表層は決して変えない。

use tracing::debug;

use crate::refine::rules::OverrideRule;
use crate::token::{ReadingSource, Token};
use crate::util::text::{CharIndex, char_len};

/// 1章分の適用結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineOutcome {
    pub text: String,
    pub tokens: Vec<Token>,
    /// テキストかトークンのどちらかが変わったか。
    pub changed: bool,
    /// 実際に何かを変えた置換の数。
    pub applied: usize,
}

/// マッチ1件に対応するトークン範囲（`first..=last`）と文字範囲。
#[derive(Debug, Clone)]
struct Edit {
    first: usize,
    last: usize,
    start: usize,
    end: usize,
    matched: String,
}

/// ルールを順に適用する。各ルールは前のルールの結果に対して走る。
#[must_use]
pub fn refine_chapter(text: &str, tokens: &[Token], rules: &[OverrideRule]) -> RefineOutcome {
    let mut text = text.to_string();
    let mut tokens = tokens.to_vec();
    tokens.sort_by_key(|token| (token.transformed_start, token.transformed_end));

    let mut applied = 0;
    for rule in rules {
        applied += apply_rule(&mut text, &mut tokens, rule);
    }

    RefineOutcome {
        text,
        tokens,
        changed: applied > 0,
        applied,
    }
}

fn apply_rule(text: &mut String, tokens: &mut Vec<Token>, rule: &OverrideRule) -> usize {
    let index = CharIndex::new(text);
    let current: &[Token] = tokens;
    let edits: Vec<Edit> = rule
        .matcher()
        .find_iter(text.as_str())
        .filter(|found| !found.as_str().is_empty())
        .filter_map(|found| {
            let start = index.char_of(found.start());
            let end = index.char_of(found.end());
            let (first, last) = covering_tokens(current, start, end)?;
            let covered = &current[first..=last];
            let surface: String = covered.iter().map(|token| token.surface.as_str()).collect();
            if !rule.surface_allowed(&surface)
                || !covered.iter().all(|token| rule.pos_allowed(token.part_of_speech.as_deref()))
            {
                return None;
            }
            Some(Edit {
                first,
                last,
                start,
                end,
                matched: found.as_str().to_string(),
            })
        })
        .collect();

    let mut applied = 0;
    // 後ろから適用すれば、手前のバイト位置とトークン番号は動かない。
    for edit in edits.into_iter().rev() {
        let inserted = rule
            .replacement
            .clone()
            .or_else(|| rule.reading.clone())
            .unwrap_or_else(|| edit.matched.clone());
        let merged = merged_token(&tokens[edit.first..=edit.last], rule, &inserted, edit.start);
        if edit.first == edit.last && inserted == edit.matched && merged == tokens[edit.first] {
            continue;
        }

        let byte_start = index.byte_of(edit.start);
        let byte_end = index.byte_of(edit.end);
        text.replace_range(byte_start..byte_end, &inserted);

        let old_len = edit.end - edit.start;
        let new_len = char_len(&inserted);
        for token in tokens.iter_mut().skip(edit.last + 1) {
            token.transformed_start = token.transformed_start + new_len - old_len;
            token.transformed_end = token.transformed_end + new_len - old_len;
        }
        debug!(
            pattern = %rule.pattern,
            surface = %merged.surface,
            reading = %merged.reading,
            "override applied"
        );
        tokens.splice(edit.first..=edit.last, std::iter::once(merged));
        applied += 1;
    }
    applied
}

/// `[start, end)` をちょうど覆う連続トークン列を探す。
///
/// 複数トークンにまたがる場合は、変換後と元テキストの両方で隙間なく
/// 並んでいる必要がある。前後のトークンと重なる範囲は対象外。
fn covering_tokens(tokens: &[Token], start: usize, end: usize) -> Option<(usize, usize)> {
    let first = tokens
        .iter()
        .position(|token| token.transformed_start == start && token.transformed_end > token.transformed_start)?;
    if first > 0 && tokens[first - 1].transformed_end > start {
        return None;
    }
    let mut last = first;
    loop {
        let current = &tokens[last];
        if current.transformed_end == end {
            let clear = tokens
                .get(last + 1)
                .is_none_or(|next| next.transformed_start >= end);
            return clear.then_some((first, last));
        }
        if current.transformed_end > end {
            return None;
        }
        let next = tokens.get(last + 1)?;
        if next.transformed_start != current.transformed_end || next.original_start != current.original_end {
            return None;
        }
        last += 1;
    }
}

fn merged_token(covered: &[Token], rule: &OverrideRule, inserted: &str, start: usize) -> Token {
    let single = match covered {
        [token] => Some(token),
        _ => None,
    };
    let surface: String = covered.iter().map(|token| token.surface.as_str()).collect();
    let original_start = covered.first().map_or(0, |token| token.original_start);
    let original_end = covered.last().map_or(original_start, |token| token.original_end);

    let mut merged = Token::new(surface, inserted, ReadingSource::Override, original_start, original_end);
    merged.transformed_start = start;
    merged.transformed_end = start + char_len(inserted);
    merged.fallback_reading = rule
        .reading
        .clone()
        .filter(|reading| reading != inserted)
        .or_else(|| single.and_then(|token| token.fallback_reading.clone()));
    merged.accent_type = rule.accent.or_else(|| single.and_then(|token| token.accent_type));
    merged.accent_connection = match single {
        Some(token) if rule.accent.is_none() => token.accent_connection.clone(),
        _ => None,
    };
    merged.part_of_speech = rule
        .pos
        .clone()
        .or_else(|| single.and_then(|token| token.part_of_speech.clone()));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::verify_alignment;
    use crate::refine::rules::RuleSpec;

    fn token(surface: &str, reading: &str, original: (usize, usize), transformed: (usize, usize)) -> Token {
        let mut token = Token::new(surface, reading, ReadingSource::Unidic, original.0, original.1);
        token.transformed_start = transformed.0;
        token.transformed_end = transformed.1;
        token
    }

    // 東京と大阪 -> トウケイとオオサカ
    fn tokyo() -> (&'static str, String, Vec<Token>) {
        let original = "東京と大阪";
        let text = "トウケイとオオサカ".to_string();
        let mut tokens = vec![
            token("東京", "トウケイ", (0, 2), (0, 4)),
            token("大阪", "オオサカ", (3, 5), (5, 9)),
        ];
        tokens[0].accent_connection = Some("C1".to_string());
        (original, text, tokens)
    }

    #[test]
    fn replacement_shifts_following_tokens() {
        let (original, text, tokens) = tokyo();
        let rule = RuleSpec::new("トウケイ")
            .replacement("トウキョウ")
            .accent(0)
            .compile()
            .expect("rule");
        let outcome = refine_chapter(&text, &tokens, &[rule]);

        assert!(outcome.changed);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.text, "トウキョウとオオサカ");
        let first = &outcome.tokens[0];
        assert_eq!(first.reading, "トウキョウ");
        assert_eq!((first.transformed_start, first.transformed_end), (0, 5));
        assert_eq!(first.reading_source, ReadingSource::Override);
        assert_eq!(first.accent_type, Some(0));
        assert!(first.accent_connection.is_none());
        assert_eq!((first.original_start, first.original_end), (0, 2));
        let second = &outcome.tokens[1];
        assert_eq!((second.transformed_start, second.transformed_end), (6, 10));
        verify_alignment(original, &outcome.text, &outcome.tokens).expect("aligned");
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let (_, text, tokens) = tokyo();
        let rules = vec![
            RuleSpec::new("トウケイ").replacement("トウキョウ").compile().expect("rule"),
            RuleSpec::new("オオサカ").accent(0).pos("名詞").compile().expect("rule"),
        ];
        let first = refine_chapter(&text, &tokens, &rules);
        assert_eq!(first.applied, 2);
        let second = refine_chapter(&first.text, &first.tokens, &rules);
        assert!(!second.changed);
        assert_eq!(second.applied, 0);
        assert_eq!(second.text, first.text);
        assert_eq!(second.tokens, first.tokens);
    }

    #[test]
    fn partial_and_gap_matches_are_ignored() {
        let (_, text, tokens) = tokyo();
        let rules = vec![
            RuleSpec::new("ケイ").replacement("キョウ").compile().expect("rule"),
            RuleSpec::new("と").replacement("ト").compile().expect("rule"),
            RuleSpec::new("イとオ").replacement("x").compile().expect("rule"),
        ];
        let outcome = refine_chapter(&text, &tokens, &rules);
        assert!(!outcome.changed);
        assert_eq!(outcome.text, text);
        assert_eq!(outcome.tokens, tokens);
    }

    #[test]
    fn overlapping_tokens_block_the_edit() {
        let text = "トウケイへ";
        let tokens = vec![
            token("東京", "トウケイ", (0, 2), (0, 4)),
            token("京", "ウケ", (1, 2), (1, 3)),
        ];
        let rule = RuleSpec::new("トウケイ").replacement("ト").compile().expect("rule");
        let outcome = refine_chapter(text, &tokens, &[rule]);

        assert!(!outcome.changed);
        assert_eq!(outcome.text, text);
        assert_eq!(outcome.tokens, tokens);
    }

    #[test]
    fn adjacent_tokens_merge_into_one() {
        let original = "馬締は";
        let text = "ウマシメハ";
        let mut tokens = vec![
            token("馬", "ウマ", (0, 1), (0, 2)),
            token("締", "シメ", (1, 2), (2, 4)),
            token("は", "ハ", (2, 3), (4, 5)),
        ];
        tokens[0].accent_type = Some(2);
        let rule = RuleSpec::new("ウマシメ")
            .replacement("マジメ")
            .reading("マジメ")
            .compile()
            .expect("rule");
        let outcome = refine_chapter(text, &tokens, &[rule]);

        assert_eq!(outcome.text, "マジメハ");
        assert_eq!(outcome.tokens.len(), 2);
        let merged = &outcome.tokens[0];
        assert_eq!(merged.surface, "馬締");
        assert_eq!((merged.original_start, merged.original_end), (0, 2));
        assert_eq!((merged.transformed_start, merged.transformed_end), (0, 3));
        assert!(merged.accent_type.is_none());
        assert!(merged.fallback_reading.is_none());
        assert_eq!((outcome.tokens[1].transformed_start, outcome.tokens[1].transformed_end), (3, 4));
        verify_alignment(original, &outcome.text, &outcome.tokens).expect("aligned");
    }

    #[test]
    fn regex_rules_respect_constraints() {
        let (_, text, mut tokens) = tokyo();
        tokens[0].part_of_speech = Some("名詞-固有名詞".to_string());
        tokens[1].part_of_speech = Some("名詞-固有名詞".to_string());
        let rules = vec![
            RuleSpec::new("^トウ.イ")
                .regex()
                .replacement("トーケー")
                .match_pos("^動詞")
                .compile()
                .expect("rule"),
            RuleSpec::new("オオ..")
                .regex()
                .replacement("オーサカ")
                .surface("大阪")
                .match_surface("^大")
                .compile()
                .expect("rule"),
        ];
        let outcome = refine_chapter(&text, &tokens, &rules);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.text, "トウケイとオーサカ");
        assert_eq!(outcome.tokens[0].reading, "トウケイ");
        assert_eq!(outcome.tokens[1].reading, "オーサカ");
    }

    #[test]
    fn reading_becomes_the_inserted_text_without_replacement() {
        let (_, text, tokens) = tokyo();
        let rule = RuleSpec::new("トウケイ").reading("トーキョー").compile().expect("rule");
        let outcome = refine_chapter(&text, &tokens, &[rule]);
        assert_eq!(outcome.text, "トーキョーとオオサカ");
        assert_eq!(outcome.tokens[0].reading, "トーキョー");
        // accent は上書きしていないので接続情報は残る
        assert_eq!(outcome.tokens[0].accent_connection.as_deref(), Some("C1"));
    }
}
