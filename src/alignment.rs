//! 出所の異なるトークン列の並びとオフセットを揃える。
//!
//! 1. 各トークンの表層を元テキストで探して元オフセットを決める
//!    （既存のオフセットが正しければそれを使う）。
//! 2. 元オフセット順に並べ替える。
//! 3. 同じ順序で変換後テキストを走査し、読み（または表層）の位置を決める。
//!
//! どこかで位置が決まらなければ、推測で埋めずにエラーを返す。

use thiserror::Error;

use crate::token::Token;

/// エラーに載せる残りテキストの長さ。
const PREVIEW_CHARS: usize = 24;
/// 変換後テキストで読みを探す範囲の下限。
const MIN_SEARCH_WINDOW: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("token surface {surface:?} not found in original text after offset {cursor} (next: {available:?})")]
    SurfaceNotFound {
        surface: String,
        cursor: usize,
        available: String,
    },
    #[error("reading {reading:?} of token {surface:?} not found in transformed text after offset {cursor} (next: {available:?})")]
    ReadingNotFound {
        surface: String,
        reading: String,
        cursor: usize,
        available: String,
    },
    #[error("transformed text too short for token {surface:?}: needs {needed} chars, {available} left")]
    TransformedTooShort {
        surface: String,
        needed: usize,
        available: usize,
    },
    #[error("token {surface:?} at offset {offset} overlaps or precedes the previous token")]
    OutOfOrder { surface: String, offset: usize },
}

/// トークン列を元テキストと変換後テキストの両方に合わせる。
///
/// 表層が空のトークンは捨てる。返り値は元オフセット順で、両座標系で
/// 単調かつ重なりがない。
///
/// # Errors
/// 表層が元テキストに見つからない場合、または変換後テキストに
/// 読みが見つからない・足りない場合は `AlignmentError` を返す。
pub fn normalize_alignment(
    original: &str,
    transformed: &str,
    tokens: Vec<Token>,
) -> Result<Vec<Token>, AlignmentError> {
    let original_chars: Vec<char> = original.chars().collect();
    let transformed_chars: Vec<char> = transformed.chars().collect();

    let mut tokens = locate_in_original(&original_chars, tokens)?;
    tokens.sort_by_key(|token| (token.original_start, token.original_end));
    locate_in_transformed(&transformed_chars, &mut tokens)?;
    Ok(tokens)
}

fn locate_in_original(chars: &[char], tokens: Vec<Token>) -> Result<Vec<Token>, AlignmentError> {
    let mut claimed = vec![false; chars.len()];
    let mut cursor = 0;
    let mut located = Vec::with_capacity(tokens.len());

    for mut token in tokens {
        let surface: Vec<char> = token.surface.chars().collect();
        if surface.is_empty() {
            continue;
        }
        let free = |start: usize| -> bool {
            start + surface.len() <= chars.len()
                && chars[start..start + surface.len()] == surface[..]
                && claimed[start..start + surface.len()].iter().all(|c| !c)
        };

        let hint = token.original_start;
        let start = if token.original_end == hint + surface.len() && free(hint) {
            Some(hint)
        } else {
            (cursor..chars.len())
                .find(|&pos| free(pos))
                .or_else(|| (0..cursor.min(chars.len())).find(|&pos| free(pos)))
        };
        let Some(start) = start else {
            return Err(AlignmentError::SurfaceNotFound {
                surface: token.surface,
                cursor,
                available: preview(chars, cursor),
            });
        };

        let end = start + surface.len();
        for slot in &mut claimed[start..end] {
            *slot = true;
        }
        token.original_start = start;
        token.original_end = end;
        cursor = end;
        located.push(token);
    }
    Ok(located)
}

fn locate_in_transformed(chars: &[char], tokens: &mut [Token]) -> Result<(), AlignmentError> {
    let mut cursor = 0;
    let mut previous_original_end = 0;

    for token in tokens.iter_mut() {
        let reading: Vec<char> = token.reading.chars().collect();
        let surface: Vec<char> = token.surface.chars().collect();
        let candidates: Vec<&[char]> = if reading.is_empty() || reading == surface {
            vec![surface.as_slice()]
        } else {
            vec![reading.as_slice(), surface.as_slice()]
        };
        let shortest = candidates.iter().map(|c| c.len()).min().unwrap_or(0);
        if cursor + shortest > chars.len() {
            return Err(AlignmentError::TransformedTooShort {
                surface: token.surface.clone(),
                needed: candidates[0].len(),
                available: chars.len().saturating_sub(cursor),
            });
        }

        let gap = token.original_start.saturating_sub(previous_original_end);
        let window_end = cursor + gap * 2 + MIN_SEARCH_WINDOW;

        let hint = token.transformed_start;
        let hinted = (hint >= cursor && token.transformed_end >= hint)
            .then(|| {
                candidates
                    .iter()
                    .find(|c| c.len() == token.transformed_end - hint && starts_with(chars, hint, c))
                    .map(|c| (hint, c.len()))
            })
            .flatten();
        let found = hinted.or_else(|| {
            candidates.iter().find_map(|candidate| {
                (cursor..=window_end.min(chars.len()))
                    .find(|&pos| starts_with(chars, pos, candidate))
                    .map(|pos| (pos, candidate.len()))
            })
        });

        let Some((start, len)) = found else {
            return Err(AlignmentError::ReadingNotFound {
                surface: token.surface.clone(),
                reading: token.reading.clone(),
                cursor,
                available: preview(chars, cursor),
            });
        };
        token.transformed_start = start;
        token.transformed_end = start + len;
        cursor = start + len;
        previous_original_end = token.original_end;
    }
    Ok(())
}

/// 二重オフセットの不変条件を検査する。
///
/// # Errors
/// 最初に破れている条件を `AlignmentError` で返す。
pub fn verify_alignment(original: &str, transformed: &str, tokens: &[Token]) -> Result<(), AlignmentError> {
    let original_chars: Vec<char> = original.chars().collect();
    let transformed_chars: Vec<char> = transformed.chars().collect();
    let mut original_cursor = 0;
    let mut transformed_cursor = 0;

    for token in tokens {
        if token.original_start < original_cursor || token.transformed_start < transformed_cursor {
            return Err(AlignmentError::OutOfOrder {
                surface: token.surface.clone(),
                offset: token.original_start,
            });
        }
        let surface_ok = token.original_end >= token.original_start
            && token.original_end <= original_chars.len()
            && original_chars[token.original_start..token.original_end]
                .iter()
                .copied()
                .eq(token.surface.chars());
        if !surface_ok {
            return Err(AlignmentError::SurfaceNotFound {
                surface: token.surface.clone(),
                cursor: token.original_start,
                available: preview(&original_chars, token.original_start),
            });
        }
        if token.transformed_end < token.transformed_start || token.transformed_end > transformed_chars.len() {
            return Err(AlignmentError::TransformedTooShort {
                surface: token.surface.clone(),
                needed: token.transformed_end,
                available: transformed_chars.len(),
            });
        }
        let span = &transformed_chars[token.transformed_start..token.transformed_end];
        if !(span.iter().copied().eq(token.reading.chars()) || span.iter().copied().eq(token.surface.chars())) {
            return Err(AlignmentError::ReadingNotFound {
                surface: token.surface.clone(),
                reading: token.reading.clone(),
                cursor: token.transformed_start,
                available: preview(&transformed_chars, token.transformed_start),
            });
        }
        original_cursor = token.original_end;
        transformed_cursor = token.transformed_end;
    }
    Ok(())
}

/// 変換後テキスト側だけを検査する。元テキストが手元にないとき用。
///
/// トークンは元・変換後の両方で単調かつ重ならず、変換後の範囲は
/// 読みか表層のどちらかと一致していなければならない。
///
/// # Errors
/// 最初に破れている条件を `AlignmentError` で返す。
pub fn verify_transformed(transformed: &str, tokens: &[Token]) -> Result<(), AlignmentError> {
    let transformed_chars: Vec<char> = transformed.chars().collect();
    let mut original_cursor = 0;
    let mut transformed_cursor = 0;

    for token in tokens {
        if token.original_start < original_cursor
            || token.original_end < token.original_start
            || token.transformed_start < transformed_cursor
        {
            return Err(AlignmentError::OutOfOrder {
                surface: token.surface.clone(),
                offset: token.transformed_start,
            });
        }
        if token.transformed_end < token.transformed_start || token.transformed_end > transformed_chars.len() {
            return Err(AlignmentError::TransformedTooShort {
                surface: token.surface.clone(),
                needed: token.transformed_end,
                available: transformed_chars.len(),
            });
        }
        let span = &transformed_chars[token.transformed_start..token.transformed_end];
        if !(span.iter().copied().eq(token.reading.chars()) || span.iter().copied().eq(token.surface.chars())) {
            return Err(AlignmentError::ReadingNotFound {
                surface: token.surface.clone(),
                reading: token.reading.clone(),
                cursor: token.transformed_start,
                available: preview(&transformed_chars, token.transformed_start),
            });
        }
        original_cursor = token.original_end;
        transformed_cursor = token.transformed_end;
    }
    Ok(())
}

fn starts_with(haystack: &[char], pos: usize, needle: &[char]) -> bool {
    pos + needle.len() <= haystack.len() && haystack[pos..pos + needle.len()] == *needle
}

fn preview(chars: &[char], from: usize) -> String {
    chars[from.min(chars.len())..].iter().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ReadingSource;

    fn token(surface: &str, reading: &str, source: ReadingSource) -> Token {
        Token::new(surface, reading, source, 0, 0)
    }

    #[test]
    fn reorders_tokens_discovered_out_of_order() {
        let original = "温水は馬締と話した";
        let transformed = "ヌクミズハマジメトハナシタ";
        let tokens = vec![
            token("馬締", "マジメ", ReadingSource::Propagation),
            token("話", "ハナ", ReadingSource::Unidic),
            token("温水", "ヌクミズ", ReadingSource::Ruby),
        ];
        let aligned = normalize_alignment(original, transformed, tokens).expect("aligned");
        let spans: Vec<(&str, usize, usize, usize, usize)> = aligned
            .iter()
            .map(|t| {
                (
                    t.surface.as_str(),
                    t.original_start,
                    t.original_end,
                    t.transformed_start,
                    t.transformed_end,
                )
            })
            .collect();
        assert_eq!(
            spans,
            vec![
                ("温水", 0, 2, 0, 4),
                ("馬締", 3, 5, 5, 8),
                ("話", 6, 7, 9, 11),
            ]
        );
        verify_alignment(original, transformed, &aligned).expect("invariants hold");
    }

    #[test]
    fn repeated_surfaces_claim_distinct_occurrences() {
        let original = "東と東";
        let transformed = "ヒガシトアズマ";
        let mut second = token("東", "アズマ", ReadingSource::Ruby);
        second.original_start = 2;
        second.original_end = 3;
        let first = token("東", "ヒガシ", ReadingSource::Unidic);
        let aligned = normalize_alignment(original, transformed, vec![second, first]).expect("aligned");
        assert_eq!(aligned[0].reading, "ヒガシ");
        assert_eq!((aligned[0].original_start, aligned[0].transformed_start), (0, 0));
        assert_eq!(aligned[1].reading, "アズマ");
        assert_eq!((aligned[1].original_start, aligned[1].transformed_start), (2, 4));
    }

    #[test]
    fn preserved_surface_is_accepted_in_transformed_text() {
        let aligned = normalize_alignment(
            "守衛室",
            "シュエイ室",
            vec![
                token("守衛", "シュエイ", ReadingSource::Unidic),
                token("室", "シツ", ReadingSource::Unidic),
            ],
        )
        .expect("aligned");
        assert_eq!((aligned[1].transformed_start, aligned[1].transformed_end), (4, 5));
    }

    #[test]
    fn missing_surface_is_an_error() {
        let err = normalize_alignment("温水", "ヌクミズ", vec![token("馬締", "マジメ", ReadingSource::Ruby)])
            .expect_err("must fail");
        assert!(matches!(err, AlignmentError::SurfaceNotFound { ref surface, .. } if surface == "馬締"));
    }

    #[test]
    fn short_transformed_text_is_an_error() {
        let err = normalize_alignment(
            "温水と馬締",
            "ヌクミズト",
            vec![
                token("温水", "ヌクミズ", ReadingSource::Ruby),
                token("馬締", "マジメ", ReadingSource::Ruby),
            ],
        )
        .expect_err("must fail");
        assert_eq!(
            err,
            AlignmentError::TransformedTooShort {
                surface: "馬締".to_string(),
                needed: 3,
                available: 1,
            }
        );
    }

    #[test]
    fn verify_rejects_overlaps() {
        let mut first = token("温水", "ヌクミズ", ReadingSource::Ruby);
        first.original_end = 2;
        first.transformed_end = 4;
        let mut second = token("水", "ミズ", ReadingSource::Unidic);
        second.original_start = 1;
        second.original_end = 2;
        second.transformed_start = 2;
        second.transformed_end = 4;
        let err = verify_alignment("温水", "ヌクミズ", &[first, second]).expect_err("overlap");
        assert!(matches!(err, AlignmentError::OutOfOrder { .. }));
    }

    #[test]
    fn verify_transformed_checks_the_kana_side_only() {
        let mut name = token("温水", "ヌクミズ", ReadingSource::Ruby);
        name.original_end = 2;
        name.transformed_end = 4;
        verify_transformed("ヌクミズ", std::slice::from_ref(&name)).expect("consistent");

        let mut inner = token("水", "ミズ", ReadingSource::Unidic);
        inner.original_start = 1;
        inner.original_end = 2;
        inner.transformed_start = 2;
        inner.transformed_end = 4;
        let err = verify_transformed("ヌクミズ", &[name.clone(), inner]).expect_err("overlap");
        assert!(matches!(err, AlignmentError::OutOfOrder { .. }));

        name.transformed_end = 6;
        let err = verify_transformed("ヌクミズ", &[name]).expect_err("too long");
        assert!(matches!(err, AlignmentError::TransformedTooShort { needed: 6, available: 4, .. }));
    }
}
