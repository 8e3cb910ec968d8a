//! 複数パスの置換を二重適用なしで行うための区分列。
//!
//! 章の本文を「未解決の地の文」と「解決済みの区間」の列として持つ。
//! マッピングの各パスは地の文だけを走査・分割し、解決済みの区間
//! （ルビや前のパスで置き換えたもの）には二度と入らない。

use tracing::debug;

use crate::mapping::{BaseMapping, Tier};
use crate::markup::{ChapterMarkup, MarkupNode};
use crate::token::{ReadingSource, Token};
use crate::util::kana::{is_kana_string, normalize_reading};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    Resolved {
        surface: String,
        reading: String,
        source: ReadingSource,
    },
}

impl Segment {
    /// 元テキストでの表層。
    #[must_use]
    pub fn surface(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Resolved { surface, .. } => surface,
        }
    }

    /// 変換後テキストへ出力する文字列。
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Resolved {
                surface, reading, ..
            } => {
                if reading.is_empty() {
                    surface
                } else {
                    reading
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformationTracker {
    segments: Vec<Segment>,
    // 全区分の表層を連結した元テキスト。解決で変わらないので一度だけ作る
    surface_chars: Vec<char>,
}

impl TransformationTracker {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Plain(text.to_string())]
        };
        Self {
            segments,
            surface_chars: text.chars().collect(),
        }
    }

    /// マークアップから作る。ルビは最初から解決済みの区間になる。
    #[must_use]
    pub fn from_markup(markup: &ChapterMarkup) -> Self {
        let mut segments: Vec<Segment> = Vec::with_capacity(markup.nodes.len());
        for node in &markup.nodes {
            match node {
                MarkupNode::Ruby { base, reading } if !base.is_empty() && !reading.trim().is_empty() => {
                    segments.push(Segment::Resolved {
                        surface: base.clone(),
                        reading: ruby_reading(reading),
                        source: ReadingSource::Ruby,
                    });
                }
                other => push_plain(&mut segments, other.surface()),
            }
        }
        let surface_chars = segments
            .iter()
            .flat_map(|segment| segment.surface().chars())
            .collect();
        Self {
            segments,
            surface_chars,
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn original_text(&self) -> String {
        self.surface_chars.iter().collect()
    }

    /// `unique` 層、次に `common` 層を適用する。解決した区間の数を返す。
    pub fn apply_mapping(&mut self, mapping: &BaseMapping) -> usize {
        if mapping.is_empty() {
            return 0;
        }
        let unique = self.apply_tier(mapping, Tier::Unique);
        let common = self.apply_tier(mapping, Tier::Common);
        debug!(unique, common, "applied reading mapping");
        unique + common
    }

    /// 一つの層を地の文の区分にだけ適用する。
    pub fn apply_tier(&mut self, mapping: &BaseMapping, tier: Tier) -> usize {
        let mut resolved = 0;
        let mut next: Vec<Segment> = Vec::with_capacity(self.segments.len());
        let mut offset = 0;

        for segment in std::mem::take(&mut self.segments) {
            let len = segment.surface().chars().count();
            let Segment::Plain(text) = segment else {
                next.push(segment);
                offset += len;
                continue;
            };

            let hits = mapping.find_matches(&self.surface_chars, offset..offset + len, tier);
            if hits.is_empty() {
                next.push(Segment::Plain(text));
                offset += len;
                continue;
            }

            let mut cursor = offset;
            for hit in hits {
                if hit.start > cursor {
                    push_plain(&mut next, &self.chars_between(cursor, hit.start));
                }
                next.push(Segment::Resolved {
                    surface: self.chars_between(hit.start, hit.end),
                    reading: hit.entry.reading.clone(),
                    source: hit.entry.source,
                });
                cursor = hit.end;
                resolved += 1;
            }
            if cursor < offset + len {
                push_plain(&mut next, &self.chars_between(cursor, offset + len));
            }
            offset += len;
        }

        self.segments = next;
        resolved
    }

    fn chars_between(&self, start: usize, end: usize) -> String {
        self.surface_chars[start..end].iter().collect()
    }

    /// 区分列を平坦化し、変換後テキストと解決済み区間のトークン列を返す。
    ///
    /// 地の文はそのまま出力する。トークンは両方の座標系でオフセットを持つ。
    #[must_use]
    pub fn extract(&self) -> (String, Vec<Token>) {
        let mut text = String::new();
        let mut tokens = Vec::new();
        let mut original = 0;
        let mut transformed = 0;

        for segment in &self.segments {
            let surface_len = segment.surface().chars().count();
            let output = segment.output();
            let output_len = output.chars().count();
            if let Segment::Resolved {
                surface,
                reading,
                source,
            } = segment
            {
                let mut token =
                    Token::new(surface.clone(), reading.clone(), *source, original, original + surface_len);
                token.transformed_start = transformed;
                token.transformed_end = transformed + output_len;
                tokens.push(token);
            }
            text.push_str(output);
            original += surface_len;
            transformed += output_len;
        }
        (text, tokens)
    }
}

fn push_plain(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Plain(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Plain(text.to_string()));
    }
}

/// 仮名のルビは正規化し、それ以外（義訓・訳語）は表記のまま使う。
pub(crate) fn ruby_reading(raw: &str) -> String {
    let normalized = normalize_reading(raw);
    if is_kana_string(&normalized) {
        normalized
    } else {
        raw.trim().to_string()
    }
}
