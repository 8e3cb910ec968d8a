//! Chapter input model: plain text interleaved with ruby annotations.
//!
//! The HTML layer isolates ruby elements before anything reaches this crate; a
//! chapter arrives as an ordered list of text and ruby nodes. The original text of
//! a chapter is the concatenation of text nodes and ruby bases.

use serde::{Deserialize, Serialize};

use crate::util::kana::is_cjk;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkupNode {
    Text { text: String },
    Ruby { base: String, reading: String },
}

impl MarkupNode {
    /// Text contributed to the chapter's original text.
    #[must_use]
    pub fn surface(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Ruby { base, .. } => base,
        }
    }

    #[must_use]
    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, Self::Text { text } if text.trim().is_empty())
    }
}

/// Position of a ruby base inside the chapter's original text (char offsets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubySpan {
    pub start: usize,
    pub end: usize,
    pub base: String,
    pub reading: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMarkup {
    pub id: String,
    pub nodes: Vec<MarkupNode>,
}

impl ChapterMarkup {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
        }
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    #[must_use]
    pub fn ruby(mut self, base: impl Into<String>, reading: impl Into<String>) -> Self {
        self.push_ruby(base, reading);
        self
    }

    /// Appends text, merging with a preceding text node.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(MarkupNode::Text { text: last }) = self.nodes.last_mut() {
            last.push_str(&text);
        } else {
            self.nodes.push(MarkupNode::Text { text });
        }
    }

    pub fn push_ruby(&mut self, base: impl Into<String>, reading: impl Into<String>) {
        self.nodes.push(MarkupNode::Ruby {
            base: base.into(),
            reading: reading.into(),
        });
    }

    #[must_use]
    pub fn original_text(&self) -> String {
        self.nodes.iter().map(MarkupNode::surface).collect()
    }

    #[must_use]
    pub fn ruby_spans(&self) -> Vec<RubySpan> {
        let mut spans = Vec::new();
        let mut cursor = 0;
        for node in &self.nodes {
            let len = node.surface().chars().count();
            if let MarkupNode::Ruby { base, reading } = node
                && len > 0
            {
                spans.push(RubySpan {
                    start: cursor,
                    end: cursor + len,
                    base: base.clone(),
                    reading: reading.clone(),
                });
            }
            cursor += len;
        }
        spans
    }

    /// Parses Aozora Bunko style inline ruby.
    ///
    /// `｜base《reading》` marks an explicit base; without the bar the base is the
    /// run of kanji right before `《`. Unterminated or baseless annotations stay
    /// as literal text.
    #[must_use]
    pub fn parse_aozora(id: impl Into<String>, source: &str) -> Self {
        let mut markup = Self::new(id);
        let chars: Vec<char> = source.chars().collect();
        let mut buffer: Vec<char> = Vec::new();
        let mut bar: Option<usize> = None;
        let mut idx = 0;

        while idx < chars.len() {
            let ch = chars[idx];
            if ch == '｜' || ch == '|' {
                if let Some(pos) = bar.replace(buffer.len()) {
                    buffer.insert(pos, ch);
                    bar = Some(buffer.len());
                }
                idx += 1;
                continue;
            }
            if ch == '《'
                && let Some(close) = chars[idx + 1..].iter().position(|&c| c == '》')
            {
                let reading: String = chars[idx + 1..idx + 1 + close].iter().collect();
                let base_start = bar.unwrap_or_else(|| {
                    let run = buffer.iter().rev().take_while(|&&c| is_cjk(c)).count();
                    buffer.len() - run
                });
                if base_start < buffer.len() && !reading.trim().is_empty() {
                    let base: String = buffer[base_start..].iter().collect();
                    let prefix: String = buffer[..base_start].iter().collect();
                    markup.push_text(prefix);
                    markup.push_ruby(base, reading);
                    buffer.clear();
                    bar = None;
                    idx += close + 2;
                    continue;
                }
            }
            buffer.push(ch);
            idx += 1;
        }

        if let Some(pos) = bar {
            buffer.insert(pos, '｜');
        }
        markup.push_text(buffer.into_iter().collect::<String>());
        markup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_merges_adjacent_text() {
        let markup = ChapterMarkup::new("c1").text("先").text("に").ruby("百合", "ゆり");
        assert_eq!(markup.nodes.len(), 2);
        assert_eq!(markup.original_text(), "先に百合");
    }

    #[test]
    fn ruby_spans_use_char_offsets() {
        let markup = ChapterMarkup::new("c1")
            .text("先")
            .ruby("百合", "ゆり")
            .text("後 ")
            .ruby("百合", "ゆり");
        let spans = markup.ruby_spans();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (1, 3));
        assert_eq!((spans[1].start, spans[1].end), (5, 7));
    }

    #[test]
    fn aozora_implicit_base_takes_kanji_run() {
        let markup = ChapterMarkup::parse_aozora("c1", "彼は馬締《まじめ》と言った。");
        assert_eq!(
            markup.nodes,
            vec![
                MarkupNode::Text {
                    text: "彼は".to_string()
                },
                MarkupNode::Ruby {
                    base: "馬締".to_string(),
                    reading: "まじめ".to_string()
                },
                MarkupNode::Text {
                    text: "と言った。".to_string()
                },
            ]
        );
    }

    #[test]
    fn aozora_explicit_bar_sets_base_start() {
        let markup = ChapterMarkup::parse_aozora("c1", "その｜Alice《アリス》が");
        let spans = markup.ruby_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].base, "Alice");
        assert_eq!(markup.original_text(), "そのAliceが");
    }

    #[test]
    fn aozora_unterminated_annotation_is_literal() {
        let markup = ChapterMarkup::parse_aozora("c1", "漢字《かんじ");
        assert!(markup.ruby_spans().is_empty());
        assert_eq!(markup.original_text(), "漢字《かんじ");
    }
}
