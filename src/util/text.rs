/// テキストのオフセット変換とハッシュ。
///
/// トークンのオフセットはすべて Unicode スカラー値（char）単位で表す。
/// Rust の文字列スライスはバイト単位なので、この変換をここに集める。
use sha1::{Digest, Sha1};

/// char 単位の位置とバイト位置の対応表。
#[derive(Debug, Clone)]
pub struct CharIndex {
    // 各 char の先頭バイト位置。末尾に全体のバイト長を持つ。
    byte_offsets: Vec<usize>,
}

impl CharIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(pos, _)| pos).collect();
        byte_offsets.push(text.len());
        Self { byte_offsets }
    }

    /// 文字数。
    #[must_use]
    pub fn len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// char 位置をバイト位置に変換する。範囲外は末尾に丸める。
    #[must_use]
    pub fn byte_of(&self, char_pos: usize) -> usize {
        let last = self.byte_offsets.len() - 1;
        self.byte_offsets[char_pos.min(last)]
    }

    /// char 境界上のバイト位置を char 位置に変換する。
    #[must_use]
    pub fn char_of(&self, byte_pos: usize) -> usize {
        match self.byte_offsets.binary_search(&byte_pos) {
            Ok(idx) | Err(idx) => idx,
        }
    }
}

#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// char 単位の半開区間 `[start, end)` を切り出す。範囲外は空文字列として扱う。
#[must_use]
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    if start >= end {
        return "";
    }
    let index = CharIndex::new(text);
    &text[index.byte_of(start)..index.byte_of(end)]
}

/// 本文の SHA-1 を16進で返す。末尾の空白は除いてから計算する。
///
/// 手で編集されたテキストとトークンファイルの食い違いを検出するのに使う。
#[must_use]
pub fn text_sha1(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.trim_end().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_index_maps_multibyte_positions() {
        let index = CharIndex::new("赤a鉛筆");
        assert_eq!(index.len(), 4);
        assert_eq!(index.byte_of(1), 3);
        assert_eq!(index.byte_of(2), 4);
        assert_eq!(index.byte_of(99), "赤a鉛筆".len());
        assert_eq!(index.char_of(4), 2);
    }

    #[test]
    fn char_slice_uses_scalar_offsets() {
        assert_eq!(char_slice("赤鉛筆で", 1, 3), "鉛筆");
        assert_eq!(char_slice("赤鉛筆で", 3, 3), "");
    }

    #[test]
    fn text_sha1_ignores_trailing_whitespace() {
        assert_eq!(text_sha1("アメ\n\n"), text_sha1("アメ"));
        assert_ne!(text_sha1("アメ"), text_sha1("アメリ"));
        assert_eq!(text_sha1("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
