//! 仮名の正規化と文字種判定。
//!
//! ルビ読み・コーパス読み・解析器読みを同じ表記に揃えるための関数群。
//! すべての段階（証拠収集、マッピング選択、レンダリング）がここを通る。

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// 小書き仮名とその基底文字の対応。
const SMALL_KANA_BASE: &[(char, char)] = &[
    ('ァ', 'ア'),
    ('ィ', 'イ'),
    ('ゥ', 'ウ'),
    ('ェ', 'エ'),
    ('ォ', 'オ'),
    ('ャ', 'ヤ'),
    ('ュ', 'ユ'),
    ('ョ', 'ヨ'),
    ('ッ', 'ツ'),
    ('ヮ', 'ワ'),
    ('ヵ', 'カ'),
    ('ヶ', 'ケ'),
    ('ぁ', 'ア'),
    ('ぃ', 'イ'),
    ('ぅ', 'ウ'),
    ('ぇ', 'エ'),
    ('ぉ', 'オ'),
    ('ゃ', 'ヤ'),
    ('ゅ', 'ユ'),
    ('ょ', 'ヨ'),
    ('っ', 'ツ'),
    ('ゎ', 'ワ'),
];

/// 拗音の前に来うる仮名。直後の大書きヤユヨは小書きに直す。
const DIGRAPH_BASES: &[char] = &[
    'キ', 'ギ', 'シ', 'ジ', 'チ', 'ヂ', 'ニ', 'ヒ', 'ビ', 'ピ', 'ミ', 'リ',
];

/// 数字接頭辞として扱う文字。
pub const NUMERIC_PREFIX_CHARS: &str = "0123456789０１２３４５６７８９一二三四五六七八九十百千〇零";

static DOT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").expect("valid dot-run regex"));
static ELLIPSIS_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"…{2,}").expect("valid ellipsis-run regex"));

/// CJK統合漢字（拡張・互換を含む）と踊り字類かどうか。
#[must_use]
pub fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x2_0000..=0x2_A6DF
            | 0x2_A700..=0x2_EBEF
            | 0x3_0000..=0x3_134F
            | 0xF900..=0xFAFF
            | 0x2_F800..=0x2_FA1F
    ) || matches!(ch, '々' | '〆' | 'ヵ' | 'ヶ')
}

#[must_use]
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

#[must_use]
pub fn is_hiragana(ch: char) -> bool {
    ('\u{3041}'..='\u{309F}').contains(&ch)
}

/// 片仮名ブロック（長音符・中黒を含む）。
#[must_use]
pub fn is_katakana(ch: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&ch)
}

#[must_use]
pub fn is_kana(ch: char) -> bool {
    is_hiragana(ch) || is_katakana(ch)
}

/// 空白を除いたすべての文字が仮名（長音符・中黒を含む）であるか。
#[must_use]
pub fn is_kana_string(text: &str) -> bool {
    let mut seen = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            continue;
        }
        if !is_kana(ch) {
            return false;
        }
        seen = true;
    }
    seen
}

/// 英数字と一部記号のみからなり、英字を一つ以上含む語か。
///
/// 外国人名などのルビ付き英字表記を判定するのに使う。
#[must_use]
pub fn looks_like_ascii_word(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let allowed = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '\'' | '’' | '・'));
    allowed && trimmed.chars().any(|ch| ch.is_ascii_alphabetic())
}

/// 前後の空白を除いて漢字一文字だけか。
#[must_use]
pub fn is_single_kanji_base(text: &str) -> bool {
    let mut chars = text.trim().chars();
    matches!((chars.next(), chars.next()), (Some(ch), None) if is_cjk(ch))
}

/// 平仮名を片仮名へ移す。それ以外の文字はそのまま残す。
#[must_use]
pub fn hiragana_to_katakana(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{3041}'..='\u{3096}' => char::from_u32(ch as u32 + 0x60).unwrap_or(ch),
            'ゝ' => 'ヽ',
            'ゞ' => 'ヾ',
            'ゟ' => 'ヿ',
            other => other,
        })
        .collect()
}

/// 片仮名表記を正規形に揃える。
///
/// NFKC の後、四つ仮名（ヂ・ヅ）と小書きの特殊仮名を統一し、
/// 拗音になるべき大書きヤユヨを小書きに直す。
#[must_use]
pub fn normalize_katakana(text: &str) -> String {
    let folded: Vec<char> = text
        .nfkc()
        .map(|ch| match ch {
            'ヂ' => 'ジ',
            'ヅ' => 'ズ',
            'ヮ' => 'ワ',
            'ヵ' | 'ゕ' => 'カ',
            'ヶ' | 'ゖ' => 'ケ',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for ch in folded {
        let adjusted = match (prev, ch) {
            (Some(p), 'ヤ') if DIGRAPH_BASES.contains(&p) => 'ャ',
            (Some(p), 'ユ') if DIGRAPH_BASES.contains(&p) => 'ュ',
            (Some(p), 'ヨ') if DIGRAPH_BASES.contains(&p) => 'ョ',
            _ => ch,
        };
        out.push(adjusted);
        // 直したヤユヨの後ろでは連鎖させない
        prev = if adjusted == ch { Some(ch) } else { None };
    }
    out
}

/// 空白を除いてNFKC正規化した基底文字列。
#[must_use]
pub fn normalize_base(raw: &str) -> String {
    strip_whitespace(raw).nfkc().collect()
}

/// ルビ・コーパス・解析器の読みを比較可能な片仮名形に揃える。
#[must_use]
pub fn normalize_reading(raw: &str) -> String {
    let compact: String = strip_whitespace(raw).nfkc().collect();
    normalize_katakana(&hiragana_to_katakana(&compact))
}

/// トークン間の地の文を読み上げ用に整える。
///
/// 平仮名を片仮名に移し、三点以上のピリオドと連続する三点リーダを一つの `…` に畳む。
#[must_use]
pub fn render_plain(text: &str) -> String {
    let kana = normalize_katakana(&hiragana_to_katakana(text));
    fold_ellipsis(&kana)
}

#[must_use]
pub fn fold_ellipsis(text: &str) -> String {
    let dots = DOT_RUN.replace_all(text, "…");
    ELLIPSIS_RUN.replace_all(&dots, "…").into_owned()
}

/// 小書き仮名を基底文字に置き換える。
#[must_use]
pub fn strip_small_kana(text: &str) -> String {
    text.chars().map(small_kana_base_or_self).collect()
}

fn small_kana_base(ch: char) -> Option<char> {
    SMALL_KANA_BASE
        .iter()
        .find_map(|&(small, base)| (small == ch).then_some(base))
}

fn small_kana_base_or_self(ch: char) -> char {
    small_kana_base(ch).unwrap_or(ch)
}

/// 二つの読みが同じ位置の小書き/大書きの違いだけで異なるか。
///
/// 同じ長さで、小書きを基底に戻すと一致し、かつ異なる位置では
/// どちらか一方が小書き仮名になっている場合に真。完全一致は偽。
#[must_use]
pub fn differs_only_by_small_kana(left: &str, right: &str) -> bool {
    if left == right {
        return false;
    }
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(&right).all(|(&a, &b)| {
        a == b
            || (small_kana_base_or_self(a) == small_kana_base_or_self(b)
                && (small_kana_base(a).is_some() || small_kana_base(b).is_some()))
    })
}

fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|ch| !ch.is_whitespace()).collect()
}
