pub mod kana;
pub mod text;
