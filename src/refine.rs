//! 確定済みの章（テキストとトークン）に利用者の上書きルールを適用する。
pub mod engine;
pub mod files;
pub mod rules;

pub use engine::{RefineOutcome, refine_chapter};
pub use files::{RefineError, RefineSummary, refine_book, refine_chapter_file};
pub use rules::{OverrideError, OverrideRule, RuleSpec, load_book_rules, load_rules_file};
