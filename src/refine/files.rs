//! Chapter files on disk: `NNNN.txt` plus `NNNN.txt.token.json`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alignment::verify_transformed;
use crate::observability::metrics::EngineMetrics;
use crate::refine::engine::refine_chapter;
use crate::refine::rules::OverrideRule;
use crate::token::{MetadataError, TokenMetadata, token_metadata_path, write_atomically};

/// Suffix of the untouched source copy kept next to a chapter.
const ORIGINAL_SUFFIX: &str = ".original.txt";

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("failed to access chapter file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Per-book result of [`refine_book`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefineSummary {
    pub chapters: usize,
    pub refined: usize,
    pub applied: usize,
}

/// Applies `rules` to one chapter file and its token metadata.
///
/// Returns the number of applied edits. Chapters without token metadata, or
/// whose metadata no longer matches the text or has inconsistent offsets, are
/// skipped with `0`.
///
/// # Errors
/// Returns an error when the chapter or its metadata cannot be read or written.
pub fn refine_chapter_file(path: &Path, rules: &[OverrideRule]) -> Result<usize, RefineError> {
    if rules.is_empty() {
        return Ok(0);
    }
    let text = fs::read_to_string(path).map_err(|source| RefineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let metadata_path = token_metadata_path(path);
    let Some(metadata) = TokenMetadata::load(&metadata_path)? else {
        debug!(chapter = %path.display(), "no token metadata; skipping");
        return Ok(0);
    };
    if metadata.is_stale(&text) {
        warn!(chapter = %path.display(), "token metadata does not match chapter text; skipping");
        return Ok(0);
    }
    if let Err(error) = verify_transformed(&text, &metadata.tokens) {
        warn!(chapter = %path.display(), error = %error, "token offsets are inconsistent; skipping");
        return Ok(0);
    }

    let outcome = refine_chapter(&text, &metadata.tokens, rules);
    if !outcome.changed {
        return Ok(0);
    }

    write_atomically(path, outcome.text.as_bytes()).map_err(|source| RefineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    TokenMetadata::new(&outcome.text, outcome.tokens).store(&metadata_path)?;
    Ok(outcome.applied)
}

/// Chapter files of a book in name order. `*.original.txt` copies are excluded.
///
/// # Errors
/// Returns an error when the directory cannot be listed.
pub fn chapter_files(book_dir: &Path) -> Result<Vec<PathBuf>, RefineError> {
    let entries = fs::read_dir(book_dir).map_err(|source| RefineError::Io {
        path: book_dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RefineError::Io {
            path: book_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if path.is_file()
            && Path::new(name).extension().is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
            && !name.ends_with(ORIGINAL_SUFFIX)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Refines every chapter of a book directory.
///
/// # Errors
/// Stops at the first chapter that cannot be read or written.
#[allow(clippy::cast_precision_loss)]
pub fn refine_book(
    book_dir: &Path,
    rules: &[OverrideRule],
    metrics: Option<&EngineMetrics>,
) -> Result<RefineSummary, RefineError> {
    let mut summary = RefineSummary::default();
    if rules.is_empty() {
        debug!(book = %book_dir.display(), "no override rules");
        return Ok(summary);
    }

    for path in chapter_files(book_dir)? {
        summary.chapters += 1;
        let applied = refine_chapter_file(&path, rules)?;
        if applied > 0 {
            summary.refined += 1;
            summary.applied += applied;
            if let Some(metrics) = metrics {
                metrics.chapters_refined.inc();
                metrics.overrides_applied.inc_by(applied as f64);
            }
        }
    }

    info!(
        book = %book_dir.display(),
        chapters = summary.chapters,
        refined = summary.refined,
        applied = summary.applied,
        "override refinement finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::rules::RuleSpec;
    use crate::token::{ReadingSource, Token};
    use tempfile::TempDir;

    fn write_chapter(dir: &TempDir, name: &str, text: &str, tokens: Vec<Token>) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).expect("write chapter");
        TokenMetadata::new(text, tokens)
            .store(&token_metadata_path(&path))
            .expect("store metadata");
        path
    }

    fn tokyo_token() -> Token {
        let mut token = Token::new("東京", "トウケイ", ReadingSource::Unidic, 0, 2);
        token.transformed_end = 4;
        token
    }

    fn rules() -> Vec<OverrideRule> {
        vec![RuleSpec::new("トウケイ").replacement("トウキョウ").compile().expect("rule")]
    }

    #[test]
    fn rewrites_text_and_metadata_together() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_chapter(&dir, "0001.txt", "トウケイへ\n", vec![tokyo_token()]);

        assert_eq!(refine_chapter_file(&path, &rules()).expect("refine"), 1);
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, "トウキョウへ\n");
        let metadata = TokenMetadata::load(&token_metadata_path(&path))
            .expect("load")
            .expect("present");
        assert!(!metadata.is_stale(&text));
        assert_eq!(metadata.tokens[0].reading, "トウキョウ");

        // 二度目は何も書き換えない
        assert_eq!(refine_chapter_file(&path, &rules()).expect("refine"), 0);
    }

    #[test]
    fn stale_or_missing_metadata_is_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let stale = write_chapter(&dir, "0001.txt", "トウケイへ", vec![tokyo_token()]);
        fs::write(&stale, "トウケイへ（加筆）").expect("edit");
        assert_eq!(refine_chapter_file(&stale, &rules()).expect("refine"), 0);
        assert_eq!(fs::read_to_string(&stale).expect("read"), "トウケイへ（加筆）");

        let bare = dir.path().join("0002.txt");
        fs::write(&bare, "トウケイ").expect("write");
        assert_eq!(refine_chapter_file(&bare, &rules()).expect("refine"), 0);
    }

    #[test]
    fn overlapping_metadata_is_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let mut inner = Token::new("京", "ウケ", ReadingSource::Unidic, 1, 2);
        inner.transformed_start = 1;
        inner.transformed_end = 3;
        let path = write_chapter(&dir, "0001.txt", "トウケイへ", vec![tokyo_token(), inner]);
        let shrink = vec![RuleSpec::new("トウケイ").replacement("ト").compile().expect("rule")];

        assert_eq!(refine_chapter_file(&path, &shrink).expect("refine"), 0);
        assert_eq!(fs::read_to_string(&path).expect("read"), "トウケイへ");
        let metadata = TokenMetadata::load(&token_metadata_path(&path))
            .expect("load")
            .expect("present");
        assert_eq!(metadata.tokens.len(), 2);
    }

    #[test]
    fn book_refinement_skips_original_copies() {
        let dir = TempDir::new().expect("tempdir");
        write_chapter(&dir, "0002.txt", "オオサカ", Vec::new());
        write_chapter(&dir, "0001.txt", "トウケイへ", vec![tokyo_token()]);
        fs::write(dir.path().join("0001.original.txt"), "東京へ").expect("write");

        let files = chapter_files(dir.path()).expect("list");
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(names, vec!["0001.txt", "0002.txt"]);

        let summary = refine_book(dir.path(), &rules(), None).expect("refine");
        assert_eq!(
            summary,
            RefineSummary {
                chapters: 2,
                refined: 1,
                applied: 1
            }
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("0001.original.txt")).expect("read"),
            "東京へ"
        );
    }
}
