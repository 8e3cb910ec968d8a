//! 書籍単位の二段階処理。
//!
//! 1. `BookContext::build` で全章の証拠からマッピングを一度だけ作る。
//! 2. 各章を独立に変換する。章同士は読み取り専用のマッピングしか共有しない。

use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alignment::{AlignmentError, normalize_alignment};
use crate::analyzer::{AnalyzerError, KanaConverter, MorphAnalyzer};
use crate::builder::{TokenBuilder, render};
use crate::config::EngineSettings;
use crate::evidence::{BookEvidence, CorpusDictionary};
use crate::mapping::{BaseMapping, MappingSelector, ReadingMode, SelectionError};
use crate::markup::ChapterMarkup;
use crate::observability::metrics::EngineMetrics;
use crate::pitch::{PitchCache, enrich};
use crate::token::{MetadataError, Token, TokenMetadata, token_metadata_path, write_atomically};
use crate::tracker::TransformationTracker;
use crate::util::text::text_sha1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("advanced reading mode requires a morphological analyzer")]
    AnalyzerUnavailable,
    #[error("mapping selection failed: {0}")]
    Selection(#[source] SelectionError),
}

impl From<SelectionError> for PipelineError {
    fn from(error: SelectionError) -> Self {
        match error {
            SelectionError::AnalyzerUnavailable => Self::AnalyzerUnavailable,
            other => Self::Selection(other),
        }
    }
}

/// 章単位の失敗。呼び出し側は章を飛ばして続行できる。
#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("chapter {chapter}: {source}")]
    Alignment {
        chapter: String,
        #[source]
        source: AlignmentError,
    },
    #[error("chapter {chapter}: {source}")]
    Analyzer {
        chapter: String,
        #[source]
        source: AnalyzerError,
    },
}

impl ChapterError {
    #[must_use]
    pub fn chapter(&self) -> &str {
        match self {
            Self::Alignment { chapter, .. } | Self::Analyzer { chapter, .. } => chapter,
        }
    }
}

/// 変換済みの一章。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutput {
    pub id: String,
    pub original_text: String,
    pub text: String,
    pub tokens: Vec<Token>,
    pub text_sha1: String,
    /// この章で解析器に問い合わせたアクセントの件数。
    pub pitch_lookups: usize,
}

impl ChapterOutput {
    #[must_use]
    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata::new(&self.text, self.tokens.clone())
    }

    /// `<id>.txt`、`<id>.original.txt`、`<id>.txt.token.json` を書き出す。
    ///
    /// # Errors
    /// いずれかのファイルの書き込みに失敗した場合。
    pub fn store(&self, book_dir: &Path) -> Result<PathBuf, MetadataError> {
        let chapter_path = book_dir.join(format!("{}.txt", self.id));
        let original_path = book_dir.join(format!("{}.original.txt", self.id));
        for (path, body) in [(&chapter_path, &self.text), (&original_path, &self.original_text)] {
            write_atomically(path, body.as_bytes()).map_err(|source| MetadataError::Io {
                path: path.clone(),
                source,
            })?;
        }
        self.metadata().store(&token_metadata_path(&chapter_path))?;
        Ok(chapter_path)
    }
}

/// 書籍全体で共有する読み取り専用の状態。
pub struct BookContext<'a> {
    mode: ReadingMode,
    preserve_unambiguous: bool,
    mapping: BaseMapping,
    analyzer: Option<&'a dyn MorphAnalyzer>,
    kana: Option<&'a dyn KanaConverter>,
}

impl fmt::Debug for BookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookContext")
            .field("mode", &self.mode)
            .field("preserve_unambiguous", &self.preserve_unambiguous)
            .field("mapping", &self.mapping)
            .field("analyzer", &self.analyzer.is_some())
            .field("kana", &self.kana.is_some())
            .finish()
    }
}

impl<'a> BookContext<'a> {
    /// 全章の証拠を集め、マッピングを選ぶ。章の変換より前に一度だけ呼ぶ。
    ///
    /// # Errors
    /// `advanced` モードで解析器がない場合は、章の処理を始める前に
    /// `PipelineError::AnalyzerUnavailable` を返す。
    pub fn build(
        chapters: &[ChapterMarkup],
        corpus: Option<&CorpusDictionary>,
        settings: &EngineSettings,
        analyzer: Option<&'a dyn MorphAnalyzer>,
    ) -> Result<Self, PipelineError> {
        let selector = MappingSelector::new(settings.mode, settings.selection.clone(), analyzer)?;
        let mut evidence = BookEvidence::from_chapters(chapters);
        if let Some(corpus) = corpus {
            evidence.merge_corpus(corpus);
        }
        let mapping = selector.select(&evidence);
        info!(
            mode = %settings.mode,
            chapters = chapters.len(),
            unique = mapping.unique().len(),
            common = mapping.common().len(),
            "book mapping ready"
        );
        Ok(Self {
            mode: settings.mode,
            preserve_unambiguous: settings.preserve_unambiguous,
            mapping,
            analyzer,
            kana: None,
        })
    }

    #[must_use]
    pub fn with_kana_converter(mut self, kana: &'a dyn KanaConverter) -> Self {
        self.kana = Some(kana);
        self
    }

    #[must_use]
    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    #[must_use]
    pub fn mapping(&self) -> &BaseMapping {
        &self.mapping
    }

    /// 一章を変換する。
    ///
    /// # Errors
    /// 解析器の失敗、または位置合わせに失敗した場合は `ChapterError`。
    pub fn process_chapter(&self, chapter: &ChapterMarkup) -> Result<ChapterOutput, ChapterError> {
        let original = chapter.original_text();
        let (text, tokens) = match (self.mode, self.analyzer) {
            (ReadingMode::Advanced, Some(analyzer)) => {
                let mut builder = TokenBuilder::new(analyzer, &self.mapping);
                if let Some(kana) = self.kana {
                    builder = builder.with_kana_converter(kana);
                }
                let tokens = builder.build(chapter).map_err(|source| ChapterError::Analyzer {
                    chapter: chapter.id.clone(),
                    source,
                })?;
                render(&original, tokens, self.preserve_unambiguous)
            }
            _ => {
                let mut tracker = TransformationTracker::from_markup(chapter);
                tracker.apply_mapping(&self.mapping);
                tracker.extract()
            }
        };

        let mut tokens =
            normalize_alignment(&original, &text, tokens).map_err(|source| ChapterError::Alignment {
                chapter: chapter.id.clone(),
                source,
            })?;

        let mut pitch_lookups = 0;
        if let Some(analyzer) = self.analyzer {
            let mut cache = PitchCache::new();
            let filled = enrich(&mut tokens, analyzer, &mut cache);
            pitch_lookups = cache.lookups();
            debug!(chapter = %chapter.id, filled, lookups = pitch_lookups, "pitch enrichment");
        }

        Ok(ChapterOutput {
            id: chapter.id.clone(),
            text_sha1: text_sha1(&text),
            original_text: original,
            text,
            tokens,
            pitch_lookups,
        })
    }

    /// 全章を変換する。結果は入力と同じ順で、失敗した章もエラーとして残る。
    #[must_use]
    pub fn process_book(
        &self,
        chapters: &[ChapterMarkup],
        parallel: bool,
        metrics: Option<&EngineMetrics>,
    ) -> Vec<Result<ChapterOutput, ChapterError>> {
        let run = |chapter: &ChapterMarkup| {
            let _timer = metrics.map(|metrics| metrics.chapter_duration.start_timer());
            let result = self.process_chapter(chapter);
            record(metrics, &result);
            result
        };
        let results: Vec<_> = if parallel {
            chapters.par_iter().map(run).collect()
        } else {
            chapters.iter().map(run).collect()
        };

        let failed = results.iter().filter(|result| result.is_err()).count();
        info!(
            chapters = results.len(),
            failed,
            parallel,
            "book transformation finished"
        );
        results
    }
}

#[allow(clippy::cast_precision_loss)]
fn record(metrics: Option<&EngineMetrics>, result: &Result<ChapterOutput, ChapterError>) {
    match result {
        Ok(output) => {
            if let Some(metrics) = metrics {
                metrics.chapters_processed.inc();
                metrics.tokens_emitted.inc_by(output.tokens.len() as f64);
                metrics.pitch_lookups.inc_by(output.pitch_lookups as f64);
            }
        }
        Err(error) => {
            warn!(chapter = %error.chapter(), error = %error, "chapter transformation failed");
            if let Some(metrics) = metrics {
                metrics.chapters_failed.inc();
            }
        }
    }
}
