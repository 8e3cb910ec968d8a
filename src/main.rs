use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, error, info};

use yomi_engine::{
    analyzer::MorphAnalyzer,
    config::{Config, EngineSettings},
    evidence::{BookEvidence, CorpusDictionary, export_evidence, write_evidence},
    markup::ChapterMarkup,
    observability::{Telemetry, metrics::EngineMetrics},
    pipeline::BookContext,
    refine::{files::chapter_files, load_book_rules, load_rules_file, refine_book},
};

/// 青空文庫形式の章ソースを置くディレクトリ名。
const SOURCE_DIR: &str = "source";
/// 読み証拠の書き出し先（確認用）。
const RUBY_EVIDENCE_FILE: &str = "ruby_evidence.json";

fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");
        match panic_info.location() {
            Some(location) => error!(
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            ),
            None => error!(message, "panic occurred without location information"),
        }
    }));

    let telemetry = Telemetry::new().context("failed to initialize telemetry")?;
    let config = Config::from_env().context("failed to load configuration")?;
    let settings = EngineSettings::load_from_env().context("failed to load engine settings")?;

    let source_dir = config.book_dir().join(SOURCE_DIR);
    if source_dir.is_dir() {
        transform_book(&config, &settings, &source_dir, telemetry.metrics())?;
    }

    let rules = match config.override_file() {
        Some(path) => load_rules_file(path),
        None => load_book_rules(config.book_dir()),
    }
    .context("failed to load override rules")?;
    let summary = refine_book(config.book_dir(), &rules, Some(telemetry.metrics()))
        .context("override refinement failed")?;

    info!(
        book = %config.book_dir().display(),
        rules = rules.len(),
        refined = summary.refined,
        applied = summary.applied,
        "yomi-refine finished"
    );
    debug!(metrics = %telemetry.render_prometheus(), "final metrics");
    Ok(())
}

fn transform_book(
    config: &Config,
    settings: &EngineSettings,
    source_dir: &Path,
    metrics: &EngineMetrics,
) -> anyhow::Result<()> {
    let mut chapters = Vec::new();
    for path in chapter_files(source_dir).context("failed to list chapter sources")? {
        let source = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        chapters.push(ChapterMarkup::parse_aozora(id, &source));
    }

    let analyzer = load_analyzer()?;
    let evidence_path = config.book_dir().join(RUBY_EVIDENCE_FILE);
    let entries = export_evidence(&BookEvidence::from_chapters(&chapters), analyzer.as_deref());
    write_evidence(&evidence_path, &entries)?;
    debug!(path = %evidence_path.display(), entries = entries.len(), "ruby evidence exported");

    let corpus = config.corpus_path().map(CorpusDictionary::load_or_empty);
    let context = BookContext::build(&chapters, corpus.as_ref(), settings, analyzer.as_deref())
        .context("failed to build book mapping")?;

    let mut stored = 0_usize;
    for output in context
        .process_book(&chapters, config.parallel_chapters(), Some(metrics))
        .into_iter()
        .flatten()
    {
        output
            .store(config.book_dir())
            .with_context(|| format!("failed to store chapter {}", output.id))?;
        stored += 1;
    }
    info!(chapters = chapters.len(), stored, "book transformed");
    Ok(())
}

#[cfg(feature = "ipadic")]
fn load_analyzer() -> anyhow::Result<Option<Box<dyn MorphAnalyzer>>> {
    let analyzer = yomi_engine::analyzer::lindera::LinderaAnalyzer::new()
        .context("failed to load IPADIC analyzer")?;
    Ok(Some(Box::new(analyzer)))
}

#[cfg(not(feature = "ipadic"))]
#[allow(clippy::unnecessary_wraps)]
fn load_analyzer() -> anyhow::Result<Option<Box<dyn MorphAnalyzer>>> {
    Ok(None)
}
