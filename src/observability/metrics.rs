/// Prometheusメトリクス定義。
use prometheus::{Counter, Histogram, Registry, register_counter_with_registry, register_histogram_with_registry};
use std::sync::Arc;

/// エンジンのメトリクスコレクター。
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    // カウンター
    pub chapters_processed: Counter,
    pub chapters_failed: Counter,
    pub tokens_emitted: Counter,
    pub pitch_lookups: Counter,
    pub overrides_applied: Counter,
    pub chapters_refined: Counter,

    // ヒストグラム
    pub chapter_duration: Histogram,
}

impl EngineMetrics {
    /// 新しいメトリクスコレクターを作成し、`registry` に登録する。
    ///
    /// # Errors
    /// 同名のメトリクスが登録済みの場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            chapters_processed: register_counter_with_registry!(
                "yomi_chapters_processed_total",
                "Total number of chapters transformed",
                registry
            )?,
            chapters_failed: register_counter_with_registry!(
                "yomi_chapters_failed_total",
                "Total number of chapters that failed transformation",
                registry
            )?,
            tokens_emitted: register_counter_with_registry!(
                "yomi_tokens_emitted_total",
                "Total number of tokens emitted for transformed chapters",
                registry
            )?,
            pitch_lookups: register_counter_with_registry!(
                "yomi_pitch_lookups_total",
                "Number of surface pitch lookups sent to the analyzer",
                registry
            )?,
            overrides_applied: register_counter_with_registry!(
                "yomi_overrides_applied_total",
                "Number of override rule edits applied",
                registry
            )?,
            chapters_refined: register_counter_with_registry!(
                "yomi_chapters_refined_total",
                "Number of chapter files rewritten by override refinement",
                registry
            )?,
            chapter_duration: register_histogram_with_registry!(
                "yomi_chapter_duration_seconds",
                "Duration of per-chapter transformation",
                registry
            )?,
        })
    }
}
