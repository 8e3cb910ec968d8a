use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Tracing サブスクライバを一度だけ初期化する。
///
/// フィルタは `RUST_LOG`（なければ `info`）。出力は標準エラーで、既定は JSON、
/// `YOMI_LOG_FORMAT=text` なら一行の人間向け形式になる。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let text = std::env::var("YOMI_LOG_FORMAT")
            .is_ok_and(|format| format.trim().eq_ignore_ascii_case("text"));

        let json_layer = (!text).then(|| {
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .json()
        });
        let text_layer = text.then(|| {
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
        });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .with(text_layer)
            .try_init()
            .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;
        debug!(json = !text, "tracing initialized");
        Ok::<(), Error>(())
    })?;
    Ok(())
}
