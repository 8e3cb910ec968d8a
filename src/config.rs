use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::mapping::{ReadingMode, SelectionError, SelectionThresholds};

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// `yomi-refine` の実行設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    book_dir: PathBuf,
    override_file: Option<PathBuf>,
    corpus_path: Option<PathBuf>,
    parallel_chapters: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `YOMI_BOOK_DIR` が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let book_dir = PathBuf::from(env_var("YOMI_BOOK_DIR")?);
        if book_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                name: "YOMI_BOOK_DIR",
                source: anyhow::anyhow!("must not be empty"),
            });
        }
        let override_file = optional_path("YOMI_OVERRIDE_FILE");
        let corpus_path = optional_path("YOMI_CORPUS_PATH");
        let parallel_chapters = parse_bool("YOMI_PARALLEL_CHAPTERS", true)?;

        Ok(Self {
            book_dir,
            override_file,
            corpus_path,
            parallel_chapters,
        })
    }

    #[must_use]
    pub fn book_dir(&self) -> &Path {
        &self.book_dir
    }

    #[must_use]
    pub fn override_file(&self) -> Option<&Path> {
        self.override_file.as_deref()
    }

    /// 外部コーパス辞書（JSON）。
    #[must_use]
    pub fn corpus_path(&self) -> Option<&Path> {
        self.corpus_path.as_deref()
    }

    #[must_use]
    pub fn parallel_chapters(&self) -> bool {
        self.parallel_chapters
    }
}

/// 読み選択とレンダリングの調整値。YAML から読み込む。
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineSettings {
    pub mode: ReadingMode,
    #[serde(flatten)]
    pub selection: SelectionThresholds,
    pub preserve_unambiguous: bool,
}

impl EngineSettings {
    /// `YOMI_SETTINGS_PATH` の YAML を読み、`YOMI_MODE` があれば上書きする。
    ///
    /// # Errors
    /// ファイルの読み込み・パースに失敗した場合、または `YOMI_MODE` が不正な場合。
    pub fn load_from_env() -> Result<Self, SettingsError> {
        let mut settings = match env::var("YOMI_SETTINGS_PATH") {
            Ok(raw) if !raw.trim().is_empty() => Self::load_from_path(Path::new(raw.trim()))?,
            _ => Self::default(),
        };
        if let Ok(raw) = env::var("YOMI_MODE")
            && !raw.trim().is_empty()
        {
            settings.mode = raw.parse().map_err(|source| SettingsError::Mode { source })?;
        }
        Ok(settings)
    }

    /// # Errors
    /// ファイルが読めない、または YAML として解釈できない場合。
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| SettingsError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read engine settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse engine settings at {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid YOMI_MODE: {source}")]
    Mode {
        #[source]
        source: SelectionError,
    },
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_path(name: &'static str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("expected a boolean, got {raw:?}"),
        }),
    }
}
