//! Tokens, provenance labels and the per-chapter token metadata file.
//!
//! All offsets are Unicode scalar (char) offsets, so `original_start..original_end`
//! indexes `original_text.chars()` and likewise for the transformed text.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::util::text::text_sha1;

/// Current token metadata file format.
pub const TOKEN_METADATA_VERSION: u32 = 2;

/// Which mechanism chose a token's reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    Ruby,
    #[serde(alias = "nhk")]
    Corpus,
    #[default]
    Unidic,
    Propagation,
    Override,
}

impl ReadingSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ruby => "ruby",
            Self::Corpus => "corpus",
            Self::Unidic => "unidic",
            Self::Propagation => "propagation",
            Self::Override => "override",
        }
    }
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rewritten span, valid in both the original and the transformed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub surface: String,
    #[serde(rename = "start")]
    pub original_start: usize,
    #[serde(rename = "end")]
    pub original_end: usize,
    pub reading: String,
    #[serde(default)]
    pub reading_source: ReadingSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reading: Option<String>,
    #[serde(rename = "accent", default)]
    pub accent_type: Option<u16>,
    #[serde(rename = "connection", default, skip_serializing_if = "Option::is_none")]
    pub accent_connection: Option<String>,
    #[serde(rename = "pos", default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub transformed_start: usize,
    #[serde(default)]
    pub transformed_end: usize,
}

impl Token {
    /// A token with original offsets only; transformed offsets are filled in by rendering.
    #[must_use]
    pub fn new(
        surface: impl Into<String>,
        reading: impl Into<String>,
        source: ReadingSource,
        original_start: usize,
        original_end: usize,
    ) -> Self {
        Self {
            surface: surface.into(),
            original_start,
            original_end,
            reading: reading.into(),
            reading_source: source,
            fallback_reading: None,
            accent_type: None,
            accent_connection: None,
            part_of_speech: None,
            transformed_start: 0,
            transformed_end: 0,
        }
    }

    #[must_use]
    pub fn original_len(&self) -> usize {
        self.original_end - self.original_start
    }

    #[must_use]
    pub fn transformed_len(&self) -> usize {
        self.transformed_end - self.transformed_start
    }

    /// Reading if set, otherwise the fallback reading, otherwise the surface.
    #[must_use]
    pub fn spoken(&self) -> &str {
        if !self.reading.is_empty() {
            return &self.reading;
        }
        match self.fallback_reading.as_deref() {
            Some(fallback) if !fallback.is_empty() => fallback,
            _ => &self.surface,
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to access token metadata {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse token metadata {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize token metadata for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialized form of a chapter's tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub version: u32,
    pub text_sha1: String,
    pub tokens: Vec<Token>,
}

impl TokenMetadata {
    #[must_use]
    pub fn new(transformed_text: &str, tokens: Vec<Token>) -> Self {
        Self {
            version: TOKEN_METADATA_VERSION,
            text_sha1: text_sha1(transformed_text),
            tokens,
        }
    }

    /// True when the stored hash no longer matches `transformed_text`.
    #[must_use]
    pub fn is_stale(&self, transformed_text: &str) -> bool {
        self.text_sha1 != text_sha1(transformed_text)
    }

    /// Reads a metadata file. A missing file yields `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, MetadataError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MetadataError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| MetadataError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes the file atomically (temp file in the same directory, then rename).
    ///
    /// # Errors
    /// Returns an error when the file cannot be written.
    pub fn store(&self, path: &Path) -> Result<(), MetadataError> {
        let body = serde_json::to_string_pretty(self).map_err(|source| MetadataError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomically(path, body.as_bytes()).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `<chapter file name>.token.json` next to the chapter text.
#[must_use]
pub fn token_metadata_path(chapter_path: &Path) -> PathBuf {
    let mut name = chapter_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".token.json");
    chapter_path.with_file_name(name)
}

/// Replaces `path` with `contents` via a temp file in the same directory.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        writer.write_all(contents)?;
        writer.flush()?;
    }
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_token() -> Token {
        let mut token = Token::new("飴", "アメ", ReadingSource::Ruby, 0, 1);
        token.transformed_end = 2;
        token.accent_type = Some(0);
        token
    }

    #[test]
    fn token_serializes_with_exchange_field_names() {
        let value = serde_json::to_value(sample_token()).expect("serialize");
        assert_eq!(value["start"], 0);
        assert_eq!(value["end"], 1);
        assert_eq!(value["reading_source"], "ruby");
        assert_eq!(value["accent"], 0);
        assert_eq!(value["transformed_end"], 2);
        assert!(value.get("pos").is_none());
    }

    #[test]
    fn legacy_corpus_label_is_accepted() {
        let token: Token = serde_json::from_str(
            r#"{"surface":"東京","start":0,"end":2,"reading":"トウキョウ","reading_source":"nhk"}"#,
        )
        .expect("parse");
        assert_eq!(token.reading_source, ReadingSource::Corpus);
        assert_eq!(token.transformed_end, 0);
    }

    #[test]
    fn spoken_prefers_reading_then_fallback_then_surface() {
        let mut token = sample_token();
        assert_eq!(token.spoken(), "アメ");
        token.reading.clear();
        token.fallback_reading = Some("アメダマ".to_string());
        assert_eq!(token.spoken(), "アメダマ");
        token.fallback_reading = None;
        assert_eq!(token.spoken(), "飴");
    }

    #[test]
    fn metadata_round_trips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let chapter = dir.path().join("0001.txt");
        let path = token_metadata_path(&chapter);
        assert!(path.ends_with("0001.txt.token.json"));

        assert!(TokenMetadata::load(&path).expect("load").is_none());

        let metadata = TokenMetadata::new("アメ\n", vec![sample_token()]);
        metadata.store(&path).expect("store");
        let loaded = TokenMetadata::load(&path).expect("load").expect("present");
        assert_eq!(loaded, metadata);
        assert!(!loaded.is_stale("アメ"));
        assert!(loaded.is_stale("アメリ"));
    }

    #[test]
    fn metadata_reports_parse_errors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.token.json");
        fs::write(&path, "{not json").expect("write");
        let err = TokenMetadata::load(&path).expect_err("must fail");
        assert!(matches!(err, MetadataError::Parse { .. }));
    }
}
