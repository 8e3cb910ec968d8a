//! Override rules and the rule file format.
//!
//! Patterns are compiled when the file is loaded, so a broken rule stops the
//! whole book before any chapter is touched.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Rule file name inside a book directory.
pub const OVERRIDE_FILE_NAME: &str = "custom_token.json";
/// Older name, still read when the current one is absent.
pub const LEGACY_OVERRIDE_FILE_NAME: &str = "custom_pitch.json";

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("failed to read override file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse override file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("override file {path} is malformed: {detail}")]
    Shape { path: PathBuf, detail: String },
    #[error("invalid override pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid accent {value} for override pattern {pattern:?}")]
    InvalidAccent { pattern: String, value: String },
}

/// A user-authored correction, matched against the transformed text.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    pub pattern: String,
    pub regex: bool,
    pub replacement: Option<String>,
    pub reading: Option<String>,
    pub accent: Option<u16>,
    pub pos: Option<String>,
    /// Literal constraint: the covered tokens' surface must equal this.
    pub surface: Option<String>,
    /// Regex constraint on the covered tokens' surface.
    pub match_surface: Option<String>,
    /// Regex constraint on every covered token's part of speech.
    pub match_pos: Option<String>,
    compiled: Regex,
    surface_regex: Option<Regex>,
    pos_regex: Option<Regex>,
}

impl OverrideRule {
    /// A literal rule with no constraints.
    ///
    /// # Errors
    /// Never fails for literal patterns in practice; returns `InvalidPattern`
    /// only if the escaped pattern exceeds the regex size limit.
    pub fn literal(pattern: &str) -> Result<Self, OverrideError> {
        RuleSpec::new(pattern).compile()
    }

    #[must_use]
    pub fn matcher(&self) -> &Regex {
        &self.compiled
    }

    /// Whether the covered surface passes the `surface` / `match_surface` constraints.
    #[must_use]
    pub fn surface_allowed(&self, surface: &str) -> bool {
        if self.surface.as_deref().is_some_and(|expected| expected != surface) {
            return false;
        }
        self.surface_regex
            .as_ref()
            .is_none_or(|regex| regex.is_match(surface))
    }

    /// Whether a token's part of speech passes `match_pos`. A missing pos fails
    /// when the constraint is set.
    #[must_use]
    pub fn pos_allowed(&self, pos: Option<&str>) -> bool {
        match (&self.pos_regex, pos) {
            (None, _) => true,
            (Some(regex), Some(pos)) => regex.is_match(pos),
            (Some(_), None) => false,
        }
    }
}

/// Uncompiled rule fields, as written in the rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSpec {
    pub pattern: String,
    pub regex: bool,
    pub replacement: Option<String>,
    pub reading: Option<String>,
    pub accent: Option<u16>,
    pub pos: Option<String>,
    pub surface: Option<String>,
    pub match_surface: Option<String>,
    pub match_pos: Option<String>,
}

impl RuleSpec {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn regex(mut self) -> Self {
        self.regex = true;
        self
    }

    #[must_use]
    pub fn replacement(mut self, value: impl Into<String>) -> Self {
        self.replacement = Some(value.into());
        self
    }

    #[must_use]
    pub fn reading(mut self, value: impl Into<String>) -> Self {
        self.reading = Some(value.into());
        self
    }

    #[must_use]
    pub fn accent(mut self, value: u16) -> Self {
        self.accent = Some(value);
        self
    }

    #[must_use]
    pub fn pos(mut self, value: impl Into<String>) -> Self {
        self.pos = Some(value.into());
        self
    }

    #[must_use]
    pub fn surface(mut self, value: impl Into<String>) -> Self {
        self.surface = Some(value.into());
        self
    }

    #[must_use]
    pub fn match_surface(mut self, value: impl Into<String>) -> Self {
        self.match_surface = Some(value.into());
        self
    }

    #[must_use]
    pub fn match_pos(mut self, value: impl Into<String>) -> Self {
        self.match_pos = Some(value.into());
        self
    }

    /// Compiles the pattern and the regex constraints.
    ///
    /// # Errors
    /// Returns `OverrideError::InvalidPattern` for any regex that fails to compile.
    pub fn compile(self) -> Result<OverrideRule, OverrideError> {
        let source = if self.regex {
            self.pattern.clone()
        } else {
            regex::escape(&self.pattern)
        };
        let compiled = compile_regex(&source)?;
        let surface_regex = self.match_surface.as_deref().map(compile_regex).transpose()?;
        let pos_regex = self.match_pos.as_deref().map(compile_regex).transpose()?;
        Ok(OverrideRule {
            pattern: self.pattern,
            regex: self.regex,
            replacement: self.replacement,
            reading: self.reading,
            accent: self.accent,
            pos: self.pos,
            surface: self.surface,
            match_surface: self.match_surface,
            match_pos: self.match_pos,
            compiled,
            surface_regex,
            pos_regex,
        })
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, OverrideError> {
    Regex::new(pattern).map_err(|source| OverrideError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Rule file of a book directory: `custom_token.json`, else `custom_pitch.json`.
#[must_use]
pub fn override_file_path(book_dir: &Path) -> Option<PathBuf> {
    [OVERRIDE_FILE_NAME, LEGACY_OVERRIDE_FILE_NAME]
        .iter()
        .map(|name| book_dir.join(name))
        .find(|path| path.is_file())
}

/// Loads the rules of a book directory. A book without a rule file has no rules.
///
/// # Errors
/// Propagates any error from [`load_rules_file`].
pub fn load_book_rules(book_dir: &Path) -> Result<Vec<OverrideRule>, OverrideError> {
    match override_file_path(book_dir) {
        Some(path) => load_rules_file(&path),
        None => Ok(Vec::new()),
    }
}

/// Reads and compiles a rule file.
///
/// Entries that are not objects or have no pattern are skipped. Fields with the
/// wrong type are treated as absent.
///
/// # Errors
/// I/O and JSON errors, a missing or non-list `overrides`, an invalid accent,
/// or any pattern that fails to compile.
pub fn load_rules_file(path: &Path) -> Result<Vec<OverrideRule>, OverrideError> {
    let contents = fs::read_to_string(path).map_err(|source| OverrideError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: Value = serde_json::from_str(&contents).map_err(|source| OverrideError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(entries) = raw.get("overrides").and_then(Value::as_array) else {
        return Err(OverrideError::Shape {
            path: path.to_path_buf(),
            detail: "expected an `overrides` array".to_string(),
        });
    };

    let mut rules = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(object) = entry.as_object() else {
            debug!(path = %path.display(), "skipping non-object override entry");
            continue;
        };
        let Some(spec) = spec_from_object(object)? else {
            continue;
        };
        rules.push(spec.compile()?);
    }
    Ok(rules)
}

fn spec_from_object(object: &Map<String, Value>) -> Result<Option<RuleSpec>, OverrideError> {
    let text = |name: &str| object.get(name).and_then(Value::as_str).map(str::to_string);
    let Some(pattern) = text("pattern").filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let accent = match object.get("accent") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => Some(
            number
                .as_u64()
                .and_then(|value| u16::try_from(value).ok())
                .ok_or_else(|| OverrideError::InvalidAccent {
                    pattern: pattern.clone(),
                    value: number.to_string(),
                })?,
        ),
        Some(Value::String(raw)) if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) => {
            Some(raw.parse::<u16>().map_err(|_| OverrideError::InvalidAccent {
                pattern: pattern.clone(),
                value: raw.clone(),
            })?)
        }
        Some(other) => {
            return Err(OverrideError::InvalidAccent {
                pattern,
                value: other.to_string(),
            });
        }
    };
    Ok(Some(RuleSpec {
        regex: object.get("regex").and_then(Value::as_bool).unwrap_or(false),
        replacement: text("replacement"),
        reading: text("reading"),
        accent,
        pos: text("pos"),
        surface: text("surface"),
        match_surface: text("match_surface"),
        match_pos: text("match_pos"),
        pattern,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).expect("write rule file");
        path
    }

    #[test]
    fn loads_rules_and_skips_empty_patterns() {
        let dir = TempDir::new().expect("tempdir");
        write(
            &dir,
            OVERRIDE_FILE_NAME,
            r#"{"overrides": [
                {"pattern": "トウケイ", "replacement": "トウキョウ", "accent": "0", "pos": "名詞"},
                {"pattern": ""},
                "junk",
                {"pattern": "マ.メ", "regex": true, "reading": 5, "accent": 1, "match_surface": "^馬"}
            ]}"#,
        );
        let rules = load_book_rules(dir.path()).expect("rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].replacement.as_deref(), Some("トウキョウ"));
        assert_eq!(rules[0].accent, Some(0));
        assert!(rules[0].matcher().is_match("トウケイ"));
        assert!(!rules[0].regex);
        assert!(rules[1].regex);
        assert!(rules[1].reading.is_none());
        assert!(rules[1].surface_allowed("馬締"));
        assert!(!rules[1].surface_allowed("真面目"));
    }

    #[test]
    fn legacy_file_name_is_accepted() {
        let dir = TempDir::new().expect("tempdir");
        write(&dir, LEGACY_OVERRIDE_FILE_NAME, r#"{"overrides": [{"pattern": "a.b"}]}"#);
        let rules = load_book_rules(dir.path()).expect("rules");
        assert_eq!(rules.len(), 1);
        // literal patterns are escaped
        assert!(!rules[0].matcher().is_match("axb"));
        assert!(rules[0].matcher().is_match("a.b"));
    }

    #[test]
    fn missing_file_means_no_rules() {
        let dir = TempDir::new().expect("tempdir");
        assert!(load_book_rules(dir.path()).expect("rules").is_empty());
    }

    #[rstest]
    #[case(r#"{"rules": []}"#)]
    #[case(r#"{"overrides": {"pattern": "x"}}"#)]
    fn overrides_must_be_a_list(#[case] body: &str) {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, OVERRIDE_FILE_NAME, body);
        let err = load_rules_file(&path).expect_err("must fail");
        assert!(matches!(err, OverrideError::Shape { .. }));
    }

    #[test]
    fn invalid_regex_fails_at_load_time() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            OVERRIDE_FILE_NAME,
            r#"{"overrides": [{"pattern": "(unclosed", "regex": true}]}"#,
        );
        let err = load_rules_file(&path).expect_err("must fail");
        assert!(matches!(err, OverrideError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[rstest]
    #[case(r#""high""#)]
    #[case("-1")]
    #[case("70000")]
    fn invalid_accents_are_rejected(#[case] accent: &str) {
        let dir = TempDir::new().expect("tempdir");
        let body = format!(r#"{{"overrides": [{{"pattern": "x", "accent": {accent}}}]}}"#);
        let path = write(&dir, OVERRIDE_FILE_NAME, &body);
        let err = load_rules_file(&path).expect_err("must fail");
        assert!(matches!(err, OverrideError::InvalidAccent { .. }));
    }

    #[test]
    fn pos_constraint_requires_a_pos() {
        let rule = RuleSpec::new("x").match_pos("^名詞").compile().expect("rule");
        assert!(rule.pos_allowed(Some("名詞-固有名詞")));
        assert!(!rule.pos_allowed(Some("動詞")));
        assert!(!rule.pos_allowed(None));
    }
}
