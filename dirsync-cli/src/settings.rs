//! The `.settings` file.
//!
//! A line-oriented `key = value` format: blank lines and lines starting with
//! `#` are ignored, everything else must contain an `=`. The edge takes its
//! pre-shared `secretKey` from here; an optional `serverAddr` overrides the
//! default hub address.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Settings errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A non-comment line had no `=`.
    #[error("invalid settings line {number}: {line:?}")]
    InvalidLine {
        /// 1-based line number.
        number: usize,
        /// The offending line.
        line: String,
    },

    /// A required key is absent.
    #[error("missing required setting {0:?}")]
    Missing(String),
}

/// Parsed settings.
#[derive(Debug, Default)]
pub struct Settings(HashMap<String, String>);

impl Settings {
    /// Load and parse a settings file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse settings text.
    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let mut map = HashMap::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| SettingsError::InvalidLine {
                number: index + 1,
                line: line.to_string(),
            })?;
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self(map))
    }

    /// Look up an optional key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a key that must be present.
    pub fn require(&self, key: &str) -> Result<&str, SettingsError> {
        self.get(key)
            .ok_or_else(|| SettingsError::Missing(key.to_string()))
    }
}
