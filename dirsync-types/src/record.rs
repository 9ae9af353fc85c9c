//! The inner change record carried inside encrypted payloads.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::WireError;

/// One file change as seen by the originating edge.
///
/// Encoded as `base64(path) base64(content) rfc3339-timestamp`, three
/// space-separated fields, then encrypted before it goes on the wire. For
/// removals the content is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Path relative to the watched directory.
    pub path: String,
    /// File bytes after the change; empty for removals.
    pub content: Vec<u8>,
    /// Wall-clock time of the originating filesystem event.
    pub timestamp: DateTime<Utc>,
}

impl ChangeRecord {
    /// Build a record stamped with the current time.
    pub fn now(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Encode to the three-field plaintext form.
    pub fn encode(&self) -> String {
        format!(
            "{} {} {}",
            BASE64.encode(self.path.as_bytes()),
            BASE64.encode(&self.content),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }

    /// Parse the three-field plaintext form.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let mut fields = text.splitn(3, ' ');
        let (path, content, timestamp) = match (fields.next(), fields.next(), fields.next()) {
            (Some(p), Some(c), Some(t)) => (p, c, t),
            _ => return Err(WireError::MalformedRecord),
        };

        let path = BASE64
            .decode(path)
            .map_err(|source| WireError::InvalidBase64 {
                field: "path",
                source,
            })?;
        let path = String::from_utf8(path).map_err(|_| WireError::InvalidPath)?;

        let content = BASE64
            .decode(content)
            .map_err(|source| WireError::InvalidBase64 {
                field: "content",
                source,
            })?;

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| WireError::InvalidTimestamp(timestamp.to_string()))?
            .with_timezone(&Utc);

        Ok(Self {
            path,
            content,
            timestamp,
        })
    }
}
