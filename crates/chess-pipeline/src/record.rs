//! Raw game records and tag extraction.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Tag name to value, e.g. `"WhiteElo" -> "1500"`.
pub type TagMap = HashMap<String, String>;

/// The verbatim text of one game: its tag lines, any blank lines before
/// them, and the move or result line that sealed it. Every line keeps its `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord(String);

impl RawRecord {
    /// Wrap the verbatim text of one game.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The verbatim record text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the owned record text.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Lowercase hex SHA-256 of the verbatim record text.
    ///
    /// Identical text always yields the same id, so re-ingesting an archive
    /// with `create` semantics turns repeats into conflicts.
    pub fn game_id(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    /// Split the record into its tags and move text.
    pub fn parse(&self) -> ParsedRecord {
        let mut parsed = ParsedRecord::default();

        for line in self.0.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                if let Some((key, value)) = parse_tag_line(line) {
                    parsed.tags.insert(key, value);
                }
            } else if line.starts_with("1.") {
                parsed.moves = line.to_string();
            }
        }

        parsed
    }
}

impl From<String> for RawRecord {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Tags and move text pulled out of a [`RawRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    pub tags: TagMap,
    /// The move line, trimmed; empty when the sealing line was not a move list
    pub moves: String,
}

impl ParsedRecord {
    /// Value of `key`, or `""` when the tag is absent.
    pub fn tag(&self, key: &str) -> &str {
        self.tags.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Parse a `[Key "Value"]` line.
///
/// The key is everything before the first ` "`; the value is the rest with
/// one trailing `"` removed. Lines without that separator yield `None`.
pub fn parse_tag_line(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[').unwrap_or(line);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    let (key, value) = inner.split_once(" \"")?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = value.strip_suffix('"').unwrap_or(value);
    Some((key.to_string(), value.to_string()))
}
