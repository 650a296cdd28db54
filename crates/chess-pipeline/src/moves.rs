//! Move-text normalization.

use regex::Regex;

use crate::error::IngestError;

/// Strips commentary and annotations out of a move list.
///
/// Patterns are compiled once and shared by every transformer worker.
#[derive(Debug, Clone)]
pub struct MoveCleaner {
    comment: Regex,
    ellipsis: Regex,
    annotation: Regex,
    whitespace: Regex,
    score: Regex,
    move_number: Regex,
}

impl MoveCleaner {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            comment: Regex::new(r"\{.*?\}")?,
            ellipsis: Regex::new(r"\d+\.{3}")?,
            annotation: Regex::new(r"\?!|!\?|\?+|!+")?,
            whitespace: Regex::new(r"\s+")?,
            score: Regex::new(r" (1/2-1/2|\d-\d)")?,
            move_number: Regex::new(r"\d+\. ")?,
        })
    }

    /// Whether `moves` carries comments or continuation markers worth removing.
    pub fn needs_cleaning(moves: &str) -> bool {
        !moves.is_empty() && (moves.contains('{') || moves.contains("..."))
    }

    /// Apply the rewrites in order: drop `{...}` comments, drop `N...`
    /// continuation markers, drop `?`/`!` annotations, collapse whitespace,
    /// then drop the game score.
    pub fn clean(&self, moves: &str) -> String {
        let text = self.comment.replace_all(moves, "");
        let text = self.ellipsis.replace_all(&text, "");
        let text = self.annotation.replace_all(&text, "");
        let text = self.whitespace.replace_all(&text, " ");
        self.score.replace_all(&text, "").into_owned()
    }

    /// Number of full-move markers (`1. `, `2. `, ...) in cleaned text.
    pub fn count_moves(&self, cleaned: &str) -> u32 {
        self.move_number.find_iter(cleaned).count() as u32
    }
}
