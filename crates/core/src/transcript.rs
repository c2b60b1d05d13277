//! Conversation transcript model
//!
//! Entries are appended in arrival order and never reordered or edited;
//! the whole log is cleared on session teardown.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local user's speech (input transcription)
    User,
    /// The remote assistant's speech
    Assistant,
}

/// One immutable line of conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who spoke
    pub speaker: Speaker,
    /// What was said
    pub text: String,
    /// When the entry arrived locally
    pub captured_at: SystemTime,
}

impl TranscriptEntry {
    /// Create an entry stamped with the current time
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            captured_at: SystemTime::now(),
        }
    }

    /// Create a user entry
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    /// Create an assistant entry
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text)
    }
}

/// Append-only transcript log
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; arrival order is preserved
    pub fn append(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// All entries in arrival order
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (session teardown)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = TranscriptLog::new();
        log.append(TranscriptEntry::user("こんにちは"));
        log.append(TranscriptEntry::assistant("いらっしゃいませ"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].speaker, Speaker::User);
        assert_eq!(log.entries()[0].text, "こんにちは");
        assert_eq!(log.entries()[1].speaker, Speaker::Assistant);
        assert_eq!(log.entries()[1].text, "いらっしゃいませ");
    }

    #[test]
    fn test_clear_empties_log() {
        let mut log = TranscriptLog::new();
        log.append(TranscriptEntry::user("test"));
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_speaker_serialization() {
        assert_eq!(serde_json::to_string(&Speaker::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Speaker::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
