//! Caller-facing session events
//!
//! The manager pushes these over a take-once mpsc receiver so the UI layer
//! can react to state changes without polling the snapshot.

use crate::error::ErrorCode;
use crate::state::SessionPhase;
use crate::transcript::TranscriptEntry;

/// Events observable by the session owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session phase changed
    PhaseChanged {
        /// New phase
        phase: SessionPhase,
    },

    /// An entry was appended to the transcript
    TranscriptAppended {
        /// The appended entry
        entry: TranscriptEntry,
    },

    /// Incremental assistant text, ahead of the finalized transcript entry.
    /// Purely informational; the finalized entry arrives separately and is
    /// never duplicated by deltas.
    AssistantDelta {
        /// Partial text fragment
        text: String,
    },

    /// A non-fatal error (remote error event, dropped frame, failed send).
    /// Does not by itself change the session phase.
    Error {
        /// Machine-readable code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl SessionEvent {
    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::PhaseChanged { .. } => "phase_changed",
            SessionEvent::TranscriptAppended { .. } => "transcript_appended",
            SessionEvent::AssistantDelta { .. } => "assistant_delta",
            SessionEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            SessionEvent::PhaseChanged {
                phase: SessionPhase::Active
            }
            .name(),
            "phase_changed"
        );
        assert_eq!(
            SessionEvent::AssistantDelta {
                text: "い".to_string()
            }
            .name(),
            "assistant_delta"
        );
    }
}
