//! Session phase state machine and caller-facing snapshot

use crate::error::ErrorInfo;
use crate::scenario::ScenarioConfig;
use crate::transcript::TranscriptEntry;
use serde::{Deserialize, Serialize};

/// Connection phase of a voice session
///
/// `Idle → Connecting → Active → Disconnecting → Idle`, with a
/// per-attempt `Failed` that always resolves back to `Idle` after resource
/// release. `Idle` is both the initial and the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session; ready for `connect()`
    Idle,
    /// Connection attempt in flight
    Connecting,
    /// Control channel open, conversation live
    Active,
    /// Explicit teardown in progress
    Disconnecting,
    /// Attempt aborted; resources being released before returning to `Idle`
    Failed,
}

impl SessionPhase {
    /// Whether a `connect()` call must be rejected in this phase
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionPhase::Connecting | SessionPhase::Active)
    }

    /// Whether `next` is a legal direct transition from this phase
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Active)
                | (Connecting, Failed)
                | (Connecting, Disconnecting)
                | (Active, Failed)
                | (Active, Disconnecting)
                | (Disconnecting, Idle)
                | (Failed, Idle)
        )
    }

    /// Phase name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Active => "active",
            SessionPhase::Disconnecting => "disconnecting",
            SessionPhase::Failed => "failed",
        }
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

/// Read-only view of the manager's state, taken atomically
///
/// This is the entire surface the UI layer consumes; it never hands out
/// manager-owned resources.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current phase
    pub phase: SessionPhase,
    /// Convenience flag: phase is `Connecting`
    pub connecting: bool,
    /// Convenience flag: phase is `Active`
    pub connected: bool,
    /// Scenario of the live or in-flight session, if any
    pub scenario: Option<ScenarioConfig>,
    /// Whether outbound audio is muted
    pub muted: bool,
    /// Most recent fatal error, cleared on the next successful connect
    pub last_error: Option<ErrorInfo>,
    /// Transcript so far, in arrival order
    pub transcript: Vec<TranscriptEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase_is_idle() {
        assert_eq!(SessionPhase::default(), SessionPhase::Idle);
    }

    #[test]
    fn test_busy_phases() {
        assert!(SessionPhase::Connecting.is_busy());
        assert!(SessionPhase::Active.is_busy());
        assert!(!SessionPhase::Idle.is_busy());
        assert!(!SessionPhase::Disconnecting.is_busy());
        assert!(!SessionPhase::Failed.is_busy());
    }

    #[test]
    fn test_legal_transitions() {
        use SessionPhase::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Active));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Active.can_transition_to(Disconnecting));
        assert!(Disconnecting.can_transition_to(Idle));
        assert!(Failed.can_transition_to(Idle));
    }

    #[test]
    fn test_illegal_transitions() {
        use SessionPhase::*;
        assert!(!Idle.can_transition_to(Active));
        assert!(!Active.can_transition_to(Connecting));
        assert!(!Failed.can_transition_to(Active));
        assert!(!Disconnecting.can_transition_to(Connecting));
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::Connecting).unwrap(),
            "\"connecting\""
        );
    }
}
