//! Conversation scenario configuration

use serde::{Deserialize, Serialize};

/// A practice scenario: the situation the assistant should role-play and the
/// voice it should speak with.
///
/// The session manager treats this as opaque input; it is pushed to the
/// remote service verbatim in the configuration message once the control
/// channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Stable identifier for the scenario (e.g. "restaurant-order")
    pub id: String,
    /// Natural-language instructions for the assistant
    pub instructions: String,
    /// Synthesized-voice identifier recognized by the remote service
    pub voice: String,
}

impl ScenarioConfig {
    /// Create a new scenario configuration
    pub fn new(
        id: impl Into<String>,
        instructions: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            instructions: instructions.into(),
            voice: voice.into(),
        }
    }

    /// Check the scenario carries the fields the remote service requires
    pub fn validate(&self) -> Result<(), ScenarioValidationError> {
        if self.instructions.trim().is_empty() {
            return Err(ScenarioValidationError::EmptyInstructions);
        }
        if self.voice.trim().is_empty() {
            return Err(ScenarioValidationError::EmptyVoice);
        }
        Ok(())
    }
}

/// Scenario validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioValidationError {
    /// Instructions must be non-empty
    #[error("scenario instructions cannot be empty")]
    EmptyInstructions,
    /// Voice must be non-empty
    #[error("scenario voice cannot be empty")]
    EmptyVoice,
}
