//! Session manager configuration

use crate::media::CaptureOptions;
use kaiwa_core::TurnDetection;
use std::time::Duration;
use thiserror::Error;

/// Reserved control-channel label the remote service recognizes; channels
/// opened with any other label are ignored.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Default negotiation endpoint of the realtime service
pub const DEFAULT_NEGOTIATION_URL: &str = "https://api.openai.com/v1/realtime";

/// Default input-transcription model
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Configuration for a [`crate::session::SessionManager`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Negotiation endpoint the SDP offer is POSTed to
    pub negotiation_url: String,

    /// STUN servers for ICE candidate gathering
    pub stun_servers: Vec<String>,

    /// Control-channel label; must stay the protocol-reserved value unless
    /// pointed at a compatible service
    pub channel_label: String,

    /// Upper bound on the ICE candidate-gathering wait. Gathering may never
    /// naturally complete on some networks; whichever local description is
    /// available when this elapses is sent.
    pub gathering_timeout: Duration,

    /// Input-transcription model requested in the configuration message
    pub transcription_model: String,

    /// Server-side voice-activity-detection policy
    pub turn_detection: TurnDetection,

    /// Local capture options
    pub capture: CaptureOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiation_url: DEFAULT_NEGOTIATION_URL.to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            channel_label: CONTROL_CHANNEL_LABEL.to_string(),
            gathering_timeout: Duration::from_secs(3),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            turn_detection: TurnDetection::default(),
            capture: CaptureOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Validate the configuration before any connection attempt
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.negotiation_url.starts_with("http://")
            && !self.negotiation_url.starts_with("https://")
        {
            return Err(ConfigValidationError::InvalidNegotiationUrl);
        }
        if self.stun_servers.is_empty() {
            return Err(ConfigValidationError::NoStunServers);
        }
        if self.channel_label.is_empty() {
            return Err(ConfigValidationError::EmptyChannelLabel);
        }
        if self.gathering_timeout.is_zero() {
            return Err(ConfigValidationError::ZeroGatheringTimeout);
        }
        if !(0.0..=1.0).contains(&self.turn_detection.threshold) {
            return Err(ConfigValidationError::InvalidVadThreshold);
        }
        Ok(())
    }
}

/// Configuration validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// The negotiation URL must be http(s)
    #[error("negotiation_url must start with http:// or https://")]
    InvalidNegotiationUrl,

    /// At least one STUN server is required for candidate gathering
    #[error("no STUN servers configured")]
    NoStunServers,

    /// The remote ignores unlabeled channels
    #[error("channel label cannot be empty")]
    EmptyChannelLabel,

    /// A zero timeout would send a candidate-free offer every time
    #[error("gathering timeout must be non-zero")]
    ZeroGatheringTimeout,

    /// Threshold is a probability-like sensitivity
    #[error("turn-detection threshold must be within 0.0..=1.0")]
    InvalidVadThreshold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_negotiation_url() {
        let config = SessionConfig {
            negotiation_url: "ws://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::InvalidNegotiationUrl)
        );
    }

    #[test]
    fn test_no_stun_servers() {
        let config = SessionConfig {
            stun_servers: vec![],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigValidationError::NoStunServers));
    }

    #[test]
    fn test_empty_channel_label() {
        let config = SessionConfig {
            channel_label: String::new(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::EmptyChannelLabel)
        );
    }

    #[test]
    fn test_zero_gathering_timeout() {
        let config = SessionConfig {
            gathering_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroGatheringTimeout)
        );
    }

    #[test]
    fn test_out_of_range_vad_threshold() {
        let mut config = SessionConfig::default();
        config.turn_detection.threshold = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::InvalidVadThreshold)
        );
    }
}
