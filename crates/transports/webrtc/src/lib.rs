//! Realtime voice session manager for kaiwa
//!
//! Negotiates a peer-to-peer audio link with the realtime service and
//! carries the conversation protocol over a data channel:
//!
//! 1. acquire a short-lived credential ([`kaiwa_auth`])
//! 2. open the local microphone and attach it as the outbound Opus track
//! 3. create the peer connection and the reserved control channel
//! 4. exchange the SDP offer for an answer over one authenticated request
//! 5. on channel-open, push the scenario configuration and go `Active`
//!
//! The caller surface is [`session::SessionManager`]: `connect`,
//! `disconnect`, `toggle_mute`, `snapshot`, and a take-once event receiver.

pub mod channel;
pub mod config;
pub mod media;
pub mod negotiation;
mod peer;
pub mod session;

pub use channel::ControlChannel;
pub use config::{ConfigValidationError, SessionConfig, CONTROL_CHANNEL_LABEL};
pub use media::{CaptureOptions, MediaSource, PlaybackSink};
pub use negotiation::{HttpNegotiator, Negotiator};
pub use session::SessionManager;

// Re-export the shared vocabulary so embedders only need this crate.
pub use kaiwa_auth::{Credential, CredentialProvider, HttpCredentialProvider};
pub use kaiwa_core::{
    ErrorCode, ScenarioConfig, SessionError, SessionEvent, SessionPhase, SessionSnapshot, Speaker,
    TranscriptEntry,
};
