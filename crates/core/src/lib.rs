//! Core types for kaiwa voice sessions
//!
//! This crate carries everything the session manager and its callers share
//! without pulling in network or device dependencies: the control-channel
//! wire protocol, the session phase state machine, the transcript model,
//! scenario configuration, and the unified error taxonomy.

pub mod error;
pub mod events;
pub mod protocol;
pub mod scenario;
pub mod state;
pub mod transcript;

pub use error::{ErrorCode, ErrorInfo, Result, SessionError};
pub use events::SessionEvent;
pub use protocol::{ClientEvent, ServerEvent, SessionUpdate, TurnDetection};
pub use scenario::ScenarioConfig;
pub use state::{SessionPhase, SessionSnapshot};
pub use transcript::{Speaker, TranscriptEntry, TranscriptLog};
