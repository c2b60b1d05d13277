//! Session error taxonomy
//!
//! Every failure the session manager can surface maps to one variant here,
//! and each variant carries a stable machine-readable [`ErrorCode`] for the
//! caller-facing state snapshot and event stream.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for voice-session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Credential endpoint unreachable or returned a non-success status
    #[error("credential endpoint unavailable: {0}")]
    CredentialUnavailable(String),

    /// Credential response lacked a usable token or expiry
    #[error("credential response malformed: {0}")]
    CredentialMalformed(String),

    /// Credential expired before the handshake could use it
    #[error("credential expired before use")]
    CredentialExpired,

    /// Microphone unavailable or permission denied
    #[error("microphone access denied: {0}")]
    MediaAccessDenied(String),

    /// Remote negotiation endpoint rejected the offer
    #[error("handshake rejected by realtime service (status {status}): {body}")]
    HandshakeRejected {
        /// HTTP status returned by the negotiation endpoint
        status: u16,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// A control-channel frame failed to parse. Non-fatal: the frame is
    /// dropped and the session continues.
    #[error("malformed control-channel frame: {0}")]
    ProtocolParse(String),

    /// `connect()` called while a connection attempt is in flight
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    /// `connect()` called while a session is active
    #[error("a session is already connected")]
    AlreadyConnected,

    /// The control channel closed while the session still needed it
    #[error("control channel closed")]
    ChannelClosed,

    /// Peer-connection or media-transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Invariant violation inside the manager
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::CredentialUnavailable(_) => ErrorCode::CredentialUnavailable,
            SessionError::CredentialMalformed(_) => ErrorCode::CredentialMalformed,
            SessionError::CredentialExpired => ErrorCode::CredentialExpired,
            SessionError::MediaAccessDenied(_) => ErrorCode::MediaAccessDenied,
            SessionError::HandshakeRejected { .. } => ErrorCode::HandshakeRejected,
            SessionError::ProtocolParse(_) => ErrorCode::ProtocolParse,
            SessionError::AlreadyConnecting => ErrorCode::AlreadyConnecting,
            SessionError::AlreadyConnected => ErrorCode::AlreadyConnected,
            SessionError::ChannelClosed => ErrorCode::ChannelClosed,
            SessionError::Transport(_) => ErrorCode::Transport,
            SessionError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error aborts the session. Only per-frame parse errors
    /// are survivable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::ProtocolParse(_))
    }

    /// Create a media-access error
    pub fn media(msg: impl Into<String>) -> Self {
        SessionError::MediaAccessDenied(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        SessionError::Transport(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        SessionError::Internal(msg.into())
    }
}

/// Result type for session operations
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Machine-readable error codes surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CredentialUnavailable,
    CredentialMalformed,
    CredentialExpired,
    MediaAccessDenied,
    HandshakeRejected,
    ProtocolParse,
    AlreadyConnecting,
    AlreadyConnected,
    ChannelClosed,
    Transport,
    Internal,
    /// Error reported by the remote service over the control channel;
    /// never produced by [`SessionError::code`]
    Remote,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::CredentialUnavailable => "CREDENTIAL_UNAVAILABLE",
            ErrorCode::CredentialMalformed => "CREDENTIAL_MALFORMED",
            ErrorCode::CredentialExpired => "CREDENTIAL_EXPIRED",
            ErrorCode::MediaAccessDenied => "MEDIA_ACCESS_DENIED",
            ErrorCode::HandshakeRejected => "HANDSHAKE_REJECTED",
            ErrorCode::ProtocolParse => "PROTOCOL_PARSE",
            ErrorCode::AlreadyConnecting => "ALREADY_CONNECTING",
            ErrorCode::AlreadyConnected => "ALREADY_CONNECTED",
            ErrorCode::ChannelClosed => "CHANNEL_CLOSED",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Remote => "REMOTE",
        };
        write!(f, "{}", name)
    }
}

/// Serializable error summary kept in the state snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl From<&SessionError> for ErrorInfo {
    fn from(err: &SessionError) -> Self {
        ErrorInfo {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SessionError::CredentialExpired.code(),
            ErrorCode::CredentialExpired
        );
        assert_eq!(
            SessionError::media("no device").code(),
            ErrorCode::MediaAccessDenied
        );
        assert_eq!(
            SessionError::HandshakeRejected {
                status: 401,
                body: "{}".into()
            }
            .code(),
            ErrorCode::HandshakeRejected
        );
    }

    #[test]
    fn test_fatality() {
        assert!(!SessionError::ProtocolParse("bad frame".into()).is_fatal());
        assert!(SessionError::CredentialExpired.is_fatal());
        assert!(SessionError::AlreadyConnecting.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = SessionError::HandshakeRejected {
            status: 403,
            body: "forbidden".into(),
        };
        assert_eq!(
            err.to_string(),
            "handshake rejected by realtime service (status 403): forbidden"
        );
    }

    #[test]
    fn test_error_info_serialization() {
        let info = ErrorInfo::from(&SessionError::CredentialExpired);
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("CREDENTIAL_EXPIRED"));
    }
}
