//! Short-lived bearer credential

use crate::provider::CredentialError;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// A time-boxed bearer token authorizing one negotiation with the realtime
/// service.
///
/// Owned by the session manager for the duration of a single connection
/// attempt, never persisted, and re-acquired fresh on every `connect()`.
#[derive(Clone)]
pub struct Credential {
    secret: String,
    /// Absolute expiry as Unix seconds
    pub expires_at: u64,
    /// Target model identifier for the negotiation
    pub model: String,
}

impl Credential {
    /// Create a credential from already-validated parts
    pub fn new(secret: impl Into<String>, expires_at: u64, model: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
            model: model.into(),
        }
    }

    /// The bearer token
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Whether the credential is expired at `now` (Unix seconds)
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    /// Whether the credential is expired against the local clock
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

// The token never appears in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("model", &self.model)
            .finish()
    }
}

/// Current Unix time in seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Wire shape of the token-minting response.
///
/// The token arrives either as a scalar `client_secret` string or nested
/// under `client_secret.value`; the expiry may sit next to the nested token
/// or at the top level. Both shapes must be accepted.
#[derive(Debug, Deserialize)]
pub struct MintResponse {
    #[serde(default)]
    client_secret: Option<TokenField>,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenField {
    Nested {
        value: String,
        #[serde(default)]
        expires_at: Option<u64>,
    },
    Scalar(String),
}

impl TryFrom<MintResponse> for Credential {
    type Error = CredentialError;

    fn try_from(resp: MintResponse) -> Result<Self, Self::Error> {
        let (secret, nested_expiry) = match resp.client_secret {
            Some(TokenField::Scalar(value)) => (value, None),
            Some(TokenField::Nested { value, expires_at }) => (value, expires_at),
            None => {
                return Err(CredentialError::Malformed(
                    "response has no client_secret field".to_string(),
                ))
            }
        };

        if secret.is_empty() {
            return Err(CredentialError::Malformed(
                "client_secret is empty".to_string(),
            ));
        }

        let expires_at = nested_expiry.or(resp.expires_at).ok_or_else(|| {
            CredentialError::Malformed("response has no expires_at field".to_string())
        })?;

        let model = resp
            .model
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CredentialError::Malformed("response has no model field".to_string()))?;

        Ok(Credential::new(secret, expires_at, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Credential, CredentialError> {
        let resp: MintResponse = serde_json::from_str(json).expect("valid json");
        Credential::try_from(resp)
    }

    #[test]
    fn test_scalar_token_shape() {
        let cred = parse(
            r#"{"client_secret":"ek_abc123","expires_at":1999999999,"model":"gpt-4o-realtime-preview"}"#,
        )
        .unwrap();
        assert_eq!(cred.secret(), "ek_abc123");
        assert_eq!(cred.expires_at, 1999999999);
        assert_eq!(cred.model, "gpt-4o-realtime-preview");
    }

    #[test]
    fn test_nested_token_shape() {
        let cred = parse(
            r#"{"client_secret":{"value":"ek_abc123","expires_at":1999999999},"model":"gpt-4o-realtime-preview"}"#,
        )
        .unwrap();
        assert_eq!(cred.secret(), "ek_abc123");
        assert_eq!(cred.expires_at, 1999999999);
    }

    #[test]
    fn test_nested_expiry_wins_over_top_level() {
        let cred = parse(
            r#"{"client_secret":{"value":"ek","expires_at":100},"expires_at":200,"model":"m"}"#,
        )
        .unwrap();
        assert_eq!(cred.expires_at, 100);
    }

    #[test]
    fn test_missing_token_is_malformed() {
        let err = parse(r#"{"expires_at":1999999999,"model":"m"}"#).unwrap_err();
        assert!(matches!(err, CredentialError::Malformed(_)));
    }

    #[test]
    fn test_empty_token_is_malformed() {
        let err = parse(r#"{"client_secret":"","expires_at":1999999999,"model":"m"}"#).unwrap_err();
        assert!(matches!(err, CredentialError::Malformed(_)));
    }

    #[test]
    fn test_missing_expiry_is_malformed() {
        let err = parse(r#"{"client_secret":"ek","model":"m"}"#).unwrap_err();
        assert!(matches!(err, CredentialError::Malformed(_)));
    }

    #[test]
    fn test_expiry_check() {
        let cred = Credential::new("ek", 1000, "m");
        assert!(cred.is_expired_at(1000));
        assert!(cred.is_expired_at(1001));
        assert!(!cred.is_expired_at(999));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("ek_very_secret", 1000, "m");
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("ek_very_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
