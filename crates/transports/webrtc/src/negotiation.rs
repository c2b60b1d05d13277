//! SDP offer/answer exchange with the realtime service
//!
//! One synchronous HTTP round trip per connection attempt: the finalized
//! local offer goes up as `application/sdp` authenticated with the
//! credential's bearer token, and the raw answer comes back in the same
//! encoding.

use async_trait::async_trait;
use kaiwa_auth::Credential;
use kaiwa_core::{Result, SessionError};
use serde::Deserialize;
use tracing::{debug, warn};

/// Exchanges a local offer for a remote answer
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Perform the single offer/answer request. Returns the raw answer SDP.
    async fn exchange(&self, offer_sdp: &str, credential: &Credential) -> Result<String>;
}

/// HTTP implementation against the realtime negotiation endpoint
pub struct HttpNegotiator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNegotiator {
    /// Create a negotiator for the given endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

/// Error body shape returned by the negotiation endpoint on non-2xx
#[derive(Debug, Deserialize)]
struct NegotiationErrorBody {
    #[serde(default)]
    error: Option<NegotiationErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct NegotiationErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    async fn exchange(&self, offer_sdp: &str, credential: &Credential) -> Result<String> {
        debug!(
            endpoint = %self.base_url,
            model = %credential.model,
            offer_len = offer_sdp.len(),
            "exchanging session description"
        );

        let response = self
            .client
            .post(&self.base_url)
            .query(&[("model", credential.model.as_str())])
            .bearer_auth(credential.secret())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| SessionError::transport(format!("negotiation request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::transport(format!("negotiation response unreadable: {}", e)))?;

        if status.is_success() {
            debug!(answer_len = body.len(), "received session answer");
            return Ok(body);
        }

        warn!(status = %status, "negotiation rejected");
        Err(classify_rejection(status.as_u16(), body))
    }
}

/// Map a non-2xx negotiation response onto the error taxonomy. An expired
/// credential is distinguished so the caller knows a retry with a fresh one
/// may succeed.
fn classify_rejection(status: u16, body: String) -> SessionError {
    if let Ok(parsed) = serde_json::from_str::<NegotiationErrorBody>(&body) {
        if let Some(detail) = parsed.error {
            if detail
                .code
                .as_deref()
                .is_some_and(|code| code.ends_with("expired"))
            {
                return SessionError::CredentialExpired;
            }
            if let Some(message) = detail.message {
                return SessionError::HandshakeRejected {
                    status,
                    body: message,
                };
            }
        }
    }
    SessionError::HandshakeRejected { status, body }
}
