//! Credential acquisition
//!
//! One outbound request per `acquire()` call; retry policy belongs to the
//! caller, and nothing is cached: credentials are single-use-oriented and
//! live for minutes.

use crate::credential::{Credential, MintResponse};
use async_trait::async_trait;
use kaiwa_core::SessionError;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Credential acquisition failure
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Issuing authority unreachable or returned a non-success status
    #[error("credential endpoint unavailable: {0}")]
    Unavailable(String),

    /// Response lacked a usable token, expiry, or model
    #[error("credential response malformed: {0}")]
    Malformed(String),
}

impl From<CredentialError> for SessionError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Unavailable(msg) => SessionError::CredentialUnavailable(msg),
            CredentialError::Malformed(msg) => SessionError::CredentialMalformed(msg),
        }
    }
}

/// Obtains a time-boxed connection credential from an external authority
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Request one fresh credential. Performs exactly one outbound request;
    /// no retries, no caching.
    async fn acquire(&self) -> Result<Credential, CredentialError>;
}

/// HTTP implementation against the application's token-minting endpoint
pub struct HttpCredentialProvider {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpCredentialProvider {
    /// Create a provider for the given minting endpoint
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// Create a provider reusing an existing HTTP client
    pub fn with_client(endpoint: Url, client: reqwest::Client) -> Self {
        Self { endpoint, client }
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        debug!(endpoint = %self.endpoint, "requesting session credential");

        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Unavailable(format!(
                "endpoint returned status {}",
                status
            )));
        }

        let body: MintResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;

        let credential = Credential::try_from(body)?;
        debug!(
            expires_at = credential.expires_at,
            model = %credential.model,
            "credential acquired"
        );
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on an ephemeral port.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // A GET request is header-only; read until the blank line.
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        Url::parse(&format!("http://{}/session", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_success() {
        let endpoint = one_shot_server(
            "200 OK",
            r#"{"client_secret":{"value":"ek_test"},"expires_at":1999999999,"model":"gpt-4o-realtime-preview"}"#,
        )
        .await;

        let provider = HttpCredentialProvider::new(endpoint);
        let credential = provider.acquire().await.unwrap();
        assert_eq!(credential.secret(), "ek_test");
        assert_eq!(credential.model, "gpt-4o-realtime-preview");
    }

    #[tokio::test]
    async fn test_non_success_status_is_unavailable() {
        let endpoint = one_shot_server("500 Internal Server Error", "{}").await;

        let provider = HttpCredentialProvider::new(endpoint);
        let err = provider.acquire().await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_tokenless_response_is_malformed() {
        let endpoint = one_shot_server("200 OK", r#"{"expires_at":1999999999,"model":"m"}"#).await;

        let provider = HttpCredentialProvider::new(endpoint);
        let err = provider.acquire().await.unwrap_err();
        assert!(matches!(err, CredentialError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port 9 on localhost is expected to refuse connections.
        let provider =
            HttpCredentialProvider::new(Url::parse("http://127.0.0.1:9/session").unwrap());
        let err = provider.acquire().await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(_)));
    }

    #[test]
    fn test_error_maps_to_session_error() {
        let err: SessionError = CredentialError::Malformed("x".into()).into();
        assert!(matches!(err, SessionError::CredentialMalformed(_)));

        let err: SessionError = CredentialError::Unavailable("x".into()).into();
        assert!(matches!(err, SessionError::CredentialUnavailable(_)));
    }
}
