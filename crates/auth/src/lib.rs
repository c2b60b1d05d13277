//! Ephemeral credential acquisition for kaiwa voice sessions
//!
//! The realtime service authenticates each connection with a short-lived
//! bearer token minted by the application's own backend. This crate owns
//! the [`Credential`] type and the [`CredentialProvider`] seam the session
//! manager calls at the start of every connection attempt.

pub mod credential;
pub mod provider;

pub use credential::Credential;
pub use provider::{CredentialError, CredentialProvider, HttpCredentialProvider};
