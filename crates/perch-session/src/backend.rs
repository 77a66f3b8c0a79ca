//! Auth backend contract
//!
//! The backend exchanges credentials for session tokens. The manager never
//! retries a backend call; retry policy belongs to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, RegistrationError};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub service: String,
    pub email: String,
    pub password: String,
    pub handle: String,
    pub invite_code: Option<String>,
    pub verification_phone: Option<String>,
    pub verification_code: Option<String>,
}

impl std::fmt::Debug for CreateAccountRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateAccountRequest")
            .field("service", &self.service)
            .field("email", &self.email)
            .field("handle", &self.handle)
            .field("invite_code", &self.invite_code)
            .field("verification_phone", &self.verification_phone)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub service: String,
    /// Handle or email
    pub identifier: String,
    pub password: String,
    /// Emailed one-time code, required when the account has 2FA enabled
    pub auth_factor_token: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("service", &self.service)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

/// Identity and profile fields reported for a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub did: String,
    pub handle: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub email_auth_factor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub profile: SessionProfile,
    pub tokens: TokenPair,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Register a new identity and open a session for it.
    async fn register(
        &self,
        request: &CreateAccountRequest,
    ) -> Result<AuthSession, RegistrationError>;

    /// Exchange an identifier and password for a session.
    async fn authenticate(&self, request: &LoginRequest) -> Result<AuthSession, AuthError>;

    /// Describe the session behind `access_token`. Fails with
    /// `AuthError::SessionExpired` once the access token is no longer accepted.
    async fn get_session(
        &self,
        service: &str,
        access_token: &str,
    ) -> Result<SessionProfile, AuthError>;

    /// Trade a refresh token for a new token pair. The old refresh token is
    /// consumed.
    async fn refresh(&self, service: &str, refresh_token: &str) -> Result<TokenPair, AuthError>;
}
