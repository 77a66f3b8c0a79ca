//! Session error types

use thiserror::Error;

/// Reasons the backend refuses to register a new identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Invalid invite code")]
    InvalidInvite,

    #[error("Handle is already taken")]
    HandleTaken,

    #[error("Password is too weak")]
    WeakPassword,

    #[error("Phone verification is required")]
    VerificationRequired,

    #[error("Phone verification failed")]
    VerificationFailed,

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid identifier or password")]
    InvalidCredentials,

    #[error("A second authentication factor is required")]
    SecondFactorRequired,

    #[error("Account has been taken down")]
    AccountTakenDown,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Network error: {0}")]
    Network(String),
}

impl AuthError {
    /// Only transport failures are worth retrying; the manager itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

/// Credential store failures. Logged by the manager and retried on the next
/// mutation, never returned from a mutating operation.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write credential store: {0}")]
    WriteFailed(String),

    #[error("Failed to read credential store: {0}")]
    ReadFailed(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Account not found: {0}")]
    UnknownAccount(String),

    #[error("Invalid service endpoint: {0}")]
    InvalidService(String),

    #[error("Operation was superseded by a newer session change")]
    Superseded,
}

impl SessionError {
    /// The auth failure carried by this error, if any.
    pub fn auth_reason(&self) -> Option<&AuthError> {
        match self {
            SessionError::Auth(reason) => Some(reason),
            _ => None,
        }
    }
}
