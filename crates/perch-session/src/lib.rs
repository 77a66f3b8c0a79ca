//! Perch Session Management
//!
//! - An account is one authenticated identity on some backend service
//! - Any number of accounts may be stored, at most one is current
//! - Every mutation is persisted through a `CredentialStore`
//! - Token lifecycle (login, resume, refresh, expiry, logout) goes through
//!   `SessionManager`

mod account;
mod backend;
mod error;
mod events;
mod manager;
mod memory_backend;
mod state;
mod store;

pub use account::{validate_service, Account, AccountStatus, AccountUpdate};
pub use backend::{
    AuthBackend, AuthSession, CreateAccountRequest, LoginRequest, SessionProfile, TokenPair,
};
pub use error::{AuthError, PersistenceError, RegistrationError, SessionError};
pub use events::{LogContext, SessionEvent, SessionEventKind};
pub use manager::SessionManager;
pub use memory_backend::MemoryAuthBackend;
pub use state::SessionState;
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore, StoredSessions};

pub type Result<T> = std::result::Result<T, SessionError>;
