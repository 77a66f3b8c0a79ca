//! Perch Core
//!
//! Entry point for embedding Perch: configuration, logging and a `Client`
//! that wires storage and the session manager together.

mod client;
mod config;
mod error;

pub use client::Client;
pub use config::Config;
pub use error::CoreError;

// Re-export core components
pub use perch_chat::{
    group_ends, is_from_self, is_last_in_group, relative_timestamp, should_show_metadata,
    ChatItem, DeletedMessage, MessageView, RelativeTimestamp, GROUP_GAP_MS,
};
pub use perch_session::{
    Account, AccountStatus, AccountUpdate, AuthBackend, AuthError, AuthSession,
    CreateAccountRequest, CredentialStore, LogContext, LoginRequest, MemoryAuthBackend,
    MemoryCredentialStore, PersistenceError, RegistrationError, SessionError, SessionEvent,
    SessionEventKind, SessionManager, SessionProfile, SessionState, SqliteCredentialStore,
    TokenPair,
};
pub use perch_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

const DEFAULT_LOG_FILTER: &str = "info";

/// Initialize logging. `RUST_LOG` wins over the default `info` filter.
pub fn init_logging() {
    init_logging_with(DEFAULT_LOG_FILTER);
}

/// Initialize logging with `default_filter` (usually `Config::log_filter`)
/// when `RUST_LOG` is unset.
pub fn init_logging_with(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(true).init();
}
