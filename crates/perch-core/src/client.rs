//! Top-level client handle
//!
//! Owns the database and the session manager built on top of it. Cloning a
//! `Client` shares all state.

use std::sync::Arc;

use perch_session::{AuthBackend, LoginRequest, SessionManager, SqliteCredentialStore};
use perch_storage::{read_setting, write_setting, Database};

use crate::config::{validate_service, Config};
use crate::Result;

const DEFAULT_SERVICE_KEY: &str = "default_service";

pub struct Client {
    config: Config,
    db: Database,
    session_manager: SessionManager,
}

impl Client {
    /// Open the database named by `config` and build a session manager that
    /// talks to `backend`.
    pub fn new(config: Config, backend: Arc<dyn AuthBackend>) -> Result<Self> {
        config.validate()?;
        let db = Database::open(&config.database_path)?;
        Ok(Self::with_database(config, db, backend))
    }

    pub fn with_database(config: Config, db: Database, backend: Arc<dyn AuthBackend>) -> Self {
        let store = SqliteCredentialStore::new(db.clone());
        let session_manager = SessionManager::new(Arc::new(store), backend);

        Self {
            config,
            db,
            session_manager,
        }
    }

    /// Restore stored accounts and resume the current one.
    pub async fn initialize(&self) -> Result<()> {
        self.session_manager.initialize().await?;

        tracing::info!(
            database = %self.config.database_path.display(),
            accounts = self.session_manager.accounts().len(),
            "Client initialized"
        );
        Ok(())
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    /// Service for forms that do not name one. A stored preference wins over
    /// the config value.
    pub fn default_service(&self) -> Result<String> {
        let stored = self
            .db
            .with_connection(|conn| read_setting(conn, DEFAULT_SERVICE_KEY))?;
        Ok(stored.unwrap_or_else(|| self.config.default_service.clone()))
    }

    pub fn set_default_service(&self, service: &str) -> Result<()> {
        validate_service(service)?;
        self.db
            .with_connection(|conn| write_setting(conn, DEFAULT_SERVICE_KEY, service))?;
        tracing::info!(service = %service, "Default service updated");
        Ok(())
    }

    /// Login request against the default service.
    pub fn login_request(&self, identifier: &str, password: &str) -> Result<LoginRequest> {
        Ok(LoginRequest {
            service: self.default_service()?,
            identifier: identifier.to_string(),
            password: password.to_string(),
            auth_factor_token: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            db: self.db.clone(),
            session_manager: self.session_manager.clone(),
        }
    }
}
