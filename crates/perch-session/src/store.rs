//! Credential store contract and implementations
//!
//! A store holds the ordered account list plus the current account pointer.
//! Every call is atomic: readers never observe a partially written snapshot.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use perch_storage::{read_setting, remove_setting, write_setting, Database, StorageError};

use crate::account::{Account, AccountStatus};
use crate::error::PersistenceError;

const CURRENT_ACCOUNT_KEY: &str = "current_account_did";

/// Snapshot persisted by a `CredentialStore`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSessions {
    pub accounts: Vec<Account>,
    pub current_account_did: Option<String>,
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<StoredSessions, PersistenceError>;

    /// Replace the stored snapshot with `accounts` and `current_did`.
    fn save(&self, accounts: &[Account], current_did: Option<&str>)
        -> Result<(), PersistenceError>;

    fn clear(&self) -> Result<(), PersistenceError>;
}

/// SQLite-backed store over the shared `Database`.
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Clone for SqliteCredentialStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl CredentialStore for SqliteCredentialStore {
    fn load(&self) -> Result<StoredSessions, PersistenceError> {
        self.db
            .transaction(|tx| {
                let mut stmt = tx.prepare(
                    "SELECT did, service, identifier, handle, email, email_confirmed,
                            email_auth_factor, access_token, refresh_token, status, updated_at
                     FROM accounts ORDER BY position",
                )?;

                let accounts = stmt
                    .query_map([], |row| {
                        let status_str: String = row.get(9)?;
                        let status = status_str.parse().unwrap_or(AccountStatus::Expired);
                        let updated_str: String = row.get(10)?;

                        Ok(Account {
                            did: row.get(0)?,
                            service: row.get(1)?,
                            identifier: row.get(2)?,
                            handle: row.get(3)?,
                            email: row.get(4)?,
                            email_confirmed: row.get::<_, i32>(5)? != 0,
                            email_auth_factor: row.get::<_, i32>(6)? != 0,
                            access_token: row.get(7)?,
                            refresh_token: row.get(8)?,
                            status,
                            updated_at: parse_timestamp(&updated_str),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let current_account_did = read_setting(tx, CURRENT_ACCOUNT_KEY)?;

                Ok(StoredSessions {
                    accounts,
                    current_account_did,
                })
            })
            .map_err(|e| PersistenceError::ReadFailed(e.to_string()))
    }

    fn save(
        &self,
        accounts: &[Account],
        current_did: Option<&str>,
    ) -> Result<(), PersistenceError> {
        self.db
            .transaction(|tx| {
                tx.execute("DELETE FROM accounts", [])?;

                let mut stmt = tx.prepare(
                    "INSERT INTO accounts
                     (did, position, service, identifier, handle, email, email_confirmed,
                      email_auth_factor, access_token, refresh_token, status, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )?;
                for (position, account) in accounts.iter().enumerate() {
                    stmt.execute(rusqlite::params![
                        account.did,
                        position as i64,
                        account.service,
                        account.identifier,
                        account.handle,
                        account.email,
                        account.email_confirmed as i32,
                        account.email_auth_factor as i32,
                        account.access_token,
                        account.refresh_token,
                        account.status.as_str(),
                        account.updated_at.to_rfc3339(),
                    ])?;
                }

                match current_did {
                    Some(did) => write_setting(tx, CURRENT_ACCOUNT_KEY, did)?,
                    None => remove_setting(tx, CURRENT_ACCOUNT_KEY)?,
                }

                Ok::<_, StorageError>(())
            })
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.db
            .transaction(|tx| {
                tx.execute("DELETE FROM accounts", [])?;
                remove_setting(tx, CURRENT_ACCOUNT_KEY)?;
                Ok(())
            })
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))
    }
}

/// Volatile store. Writes can be made to fail to exercise persistence
/// error handling.
pub struct MemoryCredentialStore {
    data: Arc<Mutex<StoredSessions>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::with_sessions(StoredSessions::default())
    }

    pub fn with_sessions(sessions: StoredSessions) -> Self {
        Self {
            data: Arc::new(Mutex::new(sessions)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save`/`clear` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StoredSessions {
        self.data.lock().clone()
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteFailed(
                "memory store rejected write".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryCredentialStore {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            fail_writes: Arc::clone(&self.fail_writes),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredSessions, PersistenceError> {
        Ok(self.data.lock().clone())
    }

    fn save(
        &self,
        accounts: &[Account],
        current_did: Option<&str>,
    ) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.data.lock() = StoredSessions {
            accounts: accounts.to_vec(),
            current_account_did: current_did.map(str::to_string),
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.data.lock() = StoredSessions::default();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::test_account;

    fn sample_accounts() -> Vec<Account> {
        let mut bob = test_account("did:plc:bob");
        bob.email = Some("bob@example.com".to_string());
        bob.email_confirmed = true;
        bob.clear_tokens(AccountStatus::LoggedOut);

        vec![
            test_account("did:plc:carol"),
            test_account("did:plc:alice"),
            bob,
        ]
    }

    fn assert_round_trip(store: &dyn CredentialStore) {
        let accounts = sample_accounts();
        store.save(&accounts, Some("did:plc:alice")).unwrap();

        let loaded = store.load().unwrap();
        let dids: Vec<&str> = loaded.accounts.iter().map(|a| a.did.as_str()).collect();
        assert_eq!(dids, vec!["did:plc:carol", "did:plc:alice", "did:plc:bob"]);
        assert_eq!(loaded.current_account_did.as_deref(), Some("did:plc:alice"));

        for (saved, loaded) in accounts.iter().zip(&loaded.accounts) {
            assert_eq!(saved.access_token, loaded.access_token);
            assert_eq!(saved.refresh_token, loaded.refresh_token);
            assert_eq!(saved.email, loaded.email);
            assert_eq!(saved.email_confirmed, loaded.email_confirmed);
            assert_eq!(saved.status, loaded.status);
            assert_eq!(saved.updated_at.timestamp(), loaded.updated_at.timestamp());
        }

        // Saving again replaces rather than appends
        store.save(&accounts[..1], None).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.current_account_did, None);

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), StoredSessions::default());
    }

    #[test]
    fn test_sqlite_round_trip() {
        let store = SqliteCredentialStore::new(Database::open_in_memory().unwrap());
        assert_round_trip(&store);
    }

    #[test]
    fn test_memory_round_trip() {
        assert_round_trip(&MemoryCredentialStore::new());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perch.db");

        {
            let store = SqliteCredentialStore::new(Database::open(&path).unwrap());
            store
                .save(&sample_accounts(), Some("did:plc:carol"))
                .unwrap();
        }

        let store = SqliteCredentialStore::new(Database::open(&path).unwrap());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.accounts.len(), 3);
        assert_eq!(loaded.current_account_did.as_deref(), Some("did:plc:carol"));
    }

    #[test]
    fn test_memory_store_failing_writes() {
        let store = MemoryCredentialStore::new();
        store.set_fail_writes(true);

        let err = store.save(&sample_accounts(), None).unwrap_err();
        assert!(matches!(err, PersistenceError::WriteFailed(_)));
        assert_eq!(store.write_count(), 0);
        assert!(store.snapshot().accounts.is_empty());

        store.set_fail_writes(false);
        store.save(&sample_accounts(), None).unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
