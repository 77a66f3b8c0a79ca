//! In-memory session state
//!
//! `accounts` is unique by did and `current_account_did` always names a
//! member of `accounts`. Mutators keep both true.

use serde::Serialize;

use crate::account::Account;
use crate::store::StoredSessions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub accounts: Vec<Account>,
    pub current_account_did: Option<String>,
    /// True until the first load from the credential store finishes
    pub is_initial_load: bool,
    /// True while `select_account` is revalidating its target
    pub is_switching_accounts: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            accounts: Vec::new(),
            current_account_did: None,
            is_initial_load: true,
            is_switching_accounts: false,
        }
    }

    /// Rebuild from a stored snapshot, repairing anything a crash or an older
    /// writer may have left behind: duplicate dids keep their first record
    /// and a dangling current pointer is dropped.
    pub(crate) fn restore(&mut self, stored: StoredSessions) {
        let mut accounts: Vec<Account> = Vec::with_capacity(stored.accounts.len());
        for account in stored.accounts {
            if accounts.iter().any(|a| a.did == account.did) {
                tracing::warn!(did = %account.did, "Dropping duplicate stored account");
                continue;
            }
            accounts.push(account);
        }

        let current_account_did = stored
            .current_account_did
            .filter(|did| accounts.iter().any(|a| &a.did == did));

        self.accounts = accounts;
        self.current_account_did = current_account_did;
    }

    pub fn account(&self, did: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.did == did)
    }

    pub(crate) fn account_mut(&mut self, did: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.did == did)
    }

    pub fn current_account(&self) -> Option<&Account> {
        self.current_account_did
            .as_deref()
            .and_then(|did| self.account(did))
    }

    pub(crate) fn current_account_mut(&mut self) -> Option<&mut Account> {
        let did = self.current_account_did.clone()?;
        self.account_mut(&did)
    }

    pub fn is_current(&self, did: &str) -> bool {
        self.current_account_did.as_deref() == Some(did)
    }

    /// A current account exists and holds an access token.
    pub fn has_session(&self) -> bool {
        self.current_account().is_some_and(Account::has_tokens)
    }

    /// Insert `account`, or replace the record with the same did in place.
    pub(crate) fn upsert(&mut self, account: Account) {
        match self.account_mut(&account.did) {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }
    }

    /// Remove the record for `did`, clearing the current pointer if it
    /// referenced it.
    pub(crate) fn remove(&mut self, did: &str) -> Option<Account> {
        let index = self.accounts.iter().position(|a| a.did == did)?;
        if self.is_current(did) {
            self.current_account_did = None;
        }
        Some(self.accounts.remove(index))
    }

    /// Point at `did`; ignored if no such account exists.
    pub(crate) fn set_current(&mut self, did: &str) -> bool {
        if self.account(did).is_none() {
            return false;
        }
        self.current_account_did = Some(did.to_string());
        true
    }

    /// Both structural invariants hold.
    pub fn is_consistent(&self) -> bool {
        let unique = self
            .accounts
            .iter()
            .enumerate()
            .all(|(i, a)| self.accounts[..i].iter().all(|b| b.did != a.did));
        let pointer_valid = self
            .current_account_did
            .as_deref()
            .map_or(true, |did| self.account(did).is_some());
        unique && pointer_valid
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
