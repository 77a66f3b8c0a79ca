//! Session Manager
//!
//! Owns the account list and the current account pointer, and mediates every
//! token lifecycle transition. State is persisted on every mutation.
//!
//! Async operations hold the operation lock for their whole duration, so two
//! of them never interleave. Sync operations only take the state lock. A
//! generation counter, bumped on every structural change, lets an async
//! operation notice that a sync one moved the ground under it while it was
//! waiting on the backend; its response is then discarded.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::account::{validate_service, Account, AccountStatus, AccountUpdate};
use crate::backend::{AuthBackend, CreateAccountRequest, LoginRequest, SessionProfile, TokenPair};
use crate::error::{AuthError, SessionError};
use crate::events::{LogContext, SessionEvent, SessionEventKind};
use crate::state::SessionState;
use crate::store::CredentialStore;
use crate::Result;

const EVENT_CAPACITY: usize = 64;

struct Shared {
    state: SessionState,
    generation: u64,
    /// Last write to the credential store failed
    needs_persist: bool,
}

/// What a mutation did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    None,
    /// Fields of one record; account set and current pointer untouched
    Fields,
    /// Account set or current pointer
    Structure,
}

/// Result of a successful revalidation against the backend.
struct Revalidated {
    profile: SessionProfile,
    /// Set when the access token had to be refreshed
    tokens: Option<TokenPair>,
}

impl Revalidated {
    fn apply_to(self, account: &mut Account) {
        if let Some(tokens) = self.tokens {
            account.apply_tokens(tokens);
        }
        account.apply_profile(self.profile);
        account.status = AccountStatus::Active;
    }
}

/// Resets a state flag when dropped, including when the owning future is
/// dropped mid-flight.
struct FlagGuard<'a> {
    shared: &'a RwLock<Shared>,
    flag: fn(&mut SessionState) -> &mut bool,
}

impl<'a> FlagGuard<'a> {
    fn raise(shared: &'a RwLock<Shared>, flag: fn(&mut SessionState) -> &mut bool) -> Self {
        *flag(&mut shared.write().state) = true;
        Self { shared, flag }
    }

    fn lower_on_drop(shared: &'a RwLock<Shared>, flag: fn(&mut SessionState) -> &mut bool) -> Self {
        Self { shared, flag }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        *(self.flag)(&mut self.shared.write().state) = false;
    }
}

fn switching_flag(state: &mut SessionState) -> &mut bool {
    &mut state.is_switching_accounts
}

fn initial_load_flag(state: &mut SessionState) -> &mut bool {
    &mut state.is_initial_load
}

fn is_stale(shared: &Shared, generation: u64) -> bool {
    if shared.generation == generation {
        return false;
    }
    tracing::info!(
        expected = generation,
        actual = shared.generation,
        "Discarding stale session response"
    );
    true
}

pub struct SessionManager {
    shared: Arc<RwLock<Shared>>,
    /// Serializes async lifecycle operations
    op_lock: Arc<Mutex<()>>,
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn AuthBackend>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, backend: Arc<dyn AuthBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(RwLock::new(Shared {
                state: SessionState::new(),
                generation: 0,
                needs_persist: false,
            })),
            op_lock: Arc::new(Mutex::new(())),
            store,
            backend,
            events,
        }
    }

    /// Load accounts from the credential store and resume the current
    /// account, if any. A failed resume is logged, not returned.
    pub async fn initialize(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let _initial_load = FlagGuard::lower_on_drop(&self.shared, initial_load_flag);

        let stored = self.store.load()?;
        let stored_count = stored.accounts.len();
        let stored_current = stored.current_account_did.clone();

        let current = {
            let mut shared = self.shared.write();
            shared.state.restore(stored);
            shared.generation += 1;

            let repaired = shared.state.accounts.len() != stored_count
                || shared.state.current_account_did != stored_current;
            if repaired {
                tracing::warn!("Repaired inconsistent stored sessions");
                self.persist_locked(&mut shared);
            }

            tracing::info!(
                account_count = shared.state.accounts.len(),
                current = ?shared.state.current_account_did,
                "Loaded sessions"
            );

            shared.state.current_account().cloned()
        };

        if let Some(account) = current {
            if let Err(e) = self.resume_locked(account).await {
                tracing::warn!(error = %e, "Could not resume session on startup");
            }
        }

        Ok(())
    }

    /// Register a new identity; it becomes the current account.
    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<Account> {
        validate_service(&request.service)?;

        let _op = self.op_lock.lock().await;
        let generation = self.generation();

        let session = self.backend.register(&request).await?;
        let account = Account::from_auth_session(
            request.service.trim(),
            session.profile.handle.clone(),
            session,
        );

        self.commit_if_current(generation, |state| {
            state.upsert(account.clone());
            state.set_current(&account.did);
            Change::Structure
        })?;

        tracing::info!(did = %account.did, handle = %account.handle, "Created account");
        self.emit(SessionEventKind::AccountCreated, Some(&account.did), None);

        Ok(account)
    }

    /// Exchange credentials for a session; the account becomes current.
    pub async fn login(&self, request: LoginRequest, log_context: LogContext) -> Result<()> {
        validate_service(&request.service)?;

        let _op = self.op_lock.lock().await;
        let generation = self.generation();

        let session = self.backend.authenticate(&request).await.map_err(|e| {
            tracing::info!(identifier = %request.identifier, reason = %e, "Login failed");
            e
        })?;
        let account =
            Account::from_auth_session(request.service.trim(), request.identifier.trim(), session);
        let did = account.did.clone();

        self.commit_if_current(generation, |state| {
            state.upsert(account);
            state.set_current(&did);
            Change::Structure
        })?;

        self.emit(SessionEventKind::LoggedIn, Some(&did), Some(&log_context));
        Ok(())
    }

    /// Full logout: every account loses its tokens and nothing stays current.
    /// Without a current account, tokens left on other accounts are still
    /// cleared; only a state with no tokens and no current account is left
    /// untouched.
    pub async fn logout(&self, log_context: LogContext) -> Result<()> {
        let _op = self.op_lock.lock().await;

        let mut previous = None;
        let change = self.commit(|state| {
            let holds_tokens = state
                .accounts
                .iter()
                .any(|a| a.access_token.is_some() || a.refresh_token.is_some());
            if !holds_tokens && state.current_account_did.is_none() {
                return Change::None;
            }

            for account in &mut state.accounts {
                account.clear_tokens(AccountStatus::LoggedOut);
            }
            previous = state.current_account_did.take();
            Change::Structure
        });

        if change != Change::None {
            self.emit(
                SessionEventKind::LoggedOut,
                previous.as_deref(),
                Some(&log_context),
            );
        }
        Ok(())
    }

    /// Partial logout: drop the current pointer, keep every token.
    pub fn clear_current_account(&self) {
        let mut previous = None;
        let change = self.commit(|state| match state.current_account_did.take() {
            Some(did) => {
                previous = Some(did);
                Change::Structure
            }
            None => Change::None,
        });

        if change != Change::None {
            self.emit(SessionEventKind::CurrentCleared, previous.as_deref(), None);
        }
    }

    /// Establish a session from externally obtained tokens. Nothing is
    /// stored unless the backend accepts them.
    pub async fn init_session(&self, account: Account) -> Result<()> {
        validate_service(&account.service)?;

        let _op = self.op_lock.lock().await;
        let generation = self.generation();

        let revalidated = self.revalidate(&account).await?;
        let did = account.did.clone();

        self.commit_revalidated(generation, &did, revalidated, |state, revalidated| {
            let mut account = account;
            revalidated.apply_to(&mut account);
            state.upsert(account);
            state.set_current(&did);
            Change::Structure
        })?;

        self.emit(SessionEventKind::LoggedIn, Some(&did), None);
        Ok(())
    }

    /// Revalidate `account` (or the current account) and make it current.
    /// Without an argument and without a current account this is a no-op.
    pub async fn resume_session(&self, account: Option<Account>) -> Result<()> {
        let _op = self.op_lock.lock().await;

        let target = match account {
            Some(account) => account,
            None => {
                let current = self.current_account();
                match current {
                    Some(current) => current,
                    None => return Ok(()),
                }
            }
        };

        self.resume_locked(target).await
    }

    /// Caller must hold the operation lock.
    async fn resume_locked(&self, account: Account) -> Result<()> {
        let generation = self.generation();

        // The stored record carries the freshest tokens
        let known = self.shared.read().state.account(&account.did).cloned();
        let target = known.unwrap_or(account);

        match self.revalidate(&target).await {
            Ok(revalidated) => {
                let did = target.did.clone();

                self.commit_revalidated(generation, &did, revalidated, |state, revalidated| {
                    let mut target = target;
                    revalidated.apply_to(&mut target);
                    state.upsert(target);
                    state.set_current(&did);
                    Change::Structure
                })?;

                tracing::info!(did = %did, "Resumed session");
                self.emit(SessionEventKind::SessionResumed, Some(&did), None);
                Ok(())
            }
            Err(AuthError::Network(reason)) => Err(AuthError::Network(reason).into()),
            Err(reason) => {
                self.expire_account(generation, &target.did, &reason)?;
                Err(AuthError::SessionExpired.into())
            }
        }
    }

    /// Delete an account record. Unknown accounts are ignored.
    pub fn remove_account(&self, account: &Account) {
        let change = self.commit(|state| match state.remove(&account.did) {
            Some(_) => Change::Structure,
            None => Change::None,
        });

        if change != Change::None {
            tracing::info!(did = %account.did, "Removed account");
            self.emit(SessionEventKind::AccountRemoved, Some(&account.did), None);
        }
    }

    /// Switch to a known account. Either the switch completes or the previous
    /// current account stays selected; an expired target loses its tokens.
    pub async fn select_account(&self, account: &Account, log_context: LogContext) -> Result<()> {
        let _op = self.op_lock.lock().await;

        let target = self
            .shared
            .read()
            .state
            .account(&account.did)
            .cloned()
            .ok_or_else(|| SessionError::UnknownAccount(account.did.clone()))?;

        let _switching = FlagGuard::raise(&self.shared, switching_flag);
        let generation = self.generation();

        match self.revalidate(&target).await {
            Ok(revalidated) => {
                let did = target.did.clone();
                self.commit_revalidated(generation, &did, revalidated, |state, revalidated| {
                    if let Some(stored) = state.account_mut(&did) {
                        revalidated.apply_to(stored);
                    }
                    state.set_current(&did);
                    Change::Structure
                })?;

                tracing::info!(did = %did, "Switched account");
                self.emit(SessionEventKind::LoggedIn, Some(&did), Some(&log_context));
                Ok(())
            }
            Err(AuthError::Network(reason)) => Err(AuthError::Network(reason).into()),
            Err(reason) => {
                self.expire_account(generation, &target.did, &reason)?;
                Err(AuthError::SessionExpired.into())
            }
        }
    }

    /// Merge profile fields into the current account. No-op without one.
    pub fn update_current_account(&self, update: AccountUpdate) {
        if update.is_empty() {
            return;
        }

        let mut did = None;
        let change = self.commit(|state| match state.current_account_mut() {
            Some(account) => {
                account.apply_update(&update);
                did = Some(account.did.clone());
                Change::Fields
            }
            None => Change::None,
        });

        if change != Change::None {
            self.emit(SessionEventKind::AccountUpdated, did.as_deref(), None);
        }
    }

    /// Snapshot of the whole session state.
    pub fn state(&self) -> SessionState {
        self.shared.read().state.clone()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.shared.read().state.accounts.clone()
    }

    pub fn current_account(&self) -> Option<Account> {
        self.shared.read().state.current_account().cloned()
    }

    pub fn has_session(&self) -> bool {
        self.shared.read().state.has_session()
    }

    /// False while the last credential store write is still outstanding.
    pub fn is_durable(&self) -> bool {
        !self.shared.read().needs_persist
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn generation(&self) -> u64 {
        self.shared.read().generation
    }

    /// Check the account's access token, falling back to a refresh when the
    /// backend reports it expired. Touches no state.
    async fn revalidate(&self, account: &Account) -> std::result::Result<Revalidated, AuthError> {
        if let Some(access_token) = account.access_token.as_deref() {
            match self.fetch_profile(account, access_token).await {
                Ok(profile) => {
                    return Ok(Revalidated {
                        profile,
                        tokens: None,
                    });
                }
                Err(AuthError::SessionExpired) => {
                    tracing::debug!(did = %account.did, "Access token expired, refreshing");
                }
                Err(e) => return Err(e),
            }
        }

        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(AuthError::SessionExpired)?;
        let tokens = self.backend.refresh(&account.service, refresh_token).await?;
        let profile = self.fetch_profile(account, &tokens.access_token).await?;

        Ok(Revalidated {
            profile,
            tokens: Some(tokens),
        })
    }

    async fn fetch_profile(
        &self,
        account: &Account,
        access_token: &str,
    ) -> std::result::Result<SessionProfile, AuthError> {
        let profile = self
            .backend
            .get_session(&account.service, access_token)
            .await?;

        if profile.did != account.did {
            tracing::warn!(
                expected = %account.did,
                actual = %profile.did,
                "Session belongs to a different identity"
            );
            return Err(AuthError::InvalidCredentials);
        }
        Ok(profile)
    }

    /// Clear the tokens of an account whose revalidation failed. The current
    /// pointer is cleared only if it named that account.
    fn expire_account(&self, generation: u64, did: &str, reason: &AuthError) -> Result<()> {
        tracing::warn!(did = %did, reason = %reason, "Session expired");

        self.commit_if_current(generation, |state| {
            let Some(account) = state.account_mut(did) else {
                return Change::None;
            };
            account.clear_tokens(AccountStatus::Expired);

            if state.is_current(did) {
                state.current_account_did = None;
            }
            Change::Structure
        })?;

        self.emit(SessionEventKind::SessionExpired, Some(did), None);
        Ok(())
    }

    /// Apply `f` under the state lock, then persist if anything changed.
    fn commit<F>(&self, f: F) -> Change
    where
        F: FnOnce(&mut SessionState) -> Change,
    {
        let mut shared = self.shared.write();
        let change = f(&mut shared.state);
        self.finish_locked(&mut shared, change);
        change
    }

    /// Like `commit`, but refuses to apply `f` if the state changed
    /// structurally since `generation` was read.
    fn commit_if_current<F>(&self, generation: u64, f: F) -> Result<Change>
    where
        F: FnOnce(&mut SessionState) -> Change,
    {
        let mut shared = self.shared.write();
        if is_stale(&shared, generation) {
            return Err(SessionError::Superseded);
        }

        let change = f(&mut shared.state);
        self.finish_locked(&mut shared, change);
        Ok(change)
    }

    /// `commit_if_current` for a revalidation result. When stale, tokens
    /// rotated by a refresh still replace the stored record's pair, which the
    /// backend has already retired; nothing structural is applied.
    fn commit_revalidated<F>(
        &self,
        generation: u64,
        did: &str,
        revalidated: Revalidated,
        f: F,
    ) -> Result<Change>
    where
        F: FnOnce(&mut SessionState, Revalidated) -> Change,
    {
        let mut shared = self.shared.write();
        if is_stale(&shared, generation) {
            if let Some(tokens) = revalidated.tokens {
                if let Some(stored) = shared.state.account_mut(did) {
                    tracing::debug!(did = %did, "Keeping rotated tokens from stale response");
                    stored.apply_tokens(tokens);
                    self.finish_locked(&mut shared, Change::Fields);
                }
            }
            return Err(SessionError::Superseded);
        }

        let change = f(&mut shared.state, revalidated);
        self.finish_locked(&mut shared, change);
        Ok(change)
    }

    fn finish_locked(&self, shared: &mut Shared, change: Change) {
        if change == Change::None {
            return;
        }
        if change == Change::Structure {
            shared.generation += 1;
        }
        debug_assert!(shared.state.is_consistent());
        self.persist_locked(shared);
    }

    /// Write the full snapshot. Failures are logged and retried by the next
    /// mutation; in-memory state stays authoritative meanwhile.
    fn persist_locked(&self, shared: &mut Shared) {
        let state = &shared.state;
        match self
            .store
            .save(&state.accounts, state.current_account_did.as_deref())
        {
            Ok(()) => {
                if shared.needs_persist {
                    tracing::info!("Credential store caught up");
                }
                shared.needs_persist = false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist sessions");
                shared.needs_persist = true;
            }
        }
    }

    fn emit(&self, kind: SessionEventKind, did: Option<&str>, log_context: Option<&LogContext>) {
        tracing::info!(
            event = %kind,
            did = did.unwrap_or("-"),
            log_context = log_context.map(LogContext::as_str).unwrap_or("-"),
            "Session event"
        );

        // No subscribers is fine
        let _ = self.events.send(SessionEvent::new(kind, did, log_context));
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            op_lock: Arc::clone(&self.op_lock),
            store: Arc::clone(&self.store),
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
        }
    }
}
