//! Account data structure and status state machine
//!
//! ```text
//! Anonymous
//!   ↓ create / login / init
//! Active ──refresh failure──→ Expired
//!   │                            │
//!   └──────full logout──→ LoggedOut ←┘
//! ```
//!
//! Anonymous means "not in the account list". Both `Expired` and
//! `LoggedOut` records hold no tokens, so neither can be resumed; they come
//! back through `login` or `init_session` with fresh credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{AuthSession, SessionProfile, TokenPair};
use crate::error::SessionError;

/// Check that `service` is an absolute http(s) URL with a host.
pub fn validate_service(service: &str) -> Result<(), SessionError> {
    let parsed = url::Url::parse(service.trim())
        .map_err(|e| SessionError::InvalidService(format!("{}: {}", service, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(SessionError::InvalidService(service.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Tokens held and last revalidation succeeded
    Active,
    /// Token refresh failed; record kept for re-login
    Expired,
    /// Tokens removed by a full logout
    LoggedOut,
}

impl AccountStatus {
    pub fn can_transition_to(&self, target: AccountStatus) -> bool {
        match (self, target) {
            // Any state can become active through a fresh credential exchange
            (_, AccountStatus::Active) => true,
            (AccountStatus::Active, AccountStatus::Expired) => true,
            (AccountStatus::Active, AccountStatus::LoggedOut) => true,
            (AccountStatus::Expired, AccountStatus::LoggedOut) => true,
            (a, b) if *a == b => true,
            // A logged-out account has nothing left to expire
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Expired => "expired",
            AccountStatus::LoggedOut => "logged_out",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "expired" => Ok(AccountStatus::Expired),
            "logged_out" => Ok(AccountStatus::LoggedOut),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Backend origin this account authenticates against
    pub service: String,
    /// Handle or email used at login
    pub identifier: String,
    /// Decentralized identifier, immutable primary key
    pub did: String,
    pub handle: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub email_auth_factor: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub status: AccountStatus,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build an active account from a successful credential exchange.
    pub fn from_auth_session(
        service: impl Into<String>,
        identifier: impl Into<String>,
        session: AuthSession,
    ) -> Self {
        Self {
            service: service.into(),
            identifier: identifier.into(),
            did: session.profile.did,
            handle: session.profile.handle,
            email: session.profile.email,
            email_confirmed: session.profile.email_confirmed,
            email_auth_factor: session.profile.email_auth_factor,
            access_token: Some(session.tokens.access_token),
            refresh_token: Some(session.tokens.refresh_token),
            status: AccountStatus::Active,
            updated_at: Utc::now(),
        }
    }

    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some()
    }

    /// Install freshly issued tokens and mark the account active.
    pub fn apply_tokens(&mut self, tokens: TokenPair) {
        self.access_token = Some(tokens.access_token);
        self.refresh_token = Some(tokens.refresh_token);
        self.status = AccountStatus::Active;
        self.updated_at = Utc::now();
    }

    /// Merge profile fields reported by the backend. The did never changes.
    pub fn apply_profile(&mut self, profile: SessionProfile) {
        self.handle = profile.handle;
        self.email = profile.email;
        self.email_confirmed = profile.email_confirmed;
        self.email_auth_factor = profile.email_auth_factor;
        self.updated_at = Utc::now();
    }

    /// Drop both tokens. Refresh failures land in `Expired`, full logout in
    /// `LoggedOut`; either way only a fresh login brings the account back.
    pub fn clear_tokens(&mut self, status: AccountStatus) {
        self.access_token = None;
        self.refresh_token = None;
        if self.status != status && self.status.can_transition_to(status) {
            tracing::debug!(
                did = %self.did,
                from = %self.status,
                to = %status,
                "Account status transition"
            );
            self.status = status;
        }
        self.updated_at = Utc::now();
    }

    /// Local-only profile merge; fields left as `None` are kept.
    pub fn apply_update(&mut self, update: &AccountUpdate) {
        if let Some(handle) = &update.handle {
            self.handle = handle.clone();
        }
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(confirmed) = update.email_confirmed {
            self.email_confirmed = confirmed;
        }
        if let Some(auth_factor) = update.email_auth_factor {
            self.email_auth_factor = auth_factor;
        }
        self.updated_at = Utc::now();
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("service", &self.service)
            .field("identifier", &self.identifier)
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("email", &self.email)
            .field("email_confirmed", &self.email_confirmed)
            .field("email_auth_factor", &self.email_auth_factor)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("status", &self.status)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fields `update_current_account` may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub handle: Option<String>,
    pub email: Option<String>,
    pub email_confirmed: Option<bool>,
    pub email_auth_factor: Option<bool>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.handle.is_none()
            && self.email.is_none()
            && self.email_confirmed.is_none()
            && self.email_auth_factor.is_none()
    }
}

#[cfg(test)]
pub(crate) fn test_account(did: &str) -> Account {
    Account {
        service: "https://pds.example.com".to_string(),
        identifier: format!("{}.example.com", did.trim_start_matches("did:plc:")),
        did: did.to_string(),
        handle: format!("{}.example.com", did.trim_start_matches("did:plc:")),
        email: None,
        email_confirmed: false,
        email_auth_factor: false,
        access_token: Some(format!("access-{}", did)),
        refresh_token: Some(format!("refresh-{}", did)),
        status: AccountStatus::Active,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_service() {
        assert!(validate_service("https://pds.example.com").is_ok());
        assert!(validate_service(" http://localhost:2583 ").is_ok());

        for bad in ["pds.example.com", "ftp://pds.example.com", "https://", ""] {
            assert!(
                matches!(validate_service(bad), Err(SessionError::InvalidService(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_expired_account_holds_no_refresh_token() {
        let mut account = test_account("did:plc:alice");
        account.clear_tokens(AccountStatus::Expired);
        assert_eq!(account.status, AccountStatus::Expired);
        assert!(account.refresh_token.is_none());
        assert!(!account.has_tokens());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(AccountStatus::Active.can_transition_to(AccountStatus::Expired));
        assert!(AccountStatus::Active.can_transition_to(AccountStatus::LoggedOut));
        assert!(AccountStatus::Expired.can_transition_to(AccountStatus::Active));
        assert!(AccountStatus::Expired.can_transition_to(AccountStatus::LoggedOut));
        assert!(AccountStatus::LoggedOut.can_transition_to(AccountStatus::Active));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!AccountStatus::LoggedOut.can_transition_to(AccountStatus::Expired));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Expired,
            AccountStatus::LoggedOut,
        ] {
            assert_eq!(status.as_str().parse::<AccountStatus>(), Ok(status));
        }
        assert!("frozen".parse::<AccountStatus>().is_err());
    }

    #[test]
    fn test_clear_tokens_keeps_logged_out() {
        let mut account = test_account("did:plc:alice");
        account.clear_tokens(AccountStatus::LoggedOut);
        assert!(!account.has_tokens());
        assert!(account.refresh_token.is_none());

        // A later expiry cannot downgrade a logged-out record
        account.clear_tokens(AccountStatus::Expired);
        assert_eq!(account.status, AccountStatus::LoggedOut);
    }

    #[test]
    fn test_apply_update_merges_only_given_fields() {
        let mut account = test_account("did:plc:alice");
        account.email = Some("old@example.com".to_string());

        account.apply_update(&AccountUpdate {
            email_confirmed: Some(true),
            ..Default::default()
        });

        assert_eq!(account.email.as_deref(), Some("old@example.com"));
        assert!(account.email_confirmed);
        assert_eq!(account.handle, "alice.example.com");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let account = test_account("did:plc:alice");
        let printed = format!("{:?}", account);
        assert!(!printed.contains("access-did:plc:alice"));
        assert!(printed.contains("<redacted>"));
    }
}
