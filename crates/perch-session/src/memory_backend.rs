//! In-process auth backend
//!
//! Keeps identities and issued tokens in memory. Useful for tests, demos and
//! offline development; it also exposes knobs to simulate expiry, takedowns,
//! outages and slow responses.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backend::{
    AuthBackend, AuthSession, CreateAccountRequest, LoginRequest, SessionProfile, TokenPair,
};
use crate::error::{AuthError, RegistrationError};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
struct Identity {
    did: String,
    handle: String,
    email: String,
    password: String,
    email_confirmed: bool,
    /// Expected emailed code when 2FA is on
    auth_factor_token: Option<String>,
    taken_down: bool,
}

impl Identity {
    fn profile(&self) -> SessionProfile {
        SessionProfile {
            did: self.did.clone(),
            handle: self.handle.clone(),
            email: Some(self.email.clone()),
            email_confirmed: self.email_confirmed,
            email_auth_factor: self.auth_factor_token.is_some(),
        }
    }
}

#[derive(Default)]
struct Inner {
    identities: HashMap<String, Identity>,
    /// access token -> did
    access_tokens: HashMap<String, String>,
    /// refresh token -> did
    refresh_tokens: HashMap<String, String>,
    invite_codes: Option<HashSet<String>>,
    phone_verification_code: Option<String>,
    offline: bool,
    latency: Option<Duration>,
}

impl Inner {
    fn issue_tokens(&mut self, did: &str) -> TokenPair {
        let tokens = TokenPair {
            access_token: format!("acc-{}", Uuid::new_v4().simple()),
            refresh_token: format!("ref-{}", Uuid::new_v4().simple()),
        };
        self.access_tokens
            .insert(tokens.access_token.clone(), did.to_string());
        self.refresh_tokens
            .insert(tokens.refresh_token.clone(), did.to_string());
        tokens
    }

    fn find_by_identifier(&self, identifier: &str) -> Option<&Identity> {
        let needle = identifier.trim().to_lowercase();
        self.identities
            .values()
            .find(|i| i.handle == needle || i.email.to_lowercase() == needle)
    }
}

pub struct MemoryAuthBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAuthBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Require one of `codes` on registration.
    pub fn with_invite_codes<I, S>(self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.lock().invite_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Require phone verification with `code` on registration.
    pub fn with_phone_verification(self, code: impl Into<String>) -> Self {
        self.inner.lock().phone_verification_code = Some(code.into());
        self
    }

    /// Register an identity directly, returning its did.
    pub fn add_identity(&self, handle: &str, email: &str, password: &str) -> String {
        let did = mint_did();
        self.inner.lock().identities.insert(
            did.clone(),
            Identity {
                did: did.clone(),
                handle: handle.to_lowercase(),
                email: email.to_string(),
                password: password.to_string(),
                email_confirmed: false,
                auth_factor_token: None,
                taken_down: false,
            },
        );
        did
    }

    /// Issue a token pair for `did` outside of any login flow, as an
    /// imported or deep-linked session would carry.
    pub fn issue_session(&self, did: &str) -> Option<AuthSession> {
        let mut inner = self.inner.lock();
        let profile = inner.identities.get(did)?.profile();
        let tokens = inner.issue_tokens(did);
        Some(AuthSession { profile, tokens })
    }

    pub fn enable_email_auth_factor(&self, did: &str, token: impl Into<String>) {
        if let Some(identity) = self.inner.lock().identities.get_mut(did) {
            identity.auth_factor_token = Some(token.into());
        }
    }

    pub fn confirm_email(&self, did: &str) {
        if let Some(identity) = self.inner.lock().identities.get_mut(did) {
            identity.email_confirmed = true;
        }
    }

    pub fn take_down(&self, did: &str) {
        if let Some(identity) = self.inner.lock().identities.get_mut(did) {
            identity.taken_down = true;
        }
    }

    /// Invalidate every access token of `did`; refresh tokens keep working.
    pub fn expire_access_tokens(&self, did: &str) {
        self.inner.lock().access_tokens.retain(|_, owner| owner != did);
    }

    /// Invalidate every token of `did`, forcing a fresh login.
    pub fn revoke_sessions(&self, did: &str) {
        let mut inner = self.inner.lock();
        inner.access_tokens.retain(|_, owner| owner != did);
        inner.refresh_tokens.retain(|_, owner| owner != did);
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    async fn simulate_network(&self) -> Result<(), String> {
        let (offline, latency) = {
            let inner = self.inner.lock();
            (inner.offline, inner.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if offline {
            return Err("backend unreachable".to_string());
        }
        Ok(())
    }
}

impl Default for MemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryAuthBackend {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn mint_did() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("did:plc:{}", &id[..24])
}

#[async_trait]
impl AuthBackend for MemoryAuthBackend {
    async fn register(
        &self,
        request: &CreateAccountRequest,
    ) -> Result<AuthSession, RegistrationError> {
        self.simulate_network()
            .await
            .map_err(RegistrationError::Network)?;

        let mut inner = self.inner.lock();

        if let Some(codes) = &inner.invite_codes {
            match &request.invite_code {
                Some(code) if codes.contains(code) => {}
                _ => return Err(RegistrationError::InvalidInvite),
            }
        }

        if let Some(expected) = &inner.phone_verification_code {
            if request.verification_phone.is_none() {
                return Err(RegistrationError::VerificationRequired);
            }
            if request.verification_code.as_ref() != Some(expected) {
                return Err(RegistrationError::VerificationFailed);
            }
        }

        let handle = request.handle.trim().to_lowercase();
        if inner.identities.values().any(|i| i.handle == handle) {
            return Err(RegistrationError::HandleTaken);
        }

        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RegistrationError::WeakPassword);
        }

        if let Some(codes) = inner.invite_codes.as_mut() {
            if let Some(code) = &request.invite_code {
                codes.remove(code);
            }
        }

        let did = mint_did();
        let identity = Identity {
            did: did.clone(),
            handle,
            email: request.email.clone(),
            password: request.password.clone(),
            email_confirmed: false,
            auth_factor_token: None,
            taken_down: false,
        };
        let profile = identity.profile();
        inner.identities.insert(did.clone(), identity);
        let tokens = inner.issue_tokens(&did);

        Ok(AuthSession { profile, tokens })
    }

    async fn authenticate(&self, request: &LoginRequest) -> Result<AuthSession, AuthError> {
        self.simulate_network().await.map_err(AuthError::Network)?;

        let mut inner = self.inner.lock();
        let identity = inner
            .find_by_identifier(&request.identifier)
            .filter(|i| i.password == request.password)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        if identity.taken_down {
            return Err(AuthError::AccountTakenDown);
        }

        if let Some(expected) = &identity.auth_factor_token {
            if request.auth_factor_token.as_ref() != Some(expected) {
                return Err(AuthError::SecondFactorRequired);
            }
        }

        let tokens = inner.issue_tokens(&identity.did);
        Ok(AuthSession {
            profile: identity.profile(),
            tokens,
        })
    }

    async fn get_session(
        &self,
        _service: &str,
        access_token: &str,
    ) -> Result<SessionProfile, AuthError> {
        self.simulate_network().await.map_err(AuthError::Network)?;

        let inner = self.inner.lock();
        let did = inner
            .access_tokens
            .get(access_token)
            .ok_or(AuthError::SessionExpired)?;
        let identity = inner
            .identities
            .get(did)
            .ok_or(AuthError::SessionExpired)?;

        if identity.taken_down {
            return Err(AuthError::AccountTakenDown);
        }
        Ok(identity.profile())
    }

    async fn refresh(&self, _service: &str, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.simulate_network().await.map_err(AuthError::Network)?;

        let mut inner = self.inner.lock();
        let did = inner
            .refresh_tokens
            .remove(refresh_token)
            .ok_or(AuthError::SessionExpired)?;

        if inner.identities.get(&did).map_or(true, |i| i.taken_down) {
            return Err(AuthError::AccountTakenDown);
        }

        // Rotation retires the old access token too
        inner.access_tokens.retain(|_, owner| owner != &did);
        Ok(inner.issue_tokens(&did))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_request(identifier: &str, password: &str) -> LoginRequest {
        LoginRequest {
            service: "https://pds.example.com".to_string(),
            identifier: identifier.to_string(),
            password: password.to_string(),
            auth_factor_token: None,
        }
    }

    fn create_request(handle: &str, password: &str) -> CreateAccountRequest {
        CreateAccountRequest {
            service: "https://pds.example.com".to_string(),
            email: format!("{}@example.com", handle),
            password: password.to_string(),
            handle: handle.to_string(),
            invite_code: None,
            verification_phone: None,
            verification_code: None,
        }
    }

    #[tokio::test]
    async fn test_register_rules() {
        let backend = MemoryAuthBackend::new().with_invite_codes(["invite-1"]);

        let mut request = create_request("alice.test", "hunter22hunter");
        assert_eq!(
            backend.register(&request).await.unwrap_err(),
            RegistrationError::InvalidInvite
        );

        request.invite_code = Some("invite-1".to_string());
        request.password = "short".to_string();
        assert_eq!(
            backend.register(&request).await.unwrap_err(),
            RegistrationError::WeakPassword
        );

        request.password = "hunter22hunter".to_string();
        let session = backend.register(&request).await.unwrap();
        assert!(session.profile.did.starts_with("did:plc:"));
        assert_eq!(session.profile.handle, "alice.test");

        // Invite codes are single use
        assert_eq!(
            backend.register(&request).await.unwrap_err(),
            RegistrationError::InvalidInvite
        );
    }

    #[tokio::test]
    async fn test_register_handle_taken_and_verification() {
        let backend = MemoryAuthBackend::new().with_phone_verification("123456");
        backend.add_identity("alice.test", "alice@example.com", "password123");

        let mut request = create_request("bob.test", "password123");
        assert_eq!(
            backend.register(&request).await.unwrap_err(),
            RegistrationError::VerificationRequired
        );

        request.verification_phone = Some("+15550100".to_string());
        request.verification_code = Some("000000".to_string());
        assert_eq!(
            backend.register(&request).await.unwrap_err(),
            RegistrationError::VerificationFailed
        );

        request.verification_code = Some("123456".to_string());
        request.handle = "Alice.test".to_string();
        assert_eq!(
            backend.register(&request).await.unwrap_err(),
            RegistrationError::HandleTaken
        );
    }

    #[tokio::test]
    async fn test_authenticate_by_handle_or_email() {
        let backend = MemoryAuthBackend::new();
        let did = backend.add_identity("alice.test", "alice@example.com", "password123");

        let by_handle = backend
            .authenticate(&login_request("alice.test", "password123"))
            .await
            .unwrap();
        assert_eq!(by_handle.profile.did, did);

        let by_email = backend
            .authenticate(&login_request("ALICE@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(by_email.profile.did, did);

        assert_eq!(
            backend
                .authenticate(&login_request("alice.test", "wrong"))
                .await
                .unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_second_factor() {
        let backend = MemoryAuthBackend::new();
        let did = backend.add_identity("alice.test", "alice@example.com", "password123");
        backend.enable_email_auth_factor(&did, "TOKEN-1");

        let mut request = login_request("alice.test", "password123");
        assert_eq!(
            backend.authenticate(&request).await.unwrap_err(),
            AuthError::SecondFactorRequired
        );

        request.auth_factor_token = Some("TOKEN-1".to_string());
        let session = backend.authenticate(&request).await.unwrap();
        assert!(session.profile.email_auth_factor);
    }

    #[tokio::test]
    async fn test_expiry_and_refresh_rotation() {
        let backend = MemoryAuthBackend::new();
        let did = backend.add_identity("alice.test", "alice@example.com", "password123");
        let session = backend.issue_session(&did).unwrap();
        let service = "https://pds.example.com";

        assert!(backend
            .get_session(service, &session.tokens.access_token)
            .await
            .is_ok());

        backend.expire_access_tokens(&did);
        assert_eq!(
            backend
                .get_session(service, &session.tokens.access_token)
                .await
                .unwrap_err(),
            AuthError::SessionExpired
        );

        let rotated = backend
            .refresh(service, &session.tokens.refresh_token)
            .await
            .unwrap();
        assert!(backend
            .get_session(service, &rotated.access_token)
            .await
            .is_ok());

        // The consumed refresh token cannot be replayed
        assert_eq!(
            backend
                .refresh(service, &session.tokens.refresh_token)
                .await
                .unwrap_err(),
            AuthError::SessionExpired
        );
    }

    #[tokio::test]
    async fn test_offline_and_takedown() {
        let backend = MemoryAuthBackend::new();
        let did = backend.add_identity("alice.test", "alice@example.com", "password123");

        backend.set_offline(true);
        let err = backend
            .authenticate(&login_request("alice.test", "password123"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        backend.set_offline(false);
        backend.take_down(&did);
        assert_eq!(
            backend
                .authenticate(&login_request("alice.test", "password123"))
                .await
                .unwrap_err(),
            AuthError::AccountTakenDown
        );
    }
}
