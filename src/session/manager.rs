//! The session facade and the state cell it owns.
//!
//! `SessionManager` is the public API surface: login, logout, startup
//! rehydration, profile refresh, synchronous snapshots, and change
//! notifications. It is constructed explicitly and injected at the
//! application root; observers subscribe rather than reading globals.
//!
//! `SessionCell` is the sole writer of the in-memory `Session` and of the
//! persisted snapshot. Every other component (coordinator, transport) reads
//! or requests transitions through it, never mutates state directly.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{AuthApi, LoginPayload, ProfilePayload, TokenSet};
use crate::error::AuthError;
use crate::models::{Session, SessionState, TOKEN_TYPE_BEARER};
use crate::session::refresh::RefreshCoordinator;
use crate::session::snapshot;
use crate::store::CredentialStore;

struct CellInner {
    session: Session,
    state: SessionState,
    /// Bumped on every login and logout. A refresh result whose captured
    /// generation no longer matches is stale and must be discarded.
    generation: u64,
}

/// Canonical session state plus its persistence and change notification.
pub(crate) struct SessionCell {
    store: Arc<dyn CredentialStore>,
    inner: Mutex<CellInner>,
    tx: watch::Sender<Session>,
}

impl SessionCell {
    fn new(store: Arc<dyn CredentialStore>) -> Self {
        let session = Session::anonymous();
        let (tx, _rx) = watch::channel(session.clone());
        Self {
            store,
            inner: Mutex::new(CellInner {
                session,
                state: SessionState::Anonymous,
                generation: 0,
            }),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CellInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub(crate) fn refresh_token(&self) -> Option<String> {
        self.lock().session.refresh_token.clone()
    }

    /// `Authorization` header value, when a token is present.
    pub(crate) fn authorization_header(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .session
            .access_token
            .as_ref()
            .map(|token| format!("{} {}", inner.session.token_type, token))
    }

    fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    fn publish(&self, session: Session) {
        self.tx.send_replace(session);
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = snapshot::write(self.store.as_ref(), session) {
            warn!(error = %e, "failed to persist session snapshot");
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = snapshot::clear(self.store.as_ref()) {
            warn!(error = %e, "failed to clear persisted session");
        }
    }

    /// Mark a transient state (Authenticating) without touching the record.
    fn set_state(&self, state: SessionState) {
        let session = {
            let mut inner = self.lock();
            inner.state = state;
            inner.session.clone()
        };
        self.publish(session);
    }

    /// Commit a successful login: new identity, new generation, full
    /// snapshot write.
    fn complete_login(&self, payload: &LoginPayload) {
        let session = Session {
            is_authenticated: true,
            access_token: Some(payload.tokens.access_token.clone()),
            refresh_token: Some(payload.tokens.refresh_token.clone()),
            expires_at: Some(payload.tokens.expires_at),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            email: Some(payload.email.clone()),
            username: Some(payload.username.clone()),
            role: payload.role,
            account: Some(payload.account.clone()),
            created_at: Some(payload.created_at),
            updated_at: Some(payload.updated_at),
        };
        {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.session = session.clone();
            inner.state = SessionState::Authenticated;
        }
        self.persist(&session);
        self.publish(session);
    }

    /// Swap the token set after a successful renewal; role and identity are
    /// unchanged. Returns false (and applies nothing) when `generation` is
    /// stale - a login or logout superseded the renewal while it was in
    /// flight.
    pub(crate) fn apply_refreshed_tokens(&self, generation: u64, tokens: &TokenSet) -> bool {
        let session = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            inner.session.access_token = Some(tokens.access_token.clone());
            inner.session.refresh_token = Some(tokens.refresh_token.clone());
            inner.session.expires_at = Some(tokens.expires_at);
            inner.session.is_authenticated = true;
            inner.state = SessionState::Authenticated;
            inner.session.clone()
        };
        self.persist(&session);
        self.publish(session);
        true
    }

    /// Update only the profile-bearing fields; tokens untouched. Skipped
    /// (returns None) when `generation` is stale.
    fn update_profile(&self, generation: u64, payload: &ProfilePayload) -> Option<Session> {
        let session = {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state != SessionState::Authenticated {
                return None;
            }
            inner.session.email = Some(payload.email.clone());
            inner.session.username = Some(payload.username.clone());
            inner.session.role = payload.role;
            inner.session.account = Some(payload.account.clone());
            inner.session.updated_at = Some(payload.updated_at);
            inner.session.clone()
        };
        self.persist(&session);
        self.publish(session.clone());
        Some(session)
    }

    /// Unconditional reset to the anonymous default. Local state and the
    /// persisted snapshot are cleared; always succeeds locally.
    fn reset_to_anonymous(&self) {
        let session = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.session = Session::anonymous();
            inner.state = SessionState::Anonymous;
            inner.session.clone()
        };
        self.clear_persisted();
        self.publish(session);
    }

    /// Forced logout after a failed renewal, unless a newer login already
    /// superseded the session that failed to renew.
    pub(crate) fn force_logout_if_current(&self, generation: u64) {
        {
            let inner = self.lock();
            if inner.generation != generation {
                debug!("skipping forced logout: session superseded");
                return;
            }
        }
        self.reset_to_anonymous();
    }

    /// Rehydrate from a persisted snapshot whose token is still valid.
    fn restore_authenticated(&self, mut session: Session) {
        session.is_authenticated = true;
        {
            let mut inner = self.lock();
            inner.session = session.clone();
            inner.state = SessionState::Authenticated;
        }
        self.persist(&session);
        self.publish(session);
    }

    /// Rehydrate from a snapshot whose token is past expiry; the caller
    /// follows up with exactly one renewal attempt.
    fn restore_expired(&self, mut session: Session) {
        session.is_authenticated = false;
        {
            let mut inner = self.lock();
            inner.session = session.clone();
            inner.state = SessionState::Expired;
        }
        self.publish(session);
    }
}

/// Public API surface of the session core.
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    cell: Arc<SessionCell>,
    refresh: RefreshCoordinator,
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let cell = Arc::new(SessionCell::new(store));
        let refresh = RefreshCoordinator::new(Arc::clone(&api), Arc::clone(&cell));
        Arc::new(Self { api, cell, refresh })
    }

    /// Startup rehydration from the persisted snapshot.
    ///
    /// A valid snapshot restores the session with no network I/O; an expired
    /// one goes through `Expired` and exactly one renewal attempt; an absent
    /// or corrupt one silently settles on `Anonymous`.
    pub async fn rehydrate(&self) -> SessionState {
        match snapshot::read(self.cell.store()) {
            Ok(None) => {
                debug!("no persisted session");
            }
            Ok(Some(session)) => {
                if !session.is_expired() {
                    info!(email = ?session.email, "session rehydrated from snapshot");
                    self.cell.restore_authenticated(session);
                } else {
                    debug!("persisted session expired, attempting renewal");
                    self.cell.restore_expired(session);
                    match self.refresh.ensure_fresh_token().await {
                        Ok(_) => info!("expired session renewed on startup"),
                        Err(e) => debug!(error = %e, "startup renewal failed"),
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "discarding unreadable session snapshot");
                self.cell.reset_to_anonymous();
            }
        }
        self.cell.state()
    }

    /// Authenticate with email and password.
    ///
    /// On success the full snapshot is persisted before this returns. On
    /// failure the previous state is kept and the error surfaces as
    /// `InvalidCredentials` or `NetworkFailure`.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let prior = self.cell.state();
        self.cell.set_state(SessionState::Authenticating);

        match self.api.login(email, password).await {
            Ok(payload) => {
                info!(email = %payload.email, role = %payload.role, "login succeeded");
                self.cell.complete_login(&payload);
                Ok(self.cell.snapshot())
            }
            Err(e) => {
                debug!(error = %e, "login failed");
                self.cell.set_state(prior);
                Err(e)
            }
        }
    }

    /// Log out. Local state and the persisted snapshot are cleared
    /// unconditionally and synchronously; remote invalidation is best-effort
    /// and never surfaces an error. Idempotent.
    pub async fn logout(&self) {
        let token = self.cell.snapshot().access_token;
        // Clearing first guarantees logout wins any race with an in-flight
        // renewal; the generation bump discards its late result.
        self.cell.reset_to_anonymous();

        if let Some(token) = token {
            if let Err(e) = self.api.logout(&token).await {
                warn!(error = %e, "remote logout failed; local session cleared anyway");
            }
        }
        info!("logged out");
    }

    /// Re-fetch the current profile and update only the profile-bearing
    /// fields of the session and snapshot; tokens are untouched.
    pub async fn refresh_account(&self) -> Result<Session, AuthError> {
        let (token, generation) = {
            let session = self.cell.snapshot();
            if self.cell.state() != SessionState::Authenticated {
                return Err(AuthError::NotAuthenticated);
            }
            match session.access_token {
                Some(token) => (token, self.cell.generation()),
                None => return Err(AuthError::NotAuthenticated),
            }
        };

        let profile = self.api.fetch_profile(&token).await?;
        self.cell
            .update_profile(generation, &profile)
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Obtain a fresh token set through the single-flight coordinator.
    pub async fn ensure_fresh_token(&self) -> Result<TokenSet, AuthError> {
        self.refresh.ensure_fresh_token().await
    }

    /// Synchronous read of the current in-memory session; no I/O.
    pub fn snapshot(&self) -> Session {
        self.cell.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.cell.state()
    }

    /// Subscribe to session changes. Every committed transition publishes
    /// the new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.cell.subscribe()
    }

    /// `Authorization` header value for the current token, if any.
    pub(crate) fn authorization_header(&self) -> Option<String> {
        self.cell.authorization_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LoginPayload, ProfilePayload, TokenSet};
    use crate::models::{Account, ClientAccount, DeveloperAccount, Role};
    use crate::session::snapshot::{self, SNAPSHOT_KEYS};
    use crate::store::MemoryStore;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::future::join_all;

    fn tokens(access: &str, refresh: &str) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn login_payload() -> LoginPayload {
        LoginPayload {
            tokens: tokens("T1", "R1"),
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            role: Role::Client,
            account: Account::Client(ClientAccount {
                id: 9,
                company_name: Some("Acme".to_string()),
                contact_email: None,
                project_ids: vec![1],
            }),
            created_at: Utc::now() - chrono::Duration::days(30),
            updated_at: Utc::now(),
        }
    }

    fn profile_payload() -> ProfilePayload {
        ProfilePayload {
            email: "a@x.com".to_string(),
            username: "alice-renamed".to_string(),
            role: Role::Client,
            account: Account::Client(ClientAccount {
                id: 9,
                company_name: Some("Acme Industries".to_string()),
                contact_email: Some("ops@acme.test".to_string()),
                project_ids: vec![1, 2],
            }),
            updated_at: Utc::now(),
        }
    }

    /// Scripted backend with call counters.
    struct MockApi {
        login_result: Result<LoginPayload, AuthError>,
        refresh_result: Result<TokenSet, AuthError>,
        profile_result: Result<ProfilePayload, AuthError>,
        refresh_delay: Option<Duration>,
        login_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        profile_calls: AtomicUsize,
        logout_calls: AtomicUsize,
    }

    impl MockApi {
        fn new() -> Self {
            Self {
                login_result: Ok(login_payload()),
                refresh_result: Ok(tokens("T2", "R2")),
                profile_result: Ok(profile_payload()),
                refresh_delay: None,
                login_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                profile_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
            }
        }

        fn with_refresh(mut self, result: Result<TokenSet, AuthError>) -> Self {
            self.refresh_result = result;
            self
        }

        fn with_refresh_delay(mut self, delay: Duration) -> Self {
            self.refresh_delay = Some(delay);
            self
        }

        fn with_login(mut self, result: Result<LoginPayload, AuthError>) -> Self {
            self.login_result = result;
            self
        }
    }

    #[async_trait]
    impl AuthApi for MockApi {
        async fn login(&self, _email: &str, _password: &str) -> Result<LoginPayload, AuthError> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            self.login_result.clone()
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.refresh_delay {
                tokio::time::sleep(delay).await;
            }
            self.refresh_result.clone()
        }

        async fn fetch_profile(&self, _access_token: &str) -> Result<ProfilePayload, AuthError> {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            self.profile_result.clone()
        }

        async fn logout(&self, _access_token: &str) -> Result<(), AuthError> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager_with(api: MockApi) -> (Arc<SessionManager>, Arc<MockApi>, Arc<MemoryStore>) {
        let api = Arc::new(api);
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(
            Arc::clone(&api) as Arc<dyn AuthApi>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
        );
        (manager, api, store)
    }

    fn assert_snapshot_complete(store: &MemoryStore) {
        for key in SNAPSHOT_KEYS {
            assert!(store.get(key).unwrap().is_some(), "missing snapshot key {key}");
        }
    }

    #[tokio::test]
    async fn test_login_persists_snapshot_and_notifies() {
        let (manager, _api, store) = manager_with(MockApi::new());
        let mut rx = manager.subscribe();
        rx.borrow_and_update();

        let session = manager.login("a@x.com", "pw").await.unwrap();

        assert_eq!(manager.state(), SessionState::Authenticated);
        assert!(session.is_authenticated);
        assert_eq!(session.access_token.as_deref(), Some("T1"));
        assert_eq!(session.role, Role::Client);
        assert_snapshot_complete(&store);

        assert!(rx.has_changed().unwrap());
        let observed = rx.borrow_and_update().clone();
        assert!(observed.is_authenticated);
        assert_eq!(observed.email.as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn test_login_rejected_stays_anonymous() {
        let (manager, _api, store) =
            manager_with(MockApi::new().with_login(Err(AuthError::InvalidCredentials)));

        let err = manager.login("a@x.com", "wrong").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce_into_one_call() {
        let (manager, api, store) =
            manager_with(MockApi::new().with_refresh_delay(Duration::from_millis(30)));
        manager.login("a@x.com", "pw").await.unwrap();

        let outcomes =
            join_all((0..8).map(|_| manager.ensure_fresh_token())).await;

        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        for outcome in outcomes {
            let set = outcome.unwrap();
            assert_eq!(set.access_token, "T2");
            assert_eq!(set.refresh_token, "R2");
        }

        // New token set applied and persisted; identity untouched.
        let session = manager.snapshot();
        assert_eq!(session.access_token.as_deref(), Some("T2"));
        assert_eq!(session.email.as_deref(), Some("a@x.com"));
        assert_eq!(store.get("authToken").unwrap().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_sequential_refreshes_each_issue_a_call() {
        let (manager, api, _store) = manager_with(MockApi::new());
        manager.login("a@x.com", "pw").await.unwrap();

        manager.ensure_fresh_token().await.unwrap();
        manager.ensure_fresh_token().await.unwrap();

        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_refresh_forces_logout_for_all_waiters() {
        let (manager, api, store) = manager_with(
            MockApi::new()
                .with_refresh(Err(AuthError::RefreshRejected))
                .with_refresh_delay(Duration::from_millis(20)),
        );
        manager.login("a@x.com", "pw").await.unwrap();

        let outcomes = join_all((0..3).map(|_| manager.ensure_fresh_token())).await;

        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        for outcome in outcomes {
            assert_eq!(outcome.unwrap_err(), AuthError::RefreshRejected);
        }
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_token_forces_logout() {
        let (manager, api, store) = manager_with(MockApi::new());
        store.set("stray", "value").unwrap();

        let err = manager.ensure_fresh_token().await.unwrap_err();
        assert_eq!(err, AuthError::NoRefreshToken);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (manager, api, store) = manager_with(MockApi::new());

        // Logging out while anonymous is a no-op that still clears storage.
        store.set("stray", "value").unwrap();
        manager.logout().await;
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.is_empty());
        assert_eq!(api.logout_calls.load(Ordering::SeqCst), 0);

        manager.login("a@x.com", "pw").await.unwrap();
        manager.logout().await;
        manager.logout().await;
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.is_empty());
        // Remote invalidation attempted once, with the token we had.
        assert_eq!(api.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_discards_late_refresh_result() {
        let (manager, _api, store) =
            manager_with(MockApi::new().with_refresh_delay(Duration::from_millis(60)));
        manager.login("a@x.com", "pw").await.unwrap();

        let mgr = Arc::clone(&manager);
        let renewal = tokio::spawn(async move { mgr.ensure_fresh_token().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.logout().await;

        // The waiter still observes the settled outcome...
        let outcome = renewal.await.unwrap().unwrap();
        assert_eq!(outcome.access_token, "T2");

        // ...but logout won: the result was never applied.
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(!manager.snapshot().is_authenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rehydrate_valid_snapshot_without_network() {
        let (manager, api, store) = manager_with(MockApi::new());
        manager.login("a@x.com", "pw").await.unwrap();

        // Fresh manager over the same store simulates a process restart.
        let api2 = Arc::new(MockApi::new());
        let restarted = SessionManager::new(
            Arc::clone(&api2) as Arc<dyn AuthApi>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
        );

        let state = restarted.rehydrate().await;
        assert_eq!(state, SessionState::Authenticated);
        assert_eq!(restarted.snapshot().access_token.as_deref(), Some("T1"));
        assert_eq!(api2.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rehydrate_expired_snapshot_refreshes_once() {
        let store = Arc::new(MemoryStore::new());
        let mut session = {
            // Persist an expired session directly.
            let payload = login_payload();
            Session {
                is_authenticated: true,
                access_token: Some(payload.tokens.access_token),
                refresh_token: Some(payload.tokens.refresh_token),
                expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
                token_type: TOKEN_TYPE_BEARER.to_string(),
                email: Some(payload.email),
                username: Some(payload.username),
                role: payload.role,
                account: Some(payload.account),
                created_at: Some(payload.created_at),
                updated_at: Some(payload.updated_at),
            }
        };
        snapshot::write(store.as_ref(), &session).unwrap();

        let api = Arc::new(MockApi::new());
        let manager = SessionManager::new(
            Arc::clone(&api) as Arc<dyn AuthApi>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
        );

        let state = manager.rehydrate().await;
        assert_eq!(state, SessionState::Authenticated);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);

        session = manager.snapshot();
        assert_eq!(session.access_token.as_deref(), Some("T2"));
        // Identity carried over from the snapshot, not re-fetched.
        assert_eq!(session.email.as_deref(), Some("a@x.com"));
        assert_eq!(store.get("authToken").unwrap().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_rehydrate_expired_snapshot_rejected_settles_anonymous() {
        let store = Arc::new(MemoryStore::new());
        let payload = login_payload();
        let session = Session {
            is_authenticated: true,
            access_token: Some(payload.tokens.access_token),
            refresh_token: Some(payload.tokens.refresh_token),
            expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            email: Some(payload.email),
            username: Some(payload.username),
            role: payload.role,
            account: Some(payload.account),
            created_at: Some(payload.created_at),
            updated_at: Some(payload.updated_at),
        };
        snapshot::write(store.as_ref(), &session).unwrap();

        let api = Arc::new(MockApi::new().with_refresh(Err(AuthError::RefreshRejected)));
        let manager = SessionManager::new(
            Arc::clone(&api) as Arc<dyn AuthApi>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
        );

        let state = manager.rehydrate().await;
        assert_eq!(state, SessionState::Anonymous);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rehydrate_partial_snapshot_resets() {
        let (manager, api, store) = manager_with(MockApi::new());
        manager.login("a@x.com", "pw").await.unwrap();
        store.remove("refreshToken").unwrap();

        let restarted = SessionManager::new(
            Arc::new(MockApi::new()) as Arc<dyn AuthApi>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
        );
        let state = restarted.rehydrate().await;

        assert_eq!(state, SessionState::Anonymous);
        assert!(store.is_empty());
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_account_updates_profile_only() {
        let (manager, api, store) = manager_with(MockApi::new());
        manager.login("a@x.com", "pw").await.unwrap();

        let session = manager.refresh_account().await.unwrap();

        assert_eq!(api.profile_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.username.as_deref(), Some("alice-renamed"));
        match session.account.as_ref().unwrap() {
            Account::Client(c) => assert_eq!(c.project_ids, vec![1, 2]),
            other => panic!("unexpected account shape: {:?}", other),
        }
        // Tokens untouched.
        assert_eq!(session.access_token.as_deref(), Some("T1"));
        assert_eq!(store.get("authToken").unwrap().as_deref(), Some("T1"));
        assert_eq!(store.get("username").unwrap().as_deref(), Some("alice-renamed"));
    }

    #[tokio::test]
    async fn test_refresh_account_requires_authentication() {
        let (manager, api, _store) = manager_with(MockApi::new());

        let err = manager.refresh_account().await.unwrap_err();
        assert_eq!(err, AuthError::NotAuthenticated);
        assert_eq!(api.profile_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_relogin_supersedes_inflight_refresh() {
        let (manager, _api, _store) =
            manager_with(MockApi::new().with_refresh_delay(Duration::from_millis(60)));
        manager.login("a@x.com", "pw").await.unwrap();

        let mgr = Arc::clone(&manager);
        let renewal = tokio::spawn(async move { mgr.ensure_fresh_token().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A second login lands while the renewal is still in flight.
        manager.login("a@x.com", "pw").await.unwrap();
        renewal.await.unwrap().unwrap();

        // The fresh login's tokens win; the late renewal was discarded.
        assert_eq!(manager.snapshot().access_token.as_deref(), Some("T1"));
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_developer_login_round_trips_account_shape() {
        let mut payload = login_payload();
        payload.role = Role::Developer;
        payload.account = Account::Developer(DeveloperAccount {
            id: 4,
            bio: None,
            github_username: Some("octocat".to_string()),
            skills: vec!["rust".to_string()],
        });
        let (manager, _api, store) = manager_with(MockApi::new().with_login(Ok(payload)));

        manager.login("d@x.com", "pw").await.unwrap();
        assert_eq!(store.get("role").unwrap().as_deref(), Some("DEVELOPER"));

        let restarted = SessionManager::new(
            Arc::new(MockApi::new()) as Arc<dyn AuthApi>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
        );
        restarted.rehydrate().await;
        match restarted.snapshot().account.unwrap() {
            Account::Developer(d) => assert_eq!(d.github_username.as_deref(), Some("octocat")),
            other => panic!("unexpected account shape: {:?}", other),
        }
    }
}
