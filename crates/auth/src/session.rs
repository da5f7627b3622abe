//! Session manager: authentication lifecycle and state propagation.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    canispect_common::{Error, Result},
    canispect_config::CanispectConfig,
    tokio::sync::OnceCell,
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    client::{AuthClient, AuthClientFactory, DelegationClientFactory},
    defaults::provider_url,
    listeners::{ListenerSet, Subscription},
    provider::BrowserIdentityProvider,
    storage::DelegationStore,
    types::AuthState,
};

/// Owns the authentication lifecycle. Construct one per application and
/// share it by `Arc`.
pub struct SessionManager {
    provider_url: Url,
    factory: Arc<dyn AuthClientFactory>,
    client: OnceCell<Arc<dyn AuthClient>>,
    listeners: ListenerSet<AuthState>,
}

impl SessionManager {
    pub fn new(provider_url: Url, factory: Arc<dyn AuthClientFactory>) -> Self {
        Self {
            provider_url,
            factory,
            client: OnceCell::new(),
            listeners: ListenerSet::new(),
        }
    }

    /// Build a manager using the browser provider and the default store.
    pub fn from_config(config: &CanispectConfig) -> Result<Self> {
        let url = provider_url(config).map_err(Error::provider_unavailable)?;
        let provider = Arc::new(BrowserIdentityProvider::new(config.identity.callback_port));
        let factory = Arc::new(DelegationClientFactory::new(DelegationStore::new(), provider));
        Ok(Self::new(url, factory))
    }

    pub fn provider_url(&self) -> &Url {
        &self.provider_url
    }

    /// Create the credential client if needed.
    ///
    /// Concurrent callers share one creation. When the creating call finds a
    /// persisted session, subscribers are notified with the resolved state.
    pub async fn init(&self) -> Result<()> {
        let created = AtomicBool::new(false);
        let client = self
            .client
            .get_or_try_init(|| async {
                created.store(true, Ordering::SeqCst);
                debug!("creating auth client");
                self.factory.create().await
            })
            .await?;

        if created.load(Ordering::SeqCst) && client.is_authenticated() {
            info!(principal = %client.identity().principal(), "resumed persisted session");
            self.notify();
        }
        Ok(())
    }

    async fn client(&self) -> Result<&Arc<dyn AuthClient>> {
        self.init().await?;
        self.client
            .get()
            .ok_or_else(|| Error::storage("auth client missing after init"))
    }

    /// Log in through the identity provider for the configured mode.
    ///
    /// Subscribers are notified only on success; on failure the state is
    /// unchanged and the error is returned.
    pub async fn login(&self) -> Result<AuthState> {
        let client = self.client().await?;
        if let Err(e) = client.login(&self.provider_url).await {
            warn!(error = %e, "login failed");
            return Err(e);
        }
        let state = self.state();
        info!(principal = ?state.principal().map(ToString::to_string), "logged in");
        self.listeners.notify(state.clone());
        Ok(state)
    }

    /// Clear the credential and notify subscribers, whatever the prior state.
    ///
    /// When the credential client cannot be created, the persisted copy is
    /// discarded through the factory instead.
    pub async fn logout(&self) -> Result<()> {
        let result = match self.client().await {
            Ok(client) => client.logout().await,
            Err(e) => {
                warn!(error = %e, "auth client unavailable; discarding persisted session");
                self.factory.discard().await
            },
        };
        if let Err(ref e) = result {
            warn!(error = %e, "logout did not complete cleanly");
        } else {
            info!("logged out");
        }
        self.notify();
        result
    }

    /// Current state, recomputed from the credential client on every call.
    pub fn state(&self) -> AuthState {
        match self.client.get() {
            Some(client) => AuthState::from_identity(client.identity()),
            None => AuthState::anonymous(),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&AuthState) + Send + Sync + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    fn notify(&self) {
        self.listeners.notify(self.state());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex, OnceLock,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        async_trait::async_trait,
        canispect_common::Principal,
        secrecy::Secret,
    };

    use {
        super::*,
        crate::{
            provider::IdentityProvider,
            types::{DelegatedSession, Identity},
        },
    };

    struct FixedProvider(DelegatedSession);

    #[async_trait]
    impl IdentityProvider for FixedProvider {
        async fn authorize(&self, _provider_url: &Url) -> Result<DelegatedSession> {
            Ok(self.0.clone())
        }
    }

    /// In-memory credential client with a scripted provider outcome.
    struct FakeClient {
        session: Mutex<Option<DelegatedSession>>,
        outcome: Mutex<Option<Result<DelegatedSession>>>,
    }

    #[async_trait]
    impl AuthClient for FakeClient {
        fn identity(&self) -> Identity {
            match self.session.lock().unwrap().as_ref() {
                Some(s) if !s.is_expired() => Identity::delegated(s.clone()),
                _ => Identity::anonymous(),
            }
        }

        async fn login(&self, _provider_url: &Url) -> Result<()> {
            let outcome = self
                .outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(Error::provider_rejected("no outcome scripted")));
            *self.session.lock().unwrap() = Some(outcome?);
            Ok(())
        }

        async fn logout(&self) -> Result<()> {
            self.session.lock().unwrap().take();
            Ok(())
        }
    }

    struct FakeFactory {
        creations: AtomicUsize,
        persisted: Option<DelegatedSession>,
        outcome: Mutex<Option<Result<DelegatedSession>>>,
    }

    #[async_trait]
    impl AuthClientFactory for FakeFactory {
        async fn create(&self) -> Result<Arc<dyn AuthClient>> {
            self.creations.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Arc::new(FakeClient {
                session: Mutex::new(self.persisted.clone()),
                outcome: Mutex::new(self.outcome.lock().unwrap().take()),
            }))
        }
    }

    /// Factory whose client can never be created, e.g. an unreadable store.
    #[derive(Default)]
    struct BrokenFactory {
        discards: AtomicUsize,
    }

    #[async_trait]
    impl AuthClientFactory for BrokenFactory {
        async fn create(&self) -> Result<Arc<dyn AuthClient>> {
            Err(Error::storage(std::io::Error::other("permission denied")))
        }

        async fn discard(&self) -> Result<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn session(principal: &str) -> DelegatedSession {
        DelegatedSession {
            principal: Principal::from_text(principal).unwrap(),
            delegation: Secret::new("chain".into()),
            expires_at_ns: u64::MAX,
        }
    }

    fn manager(
        persisted: Option<DelegatedSession>,
        outcome: Option<Result<DelegatedSession>>,
    ) -> (Arc<SessionManager>, Arc<FakeFactory>) {
        let factory = Arc::new(FakeFactory {
            creations: AtomicUsize::new(0),
            persisted,
            outcome: Mutex::new(outcome),
        });
        let url = Url::parse("https://identity.ic0.app").unwrap();
        (Arc::new(SessionManager::new(url, factory.clone())), factory)
    }

    fn record(mgr: &SessionManager, name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
        let log = Arc::clone(log);
        mgr.subscribe(move |s| {
            log.lock()
                .unwrap()
                .push(format!("{name}:{}", s.is_authenticated()))
        })
    }

    fn invariant(state: &AuthState) -> bool {
        state.is_authenticated()
            == state.principal().is_some_and(|p| !p.is_anonymous())
    }

    #[tokio::test]
    async fn starts_anonymous() {
        let (mgr, factory) = manager(None, None);
        let state = mgr.state();
        assert!(!state.is_authenticated());
        assert!(invariant(&state));
        assert_eq!(factory.creations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_init_creates_client_once() {
        let (mgr, factory) = manager(None, None);
        let (a, b, c) = tokio::join!(mgr.init(), mgr.init(), mgr.init());
        a.unwrap();
        b.unwrap();
        c.unwrap();
        mgr.init().await.unwrap();
        assert_eq!(factory.creations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_surfaces_persisted_session_once() {
        let (mgr, _) = manager(Some(session("aaaaa-aa")), None);
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = record(&mgr, "a", &log);

        mgr.init().await.unwrap();
        mgr.init().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:true"]);
        assert_eq!(mgr.state().principal().unwrap().as_str(), "aaaaa-aa");
    }

    #[tokio::test]
    async fn init_without_session_is_silent() {
        let (mgr, _) = manager(None, None);
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = record(&mgr, "a", &log);
        mgr.init().await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_notifies_each_listener_once_in_order() {
        let (mgr, _) = manager(None, Some(Ok(session("aaaaa-aa"))));
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = record(&mgr, "a", &log);
        let _b = record(&mgr, "b", &log);
        let _c = record(&mgr, "c", &log);

        let state = mgr.login().await.unwrap();

        assert!(state.is_authenticated());
        assert!(invariant(&state));
        assert_eq!(*log.lock().unwrap(), vec!["a:true", "b:true", "c:true"]);
    }

    #[tokio::test]
    async fn failed_login_leaves_state_and_listeners_untouched() {
        let (mgr, _) = manager(None, Some(Err(Error::provider_rejected("UserInterrupt"))));
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = record(&mgr, "a", &log);

        let err = mgr.login().await.unwrap_err();

        assert!(matches!(err, Error::ProviderRejected { .. }));
        assert!(!mgr.state().is_authenticated());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_unavailable_is_surfaced() {
        let err = Error::provider_unavailable(std::io::Error::other("offline"));
        let (mgr, _) = manager(None, Some(Err(err)));
        assert!(matches!(
            mgr.login().await,
            Err(Error::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn logout_always_notifies() {
        let (mgr, _) = manager(None, Some(Ok(session("aaaaa-aa"))));
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = record(&mgr, "a", &log);

        mgr.logout().await.unwrap();
        mgr.login().await.unwrap();
        mgr.logout().await.unwrap();
        mgr.logout().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![
            "a:false", "a:true", "a:false", "a:false"
        ]);
        let state = mgr.state();
        assert!(!state.is_authenticated());
        assert!(state.identity().is_none());
        assert!(invariant(&state));
    }

    #[tokio::test]
    async fn logout_discards_storage_when_client_cannot_be_created() {
        let factory = Arc::new(BrokenFactory::default());
        let url = Url::parse("https://identity.ic0.app").unwrap();
        let mgr = SessionManager::new(url, factory.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = record(&mgr, "a", &log);

        assert!(matches!(mgr.init().await, Err(Error::Storage { .. })));
        mgr.logout().await.unwrap();

        assert_eq!(factory.discards.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a:false"]);
        assert!(!mgr.state().is_authenticated());
    }

    #[tokio::test]
    async fn corrupt_session_file_still_allows_login_and_logout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        std::fs::write(store.path(), "{ truncated").unwrap();

        let provider = Arc::new(FixedProvider(session("aaaaa-aa")));
        let factory = Arc::new(DelegationClientFactory::new(store.clone(), provider));
        let url = Url::parse("https://identity.ic0.app").unwrap();
        let mgr = SessionManager::new(url, factory);

        mgr.init().await.unwrap();
        assert!(!mgr.state().is_authenticated());

        std::fs::write(store.path(), "{ truncated").unwrap();
        mgr.logout().await.unwrap();
        assert!(!store.path().exists());

        assert!(mgr.login().await.unwrap().is_authenticated());
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn listener_unsubscribing_during_login_gets_nothing_further() {
        let (mgr, _) = manager(None, Some(Ok(session("aaaaa-aa"))));
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = record(&mgr, "a", &log);

        let slot: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let slot2 = Arc::clone(&slot);
        let log_b = Arc::clone(&log);
        slot.set(mgr.subscribe(move |s| {
            log_b.lock().unwrap().push(format!("b:{}", s.is_authenticated()));
            if let Some(me) = slot2.get() {
                me.unsubscribe();
            }
        }))
        .unwrap();
        let _c = record(&mgr, "c", &log);

        mgr.login().await.unwrap();
        mgr.logout().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![
            "a:true", "b:true", "c:true", "a:false", "c:false"
        ]);
    }

    #[tokio::test]
    async fn state_recomputes_after_expiry() {
        let mut expired = session("aaaaa-aa");
        expired.expires_at_ns = 1;
        let (mgr, _) = manager(Some(expired), None);
        mgr.init().await.unwrap();
        let state = mgr.state();
        assert!(!state.is_authenticated());
        assert!(invariant(&state));
    }
}
