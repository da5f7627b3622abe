//! Credential client: holds the delegated session and drives the provider.

use std::sync::{Arc, PoisonError, RwLock};

use {
    async_trait::async_trait,
    canispect_common::Result,
    tracing::{debug, info},
    url::Url,
};

use crate::{
    provider::IdentityProvider,
    storage::DelegationStore,
    types::{DelegatedSession, Identity},
};

/// Owns the credential behind a session.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// The current identity. Anonymous when no unexpired delegation is held.
    fn identity(&self) -> Identity;

    fn is_authenticated(&self) -> bool {
        !self.identity().is_anonymous()
    }

    /// Negotiate a delegation with the provider at `provider_url` and keep
    /// it. Suspends until the provider reports success or failure.
    async fn login(&self, provider_url: &Url) -> Result<()>;

    /// Drop the credential, including any persisted copy.
    async fn logout(&self) -> Result<()>;
}

/// Creates the credential client. Called at most once per session manager.
#[async_trait]
pub trait AuthClientFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn AuthClient>>;

    /// Remove any persisted credential without creating a client. Used by
    /// logout when creation fails.
    async fn discard(&self) -> Result<()> {
        Ok(())
    }
}

/// [`AuthClient`] backed by a [`DelegationStore`] and an [`IdentityProvider`].
pub struct DelegationAuthClient {
    store: DelegationStore,
    provider: Arc<dyn IdentityProvider>,
    session: RwLock<Option<DelegatedSession>>,
}

impl DelegationAuthClient {
    /// Build the client, restoring a persisted session if there is one.
    pub fn restore(store: DelegationStore, provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        let session = store.load()?;
        if let Some(ref s) = session {
            debug!(principal = %s.principal, expired = s.is_expired(), "restored persisted session");
        }
        Ok(Self {
            store,
            provider,
            session: RwLock::new(session),
        })
    }
}

#[async_trait]
impl AuthClient for DelegationAuthClient {
    fn identity(&self) -> Identity {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(session) if !session.is_expired() => Identity::delegated(session.clone()),
            _ => Identity::anonymous(),
        }
    }

    async fn login(&self, provider_url: &Url) -> Result<()> {
        let session = self.provider.authorize(provider_url).await?;
        self.store.save(&session)?;
        info!(principal = %session.principal, "delegation obtained");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.store.delete()
    }
}

/// Factory producing a [`DelegationAuthClient`].
pub struct DelegationClientFactory {
    store: DelegationStore,
    provider: Arc<dyn IdentityProvider>,
}

impl DelegationClientFactory {
    pub fn new(store: DelegationStore, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }
}

#[async_trait]
impl AuthClientFactory for DelegationClientFactory {
    async fn create(&self) -> Result<Arc<dyn AuthClient>> {
        let client = DelegationAuthClient::restore(self.store.clone(), Arc::clone(&self.provider))?;
        Ok(Arc::new(client))
    }

    async fn discard(&self) -> Result<()> {
        self.store.delete()
    }
}

#[cfg(test)]
mod tests {
    use {
        canispect_common::{Error, Principal},
        secrecy::Secret,
    };

    use {super::*, crate::types::now_ns};

    struct FixedProvider(Option<DelegatedSession>);

    #[async_trait]
    impl IdentityProvider for FixedProvider {
        async fn authorize(&self, _provider_url: &Url) -> Result<DelegatedSession> {
            self.0
                .clone()
                .ok_or_else(|| Error::provider_rejected("UserInterrupt"))
        }
    }

    fn session(expires_at_ns: u64) -> DelegatedSession {
        DelegatedSession {
            principal: Principal::from_text("aaaaa-aa").unwrap(),
            delegation: Secret::new("chain".into()),
            expires_at_ns,
        }
    }

    fn url() -> Url {
        Url::parse("https://identity.ic0.app").unwrap()
    }

    #[tokio::test]
    async fn login_persists_and_logout_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        let provider = Arc::new(FixedProvider(Some(session(u64::MAX))));
        let client = DelegationAuthClient::restore(store.clone(), provider).unwrap();

        assert!(!client.is_authenticated());
        client.login(&url()).await.unwrap();
        assert!(client.is_authenticated());
        assert!(store.load().unwrap().is_some());

        client.logout().await.unwrap();
        assert!(!client.is_authenticated());
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        let client =
            DelegationAuthClient::restore(store.clone(), Arc::new(FixedProvider(None))).unwrap();

        let err = client.login(&url()).await.unwrap_err();
        assert!(matches!(err, Error::ProviderRejected { .. }));
        assert!(!client.is_authenticated());
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn restores_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        store.save(&session(u64::MAX)).unwrap();

        let factory = DelegationClientFactory::new(store, Arc::new(FixedProvider(None)));
        let client = factory.create().await.unwrap();
        assert_eq!(client.identity().principal().as_str(), "aaaaa-aa");
    }

    #[tokio::test]
    async fn corrupt_store_does_not_block_login_or_logout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        std::fs::write(store.path(), "{ truncated").unwrap();

        let factory = DelegationClientFactory::new(
            store.clone(),
            Arc::new(FixedProvider(Some(session(u64::MAX)))),
        );
        let client = factory.create().await.unwrap();
        assert!(!client.is_authenticated());

        client.login(&url()).await.unwrap();
        assert_eq!(store.load().unwrap().unwrap().principal.as_str(), "aaaaa-aa");

        std::fs::write(store.path(), "{ truncated").unwrap();
        client.logout().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn discard_removes_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        store.save(&session(u64::MAX)).unwrap();

        let factory = DelegationClientFactory::new(store.clone(), Arc::new(FixedProvider(None)));
        factory.discard().await.unwrap();
        assert!(!store.path().exists());
        factory.discard().await.unwrap();
    }

    #[tokio::test]
    async fn expired_session_resolves_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        store.save(&session(now_ns().saturating_sub(1))).unwrap();

        let client = DelegationAuthClient::restore(store, Arc::new(FixedProvider(None))).unwrap();
        assert!(client.identity().is_anonymous());
        assert!(!client.is_authenticated());
    }
}
