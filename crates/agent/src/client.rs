use std::{fmt, sync::Arc};

use {
    canispect_auth::Identity,
    canispect_common::{Error, Principal, Result},
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::debug,
};

use crate::{
    endpoint::EndpointConfig,
    transport::{CallKind, Transport},
};

/// Remote services the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    /// Wasm analysis and recommendations (the backend canister).
    Analysis,
    /// Audit record storage and statistics.
    AuditRegistry,
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Analysis => "analysis",
            Self::AuditRegistry => "audit_registry",
        })
    }
}

/// A client bound to one service, one endpoint, and the identity captured
/// when it was built. Cheap to clone.
#[derive(Clone)]
pub struct RemoteClient {
    service: ServiceId,
    canister_id: Principal,
    endpoint: EndpointConfig,
    identity: Option<Identity>,
    root_key: Option<Arc<Vec<u8>>>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("service", &self.service)
            .field("canister_id", &self.canister_id)
            .field("endpoint", &self.endpoint)
            .field("principal", &self.identity.as_ref().map(Identity::principal))
            .field("root_key", &self.root_key.is_some())
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    pub fn new(
        service: ServiceId,
        canister_id: Principal,
        endpoint: EndpointConfig,
        identity: Option<Identity>,
        root_key: Option<Arc<Vec<u8>>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            service,
            canister_id,
            endpoint,
            identity,
            root_key,
            transport,
        }
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub fn canister_id(&self) -> &Principal {
        &self.canister_id
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// The caller identity, `None` for anonymous clients.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Root key fetched from a local replica, if bootstrap succeeded.
    pub fn root_key(&self) -> Option<&[u8]> {
        self.root_key.as_deref().map(Vec::as_slice)
    }

    pub async fn query<A, R>(&self, method: &str, arg: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke(CallKind::Query, method, arg).await
    }

    pub async fn update<A, R>(&self, method: &str, arg: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke(CallKind::Update, method, arg).await
    }

    async fn invoke<A, R>(&self, kind: CallKind, method: &str, arg: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let arg: Value = serde_json::to_value(arg).map_err(|e| Error::malformed(method, e))?;
        debug!(service = %self.service, canister = %self.canister_id, method, ?kind, "calling");
        let reply = self
            .transport
            .call(kind, &self.canister_id, method, self.identity.as_ref(), arg)
            .await?;
        serde_json::from_value(reply).map_err(|e| Error::malformed(method, e))
    }
}
