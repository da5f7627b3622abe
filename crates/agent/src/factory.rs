//! Transport factory: builds service clients bound to the current session.

use std::sync::Arc;

use {
    canispect_auth::{AuthState, SessionManager},
    canispect_common::{Error, Principal, Result},
    canispect_config::{CanispectConfig, CanistersConfig},
    tokio::sync::OnceCell,
    tracing::{debug, info, warn},
};

use crate::{
    client::{RemoteClient, ServiceId},
    endpoint::{EndpointConfig, RuntimeContext, resolve_endpoint},
    transport::{HttpTransportBuilder, Transport, TransportBuilder},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Fail with [`Error::AuthRequired`] unless the session is authenticated.
    pub require_auth: bool,
}

impl ClientOptions {
    pub fn anonymous() -> Self {
        Self {
            require_auth: false,
        }
    }

    pub fn authenticated() -> Self {
        Self { require_auth: true }
    }
}

pub struct TransportFactory {
    session: Arc<SessionManager>,
    endpoint: EndpointConfig,
    canisters: CanistersConfig,
    builder: Arc<dyn TransportBuilder>,
    root_key: OnceCell<Arc<Vec<u8>>>,
}

impl TransportFactory {
    pub fn new(
        session: Arc<SessionManager>,
        endpoint: EndpointConfig,
        canisters: CanistersConfig,
        builder: Arc<dyn TransportBuilder>,
    ) -> Self {
        Self {
            session,
            endpoint,
            canisters,
            builder,
            root_key: OnceCell::new(),
        }
    }

    /// Resolve the endpoint from config and use the HTTP transport.
    pub fn from_config(session: Arc<SessionManager>, config: &CanispectConfig) -> Result<Self> {
        let endpoint = resolve_endpoint(&RuntimeContext::from_config(config), &config.network);
        info!(kind = ?endpoint.kind, host = %endpoint.host, "resolved endpoint");
        Ok(Self::new(
            session,
            endpoint,
            config.canisters.clone(),
            Arc::new(HttpTransportBuilder::new()?),
        ))
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn canister_id(&self, service: ServiceId) -> Result<Principal> {
        let id = match service {
            ServiceId::Analysis => self.canisters.backend.as_ref(),
            ServiceId::AuditRegistry => self.canisters.audit_registry.as_ref(),
        };
        id.cloned().ok_or_else(|| {
            Error::transport(
                format!("no canister id configured for {service}"),
                "missing configuration",
            )
        })
    }

    /// Build a client for `service` bound to the identity current right now.
    pub async fn get_client(&self, service: ServiceId, opts: ClientOptions) -> Result<RemoteClient> {
        self.get_client_for(&self.session.state(), service, opts)
            .await
    }

    /// Build a client bound to a session snapshot the caller already holds.
    pub async fn get_client_for(
        &self,
        state: &AuthState,
        service: ServiceId,
        opts: ClientOptions,
    ) -> Result<RemoteClient> {
        if opts.require_auth && !state.is_authenticated() {
            debug!(%service, "refusing unauthenticated client");
            return Err(Error::AuthRequired);
        }

        let canister_id = self.canister_id(service)?;
        let transport = self.builder.build(&self.endpoint)?;
        let root_key = if self.endpoint.is_local() {
            self.bootstrap_root_key(transport.as_ref()).await
        } else {
            None
        };

        Ok(RemoteClient::new(
            service,
            canister_id,
            self.endpoint.clone(),
            state.identity().cloned(),
            root_key,
            transport,
        ))
    }

    /// Fetch the local replica's root key once. A failure is logged and
    /// retried on the next call.
    async fn bootstrap_root_key(&self, transport: &dyn Transport) -> Option<Arc<Vec<u8>>> {
        match self
            .root_key
            .get_or_try_init(|| async {
                debug!(host = %self.endpoint.host, "fetching root key");
                transport.fetch_root_key().await.map(Arc::new)
            })
            .await
        {
            Ok(key) => Some(Arc::clone(key)),
            Err(e) => {
                warn!(host = %self.endpoint.host, error = %e, "root key fetch failed; continuing without it");
                None
            },
        }
    }
}
