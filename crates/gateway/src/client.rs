//! Typed operations over the analysis and audit registry services.

use std::sync::Arc;

use {
    canispect_agent::{CallKind, ClientOptions, ServiceId, TransportFactory},
    canispect_auth::{AuthState, SessionManager},
    canispect_common::{Error, Principal, Result},
    canispect_config::CanispectConfig,
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    types::{
        AuditRecord, AuditRequest, AuditStatistics, AuditSummary, SecurityAnalysisResult,
        WasmAnalysisRequest,
    },
    wire,
};

/// Every call builds a fresh client, so each one sees the session as it is
/// when the call starts.
pub struct GatewayClient {
    factory: Arc<TransportFactory>,
}

impl GatewayClient {
    pub fn new(factory: Arc<TransportFactory>) -> Self {
        Self { factory }
    }

    pub fn from_config(session: Arc<SessionManager>, config: &CanispectConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(TransportFactory::from_config(
            session, config,
        )?)))
    }

    pub fn factory(&self) -> &Arc<TransportFactory> {
        &self.factory
    }

    /// Build a client from the current session, invoke `method`, and log
    /// any failure.
    async fn call<A, R>(
        &self,
        kind: CallKind,
        service: ServiceId,
        opts: ClientOptions,
        method: &str,
        arg: &A,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let state = self.factory.session().state();
        self.call_as(&state, kind, service, opts, method, arg)
            .await
    }

    async fn call_as<A, R>(
        &self,
        state: &AuthState,
        kind: CallKind,
        service: ServiceId,
        opts: ClientOptions,
        method: &str,
        arg: &A,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let result = match self.factory.get_client_for(state, service, opts).await {
            Ok(client) => match kind {
                CallKind::Query => client.query(method, arg).await,
                CallKind::Update => client.update(method, arg).await,
            },
            Err(e) => Err(e),
        };
        result.inspect_err(|e| log_failure(method, e))
    }

    pub async fn analyze_wasm(&self, request: &WasmAnalysisRequest) -> Result<SecurityAnalysisResult> {
        debug!(bytes = request.wasm_bytes.len(), "analyzing module");
        self.call(
            CallKind::Update,
            ServiceId::Analysis,
            ClientOptions::anonymous(),
            "analyze_wasm_security",
            request,
        )
        .await
    }

    /// Record an analysis in the audit registry. Returns the new audit id.
    pub async fn submit_audit_record(
        &self,
        result: &SecurityAnalysisResult,
        canister_id: Option<Principal>,
    ) -> Result<String> {
        let request = AuditRequest::from_analysis(result, canister_id);
        self.call(
            CallKind::Update,
            ServiceId::AuditRegistry,
            ClientOptions::authenticated(),
            "submit_audit_request",
            &request,
        )
        .await
    }

    /// Audits of one canister. Without a canister id this is always empty:
    /// the registry has no listing of recent audits.
    pub async fn get_audit_history(&self, canister_id: Option<&Principal>) -> Result<Vec<AuditSummary>> {
        let Some(canister_id) = canister_id else {
            return Ok(Vec::new());
        };
        self.call(
            CallKind::Query,
            ServiceId::AuditRegistry,
            ClientOptions::anonymous(),
            "list_audits_by_canister",
            canister_id,
        )
        .await
    }

    pub async fn get_audit_record(&self, audit_id: &str) -> Result<Option<AuditRecord>> {
        self.query_optional("get_audit_record", audit_id).await
    }

    pub async fn get_audit_summary(&self, audit_id: &str) -> Result<Option<AuditSummary>> {
        self.query_optional("get_audit_summary", audit_id).await
    }

    /// Audits submitted by the current principal; empty when logged out.
    pub async fn get_my_audits(&self) -> Result<Vec<AuditSummary>> {
        let state = self.factory.session().state();
        let Some(principal) = state.principal().filter(|_| state.is_authenticated()) else {
            return Ok(Vec::new());
        };
        self.call_as(
            &state,
            CallKind::Query,
            ServiceId::AuditRegistry,
            ClientOptions::authenticated(),
            "list_audits_by_auditor",
            principal,
        )
        .await
    }

    pub async fn get_audit_statistics(&self) -> Result<AuditStatistics> {
        self.call(
            CallKind::Query,
            ServiceId::AuditRegistry,
            ClientOptions::anonymous(),
            "get_audit_statistics",
            &(),
        )
        .await
    }

    /// Free-text recommendations for a described canister.
    pub async fn security_recommendations(&self, description: &str) -> Result<String> {
        self.call(
            CallKind::Update,
            ServiceId::Analysis,
            ClientOptions::anonymous(),
            "get_security_recommendations",
            description,
        )
        .await
    }

    async fn query_optional<T: DeserializeOwned>(&self, method: &str, audit_id: &str) -> Result<Option<T>> {
        let reply: Value = self
            .call(
                CallKind::Query,
                ServiceId::AuditRegistry,
                ClientOptions::anonymous(),
                method,
                audit_id,
            )
            .await?;
        wire::decode_optional(reply)
            .map_err(|e| Error::malformed(method, e))
            .inspect_err(|e| log_failure(method, e))
    }
}

fn log_failure(method: &str, error: &Error) {
    warn!(method, error = %error, "remote call failed");
}
