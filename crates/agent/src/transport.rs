//! HTTP transport: JSON envelopes posted to the replica's canister endpoints.

use std::sync::Arc;

use {
    async_trait::async_trait,
    canispect_auth::Identity,
    canispect_common::{Error, Principal, Result},
    secrecy::ExposeSecret,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::trace,
    url::Url,
};

use crate::endpoint::EndpointConfig;

/// Query calls are read-only; update calls may change remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Update,
}

impl CallKind {
    fn path_segment(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Update => "call",
        }
    }
}

/// Carries calls to one host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `method` on `canister` as `sender` (anonymous when `None`).
    async fn call(
        &self,
        kind: CallKind,
        canister: &Principal,
        method: &str,
        sender: Option<&Identity>,
        arg: Value,
    ) -> Result<Value>;

    /// Fetch the host's root verification key.
    async fn fetch_root_key(&self) -> Result<Vec<u8>>;
}

/// Builds a transport for a resolved endpoint.
pub trait TransportBuilder: Send + Sync {
    fn build(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn Transport>>;
}

#[derive(Serialize)]
struct CallEnvelope<'a> {
    method_name: &'a str,
    arg: Value,
    sender: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    delegation: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CallReply {
    Replied {
        reply: Value,
    },
    Rejected {
        reject_code: u64,
        reject_message: String,
    },
}

#[derive(Deserialize)]
struct StatusReply {
    root_key: Vec<u8>,
}

/// [`Transport`] over HTTP using a shared `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
    host: Url,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, host: Url) -> Self {
        Self { client, host }
    }

    pub fn host(&self) -> &Url {
        &self.host
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.host
            .join(path)
            .map_err(|e| Error::transport(format!("invalid path {path} on {}", self.host), e))
    }

    /// Send and return the raw body; callers parse it so decode failures stay
    /// distinct from transport failures.
    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<Vec<u8>> {
        let resp = request
            .send()
            .await
            .map_err(|e| Error::transport(format!("request to {url} failed"), e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| Error::transport(format!("{url} returned an error status"), e))?;
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::transport(format!("reading response from {url} failed"), e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        kind: CallKind,
        canister: &Principal,
        method: &str,
        sender: Option<&Identity>,
        arg: Value,
    ) -> Result<Value> {
        let url = self.url(&format!("api/v2/canister/{canister}/{}", kind.path_segment()))?;
        let anonymous = Principal::anonymous();
        let envelope = CallEnvelope {
            method_name: method,
            arg,
            sender: sender.map_or(anonymous.as_str(), |i| i.principal().as_str()),
            delegation: sender
                .and_then(Identity::delegation)
                .map(|d| d.expose_secret().as_str()),
        };

        trace!(%url, method, "client -> replica");
        let body = self.send(self.client.post(url.clone()).json(&envelope), &url).await?;

        match serde_json::from_slice::<CallReply>(&body).map_err(|e| Error::malformed(method, e))? {
            CallReply::Replied { reply } => Ok(reply),
            CallReply::Rejected {
                reject_code,
                reject_message,
            } => Err(Error::Rejected {
                method: method.to_string(),
                code: reject_code,
                message: reject_message,
            }),
        }
    }

    async fn fetch_root_key(&self) -> Result<Vec<u8>> {
        let url = self.url("api/v2/status")?;
        let body = self.send(self.client.get(url.clone()), &url).await?;
        let status: StatusReply =
            serde_json::from_slice(&body).map_err(|e| Error::malformed("status", e))?;
        Ok(status.root_key)
    }
}

/// Builds [`HttpTransport`]s sharing one connection pool.
pub struct HttpTransportBuilder {
    client: reqwest::Client,
}

impl HttpTransportBuilder {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("canispect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transport("building HTTP client", e))?;
        Ok(Self { client })
    }
}

impl TransportBuilder for HttpTransportBuilder {
    fn build(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn Transport>> {
        let host = Url::parse(&endpoint.host)
            .map_err(|e| Error::transport(format!("invalid host {}", endpoint.host), e))?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(Error::transport(
                format!("invalid host {}", endpoint.host),
                format!("unsupported scheme {}", host.scheme()),
            ));
        }
        Ok(Arc::new(HttpTransport::new(self.client.clone(), host)))
    }
}
