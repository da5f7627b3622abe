use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    canispect_common::Result,
    rand::RngCore,
    tracing::{info, warn},
    url::Url,
};

use crate::{callback_server::CallbackServer, types::DelegatedSession};

/// The remote party issuing delegations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run one negotiation against `provider_url`. Resolves when the
    /// provider reports success (a delegation) or failure.
    async fn authorize(&self, provider_url: &Url) -> Result<DelegatedSession>;
}

/// Generate a random state parameter.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Opens the provider in the system browser and waits for its redirect on a
/// loopback callback listener.
pub struct BrowserIdentityProvider {
    callback_port: u16,
}

impl BrowserIdentityProvider {
    pub fn new(callback_port: u16) -> Self {
        Self { callback_port }
    }
}

/// Append the redirect target and state to the provider URL, keeping any
/// query it already carries (e.g. `canisterId`).
pub fn authorize_url(provider_url: &Url, redirect_uri: &str, state: &str) -> Url {
    let mut url = provider_url.clone();
    url.query_pairs_mut()
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("state", state);
    url
}

#[async_trait]
impl IdentityProvider for BrowserIdentityProvider {
    async fn authorize(&self, provider_url: &Url) -> Result<DelegatedSession> {
        let server = CallbackServer::bind(self.callback_port).await?;
        let state = generate_state();
        let url = authorize_url(provider_url, &server.redirect_uri(), &state);

        info!(provider = %provider_url, "opening identity provider");
        if let Err(e) = open::that(url.as_str()) {
            warn!(error = %e, "could not open browser");
            println!("Open this URL to log in:\n{url}");
        }

        server.wait_for_delegation(&state).await
    }
}
