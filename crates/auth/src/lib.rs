//! Session layer: delegated-identity login/logout, credential persistence,
//! and ordered propagation of [`AuthState`] snapshots to subscribers.

pub mod callback_server;
pub mod client;
pub mod defaults;
pub mod listeners;
pub mod provider;
pub mod session;
pub mod storage;
pub mod types;

pub use {
    callback_server::CallbackServer,
    client::{AuthClient, AuthClientFactory, DelegationAuthClient, DelegationClientFactory},
    defaults::provider_url,
    listeners::{ListenerSet, Subscription},
    provider::{BrowserIdentityProvider, IdentityProvider},
    session::SessionManager,
    storage::DelegationStore,
    types::{AuthState, DelegatedSession, Identity, serialize_secret},
};
