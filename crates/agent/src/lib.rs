//! Remote service access: endpoint resolution, the HTTP transport, and the
//! factory that binds service clients to the current session.

pub mod client;
pub mod endpoint;
pub mod factory;
pub mod transport;

pub use {
    client::{RemoteClient, ServiceId},
    endpoint::{EndpointConfig, EndpointKind, RuntimeContext, resolve_endpoint},
    factory::{ClientOptions, TransportFactory},
    transport::{CallKind, HttpTransport, HttpTransportBuilder, Transport, TransportBuilder},
};
