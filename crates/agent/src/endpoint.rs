//! Endpoint resolution: local development replica or public network.

use {
    canispect_config::{CanispectConfig, LOCAL_REPLICA_PORT, Mode, NetworkConfig},
    tracing::warn,
    url::Url,
};

/// Where the client considers itself to be running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub mode: Mode,
}

impl RuntimeContext {
    pub fn new(hostname: Option<String>, port: Option<u16>, mode: Mode) -> Self {
        Self {
            hostname,
            port,
            mode,
        }
    }

    /// Context from an origin URL such as `http://localhost:4943`.
    pub fn from_origin(origin: &str, mode: Mode) -> Result<Self, url::ParseError> {
        let url = Url::parse(origin)?;
        Ok(Self {
            hostname: url.host_str().map(|h| h.trim_matches(['[', ']']).to_string()),
            port: url.port_or_known_default(),
            mode,
        })
    }

    /// Context from `network.origin` and `mode`. An unparseable origin is
    /// logged and ignored.
    pub fn from_config(config: &CanispectConfig) -> Self {
        match config.network.origin.as_deref() {
            Some(origin) => Self::from_origin(origin, config.mode).unwrap_or_else(|e| {
                warn!(origin, error = %e, "ignoring invalid network origin");
                Self::new(None, None, config.mode)
            }),
            None => Self::new(None, None, config.mode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Local replica: root key fetched at runtime, lower trust bar.
    Local,
    /// Public network: root key embedded, failures surfaced.
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub kind: EndpointKind,
    pub host: String,
}

impl EndpointConfig {
    pub fn is_local(&self) -> bool {
        self.kind == EndpointKind::Local
    }
}

pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_matches(['[', ']']).to_ascii_lowercase();
    host == "localhost"
        || host.ends_with(".localhost")
        || host.starts_with("127.")
        || host == "::1"
        || host.starts_with("::ffff:127.")
}

/// Pick the endpoint for `ctx`. Pure: the same inputs always give the same
/// endpoint.
///
/// Local when the mode is development, the hostname is loopback, or the port
/// is the local replica port.
pub fn resolve_endpoint(ctx: &RuntimeContext, network: &NetworkConfig) -> EndpointConfig {
    let local = ctx.mode.is_development()
        || ctx.hostname.as_deref().is_some_and(is_loopback_host)
        || ctx.port == Some(LOCAL_REPLICA_PORT);

    if local {
        EndpointConfig {
            kind: EndpointKind::Local,
            host: network.local_host.clone(),
        }
    } else {
        EndpointConfig {
            kind: EndpointKind::Public,
            host: network.public_host.clone(),
        }
    }
}
