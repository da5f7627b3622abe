/// Config schema: runtime mode, network hosts, service ids, identity provider.
use {
    canispect_common::Principal,
    serde::{Deserialize, Serialize},
};

/// Port the local development replica listens on.
pub const LOCAL_REPLICA_PORT: u16 = 4943;

/// Identity provider canister id deployed by default on a fresh local replica.
pub const DEFAULT_LOCAL_IDENTITY_CANISTER: &str = "rdmx6-jaaaa-aaaaa-aaadq-cai";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanispectConfig {
    pub mode: Mode,
    pub network: NetworkConfig,
    pub canisters: CanistersConfig,
    pub identity: IdentityConfig,
}

/// Development talks to a local replica, production to the public network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

impl Mode {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the local development replica.
    pub local_host: String,

    /// Base URL of the public network boundary.
    pub public_host: String,

    /// Where the client considers itself to be running. Its hostname and
    /// port feed endpoint resolution; when unset only `mode` decides.
    pub origin: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_host: format!("http://localhost:{LOCAL_REPLICA_PORT}"),
            public_host: "https://ic0.app".into(),
            origin: None,
        }
    }
}

/// Ids of the two remote services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanistersConfig {
    /// The analysis service.
    pub backend: Option<Principal>,

    pub audit_registry: Option<Principal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identity provider canister on the local replica.
    pub local_canister_id: Principal,

    /// Public identity provider URL.
    pub public_url: String,

    /// Loopback port the login callback listener binds to.
    pub callback_port: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            local_canister_id: Principal::from_text(DEFAULT_LOCAL_IDENTITY_CANISTER)
                .unwrap_or_else(|_| Principal::anonymous()),
            public_url: "https://identity.ic0.app".into(),
            callback_port: 4944,
        }
    }
}
