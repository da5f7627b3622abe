//! Configuration loading: `canispect.{toml,yaml,yml,json}` with `${ENV}`
//! substitution and `CANISPECT_*` / `CANISTER_ID_*` overrides.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, discover_and_load, load_config,
        set_config_dir,
    },
    schema::{
        CanispectConfig, CanistersConfig, IdentityConfig, LOCAL_REPLICA_PORT, Mode, NetworkConfig,
    },
};
