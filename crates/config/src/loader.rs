use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use {
    canispect_common::Principal,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    schema::{CanispectConfig, Mode},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "canispect.toml",
    "canispect.yaml",
    "canispect.yml",
    "canispect.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (project-local and user-global paths are skipped).
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Load config from the given path (any supported format).
///
/// `${VAR}` placeholders are substituted before parsing and the
/// `CANISPECT_*` / `CANISTER_ID_*` environment overrides are applied after.
pub fn load_config(path: &Path) -> anyhow::Result<CanispectConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./canispect.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/canispect/canispect.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to defaults (plus environment overrides) when no file is found
/// or the file fails to parse.
pub fn discover_and_load() -> CanispectConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    let mut config = CanispectConfig::default();
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return CONFIG_FILENAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists());
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = home_dir().map(|h| h.join(".config").join("canispect"))?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/canispect/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return Some(dir);
    }
    home_dir().map(|h| h.join(".config").join("canispect"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Apply environment overrides from the process environment.
pub fn apply_env_overrides(config: &mut CanispectConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply overrides using an explicit lookup. Invalid values are logged and
/// ignored.
pub fn apply_overrides_with(config: &mut CanispectConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CANISPECT_MODE") {
        match v.parse::<Mode>() {
            Ok(mode) => config.mode = mode,
            Err(e) => warn!(value = %v, error = %e, "ignoring CANISPECT_MODE"),
        }
    }
    if let Some(v) = lookup("CANISPECT_ORIGIN") {
        config.network.origin = Some(v);
    }
    if let Some(p) = principal_var(&lookup, "CANISTER_ID_BACKEND") {
        config.canisters.backend = Some(p);
    }
    if let Some(p) = principal_var(&lookup, "CANISTER_ID_AUDIT_REGISTRY") {
        config.canisters.audit_registry = Some(p);
    }
    if let Some(p) = principal_var(&lookup, "CANISTER_ID_INTERNET_IDENTITY") {
        config.identity.local_canister_id = p;
    }
}

fn principal_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Principal> {
    let raw = lookup(name)?;
    match Principal::from_text(raw.trim()) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, "ignoring invalid canister id");
            None
        },
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CanispectConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
