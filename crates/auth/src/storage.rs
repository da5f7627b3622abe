use std::path::PathBuf;

use {
    canispect_common::{Error, Result},
    tracing::warn,
};

use crate::types::DelegatedSession;

/// File-based session storage at `~/.config/canispect/session.json`.
#[derive(Debug, Clone)]
pub struct DelegationStore {
    path: PathBuf,
}

impl DelegationStore {
    pub fn new() -> Self {
        let path = canispect_config::config_dir()
            .unwrap_or_else(|| PathBuf::from(".canispect"))
            .join("session.json");
        Self { path }
    }

    /// Create a store at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the persisted session. A missing or unparseable file loads as
    /// no session; the next `save` or `delete` replaces it.
    pub fn load(&self) -> Result<Option<DelegatedSession>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(e)),
        };
        match serde_json::from_str(&data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                Ok(None)
            },
        }
    }

    pub fn save(&self, session: &DelegatedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::storage)?;
        }

        let data = serde_json::to_string_pretty(session).map_err(Error::storage)?;
        std::fs::write(&self.path, &data).map_err(Error::storage)?;

        // Set file permissions to 0600 on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(Error::storage)?;
        }

        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(e)),
        }
    }
}

impl Default for DelegationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use {canispect_common::Principal, secrecy::{ExposeSecret, Secret}};

    use super::*;

    fn sample() -> DelegatedSession {
        DelegatedSession {
            principal: Principal::from_text("aaaaa-aa").unwrap(),
            delegation: Secret::new("d3l3gation".into()),
            expires_at_ns: 1_700_000_000_000_000_000,
        }
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        assert!(store.load().unwrap().is_none());
        store.delete().unwrap();
    }

    #[test]
    fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("nested").join("session.json"));

        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.principal.as_str(), "aaaaa-aa");
        assert_eq!(loaded.delegation.expose_secret(), "d3l3gation");
        assert_eq!(loaded.expires_at_ns, 1_700_000_000_000_000_000);

        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        store.save(&sample()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_loads_none_and_can_be_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = DelegationStore::with_path(dir.path().join("session.json"));
        std::fs::write(store.path(), "{ truncated").unwrap();
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        assert!(store.load().unwrap().is_some());

        std::fs::write(store.path(), "{ truncated").unwrap();
        store.delete().unwrap();
        assert!(!store.path().exists());
    }
}
