use std::time::{SystemTime, UNIX_EPOCH};

use {
    canispect_common::Principal,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

/// Serialize a secret string as its plain value (for the on-disk store only).
pub fn serialize_secret<S: Serializer>(secret: &Secret<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// A credential obtained from the identity provider, used to sign calls on
/// the user's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedSession {
    pub principal: Principal,
    /// Opaque delegation chain as issued by the provider.
    #[serde(serialize_with = "serialize_secret")]
    pub delegation: Secret<String>,
    /// Expiry in nanoseconds since the Unix epoch.
    pub expires_at_ns: u64,
}

impl DelegatedSession {
    pub fn is_expired_at(&self, now_ns: u64) -> bool {
        self.expires_at_ns <= now_ns
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ns())
    }
}

/// The caller identity bound into remote clients.
#[derive(Debug, Clone)]
pub struct Identity {
    principal: Principal,
    session: Option<DelegatedSession>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            principal: Principal::anonymous(),
            session: None,
        }
    }

    pub fn delegated(session: DelegatedSession) -> Self {
        Self {
            principal: session.principal.clone(),
            session: Some(session),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The delegation chain, if this identity carries one.
    pub fn delegation(&self) -> Option<&Secret<String>> {
        self.session.as_ref().map(|s| &s.delegation)
    }

    pub fn expires_at_ns(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.expires_at_ns)
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_anonymous()
    }
}

/// Immutable snapshot of the session.
///
/// `is_authenticated` holds exactly when an identity and a non-anonymous
/// principal are present.
#[derive(Debug, Clone)]
pub struct AuthState {
    is_authenticated: bool,
    identity: Option<Identity>,
    principal: Option<Principal>,
}

impl AuthState {
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            identity: None,
            principal: None,
        }
    }

    pub fn from_identity(identity: Identity) -> Self {
        if identity.is_anonymous() {
            return Self::anonymous();
        }
        Self {
            is_authenticated: true,
            principal: Some(identity.principal().clone()),
            identity: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(principal: &str, expires_at_ns: u64) -> DelegatedSession {
        DelegatedSession {
            principal: Principal::from_text(principal).unwrap(),
            delegation: Secret::new("chain".into()),
            expires_at_ns,
        }
    }

    fn holds_invariant(state: &AuthState) -> bool {
        let principal_ok = state
            .principal()
            .is_some_and(|p| !p.is_anonymous());
        state.is_authenticated() == principal_ok
            && state.is_authenticated() == state.identity().is_some()
    }

    #[test]
    fn anonymous_identity_yields_anonymous_state() {
        let state = AuthState::from_identity(Identity::anonymous());
        assert!(!state.is_authenticated());
        assert!(state.identity().is_none());
        assert!(state.principal().is_none());
        assert!(holds_invariant(&state));
    }

    #[test]
    fn delegated_identity_yields_authenticated_state() {
        let state =
            AuthState::from_identity(Identity::delegated(session("aaaaa-aa", u64::MAX)));
        assert!(state.is_authenticated());
        assert_eq!(state.principal().unwrap().as_str(), "aaaaa-aa");
        assert!(state.identity().unwrap().delegation().is_some());
        assert!(holds_invariant(&state));
    }

    #[test]
    fn delegation_to_anonymous_principal_is_not_authenticated() {
        let state =
            AuthState::from_identity(Identity::delegated(session("2vxsx-fae", u64::MAX)));
        assert!(!state.is_authenticated());
        assert!(holds_invariant(&state));
    }

    #[test]
    fn expiry() {
        let s = session("aaaaa-aa", 100);
        assert!(s.is_expired_at(100));
        assert!(!s.is_expired_at(99));
        assert!(s.is_expired());
    }

    #[test]
    fn debug_does_not_leak_delegation() {
        let s = session("aaaaa-aa", 1);
        assert!(!format!("{s:?}").contains("chain"));
    }
}
