/// Boxed source error carried by transport and provider failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the session, transport, and gateway layers.
///
/// Every variant that wraps a lower-level failure keeps it as `source`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation needs an authenticated session and none is present.
    /// Raised before any network activity.
    #[error("operation requires an authenticated session")]
    AuthRequired,

    /// The identity provider reported an error or the callback was invalid.
    #[error("identity provider rejected login: {reason}")]
    ProviderRejected { reason: String },

    /// The identity provider could not be reached.
    #[error("identity provider unavailable")]
    ProviderUnavailable {
        #[source]
        source: BoxError,
    },

    /// The reply did not match the expected wire shape.
    #[error("malformed response from {method}")]
    MalformedResponse {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The endpoint could not be reached or the client could not be built.
    #[error("transport unavailable: {context}")]
    TransportUnavailable {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The remote service rejected the call.
    #[error("{method} rejected (code {code}): {message}")]
    Rejected {
        method: String,
        code: u64,
        message: String,
    },

    /// Reading or writing the persisted session failed.
    #[error("session storage failed")]
    Storage {
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub fn provider_rejected(reason: impl Into<String>) -> Self {
        Self::ProviderRejected {
            reason: reason.into(),
        }
    }

    pub fn provider_unavailable(source: impl Into<BoxError>) -> Self {
        Self::ProviderUnavailable {
            source: source.into(),
        }
    }

    pub fn malformed(method: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedResponse {
            method: method.into(),
            source,
        }
    }

    pub fn transport(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::TransportUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn storage(source: impl Into<BoxError>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }
}
