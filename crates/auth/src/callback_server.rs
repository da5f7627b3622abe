//! Loopback HTTP listener receiving the identity provider's redirect.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use {
    axum::{
        Router,
        extract::{Query, State},
        response::Html,
        routing::get,
    },
    canispect_common::{Error, Principal, Result},
    secrecy::Secret,
    serde::Deserialize,
    tokio::{net::TcpListener, sync::oneshot, task::JoinError},
    tracing::{debug, warn},
};

use crate::types::DelegatedSession;

pub const CALLBACK_PATH: &str = "/auth/callback";

/// Query parameters the provider appends to the redirect.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    state: Option<String>,
    principal: Option<String>,
    delegation: Option<String>,
    /// Delegation expiry, nanoseconds since the Unix epoch.
    expiration: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Bind the loopback listener. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(Error::provider_unavailable)?;
        let addr = listener.local_addr().map_err(Error::provider_unavailable)?;
        Ok(Self { listener, addr })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.addr)
    }

    /// Serve until the first callback arrives, then turn it into a session.
    ///
    /// An `error` parameter or a `state` that differs from `expected_state`
    /// is a rejection.
    pub async fn wait_for_delegation(self, expected_state: &str) -> Result<DelegatedSession> {
        let (tx, rx) = oneshot::channel();
        let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(sender);

        debug!(addr = %self.addr, "waiting for identity provider callback");
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let params = rx.await.map_err(Error::provider_unavailable);
        let _ = shutdown_tx.send(());
        log_server_exit(server.await);

        into_session(params?, expected_state)
    }
}

/// Log how the callback server ended. Returns whether it shut down cleanly.
fn log_server_exit(joined: std::result::Result<std::io::Result<()>, JoinError>) -> bool {
    match joined {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "callback server failed");
            false
        },
        Err(e) => {
            warn!(error = %e, "callback server task failed");
            false
        },
    }
}

async fn handle_callback(
    State(sender): State<CallbackSender>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let failed = params.error.is_some();
    if let Some(tx) = sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        let _ = tx.send(params);
    }
    if failed {
        Html("<h1>Login failed</h1><p>You can close this window.</p>")
    } else {
        Html("<h1>Login complete</h1><p>You can close this window.</p>")
    }
}

fn into_session(params: CallbackParams, expected_state: &str) -> Result<DelegatedSession> {
    if let Some(error) = params.error {
        let reason = match params.error_description {
            Some(desc) => format!("{error}: {desc}"),
            None => error,
        };
        return Err(Error::provider_rejected(reason));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(Error::provider_rejected("callback state mismatch"));
    }

    let principal = params
        .principal
        .ok_or_else(|| Error::provider_rejected("callback missing principal"))?;
    let principal = Principal::from_text(&principal)
        .map_err(|e| Error::provider_rejected(format!("invalid principal: {e}")))?;
    let delegation = params
        .delegation
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::provider_rejected("callback missing delegation"))?;
    let expires_at_ns = params
        .expiration
        .ok_or_else(|| Error::provider_rejected("callback missing expiration"))?
        .parse::<u64>()
        .map_err(|e| Error::provider_rejected(format!("invalid expiration: {e}")))?;

    Ok(DelegatedSession {
        principal,
        delegation: Secret::new(delegation),
        expires_at_ns,
    })
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn params() -> CallbackParams {
        CallbackParams {
            state: Some("s1".into()),
            principal: Some("aaaaa-aa".into()),
            delegation: Some("chain".into()),
            expiration: Some("1700000000000000000".into()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_params_become_session() {
        let session = into_session(params(), "s1").unwrap();
        assert_eq!(session.principal.as_str(), "aaaaa-aa");
        assert_eq!(session.delegation.expose_secret(), "chain");
        assert_eq!(session.expires_at_ns, 1_700_000_000_000_000_000);
    }

    #[test]
    fn provider_error_is_rejection() {
        let p = CallbackParams {
            error: Some("UserInterrupt".into()),
            error_description: Some("window closed".into()),
            ..params()
        };
        match into_session(p, "s1") {
            Err(Error::ProviderRejected { reason }) => {
                assert_eq!(reason, "UserInterrupt: window closed")
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn state_mismatch_is_rejection() {
        assert!(matches!(
            into_session(params(), "other"),
            Err(Error::ProviderRejected { .. })
        ));
    }

    #[test]
    fn missing_or_bad_fields_are_rejections() {
        for p in [
            CallbackParams {
                principal: None,
                ..params()
            },
            CallbackParams {
                principal: Some("BAD".into()),
                ..params()
            },
            CallbackParams {
                delegation: Some(String::new()),
                ..params()
            },
            CallbackParams {
                expiration: Some("soon".into()),
                ..params()
            },
        ] {
            assert!(matches!(
                into_session(p, "s1"),
                Err(Error::ProviderRejected { .. })
            ));
        }
    }

    #[tokio::test]
    async fn server_exit_reports_serve_errors() {
        assert!(log_server_exit(Ok(Ok(()))));
        assert!(!log_server_exit(Ok(Err(std::io::Error::other("accept failed")))));

        let task = tokio::spawn(std::future::pending::<std::io::Result<()>>());
        task.abort();
        assert!(!log_server_exit(task.await));
    }

    #[tokio::test]
    async fn serves_a_single_callback() {
        let server = CallbackServer::bind(0).await.unwrap();
        let redirect = server.redirect_uri();
        assert!(redirect.starts_with("http://127.0.0.1:"));

        let waiter = tokio::spawn(async move { server.wait_for_delegation("xyz").await });

        let url = format!(
            "{redirect}?state=xyz&principal=aaaaa-aa&delegation=chain&expiration=42"
        );
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Login complete"));

        let session = waiter.await.unwrap().unwrap();
        assert_eq!(session.principal.as_str(), "aaaaa-aa");
        assert_eq!(session.expires_at_ns, 42);
    }

    #[tokio::test]
    async fn bind_conflict_is_unavailable() {
        let first = CallbackServer::bind(0).await.unwrap();
        let port = first.addr.port();
        assert!(matches!(
            CallbackServer::bind(port).await,
            Err(Error::ProviderUnavailable { .. })
        ));
    }
}
