use {
    anyhow::Result,
    canispect_auth::AuthState,
    clap::Subcommand,
    serde_json::json,
};

use crate::{Context, audit_commands::format_nanos};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Log in through the identity provider for the configured mode.
    Login,
    /// Show the current principal and session expiry.
    Status,
    /// Forget the saved session.
    Logout,
}

pub async fn handle_auth(ctx: &Context, action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Login => login(ctx).await,
        AuthAction::Status => {
            status(ctx, &ctx.session.state());
            Ok(())
        },
        AuthAction::Logout => logout(ctx).await,
    }
}

async fn login(ctx: &Context) -> Result<()> {
    if ctx.session.state().is_authenticated() {
        println!("Already logged in.");
        status(ctx, &ctx.session.state());
        return Ok(());
    }

    println!("Opening {} ...", ctx.session.provider_url());
    println!(
        "Waiting for the provider to redirect to http://127.0.0.1:{}/auth/callback ...",
        ctx.config.identity.callback_port
    );
    let state = ctx.session.login().await?;
    status(ctx, &state);
    Ok(())
}

async fn logout(ctx: &Context) -> Result<()> {
    ctx.session.logout().await?;
    println!("Logged out.");
    Ok(())
}

fn status(ctx: &Context, state: &AuthState) {
    let identity = state.identity().filter(|_| state.is_authenticated());
    if ctx.json {
        println!(
            "{}",
            json!({
                "authenticated": state.is_authenticated(),
                "principal": identity.map(|i| i.principal().to_string()),
                "expires_at_ns": identity.and_then(|i| i.expires_at_ns()),
            })
        );
        return;
    }
    match identity {
        Some(identity) => {
            let expiry = identity
                .expires_at_ns()
                .map_or_else(|| "unknown".to_string(), format_nanos);
            println!("Logged in as {} [expires {expiry}]", identity.principal());
        },
        None => println!("Not logged in."),
    }
}
