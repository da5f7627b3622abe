mod audit_commands;
mod auth_commands;

use std::{path::PathBuf, sync::Arc};

use {
    canispect_auth::SessionManager,
    canispect_config::CanispectConfig,
    canispect_gateway::GatewayClient,
    clap::{Parser, Subcommand},
    tracing::{debug, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "canispect", about = "Canispect: canister security analysis and audits")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Directory to read canispect.{toml,yaml,yml,json} from.
    #[arg(long, global = true, env = "CANISPECT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Identity provider login and session status.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
    /// Analyze a Wasm module.
    Analyze(audit_commands::AnalyzeArgs),
    /// Query the audit registry.
    Audit {
        #[command(subcommand)]
        action: audit_commands::AuditAction,
    },
    /// Security recommendations for a described canister.
    Recommend {
        /// What the canister does.
        description: String,
    },
}

/// Shared handles for one command invocation.
pub(crate) struct Context {
    pub config: CanispectConfig,
    pub session: Arc<SessionManager>,
    pub json: bool,
}

impl Context {
    async fn new(json: bool) -> anyhow::Result<Self> {
        let config = canispect_config::discover_and_load();
        debug!(mode = ?config.mode, "config loaded");
        let session = Arc::new(SessionManager::from_config(&config)?);
        // Logout still clears storage when this fails; later calls retry.
        if let Err(e) = session.init().await {
            warn!(error = %e, "could not restore the saved session");
        }
        Ok(Self {
            config,
            session,
            json,
        })
    }

    pub fn gateway(&self) -> anyhow::Result<GatewayClient> {
        Ok(GatewayClient::from_config(
            Arc::clone(&self.session),
            &self.config,
        )?)
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "canispect starting");

    if let Some(dir) = cli.config_dir.clone() {
        canispect_config::set_config_dir(dir);
    }
    let ctx = Context::new(cli.json).await?;

    match cli.command {
        Commands::Auth { action } => auth_commands::handle_auth(&ctx, action).await,
        Commands::Analyze(args) => audit_commands::analyze(&ctx, args).await,
        Commands::Audit { action } => audit_commands::handle_audit(&ctx, action).await,
        Commands::Recommend { description } => {
            audit_commands::recommend(&ctx, &description).await
        },
    }
}
