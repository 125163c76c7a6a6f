//! kebd — the Kyma environment broker daemon.
//!
//! Single binary that assembles the broker:
//! - Configuration (broker, providers, plans)
//! - State store (redb)
//! - Admission pipeline and lifecycle orchestrators
//! - In-process operation queue and its worker
//! - REST API
//!
//! # Usage
//!
//! ```text
//! kebd serve --port 8080 --data-dir /var/lib/keb --config config/broker.toml \
//!     --providers config/providers.toml --plans config/plans.toml
//! kebd check-config --config config/broker.toml --providers config/providers.toml \
//!     --plans config/plans.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use kebd::{ConfigPaths, LoadedConfig, LoggingLabeler, StaticQuota, build_broker, worker};
use keb_lifecycle::ChannelQueue;
use keb_state::{StateStore, Store};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kebd", about = "Kyma environment broker daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Broker configuration file.
    #[arg(long, default_value = "config/broker.toml")]
    config: PathBuf,

    /// Provider regions, zones and machines.
    #[arg(long, default_value = "config/providers.toml")]
    providers: PathBuf,

    /// Plan regions, machines and upgrade paths.
    #[arg(long, default_value = "config/plans.toml")]
    plans: PathBuf,
}

impl From<ConfigArgs> for ConfigPaths {
    fn from(args: ConfigArgs) -> Self {
        ConfigPaths {
            config: args.config,
            providers: args.providers,
            plans: args.plans,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the broker API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/keb")]
        data_dir: PathBuf,

        /// Instance quota granted to every subaccount and plan.
        #[arg(long, default_value = "100")]
        quota: i32,

        #[command(flatten)]
        files: ConfigArgs,
    },
    /// Load and validate the configuration files, then exit.
    CheckConfig {
        #[command(flatten)]
        files: ConfigArgs,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kebd=debug,keb=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            quota,
            files,
        } => run_serve(port, data_dir, quota, files.into()).await,
        Command::CheckConfig { files } => {
            LoadedConfig::load(&files.into())?;
            info!("configuration is valid");
            Ok(())
        }
    }
}

async fn run_serve(port: u16, data_dir: PathBuf, quota: i32, paths: ConfigPaths) -> anyhow::Result<()> {
    info!("Kyma environment broker starting");

    let loaded = LoadedConfig::load(&paths)?;

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("keb.redb");
    let store: Arc<dyn Store> = Arc::new(StateStore::open(&db_path)?);
    info!(path = ?db_path, "state store opened");

    // ── Queue and worker ───────────────────────────────────────

    let (queue, queued) = ChannelQueue::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker::run(queued, store.clone(), shutdown_rx));

    // ── API server ─────────────────────────────────────────────

    let broker = build_broker(
        &loaded,
        store,
        Arc::new(StaticQuota { quota }),
        Arc::new(queue),
        Arc::new(LoggingLabeler),
    );
    let router = keb_api::build_router(Arc::new(broker));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "unable to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = worker_handle.await;

    info!("Kyma environment broker stopped");
    Ok(())
}
