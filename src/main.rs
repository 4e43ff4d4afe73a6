use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use herald_presign::PresignEvent;
use herald_server::{ServerConfig, Services, ShutdownCoordinator};
use herald_settings::{load_settings, load_settings_from_path, HeraldSettings};
use herald_store::Database;

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Relay finished execution results to waiting WebSocket clients"
)]
struct Cli {
    /// Settings file (defaults to ~/.herald/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/WebSocket server until ctrl-c.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// SQLite database path.
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print a presigned download link for an object URI.
    Presign {
        uri: String,
        /// Link lifetime in seconds.
        #[arg(long)]
        expiry: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;

    match cli.command {
        Command::Serve { port, db } => serve(settings, port, db).await,
        Command::Presign { uri, expiry } => presign(&settings, uri, expiry),
    }
}

async fn serve(
    mut settings: HeraldSettings,
    port: Option<u16>,
    db: Option<PathBuf>,
) -> anyhow::Result<()> {
    herald_telemetry::init_telemetry(&settings.logging).context("failed to initialize logging")?;

    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(path) = db {
        settings.database.path = path;
    }

    let db_path = settings.database.path.clone();
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let mut services = Services::new(db).with_policy(settings.dispatch.clone());
    match settings.presign.signer() {
        Ok(signer) => {
            let expiry = settings.presign.default_expiry_secs();
            services = services.with_presigner(Arc::new(signer), expiry);
        }
        Err(e) => warn!(error = %e, "presign endpoint disabled"),
    }

    let coordinator = ShutdownCoordinator::new();
    let config = ServerConfig::from(&settings.server);
    let handle = herald_server::start(config, services, coordinator.token())
        .await
        .context("failed to start server")?;
    info!(port = handle.port, "herald ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    coordinator.graceful_shutdown(handle.into_tasks(), None).await;
    Ok(())
}

fn presign(settings: &HeraldSettings, uri: String, expiry: Option<u64>) -> anyhow::Result<()> {
    let signer = settings
        .presign
        .signer()
        .context("presigning needs AWS credentials in settings or the environment")?;
    let event = PresignEvent {
        input_uri: Some(uri),
        link_expiry: expiry,
    };
    let resp = herald_presign::presign(&signer, &event, settings.presign.default_expiry_secs())?;
    println!("{}", resp.signed_s3_link);
    Ok(())
}
