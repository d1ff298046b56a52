//! wfdispatch - REST server for dispatching Argo Workflows

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wfdispatch::config::Config;
use wfdispatch::dispatch::Dispatcher;
use wfdispatch::server::{router, AppState};

/// Workflow dispatcher for a multi-tenant JupyterLab cluster
#[derive(Parser, Debug)]
#[command(name = "wfdispatch", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP server
    #[arg(long, env = "WFDISPATCH_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Path to the YAML configuration file (defaults are used if omitted)
    #[arg(short = 'f', long = "config", env = "WFDISPATCH_CONFIG")]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(cli.config_file.as_deref())?);

    // One shared cluster client for the whole process; handed by reference
    // into the provisioning and assembly components.
    let client = Client::try_default().await?;

    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(client, config),
    });

    info!(addr = %cli.addr, "starting workflow dispatcher");
    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
