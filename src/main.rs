use std::sync::Arc;
use std::time::Duration;

use tv_remote_rs::netdetect::{self, InterfaceSource, SystemInterfaces};
use tv_remote_rs::server::{spawn_server, AppState};
use tv_remote_rs::{plan, relay};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// tv-remote-rs — LAN smart-TV discovery and remote-control relay with a tiny embedded web UI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tv-remote-rs",
    version,
    about = "LAN smart-TV discovery and remote-control relay with a tiny embedded web UI.",
    long_about = None
)]
struct Cli {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Max concurrent liveness probes during a scan (254 covers a /24).
    #[arg(long = "probe-concurrency", default_value_t = 254)]
    probe_concurrency: usize,

    /// Per-probe timeout in milliseconds.
    #[arg(long = "probe-timeout-ms", default_value_t = plan::DEFAULT_PROBE_TIMEOUT_MS)]
    probe_timeout_ms: u64,

    /// Timeout for a single relayed control call, in milliseconds.
    #[arg(long = "relay-timeout-ms", default_value_t = relay::DEFAULT_RELAY_TIMEOUT_MS)]
    relay_timeout_ms: u64,

    /// Directory with the static web UI.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let interfaces: Arc<dyn InterfaceSource> = Arc::new(SystemInterfaces);

    match netdetect::resolve_server_address(interfaces.as_ref()) {
        Ok(ip) => info!(
            address = %ip,
            suggested_subnet = %netdetect::suggested_subnet(ip),
            "resolved local address"
        ),
        Err(e) => warn!("no usable local address, scans will need an explicit subnet: {e}"),
    }

    let state = AppState::new(
        interfaces,
        cli.probe_concurrency,
        Duration::from_millis(cli.probe_timeout_ms),
        Duration::from_millis(cli.relay_timeout_ms),
    )?;

    info!(
        bind = %cli.bind,
        probe_concurrency = cli.probe_concurrency,
        probe_timeout_ms = cli.probe_timeout_ms,
        relay_timeout_ms = cli.relay_timeout_ms,
        ui_dir = %cli.ui_dir,
        "starting server"
    );
    spawn_server(&cli.bind, state, &cli.ui_dir).await
}
