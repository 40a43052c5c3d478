//! USSD gateway client entry point.
//!
//! ```text
//! ussd-client                   Run in the foreground
//! ussd-client --config <path>   Load a custom config TOML
//! ussd-client --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use ussd_client::config::ClientConfig;
use ussd_client::logging;
use ussd_client::service::GatewayService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ussd-client", about = "USSD-over-TCP gateway client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "ussd-client.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", ClientConfig::default_toml()?);
        return Ok(());
    }

    let config = ClientConfig::load(&cli.config)?;
    let log_file = logging::init(&config.logging)?;

    info!("ussd-client v{}", env!("CARGO_PKG_VERSION"));
    if !cli.config.exists() {
        info!("no config at {}; using defaults", cli.config.display());
    }
    if let Some(path) = log_file {
        info!("logging to {}", path.display());
    }

    let service = match GatewayService::new(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("startup failed: {e}");
            return Err(e.into());
        }
    };
    info!("gateway: {}:{}", config.gateway.host, config.gateway.port);
    info!("keepalive every {}s", config.timing.keepalive_interval_secs);
    info!("max concurrent dialogs: {}", config.dispatch.max_concurrent_dialogs);

    // Ctrl-C handler.
    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.cancel();
    });

    if let Err(e) = service.run().await {
        error!("gateway client stopped: {e}");
        return Err(e.into());
    }
    info!("gateway client stopped");
    Ok(())
}
