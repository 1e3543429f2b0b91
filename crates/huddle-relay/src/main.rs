//! huddle-relay binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use huddle_config::HuddleConfig;
use huddle_relay::{serve, Hub};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "huddle-relay", about = "Signaling relay for huddle voice channels")]
struct Args {
    /// Port to listen on. Overrides the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file to read the `[relay]` and `[logging]` sections from.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// `--config` is read as given; without it the platform config file is
/// used, and written with defaults on first run.
fn load_config(path: Option<&PathBuf>) -> (HuddleConfig, Option<String>) {
    let loaded = match path {
        Some(path) => huddle_config::toml_loader::load_from_path(path)
            .map_err(|e| format!("{}: {e}", path.display())),
        None => huddle_config::load_config().map_err(|e| e.to_string()),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(e) => (HuddleConfig::default(), Some(e)),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, load_error) = load_config(args.config.as_ref());

    let default_filter = format!("huddle_relay={}", config.logging.level.as_directive());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if let Some(e) = load_error {
        tracing::warn!(error = %e, "Using default config");
    }
    tracing::debug!(config = %huddle_config::config_to_json(&config), "Effective config");

    let section = config.relay;
    let port = args.port.unwrap_or(section.port);

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };

    tracing::info!("huddle-relay listening on {}", addr);

    serve(
        listener,
        Hub::new(),
        Duration::from_secs(section.handshake_timeout_secs),
    )
    .await;
}
