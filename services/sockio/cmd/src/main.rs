//! sockio demo client.
//!
//! Connects to a server, prints every `--event` the server sends, emits one
//! `--event` with `--message` and prints its acknowledgement, then waits for
//! Ctrl-C and closes the session.

use anyhow::Context;
use clap::Parser;
use sockio::{Client, ProtocolVersion};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::DemoConfig;
use logging::SockioLogFormatter;

/// Demo client for the sockio protocol
#[derive(Parser, Debug)]
#[command(name = "sockio", version, about = "sockio demo client")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "sockio.yaml")]
    config: PathBuf,

    /// Server URL, e.g. http://localhost:3000
    #[arg(long)]
    host: Option<String>,

    /// Endpoint path, e.g. socket.io
    #[arg(long)]
    path: Option<String>,

    /// Protocol version (v2, v3)
    #[arg(long)]
    protocol: Option<ProtocolVersion>,

    /// Base reconnect delay, e.g. 1s
    #[arg(long)]
    reconnect_delay: Option<humantime::Duration>,

    /// Maximum consecutive reconnect attempts (0 = unbounded)
    #[arg(long)]
    reconnect_attempts: Option<u32>,

    /// Disable automatic reconnection
    #[arg(long)]
    no_reconnect: bool,

    /// Event to emit and listen for
    #[arg(long)]
    event: Option<String>,

    /// Data sent with the event: JSON, or else sent as a plain string
    #[arg(long)]
    message: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command line flags win over file and environment
    fn apply(&self, config: &mut DemoConfig) {
        if let Some(host) = &self.host {
            config.client.host = host.clone();
        }
        if let Some(path) = &self.path {
            config.client.path = path.clone();
        }
        if let Some(protocol) = self.protocol {
            config.client.version = protocol;
        }
        if let Some(delay) = self.reconnect_delay {
            config.client.reconnect_delay = Duration::from(delay);
        }
        if let Some(attempts) = self.reconnect_attempts {
            config.client.reconnect_attempts = attempts;
        }
        if self.no_reconnect {
            config.client.reconnect = false;
        }
        if let Some(event) = &self.event {
            config.event = event.clone();
        }
        if let Some(message) = &self.message {
            config.message = message.clone();
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level when set
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info")
            .add_directive(format!("sockio={}", args.log_level).parse()?)
            .add_directive(format!("sockio_session={}", args.log_level).parse()?)
            .add_directive(format!("sockio_wire={}", args.log_level).parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(SockioLogFormatter::new("sockio".to_string()))
        .init();

    info!("Starting sockio demo client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DemoConfig::load_from_file(&args.config)?;
    args.apply(&mut config);

    let client = Client::connect(config.client.clone())
        .await
        .with_context(|| format!("failed to connect to {}", config.client.host))?;

    let event = config.event.clone();
    client.on(event.clone(), move |data| {
        info!("Received {}: {}", event, String::from_utf8_lossy(&data));
    });

    let data = serde_json::from_str::<serde_json::Value>(&config.message)
        .unwrap_or_else(|_| serde_json::Value::String(config.message.clone()));

    let event = config.event.clone();
    client
        .emit_with_ack(&config.event, &data, move |ack| {
            info!("Server acknowledged {}: {}", event, String::from_utf8_lossy(&ack));
        })
        .await
        .with_context(|| format!("failed to emit {}", config.event))?;

    info!("Client running. Press Ctrl-C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;

    info!("Received Ctrl-C, closing session");
    client.close(true).await;
    info!("sockio demo client stopped");

    Ok(())
}
