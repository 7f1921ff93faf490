//! Streams Mattermost events to the log until Ctrl-C.
//!
//! Configuration comes from the environment:
//!
//! - `MATTERMOST_HOST` (required)
//! - `MATTERMOST_TOKEN` (required)
//! - `MATTERMOST_PORT` (default `443`)
//! - `MATTERMOST_BASE_PATH` (default `/api/v4`)
//! - `MATTERMOST_VERIFY_TLS` (default `true`)
//!
//! ```sh
//! MATTERMOST_HOST=chat.example.com MATTERMOST_TOKEN=... RUST_LOG=info cargo run --example stream
//! ```

use std::env;

use anyhow::Context as _;
use mattermost_websocket::auth::Token;
use mattermost_websocket::ws::Supervisor;
use mattermost_websocket::ws::config::{Config, ConnectionOptions};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let host = env::var("MATTERMOST_HOST").context("MATTERMOST_HOST is not set")?;
    let token = env::var("MATTERMOST_TOKEN").context("MATTERMOST_TOKEN is not set")?;
    let port = env::var("MATTERMOST_PORT")
        .map_or(Ok(443), |port| port.parse::<u16>())
        .context("MATTERMOST_PORT is not a port number")?;
    let base_path = env::var("MATTERMOST_BASE_PATH").unwrap_or_else(|_| "/api/v4".to_owned());
    let verify_tls = env::var("MATTERMOST_VERIFY_TLS")
        .map_or(Ok(true), |verify| verify.parse::<bool>())
        .context("MATTERMOST_VERIFY_TLS must be true or false")?;

    let options = ConnectionOptions::builder()
        .host(host)
        .port(port)
        .base_path(base_path)
        .verify_tls(verify_tls)
        .build();

    let supervisor = Supervisor::new(&options, Token::new(token), Config::default())?;
    info!(url = supervisor.url(), "Starting event stream");

    let mut states = supervisor.state_receiver();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(?state, "Supervisor state changed");
        }
    });

    let handle = supervisor.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for Ctrl-C");
        }
        handle.disconnect();
    });

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let worker = tokio::spawn(async move {
        let mut count = 0_u64;
        while let Some(event) = rx.recv().await {
            count += 1;
            match serde_json::from_str::<serde_json::Value>(&event) {
                Ok(value) => info!(count, event = %value["event"], "Received event"),
                Err(e) => warn!(error = %e, %event, "Received non-JSON message"),
            }
        }
        count
    });

    supervisor.connect(tx).await;

    let received = worker.await?;
    info!(received, "Event stream stopped");

    Ok(())
}
