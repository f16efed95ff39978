//! Fetch a secret value using configuration from the environment.
//!
//! Expects `STRONGROOM_SERVICE_URL` and `STRONGROOM_ACCOUNT` (or a
//! `strongroom.toml`), plus one of the supported authentication
//! strategies; see `Client::from_environment`.
//!
//! Run with: cargo run --example retrieve_secret -- <variable-id>

use anyhow::{Context, Result};
use strongroom::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let variable_id = args
        .get(1)
        .context("Usage: cargo run --example retrieve_secret -- <variable-id>")?;

    let client = Client::from_environment()
        .await
        .context("Failed to build a client from the environment")?;
    println!("Connected to account {}", client.account());

    let value = client
        .retrieve_secret(variable_id)
        .await
        .with_context(|| format!("Failed to retrieve {variable_id}"))?;

    println!("{}", String::from_utf8_lossy(&value));
    Ok(())
}
