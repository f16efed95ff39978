//! First-time login: exchange a password for the identity's API key.
//!
//! With `credential_storage = "file"` configured, the key is stored so
//! later runs can authenticate without the password.
//!
//! Run with: STRONGROOM_AUTHN_PASSWORD=... cargo run --example login -- <login>

use anyhow::{Context, Result};
use secrecy::SecretString;
use strongroom::{Client, Config, LoginPair};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    println!("Strongroom - Login");
    println!("==================\n");

    let args: Vec<String> = std::env::args().collect();
    let login = args
        .get(1)
        .context("Usage: cargo run --example login -- <login>")?;
    let password: SecretString = std::env::var("STRONGROOM_AUTHN_PASSWORD")
        .context("STRONGROOM_AUTHN_PASSWORD is not set")?
        .into();

    let config = Config::load_default().context("Failed to load configuration")?;
    let client = Client::new(config)?;

    let api_key = client
        .login(login, &password)
        .await
        .context("Login failed")?;
    println!("Obtained API key ({} bytes)", api_key.len());

    // Prove the key works by asking the service who we are.
    let client = Client::from_key(
        client.config().clone(),
        LoginPair::new(login.clone(), String::from_utf8_lossy(&api_key).into_owned()),
    )?;
    let identity = client.whoami().await.context("Whoami failed")?;
    println!(
        "Logged in as {} (account {})",
        identity.username, identity.account
    );

    Ok(())
}
