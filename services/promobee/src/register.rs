//! `promobee register`: pair the application with an ecobee account
//!
//! Prints a PIN for the user to enter under "My Apps" in the ecobee portal,
//! waits for confirmation on stdin, then exchanges the authorization code and
//! writes the first credential to the token store.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use ecobee_auth::{DEFAULT_SCOPE, PersistentTokenStore, SystemClock, exchange_pin, request_pin};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    register(config, stdin, &mut std::io::stdout()).await
}

async fn register<R, W>(config: &Config, mut input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let api_key = config.api_key()?;
    let token_store = config.token_store()?;
    let api_host = &config.ecobee.api_host;
    let client = reqwest::Client::new();

    let challenge = request_pin(&client, api_host, api_key.expose(), DEFAULT_SCOPE)
        .await
        .context("failed initializing PIN authorization")?;

    writeln!(out, "Register with this PIN: {}", challenge.pin)?;
    writeln!(out, "Press Enter once the PIN has been added in the ecobee portal.")?;
    out.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("failed reading confirmation")?;

    let tokens = exchange_pin(&client, api_host, api_key.expose(), &challenge.code)
        .await
        .context("failed authenticating")?;

    let store = PersistentTokenStore::create(
        &tokens,
        token_store.to_path_buf(),
        Arc::new(SystemClock),
    )
    .await
    .with_context(|| format!("failed creating token store {}", token_store.display()))?;

    info!(path = %store.path().display(), "registration complete");
    writeln!(out, "Created persistent store at {}", store.path().display())?;
    Ok(())
}
