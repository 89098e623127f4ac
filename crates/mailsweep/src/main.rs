//! `mailsweep` - local Gmail cleanup service
//!
//! Serves a JSON API on the loopback interface for scanning the mailbox by
//! sender, bulk mark-read/trash/archive/label actions and unsubscribing.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
mod error;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use mailsweep_core::{KeyringTokenStore, Settings};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailsweep=info,mailsweep_core=info,mailsweep_gmail=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().await.context("Failed to load settings")?;
    if !settings.sign_in_enabled() {
        warn!("MAILSWEEP_CLIENT_ID is not set, sign-in is disabled");
    }

    let state = AppState::new(&settings, Arc::new(KeyringTokenStore))
        .await
        .context("Failed to initialize application state")?;

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_addr))?;
    let url = format!("http://{}", listener.local_addr()?);
    info!(%url, "Starting mailsweep");
    println!("mailsweep is running at {url}");

    if std::env::var_os("MAILSWEEP_NO_BROWSER").is_none()
        && let Err(e) = opener::open(&url)
    {
        warn!("Failed to open browser: {e}");
    }

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
