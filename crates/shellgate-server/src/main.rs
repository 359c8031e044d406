//! Streaming command gateway.
//!
//! Serves the `shell` tool over server-sent events. Configured through
//! environment variables; see [`config::GatewayConfig`].

mod config;

use std::sync::Arc;

use anyhow::Context;
use shellgate_credentials::CredentialManager;
use shellgate_executor::{ProcessExecutor, resolve_executable_path};
use shellgate_transport::{AccessGate, GatewayState, ShutdownTrigger, ToolAdapter, router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    if config.access_token.is_empty() {
        tracing::warn!("GITHUB_ACCESS_TOKEN is not set; commands will fail until a token is configured");
    }

    match resolve_executable_path("gh").await {
        Some(gh) => tracing::info!(gh = %gh.display(), "GitHub CLI found"),
        None => tracing::warn!("gh is not on PATH; GitHub commands will fail"),
    }

    let credentials = Arc::new(CredentialManager::new(
        config.credential_config(),
        config.initial_record(),
    ));
    let executor = ProcessExecutor::new(credentials, config.executor_config());

    let gate = AccessGate::new(config.secret_token.clone());
    if gate.is_open() {
        tracing::warn!("SECRET_TOKEN is not set; every path is authorized");
    }

    let (shutdown, signal) = ShutdownTrigger::new();
    let app = router(GatewayState::new(
        gate,
        ToolAdapter::new(Arc::new(executor)),
        signal,
    ));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        sandbox_root = %config.sandbox_root.display(),
        timeout_secs = config.command_timeout.as_secs(),
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutting down, closing open streams");
            shutdown.trigger();
        })
        .await
        .context("Server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
