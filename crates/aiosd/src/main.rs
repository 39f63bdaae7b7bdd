//! aiosd entry point

use aiosd::{logging, AgentConfig, AgentState, Listener};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging is not up yet, so config errors go straight to stderr
    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[FATAL] {}", e);
            std::process::exit(78);
        }
    };

    logging::init(&config)?;

    info!("[BOOT] AI-OS agent daemon v{} starting...", aios_common::VERSION);
    config.log_summary();
    info!("[BOOT] HAL backend: {}", config.hal.as_str());

    let state = Arc::new(AgentState::from_config(config));
    match &state.provider {
        Some(provider) => info!(
            "[BOOT] Remote provider: {} ({})",
            provider.kind(),
            provider.model()
        ),
        None => info!("[BOOT] No remote provider; local fallback only"),
    }

    let listener = match Listener::bind(&state.config.socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            error!("[FATAL] {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "[BOOT] IPC online ({}, permissions: 0666)",
        listener.path().display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("[SHUTDOWN] Stopping listener");
        let _ = shutdown_tx.send(true);
    });

    info!("[READY] aiosd operational");

    listener
        .run(state, shutdown_rx)
        .await
        .context("Listener error")?;

    info!("[SHUTDOWN] aiosd stopped");
    Ok(())
}

/// Resolve on SIGTERM or SIGINT
async fn wait_for_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to wait for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("[SHUTDOWN] SIGTERM received"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("[SHUTDOWN] SIGINT received"),
            Err(e) => {
                warn!("Failed to wait for SIGINT: {}", e);
                sigterm.recv().await;
            }
        },
    }
}
