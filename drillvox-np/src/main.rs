//! Narration Player (drillvox-np) - Main entry point
//!
//! This is the narration sequencing service for DrillVox: it holds the
//! playback state machine, drives the speech backend, and exposes the
//! HTTP/SSE control interface the vocabulary UI talks to.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drillvox_common::config::{BackendKind, TomlConfig};
use drillvox_common::events::EventBus;
use drillvox_common::vocab::{VocabSource, Vocabulary};
use drillvox_np::api;
use drillvox_np::playback::engine::NarrationEngine;
use drillvox_np::tts::bridge::HostBridgeBackend;
use drillvox_np::tts::process::ProcessBackend;
use drillvox_np::tts::{completion_channel, SpeechBackend};

/// Command-line arguments for drillvox-np
#[derive(Parser, Debug)]
#[command(name = "drillvox-np")]
#[command(about = "Narration player service for DrillVox")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "DRILLVOX_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "DRILLVOX_PORT")]
    port: Option<u16>,

    /// Vocabulary JSON file (overrides config)
    #[arg(long, env = "DRILLVOX_VOCABULARY")]
    vocabulary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration (built-in defaults when no file is given)
    let mut config = match &args.config {
        Some(path) => TomlConfig::load(path)
            .await
            .context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(vocabulary) = args.vocabulary {
        config.vocabulary_path = vocabulary;
    }

    // Initialize tracing
    let default_filter = format!("drillvox_np={},tower_http=debug", config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting DrillVox Narration Player on port {}", config.port);
    info!("Vocabulary file: {}", config.vocabulary_path.display());

    // Load the vocabulary collection
    let vocab: Arc<dyn VocabSource> = Arc::new(
        Vocabulary::load(&config.vocabulary_path)
            .await
            .context("Failed to load vocabulary")?,
    );

    // Event bus shared by the engine and the SSE surface
    let events = EventBus::new(1000);

    // Completion funnel and backend selection
    let (completion_tx, completion_rx) = completion_channel();
    let backend: Arc<dyn SpeechBackend> = match config.backend {
        BackendKind::Process => {
            info!("Speech backend: process ({})", config.tts.command);
            Arc::new(ProcessBackend::new(config.tts.clone(), completion_tx.clone()))
        }
        BackendKind::Bridge => {
            info!("Speech backend: host bridge");
            Arc::new(HostBridgeBackend::new(events.clone()))
        }
    };

    // Initialize narration engine
    let engine = Arc::new(NarrationEngine::new(
        vocab,
        backend,
        events,
        config.narration,
        config.timing,
        completion_tx,
        completion_rx,
    ));
    engine.start();
    info!("Narration engine initialized");

    // Build the application router
    let app = api::create_router(api::AppContext { engine });

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Starting HTTP server on {}", addr);

    // Create and run the server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
