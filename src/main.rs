//! imgd, the HTTP front of the image service.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────────────────────────────┐
//!                    │                     SERVICE                     │
//!                    │                                                 │
//!   Client Request   │  ┌─────────┐   ┌───────────┐   ┌────────────┐  │
//!   ─────────────────┼─▶│ engine  │──▶│ bootstrap │──▶│ middleware │  │
//!                    │  │ accept  │   │ admission │   │  pipeline  │  │
//!                    │  └─────────┘   └───────────┘   └─────┬──────┘  │
//!                    │                                      │         │
//!                    │                                      ▼         │
//!   Client Response  │  ┌─────────┐                  ┌────────────┐  │
//!   ◀────────────────┼──│response │◀─────────────────│   route    │  │
//!                    │  └─────────┘  RequestContext  │  handlers  │  │
//!                    │                               └────────────┘  │
//!                    │                                                │
//!                    │  ┌────────────────────────────────────────────┐│
//!                    │  │           Cross-Cutting Concerns           ││
//!                    │  │  ┌────────┐ ┌───────────┐ ┌─────────────┐  ││
//!                    │  │  │ config │ │ lifecycle │ │observability│  ││
//!                    │  │  └────────┘ └───────────┘ └─────────────┘  ││
//!                    │  └────────────────────────────────────────────┘│
//!                    └─────────────────────────────────────────────────┘
//! ```
//!
//! The binary loads configuration, wires the image sub-service into the
//! service, opens it, and translates process signals into a graceful quit.

// Core subsystems
pub mod config;
pub mod context;
pub mod handler;
pub mod router;

// Serving path
pub mod engine;
pub mod middleware;
pub mod service;

// Sub-services
pub mod image;

// Cross-cutting concerns
pub mod observability;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServiceConfig;
use crate::image::ImageService;
use crate::service::Service;

#[derive(Parser)]
#[command(name = "imgd")]
#[command(about = "HTTP front of the image service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("imgd v0.1.0 starting");

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => crate::config::load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }

    tracing::info!(
        address = %config.address,
        max_concurrency = config.max_concurrency,
        buffer_size = config.buffer_size,
        request_timeout_ms = config.request_timeout,
        quit_timeout_ms = config.quit_timeout,
        "Configuration loaded"
    );

    // Initialize metrics exporter
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            crate::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let service = Arc::new(
        Service::builder(config)
            .subservice(ImageService::new())
            .build()?,
    );

    let quitter = Arc::clone(&service);
    tokio::spawn(async move {
        shutdown_signal().await;
        if let Err(e) = quitter.quit().await {
            tracing::warn!(error = %e, "Quit ended with error");
        }
    });

    service.open().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
