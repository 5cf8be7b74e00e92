//! S7 I/O Image Observer (s7obsd)
//!
//! Standalone service that:
//! - Samples a Siemens S7 controller's I/O image (MB‖EB‖AB) on a timer
//! - Infers cycle time, discrete machine states, and transitions between them
//! - Exposes the live sample stream and inferred structure over REST/WebSocket
//!
//! Default bind: 0.0.0.0:8080
//! WebSocket: /events
//! REST API: /api/v1/*

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use s7obsd::api;
use s7obsd::config::ObserverConfig;
use s7obsd::core::registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true).with_thread_names(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,s7obsd=debug")))
        .init();

    info!("starting S7 I/O image observer (s7obsd)");
    info!(version = env!("CARGO_PKG_VERSION"));

    let config = ObserverConfig::from_env();
    let bind_addr: SocketAddr = config.bind_address.parse()?;

    let registry = Arc::new(Registry::new(config));
    let app = api::create_router(registry);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "s7obsd listening");
    info!("websocket events: ws://{bind_addr}/events");
    info!("swagger ui: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app).await?;

    Ok(())
}
