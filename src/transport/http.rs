//! HTTP transport
//!
//! Serves the API router with axum until Ctrl+C or the cancellation token
//! fires, then drains in-flight requests.

use crate::util::bind_listener;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default port for the HTTP API
pub const DEFAULT_HTTP_PORT: u16 = 20290;

/// Configuration for the HTTP server
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Address to bind to (e.g., "127.0.0.1:20290")
    pub bind: SocketAddr,
    /// Try neighbouring ports when `bind` is taken
    pub port_fallback: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_HTTP_PORT)))
    }
}

impl HttpConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            port_fallback: false,
        }
    }

    /// Create config from host and port strings
    pub fn from_host_port(host: &str, port: u16) -> Result<Self, std::net::AddrParseError> {
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        Ok(Self::new(addr))
    }

    pub fn with_port_fallback(mut self, fallback: bool) -> Self {
        self.port_fallback = fallback;
        self
    }
}

/// Bind the configured address
pub async fn bind(config: &HttpConfig) -> anyhow::Result<TcpListener> {
    let listener = bind_listener(config.bind, config.port_fallback).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    Ok(listener)
}

/// Serve `router` on an already bound listener until shutdown
pub async fn serve_on(
    listener: TcpListener,
    router: Router,
    ct: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(ct))
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Bind and serve `router` until Ctrl+C or `ct` is cancelled
pub async fn serve(router: Router, config: HttpConfig, ct: CancellationToken) -> anyhow::Result<()> {
    let listener = bind(&config).await?;
    info!("Press Ctrl+C to stop the server");
    serve_on(listener, router, ct).await
}

async fn shutdown_signal(ct: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = ct.cancelled() => {
            info!("Server cancelled");
        }
    }
    ct.cancel();
}
