//! Utility functions shared across the application.

mod secret;

pub use secret::SecretString;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::warn;

/// Number of consecutive ports tried after the preferred one
const FALLBACK_PORTS: u16 = 10;

/// Bind a listener on `addr`.
///
/// With `fallback` unset a taken port is an error. Otherwise the next
/// ports are tried in order, and finally an OS-assigned one.
///
/// # Example
/// ```ignore
/// let listener = bind_listener("127.0.0.1:20290".parse()?, false).await?;
/// ```
pub async fn bind_listener(addr: SocketAddr, fallback: bool) -> std::io::Result<TcpListener> {
    let err = match TcpListener::bind(addr).await {
        Ok(listener) => return Ok(listener),
        Err(e) if !fallback => return Err(e),
        Err(e) => e,
    };

    let preferred = addr.port();
    for offset in 1..=FALLBACK_PORTS {
        let port = preferred.saturating_add(offset);
        if port == preferred {
            break;
        }
        if let Ok(listener) = TcpListener::bind(SocketAddr::new(addr.ip(), port)).await {
            warn!(preferred, actual = port, error = %err, "Preferred port unavailable, using alternate");
            return Ok(listener);
        }
    }

    let listener = TcpListener::bind(SocketAddr::new(addr.ip(), 0)).await?;
    warn!(
        preferred,
        actual = listener.local_addr()?.port(),
        "Using OS-assigned port"
    );
    Ok(listener)
}
