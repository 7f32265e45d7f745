//! Listener setup with a fixed-delay retry.

use crate::error::ServerError;
use log::{info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Bind `addr` once.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Bind `addr`, waiting `delay` between failed attempts until it succeeds.
pub async fn bind_with_retry(addr: SocketAddr, delay: Duration) -> TcpListener {
    let mut attempt = 1u32;
    loop {
        info!("Binding {} (attempt {})", addr, attempt);
        match bind(addr).await {
            Ok(listener) => {
                let local = listener.local_addr().unwrap_or(addr);
                info!("Connected with IP address: {}", local);
                return listener;
            }
            Err(err) => {
                warn!("{}. Retrying in {} ms", err, delay.as_millis());
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
