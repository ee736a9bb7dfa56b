//! 9P listener.
//!
//! One tokio task per accepted connection, each with its own session over
//! the shared gateway. A failed accept is logged and the loop keeps going.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use chub9p_kernel::{Gateway, HttpFetcher, MemoryFetcher, ResourceFetcher};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::constants::ACCEPT_BACKOFF;

/// Pick the fetcher the configuration asks for: fixtures when a fixture file
/// is configured, the remote API otherwise.
pub fn build_fetcher(config: &ServerConfig) -> Result<Arc<dyn ResourceFetcher>> {
    if let Some(path) = &config.fixtures {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixtures {}", path.display()))?;
        let fetcher = MemoryFetcher::from_fixtures(&json)
            .with_context(|| format!("parsing fixtures {}", path.display()))?;
        tracing::info!(path = %path.display(), records = fetcher.len(), "serving fixtures");
        return Ok(Arc::new(fetcher));
    }

    let fetcher = HttpFetcher::new(
        &config.api_base,
        config.api_key.clone(),
        config.fetch_timeout(),
    )?;
    tracing::info!(api_base = %config.api_base, "serving remote api");
    Ok(Arc::new(fetcher))
}

/// The gateway server.
#[derive(Debug)]
pub struct NinepServer {
    config: ServerConfig,
    gateway: Arc<Gateway>,
}

impl NinepServer {
    pub fn new(config: ServerConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let gateway = Arc::new(Gateway::new(fetcher, config.gateway_config()));
        Self { config, gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind, self.config.port)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.listen_addr();
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding 9P listener on {addr}"))
    }

    /// Accept connections on `listener` forever.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("reading listener address")?;
        tracing::info!(
            addr = %local,
            ttl_secs = self.config.cache_ttl_secs,
            "serving 9P"
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "set_nodelay failed");
                    }
                    let connection = Connection::new(self.gateway.clone(), peer);
                    tokio::spawn(connection.serve(stream));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Bind, then serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}
