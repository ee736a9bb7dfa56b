//! The Gateway: shared state behind every connection.
//!
//! A gateway owns:
//! - The [`ResourceCache`] (one per process, shared by all sessions)
//! - The [`Resolver`] over that cache
//! - Node content: listings, rendered fields, the control file
//!
//! Connections get their own [`Session`] via [`Gateway::session`].

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResourceCache;
use crate::control::{render_status, ControlCommand};
use crate::fetch::ResourceFetcher;
use crate::resolver::Resolver;
use crate::session::Session;
use crate::vfs::{VfsError, VfsResult, VirtualNode};

/// Cache policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// How long a fetched record counts as fresh.
    pub cache_ttl: Duration,
    /// Upper bound on a single remote fetch.
    pub fetch_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared gateway state.
#[derive(Debug)]
pub struct Gateway {
    cache: Arc<ResourceCache>,
    resolver: Resolver,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, config: GatewayConfig) -> Self {
        let cache = Arc::new(ResourceCache::new(
            fetcher,
            config.cache_ttl,
            config.fetch_timeout,
        ));
        Self {
            resolver: Resolver::new(cache.clone()),
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn config(&self) -> GatewayConfig {
        self.config
    }

    /// Start a connection-scoped session with an empty fid table.
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(self.clone())
    }

    // ========================================================================
    // Node content
    // ========================================================================

    /// Full content of a node, as served by reads.
    ///
    /// Directories read as their child names, one per line.
    pub fn read_node(&self, node: &VirtualNode) -> VfsResult<Vec<u8>> {
        match node {
            VirtualNode::Field(field) => field.render(),
            VirtualNode::Control => Ok(render_status(&self.cache.stats())),
            dir => {
                let mut listing = String::new();
                for entry in self.resolver.entries(dir)? {
                    listing.push_str(&entry.name);
                    listing.push('\n');
                }
                Ok(listing.into_bytes())
            }
        }
    }

    /// Apply a write. Only the control file accepts data.
    pub async fn write_node(&self, node: &VirtualNode, data: &[u8]) -> VfsResult<usize> {
        if !node.is_writable() {
            return Err(VfsError::permission_denied(node.path()));
        }
        let cmd = ControlCommand::parse(data)?;
        self.control(cmd).await?;
        Ok(data.len())
    }

    /// Execute a control command against the cache.
    pub async fn control(&self, cmd: ControlCommand) -> VfsResult<()> {
        tracing::info!(%cmd, "control command");
        match cmd {
            ControlCommand::Flush => {
                let dropped = self.cache.clear();
                tracing::debug!(dropped, "cache flushed");
            }
            ControlCommand::Evict { kind, id } => {
                if !self.cache.evict(kind, &id) {
                    tracing::debug!(%kind, %id, "evict: not resident");
                }
            }
            ControlCommand::Refresh { kind, id } => {
                let hit = self
                    .cache
                    .force_refresh(kind, &id)
                    .await
                    .map_err(|e| VfsError::io(format!("refresh {kind} {id}: {e}")))?;
                if hit.stale {
                    return Err(VfsError::io(format!("refresh {kind} {id}: fetch failed")));
                }
            }
        }
        Ok(())
    }
}
