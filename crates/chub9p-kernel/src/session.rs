//! Per-connection protocol operations.
//!
//! A [`Session`] is the fid table of one client connection. Each bound fid
//! holds its [`VirtualNode`] behind its own async mutex, so operations on one
//! fid run in order while different fids proceed independently.
//!
//! Fids move forward only. To change branches a client walks again from a
//! fid bound to the root.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::gateway::Gateway;
use crate::vfs::{DirEntry, Qid, VfsError, VfsResult, VirtualNode};

/// Client-chosen handle number.
pub type Fid = u32;

/// Metadata for a bound fid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStat {
    /// Last path element (`/` for the root).
    pub name: String,
    pub qid: Qid,
    /// Content length for files, 0 for directories.
    pub length: u64,
}

type Handle = Arc<Mutex<VirtualNode>>;

/// Fid table and operation handlers for one connection.
pub struct Session {
    gateway: Arc<Gateway>,
    fids: DashMap<Fid, Handle>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("fids", &self.fids.len())
            .finish()
    }
}

impl Session {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            fids: DashMap::new(),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Number of bound fids.
    pub fn fid_count(&self) -> usize {
        self.fids.len()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Bind `fid` to the namespace root.
    ///
    /// No authentication is performed, so an auth fid is refused.
    pub fn attach(&self, fid: Fid, afid: Option<Fid>, uname: &str) -> VfsResult<Qid> {
        if afid.is_some() {
            return Err(VfsError::AuthNotRequired);
        }
        self.bind(fid, VirtualNode::Root)?;
        tracing::debug!(fid, uname, "attach");
        Ok(VirtualNode::Root.qid())
    }

    /// Walk `names` from `fid` and bind the result to `newfid`.
    ///
    /// - no names: `newfid` becomes a clone of `fid`
    /// - first name fails: error, `newfid` left unbound
    /// - later name fails: `newfid` bound to the last node reached, and only
    ///   the resolved qids are returned
    ///
    /// `newfid == fid` moves `fid` itself.
    pub async fn walk<S: AsRef<str>>(
        &self,
        fid: Fid,
        newfid: Fid,
        names: &[S],
    ) -> VfsResult<Vec<Qid>> {
        let handle = self.handle(fid)?;
        if newfid != fid && self.fids.contains_key(&newfid) {
            return Err(VfsError::FidInUse(newfid));
        }

        let mut current = handle.lock().await;
        let outcome = self.gateway.resolver().walk(&current, names).await?;
        tracing::debug!(
            fid,
            newfid,
            from = %current.path(),
            to = %outcome.node.path(),
            resolved = outcome.qids.len(),
            "walk"
        );

        if newfid == fid {
            *current = outcome.node;
        } else {
            drop(current);
            self.bind(newfid, outcome.node)?;
        }
        Ok(outcome.qids)
    }

    /// Read up to `count` bytes at `offset`.
    ///
    /// An offset at or past the end is EOF: an empty result, not an error.
    pub async fn read(&self, fid: Fid, offset: u64, count: u32) -> VfsResult<Vec<u8>> {
        let handle = self.handle(fid)?;
        let node = handle.lock().await;
        let content = self.gateway.read_node(&node)?;
        Ok(slice_at(&content, offset, count).to_vec())
    }

    /// Write `data` to `fid`. Returns the number of bytes consumed.
    ///
    /// Only `/ctl` is writable; it ignores `offset`.
    pub async fn write(&self, fid: Fid, offset: u64, data: &[u8]) -> VfsResult<usize> {
        let handle = self.handle(fid)?;
        let node = handle.lock().await;
        tracing::debug!(fid, offset, len = data.len(), path = %node.path(), "write");
        self.gateway.write_node(&node, data).await
    }

    /// Release `fid`.
    pub fn clunk(&self, fid: Fid) -> VfsResult<()> {
        self.fids
            .remove(&fid)
            .map(|_| ())
            .ok_or(VfsError::UnknownFid(fid))
    }

    pub async fn stat(&self, fid: Fid) -> VfsResult<NodeStat> {
        let handle = self.handle(fid)?;
        let node = handle.lock().await;
        let length = if node.is_dir() {
            0
        } else {
            self.gateway.read_node(&node)?.len() as u64
        };
        Ok(NodeStat {
            name: node.name(),
            qid: node.qid(),
            length,
        })
    }

    /// Children of the directory bound to `fid`.
    pub async fn entries(&self, fid: Fid) -> VfsResult<Vec<DirEntry>> {
        let handle = self.handle(fid)?;
        let node = handle.lock().await;
        self.gateway.resolver().entries(&node)
    }

    /// Snapshot of the node bound to `fid`.
    pub async fn node(&self, fid: Fid) -> VfsResult<VirtualNode> {
        let handle = self.handle(fid)?;
        let node = handle.lock().await;
        Ok(node.clone())
    }

    // ========================================================================
    // Fid table
    // ========================================================================

    fn handle(&self, fid: Fid) -> VfsResult<Handle> {
        self.fids
            .get(&fid)
            .map(|h| h.value().clone())
            .ok_or(VfsError::UnknownFid(fid))
    }

    fn bind(&self, fid: Fid, node: VirtualNode) -> VfsResult<()> {
        match self.fids.entry(fid) {
            Entry::Occupied(_) => Err(VfsError::FidInUse(fid)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(node)));
                Ok(())
            }
        }
    }
}

/// `content[offset .. min(offset + count, len)]`, empty past the end.
fn slice_at(content: &[u8], offset: u64, count: u32) -> &[u8] {
    let len = content.len();
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
    let end = start.saturating_add(count as usize).min(len);
    &content[start..end]
}
