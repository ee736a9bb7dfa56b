//! Namespace resolution.
//!
//! Turns one path segment at a time into the next [`VirtualNode`]:
//!
//! ```text
//! Root ──characters──▶ Category ──<id>──▶ Resource ──<field>──▶ Field
//!   └────ctl────▶ Control
//! ```
//!
//! The `<id>` step fills the cache (and through it, calls the fetcher); the
//! `<field>` step binds the record that step produced.
//! Resolution never moves up the tree; `.` and `..` are not names.

use std::sync::Arc;

use chub9p_types::{ResourceKind, ResourceRecord, ROOT_ENTRIES};

use crate::cache::ResourceCache;
use crate::vfs::{DirEntry, FieldFile, Qid, VfsError, VfsResult, VirtualNode};

/// Result of a multi-segment walk.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    /// One qid per resolved segment.
    pub qids: Vec<Qid>,
    /// Last node reached (the start node if no segments were given).
    pub node: VirtualNode,
}

/// Resolves path segments against the virtual namespace.
#[derive(Debug, Clone)]
pub struct Resolver {
    cache: Arc<ResourceCache>,
}

impl Resolver {
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self { cache }
    }

    /// Resolve one segment from `current`.
    pub async fn resolve(
        &self,
        current: &VirtualNode,
        segment: &str,
    ) -> VfsResult<(VirtualNode, Qid)> {
        self.step(current, segment, &mut None).await
    }

    /// One resolution step. `carried` holds the record fetched by an
    /// id step earlier in the same walk, so the field step reuses it.
    async fn step(
        &self,
        current: &VirtualNode,
        segment: &str,
        carried: &mut Option<Arc<ResourceRecord>>,
    ) -> VfsResult<(VirtualNode, Qid)> {
        if !is_name(segment) {
            return Err(VfsError::not_found(current.child_path(segment)));
        }

        let next = match current {
            VirtualNode::Root => match segment {
                "ctl" => VirtualNode::Control,
                name => ResourceKind::from_category(name)
                    .map(VirtualNode::Category)
                    .ok_or_else(|| VfsError::not_found(current.child_path(name)))?,
            },
            VirtualNode::Category(kind) => {
                // Fetch failures and unknown ids look the same from here.
                let hit = match self.cache.get_or_fetch(*kind, segment).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        tracing::debug!(%kind, id = segment, error = %e, "resource did not resolve");
                        return Err(VfsError::not_found(current.child_path(segment)));
                    }
                };
                *carried = Some(hit.record);
                VirtualNode::Resource {
                    kind: *kind,
                    id: segment.to_string(),
                }
            }
            VirtualNode::Resource { kind, id } => {
                let field = kind
                    .field(segment)
                    .ok_or_else(|| VfsError::not_found(current.child_path(segment)))?;
                let record = match carried.take() {
                    Some(record) => record,
                    None => {
                        self.cache
                            .get_or_fetch(*kind, id)
                            .await
                            .map_err(|_| VfsError::not_found(current.child_path(segment)))?
                            .record
                    }
                };
                VirtualNode::Field(FieldFile {
                    kind: *kind,
                    id: id.clone(),
                    field,
                    record,
                })
            }
            VirtualNode::Field(_) | VirtualNode::Control => {
                return Err(VfsError::not_a_directory(current.path()));
            }
        };

        let qid = next.qid();
        Ok((next, qid))
    }

    /// Resolve `names` in order from `start`, stopping at the first failure.
    ///
    /// A failure on the first segment is an error. A later failure ends the
    /// walk early and the outcome covers only the resolved prefix.
    pub async fn walk<S: AsRef<str>>(
        &self,
        start: &VirtualNode,
        names: &[S],
    ) -> VfsResult<WalkOutcome> {
        let mut node = start.clone();
        let mut qids = Vec::with_capacity(names.len());
        let mut carried = None;

        for (i, name) in names.iter().enumerate() {
            match self.step(&node, name.as_ref(), &mut carried).await {
                Ok((next, qid)) => {
                    qids.push(qid);
                    node = next;
                }
                Err(e) if i == 0 => return Err(e),
                Err(e) => {
                    tracing::debug!(
                        resolved = i,
                        requested = names.len(),
                        error = %e,
                        "partial walk"
                    );
                    break;
                }
            }
        }

        Ok(WalkOutcome { qids, node })
    }

    /// Children of a directory node.
    ///
    /// Category directories list only resources resident in the cache.
    pub fn entries(&self, node: &VirtualNode) -> VfsResult<Vec<DirEntry>> {
        let parent = node.path();
        match node {
            VirtualNode::Root => Ok(ROOT_ENTRIES
                .iter()
                .map(|name| match *name {
                    "ctl" => DirEntry::file(&parent, *name),
                    _ => DirEntry::directory(&parent, *name),
                })
                .collect()),
            VirtualNode::Category(kind) => Ok(self
                .cache
                .list_ids(*kind)
                .into_iter()
                .map(|id| DirEntry::directory(&parent, id))
                .collect()),
            VirtualNode::Resource { kind, .. } => Ok(kind
                .fields()
                .iter()
                .map(|field| DirEntry::file(&parent, *field))
                .collect()),
            VirtualNode::Field(_) | VirtualNode::Control => Err(VfsError::not_a_directory(parent)),
        }
    }
}

/// A single, non-special path element.
fn is_name(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('/')
}
