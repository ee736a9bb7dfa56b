//! Virtual namespace nodes.
//!
//! Nodes are built on demand by each walk step and never stored beyond the
//! fid that binds them. Only [`FieldFile`] carries resource data, and only a
//! shared reference to the record that was resolved during the walk.

use std::sync::Arc;

use chub9p_types::{ResourceKind, ResourceRecord};

use super::error::VfsResult;
use super::types::{join_path, FileType, Qid};

/// A field file bound to its already-resolved record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFile {
    pub kind: ResourceKind,
    pub id: String,
    pub field: &'static str,
    pub record: Arc<ResourceRecord>,
}

impl FieldFile {
    /// Render the field's content from the bound record.
    pub fn render(&self) -> VfsResult<Vec<u8>> {
        Ok(self.record.render(self.field)?)
    }
}

/// A node in the virtual namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualNode {
    /// `/`
    Root,
    /// `/characters`, `/lorebooks`, `/sessions`
    Category(ResourceKind),
    /// `/<category>/<id>`
    Resource { kind: ResourceKind, id: String },
    /// `/<category>/<id>/<field>`
    Field(FieldFile),
    /// `/ctl`
    Control,
}

impl VirtualNode {
    /// Absolute, normalized path of this node.
    pub fn path(&self) -> String {
        match self {
            VirtualNode::Root => "/".to_string(),
            VirtualNode::Category(kind) => format!("/{}", kind.category()),
            VirtualNode::Resource { kind, id } => format!("/{}/{}", kind.category(), id),
            VirtualNode::Field(f) => format!("/{}/{}/{}", f.kind.category(), f.id, f.field),
            VirtualNode::Control => "/ctl".to_string(),
        }
    }

    /// Last path element (`/` for the root).
    pub fn name(&self) -> String {
        match self {
            VirtualNode::Root => "/".to_string(),
            VirtualNode::Category(kind) => kind.category().to_string(),
            VirtualNode::Resource { id, .. } => id.clone(),
            VirtualNode::Field(f) => f.field.to_string(),
            VirtualNode::Control => "ctl".to_string(),
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            VirtualNode::Root | VirtualNode::Category(_) | VirtualNode::Resource { .. } => {
                FileType::Directory
            }
            VirtualNode::Field(_) | VirtualNode::Control => FileType::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type().is_dir()
    }

    /// Stable identity of this node's path.
    pub fn qid(&self) -> Qid {
        Qid::for_path(&self.path(), self.file_type())
    }

    /// Path of a child entry.
    pub fn child_path(&self, name: &str) -> String {
        join_path(&self.path(), name)
    }

    /// Whether this node accepts writes.
    pub fn is_writable(&self) -> bool {
        matches!(self, VirtualNode::Control)
    }
}
