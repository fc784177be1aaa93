//! Coalescing of DOM mutations into at most one rescan per animation frame.
//!
//! The observer callback reports each mutation record here. The first
//! relevant record asks for an animation frame; everything else arriving
//! before that frame folds into the same batch.

use std::collections::BTreeSet;

use crate::scanner::{
    ATTR_BLOCK_ADD, ATTR_BLOCK_READONLY, ATTR_BLOCK_SELECTOR, ATTR_BLOCK_UID, ATTR_EDITABLE_FIELD,
    ATTR_LINKABLE_ALLOW, ATTR_LINKABLE_FIELD, ATTR_MEDIA_FIELD, ATTR_NODE_ID,
};
use crate::types::BlockId;

/// Attributes whose changes alter the scan.
pub const WATCHED_ATTRIBUTES: &[&str] = &[
    ATTR_BLOCK_UID,
    ATTR_EDITABLE_FIELD,
    ATTR_MEDIA_FIELD,
    ATTR_LINKABLE_FIELD,
    ATTR_LINKABLE_ALLOW,
    ATTR_BLOCK_READONLY,
    ATTR_BLOCK_ADD,
    ATTR_BLOCK_SELECTOR,
    ATTR_NODE_ID,
];

/// One mutation record, reduced to what the bridge cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Nodes added or removed.
    ChildList { block: Option<BlockId> },
    Attribute { name: String, block: Option<BlockId> },
    /// Text or comment data changed.
    CharacterData { block: Option<BlockId>, comment: bool },
}

/// Everything that changed since the last frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    /// Blocks containing a change; empty with `page` set for changes outside blocks.
    pub blocks: BTreeSet<BlockId>,
    pub page: bool,
    /// Markers may have changed and the scan must be redone.
    pub structural: bool,
    pub records: usize,
}

impl Batch {
    /// Only text changed inside known blocks.
    pub fn is_text_only(&self) -> bool {
        !self.structural
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameCoalescer {
    batch: Option<Batch>,
    frame_requested: bool,
}

impl FrameCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation. Returns `true` when the caller must request an
    /// animation frame.
    pub fn note(&mut self, mutation: Mutation) -> bool {
        let (block, structural) = match mutation {
            Mutation::ChildList { block } => (block, true),
            Mutation::Attribute { name, block } => {
                if !WATCHED_ATTRIBUTES.contains(&name.as_str()) {
                    return false;
                }
                (block, true)
            }
            // Comment data can hold pragmas.
            Mutation::CharacterData { block, comment } => (block, comment),
        };
        let batch = self.batch.get_or_insert_with(Batch::default);
        batch.records += 1;
        batch.structural |= structural;
        match block {
            Some(id) => {
                batch.blocks.insert(id);
            }
            None => batch.page = true,
        }
        if self.frame_requested {
            return false;
        }
        self.frame_requested = true;
        true
    }

    /// The animation frame fired: hand out the batch.
    pub fn take(&mut self) -> Option<Batch> {
        self.frame_requested = false;
        let batch = self.batch.take();
        if let Some(b) = &batch {
            tracing::trace!(records = b.records, blocks = b.blocks.len(), structural = b.structural, "mutation batch");
        }
        batch
    }

    pub fn is_pending(&self) -> bool {
        self.batch.is_some()
    }
}
