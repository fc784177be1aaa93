//! Error types for bridge operations.

use smol_str::SmolStr;
use thiserror::Error;

use crate::types::{BlockId, SlotName};

/// Errors from block tree lookups and mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeError {
    /// Block id not present in the tree.
    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),

    /// Block id already present in the tree.
    #[error("duplicate block id: {0}")]
    DuplicateBlock(BlockId),

    /// Slot does not exist on the parent.
    #[error("block {parent:?} has no slot {slot}")]
    UnknownSlot {
        parent: Option<BlockId>,
        slot: SlotName,
    },

    /// A block is listed in zero or more than one slot.
    #[error("block {id} is listed in {count} slots")]
    SlotMembership { id: BlockId, count: usize },

    /// `parentId` disagrees with the slot the block is listed in.
    #[error("block {id} claims parent {claimed:?} but is listed under {actual:?}")]
    ParentMismatch {
        id: BlockId,
        claimed: Option<BlockId>,
        actual: Option<BlockId>,
    },

    /// Moving a block into itself or one of its descendants.
    #[error("cannot move {id} into its own subtree")]
    Cycle { id: BlockId },

    /// A field path walked past the page root.
    #[error("field path {0} escapes the page root")]
    FieldPathEscapes(SmolStr),

    /// Malformed field path.
    #[error("invalid field path: {0:?}")]
    InvalidFieldPath(String),
}

/// Structural edits rejected by a slot's container rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContainerError {
    /// Block type not in the slot's allowed set.
    #[error("type {block_type} is not allowed in slot {slot}")]
    TypeNotAllowed {
        slot: SlotName,
        block_type: SmolStr,
    },

    /// Adding would exceed the slot maximum.
    #[error("slot {slot} already holds its maximum of {max} blocks")]
    MaxExceeded { slot: SlotName, max: usize },

    /// The block is not a child of the slot being edited.
    #[error("block {0} is not in this slot")]
    NotInSlot(BlockId),

    /// Table operation on a column that does not exist.
    #[error("column {column} out of range (table has {columns} columns)")]
    ColumnOutOfRange { column: usize, columns: usize },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Rich-text model errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RichTextError {
    /// No element with this node id.
    #[error("unknown node id: {0}")]
    UnknownNode(SmolStr),

    /// Offset past the end of the node's text.
    #[error("offset {offset} out of range for node {node_id} (len {len})")]
    OffsetOutOfRange {
        node_id: SmolStr,
        offset: usize,
        len: usize,
    },

    /// The node does not hold inline content.
    #[error("node {0} is not a text block")]
    NotTextBlock(SmolStr),

    /// Range endpoints in different text blocks.
    #[error("range spans multiple text blocks")]
    CrossBlockRange,

    /// Field value is not a rich-text document.
    #[error("invalid rich text value: {0}")]
    InvalidValue(String),
}

/// Mode/session resolution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// Frame name carries the hydra prefix but no usable origin.
    #[error("malformed frame name: {0:?}")]
    MalformedFrameName(String),

    /// Admin origin is not a valid URL origin.
    #[error("invalid admin origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

/// Message channel errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Envelope could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport failed to deliver.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Serialization(e.to_string())
    }
}

/// Top-level error for bridge operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BridgeError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    RichText(#[from] RichTextError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Edit targets a readonly field or block.
    #[error("block {block_id} field {field} is readonly")]
    Readonly { block_id: BlockId, field: SmolStr },

    /// Operation requires edit mode.
    #[error("bridge is not in edit mode")]
    NotEditing,
}
