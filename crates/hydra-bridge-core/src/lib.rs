//! hydra-bridge-core: platform-independent logic of the hydra editing bridge.
//!
//! This crate provides:
//! - the cross-window message protocol and session-checked `Channel`
//! - mode/session resolution from the iframe name
//! - the DOM annotation scanner, generic over the `DomTree` trait
//! - the rich-text node tree with its DOM mapper and input translation
//! - overlay geometry, drag-and-drop and container rules
//! - `Bridge`, the frontend-side controller tying them together
//!
//! `MemoryDom` implements `DomTree` natively so all of it is testable without
//! a browser.

pub mod batch;
pub mod block;
pub mod bridge;
pub mod container;
pub mod dom;
pub mod drag;
pub mod error;
pub mod overlay;
pub mod pragma;
pub mod protocol;
pub mod richtext;
pub mod scanner;
pub mod schema;
pub mod session;
pub mod types;

pub use batch::{Batch, FrameCoalescer, Mutation, WATCHED_ATTRIBUTES};
pub use block::{Block, BlockTree, FieldOwner, FieldPath, FieldTarget, SlotPosition};
pub use bridge::{Bridge, BridgeEvent, FieldRef, PendingCaret};
pub use container::{CHOOSER_TYPE, ContainerResolver, InsertionChoice, RemovePlan};
pub use dom::{DomTree, MemoryDom, NodeKind, NodeRef};
pub use drag::{DragEngine, DragFrame, DragSession, DropEdge, DropTarget, MoveIntent, classify};
pub use error::{
    BridgeError, ContainerError, ProtocolError, RichTextError, SessionError, TreeError,
};
pub use overlay::{
    OutlineStyle, OverlayLayout, PointerKind, SelectionResolver, compute_overlay, resolve_add_side,
};
pub use pragma::{Pragma, PragmaAttrs, PragmaError, parse_comment};
pub use protocol::{
    BlockAction, Channel, Envelope, FormatOp, Message, RecordingTransport, ResyncTracker,
    Transport,
};
pub use richtext::{InputAction, Mark, RichText, TextEdit, TextPoint, TextRange};
pub use scanner::{
    DomMarkers, ScanResult, ScanWarning, ScannedBlock, ScannedField, ScannedTree, scan,
};
pub use schema::{BridgeConfig, DragConfig, OverlayConfig, SchemaRegistry, SlotSpec};
pub use session::{Mode, ModeController, SessionContext, SessionTag, TokenStore};
pub use smol_str::SmolStr;
pub use types::{AddSide, BlockId, Orientation, Point, Rect, SlotName};
