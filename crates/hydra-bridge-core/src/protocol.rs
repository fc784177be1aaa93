//! Cross-window message protocol.
//!
//! Every message is a self-contained envelope `{type, payload, sessionTag}`.
//! Delivery is at-most-once and unordered-safe: nothing here depends on an
//! earlier message having arrived. The only recovery mechanism is a full
//! resync, answered with the admin UI's complete canonical tree.

use std::cell::RefCell;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use web_time::Instant;

use crate::block::BlockTree;
use crate::error::ProtocolError;
use crate::richtext::{Mark, TextEdit, TextPoint, TextRange};
use crate::session::{SessionContext, SessionTag};
use crate::types::{AddSide, BlockId, Rect, SlotName};

/// How long a resync request may stay unanswered before another is allowed.
pub const RESYNC_TIMEOUT: Duration = Duration::from_secs(5);

// === Payloads ===

/// Frontend handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub allowed_blocks: Vec<SmolStr>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathChangePayload {
    /// Path after the frontend's `pathToApiPath` transform.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditChangePayload {
    pub tree: BlockTree,
    /// `tree.blocks` holds only changed blocks; `root` and `metadata` are
    /// complete either way.
    #[serde(default)]
    pub partial: bool,
    /// Block the admin UI wants selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<BlockId>,
}

/// Structural actions, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BlockAction {
    #[serde(rename_all = "camelCase")]
    Select { block_id: Option<BlockId> },
    #[serde(rename_all = "camelCase")]
    SelectParent { block_id: BlockId },
    /// Add a block after `after` (or at the end of the slot).
    #[serde(rename_all = "camelCase")]
    Add {
        parent_id: Option<BlockId>,
        slot: SlotName,
        after: Option<BlockId>,
        /// `None` asks the admin UI to open its chooser.
        block_type: Option<SmolStr>,
    },
    #[serde(rename_all = "camelCase")]
    Move {
        block_id: BlockId,
        new_parent_id: Option<BlockId>,
        new_slot: SlotName,
        before_block_id: Option<BlockId>,
    },
    #[serde(rename_all = "camelCase")]
    Copy { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    Remove { block_id: BlockId },
}

/// Field change from the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdatePayload {
    /// `None` for page-level fields.
    pub block_id: Option<BlockId>,
    /// Field path as annotated.
    pub field: SmolStr,
    /// Full new value of the field.
    pub value: Value,
    /// Text edits that produced `value`, for rich-text fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<TextEdit>,
    /// Caret after the edit, restored once the re-render arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caret: Option<TextPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatOp {
    Apply,
    Remove,
    Toggle,
}

/// Toolbar formatting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatActionPayload {
    pub op: FormatOp,
    pub mark: Mark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequestPayload {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponsePayload {
    pub tree: BlockTree,
}

/// Selection inside a rich-text field, for toolbar state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangePayload {
    pub block_id: Option<BlockId>,
    pub field: SmolStr,
    pub range: Option<TextRange>,
    pub active_marks: Vec<Mark>,
}

/// Geometry of the selected block in iframe viewport coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGeometryPayload {
    pub block_id: BlockId,
    pub rect: Rect,
    /// Visible iframe viewport (`0, 0, innerWidth, innerHeight`).
    pub viewport: Rect,
    pub add_side: AddSide,
}

// === Messages ===

/// All message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Init(InitPayload),
    PathChange(PathChangePayload),
    EditChange(EditChangePayload),
    BlockAction(BlockAction),
    BlockUpdate(BlockUpdatePayload),
    FormatAction(FormatActionPayload),
    ResyncRequest(ResyncRequestPayload),
    ResyncResponse(ResyncResponsePayload),
    SelectionChange(SelectionChangePayload),
    BlockGeometry(BlockGeometryPayload),
}

impl Message {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Init(_) => "INIT",
            Message::PathChange(_) => "PATH_CHANGE",
            Message::EditChange(_) => "EDIT_CHANGE",
            Message::BlockAction(_) => "BLOCK_ACTION",
            Message::BlockUpdate(_) => "BLOCK_UPDATE",
            Message::FormatAction(_) => "FORMAT_ACTION",
            Message::ResyncRequest(_) => "RESYNC_REQUEST",
            Message::ResyncResponse(_) => "RESYNC_RESPONSE",
            Message::SelectionChange(_) => "SELECTION_CHANGE",
            Message::BlockGeometry(_) => "BLOCK_GEOMETRY",
        }
    }
}

/// A message stamped with its session tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub message: Message,
    pub session_tag: SessionTag,
}

impl Envelope {
    pub fn new(message: Message, session_tag: SessionTag) -> Self {
        Self {
            message,
            session_tag,
        }
    }

    pub fn to_json(&self) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: Value) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }
}

// === Transport ===

/// Outbound delivery of envelopes to the other window.
pub trait Transport {
    fn post(&self, envelope: &Envelope) -> Result<(), ProtocolError>;
}

/// Transport that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: RefCell<Vec<Envelope>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain recorded envelopes.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    /// Messages sent so far, without draining.
    pub fn messages(&self) -> Vec<Message> {
        self.sent.borrow().iter().map(|e| e.message.clone()).collect()
    }
}

impl Transport for RecordingTransport {
    fn post(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        self.sent.borrow_mut().push(envelope.clone());
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        (**self).post(envelope)
    }
}

impl<T: Transport + ?Sized> Transport for std::rc::Rc<T> {
    fn post(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        (**self).post(envelope)
    }
}

// === Resync ===

/// Allows at most one outstanding resync request.
#[derive(Debug, Clone, Default)]
pub struct ResyncTracker {
    outstanding: Option<Instant>,
}

impl ResyncTracker {
    /// Whether a request may be sent now; marks one outstanding if so.
    pub fn try_begin(&mut self) -> bool {
        self.try_begin_at(Instant::now())
    }

    fn try_begin_at(&mut self, now: Instant) -> bool {
        match self.outstanding {
            Some(sent) if now.duration_since(sent) < RESYNC_TIMEOUT => false,
            _ => {
                self.outstanding = Some(now);
                true
            }
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn clear(&mut self) {
        self.outstanding = None;
    }
}

// === Channel ===

/// Session-checked message channel over a transport.
pub struct Channel<T: Transport> {
    transport: T,
    context: SessionContext,
    resync: ResyncTracker,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, context: SessionContext) -> Self {
        Self {
            transport,
            context,
            resync: ResyncTracker::default(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Replace the session after navigation; any pending resync is forgotten.
    pub fn set_context(&mut self, context: SessionContext) {
        self.context = context;
        self.resync.clear();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn send(&self, message: Message) -> Result<(), ProtocolError> {
        tracing::trace!(kind = message.kind(), "send");
        self.transport
            .post(&Envelope::new(message, self.context.tag.clone()))
    }

    /// Send a resync request unless one is already outstanding.
    pub fn request_resync(&mut self, reason: &str) -> Result<bool, ProtocolError> {
        if !self.resync.try_begin() {
            tracing::debug!(reason, "resync already outstanding");
            return Ok(false);
        }
        tracing::info!(reason, "requesting resync");
        self.send(Message::ResyncRequest(ResyncRequestPayload {
            reason: reason.to_string(),
        }))?;
        Ok(true)
    }

    pub fn resync_outstanding(&self) -> bool {
        self.resync.is_outstanding()
    }

    /// Accept an incoming envelope. Envelopes from another origin or another
    /// session are dropped.
    pub fn accept(&mut self, origin: &str, envelope: Envelope) -> Option<Message> {
        if origin != self.context.admin_origin {
            tracing::debug!(origin, expected = %self.context.admin_origin, "dropping message from foreign origin");
            return None;
        }
        if envelope.session_tag != self.context.tag {
            tracing::debug!(
                kind = envelope.message.kind(),
                tag = %envelope.session_tag,
                "dropping message for stale session"
            );
            return None;
        }
        match &envelope.message {
            Message::ResyncResponse(_) => self.resync.clear(),
            Message::EditChange(change) if !change.partial => self.resync.clear(),
            _ => {}
        }
        Some(envelope.message)
    }

    /// Decode and accept a raw message. Undecodable data is dropped.
    pub fn accept_json(&mut self, origin: &str, raw: Value) -> Option<Message> {
        match Envelope::from_json(raw) {
            Ok(envelope) => self.accept(origin, envelope),
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> SessionContext {
        SessionContext::from_frame_name("hydra-edit:https://admin.example")
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope::new(
            Message::BlockAction(BlockAction::Move {
                block_id: "x".into(),
                new_parent_id: Some("a".into()),
                new_slot: "blocks".into(),
                before_block_id: None,
            }),
            context().tag,
        );
        assert_eq!(
            env.to_json().unwrap(),
            json!({
                "type": "BLOCK_ACTION",
                "payload": {
                    "action": "move",
                    "blockId": "x",
                    "newParentId": "a",
                    "newSlot": "blocks",
                    "beforeBlockId": null
                },
                "sessionTag": "edit:https://admin.example"
            })
        );
    }

    #[test]
    fn test_decode_edit_change() {
        let env = Envelope::from_json(json!({
            "type": "EDIT_CHANGE",
            "payload": {"tree": {"blocks": {}, "root": {"blocks": []}}},
            "sessionTag": "edit:https://admin.example"
        }))
        .unwrap();
        assert!(matches!(env.message, Message::EditChange(EditChangePayload { partial: false, .. })));
    }

    #[test]
    fn test_stale_session_is_dropped() {
        let transport = RecordingTransport::new();
        let mut channel = Channel::new(&transport, context());
        let stale = Envelope::new(
            Message::FormatAction(FormatActionPayload {
                op: FormatOp::Toggle,
                mark: Mark::Strong,
            }),
            SessionTag("view:https://admin.example".into()),
        );
        assert_eq!(channel.accept("https://admin.example", stale.clone()), None);

        let fresh = Envelope::new(stale.message.clone(), context().tag);
        assert_eq!(channel.accept("https://evil.example", fresh.clone()), None);
        assert!(channel.accept("https://admin.example", fresh).is_some());
    }

    #[test]
    fn test_garbage_is_dropped() {
        let transport = RecordingTransport::new();
        let mut channel = Channel::new(&transport, context());
        assert_eq!(channel.accept_json("https://admin.example", json!({"type": "NOPE"})), None);
        assert_eq!(channel.accept_json("https://admin.example", json!("hello")), None);
    }

    #[test]
    fn test_single_outstanding_resync() {
        let transport = RecordingTransport::new();
        let mut channel = Channel::new(&transport, context());
        assert!(channel.request_resync("caret lost").unwrap());
        assert!(!channel.request_resync("again").unwrap());
        assert_eq!(transport.take().len(), 1);

        let response = Envelope::new(
            Message::ResyncResponse(ResyncResponsePayload {
                tree: BlockTree::new(),
            }),
            context().tag,
        );
        channel.accept("https://admin.example", response);
        assert!(!channel.resync_outstanding());
        assert!(channel.request_resync("later").unwrap());
    }

    #[test]
    fn test_resync_times_out() {
        let mut tracker = ResyncTracker::default();
        let start = Instant::now();
        assert!(tracker.try_begin_at(start));
        assert!(!tracker.try_begin_at(start + Duration::from_secs(1)));
        assert!(tracker.try_begin_at(start + RESYNC_TIMEOUT));
    }
}
