//! Frontend-side bridge controller.
//!
//! Owns everything the iframe knows about the page: the session, the last
//! tree received from the admin UI (with placeholders in edit mode), the last
//! scan, the block selection, the drag session and the caret waiting to be
//! restored. Incoming envelopes become [`BridgeEvent`]s for the host; user
//! gestures become outgoing messages after the readonly and container checks.
//!
//! The tree held here is a read copy. Local edits are applied to it so that
//! consecutive keystrokes build on each other, but the next `EDIT_CHANGE`
//! replaces it wholesale.

use serde_json::Value;
use smol_str::SmolStr;

use crate::block::{BlockTree, FieldOwner, FieldPath, FieldTarget};
use crate::container::{ContainerResolver, InsertionChoice};
use crate::dom::DomTree;
use crate::drag::{DragEngine, DragFrame, MoveIntent};
use crate::error::{BridgeError, RichTextError, TreeError};
use crate::overlay::{PointerKind, SelectionResolver, resolve_add_side};
use crate::protocol::{
    BlockAction, BlockGeometryPayload, BlockUpdatePayload, Channel, EditChangePayload, FormatOp,
    InitPayload, Message, PathChangePayload, SelectionChangePayload, Transport,
};
use crate::richtext::{
    InputAction, Mark, RichText, TextEdit, TextPoint, TextRange, derive_text_edits, toggle_mark,
    translate_input,
};
use crate::scanner::{BlockSelectorTarget, ScanResult, ScannedTree, UnfilledSlot, scan};
use crate::schema::{BridgeConfig, SchemaRegistry};
use crate::session::SessionContext;
use crate::types::{AddSide, BlockId, Point, Rect};

/// A field as annotated in the DOM: owning block plus the path written in
/// the markup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub block_id: Option<BlockId>,
    pub path: SmolStr,
}

impl FieldRef {
    pub fn new(block_id: Option<&str>, path: &str) -> Self {
        Self {
            block_id: block_id.map(BlockId::from),
            path: path.into(),
        }
    }
}

/// Caret to put back once the admin UI echoes an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCaret {
    pub field: FieldRef,
    pub caret: TextPoint,
}

/// Things the host must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Re-render from this tree. Placeholders are included in edit mode.
    Render { tree: BlockTree, partial: bool },
    /// Block selection changed.
    Selected(Option<BlockId>),
}

pub struct Bridge<T: Transport> {
    channel: Channel<T>,
    registry: SchemaRegistry,
    tree: BlockTree,
    scanned: ScannedTree,
    /// Slots below their minimum that the frontend rendered empty.
    unfilled: Vec<UnfilledSlot>,
    selection: SelectionResolver,
    drag: DragEngine,
    text_selection: Option<(FieldRef, TextRange)>,
    pending_caret: Option<PendingCaret>,
    /// An update was sent and its `EDIT_CHANGE` has not arrived.
    awaiting_echo: bool,
}

impl<T: Transport> Bridge<T> {
    pub fn new(transport: T, context: SessionContext, config: BridgeConfig) -> Self {
        let drag = DragEngine::new(config.drag.clone());
        Self {
            channel: Channel::new(transport, context),
            registry: SchemaRegistry::new(config),
            tree: BlockTree::new(),
            scanned: ScannedTree::default(),
            unfilled: Vec::new(),
            selection: SelectionResolver::new(),
            drag,
            text_selection: None,
            pending_caret: None,
            awaiting_echo: false,
        }
    }

    pub fn context(&self) -> &SessionContext {
        self.channel.context()
    }

    pub fn is_editing(&self) -> bool {
        self.channel.context().is_editing()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn tree(&self) -> &BlockTree {
        &self.tree
    }

    /// Required slots the last scan found empty. Edit mode only.
    pub fn unfilled_slots(&self) -> &[UnfilledSlot] {
        &self.unfilled
    }

    pub fn scanned(&self) -> &ScannedTree {
        &self.scanned
    }

    pub fn selected(&self) -> Option<&BlockId> {
        self.selection.selected()
    }

    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    pub fn pending_caret(&self) -> Option<&PendingCaret> {
        self.pending_caret.as_ref()
    }

    fn require_editing(&self) -> Result<(), BridgeError> {
        if self.is_editing() {
            Ok(())
        } else {
            Err(BridgeError::NotEditing)
        }
    }

    fn require_editable(&self, field: &FieldRef) -> Result<(), BridgeError> {
        self.require_editing()?;
        if self.scanned.is_editable(field.block_id.as_deref(), &field.path) {
            return Ok(());
        }
        tracing::debug!(block = ?field.block_id, field = %field.path, "edit on readonly field dropped");
        Err(BridgeError::Readonly {
            block_id: field.block_id.clone().unwrap_or_default(),
            field: field.path.clone(),
        })
    }

    // === Session ===

    /// Handshake after load.
    pub fn announce(&self, path: &str) -> Result<(), BridgeError> {
        self.channel.send(Message::Init(InitPayload {
            allowed_blocks: self.registry.config().allowed_blocks.clone(),
            path: path.to_string(),
        }))?;
        Ok(())
    }

    /// Client-side navigation. `path` is already transformed for the API.
    pub fn navigate(&mut self, path: &str, context: SessionContext) -> Result<(), BridgeError> {
        if &context != self.channel.context() {
            tracing::info!(tag = %context.tag, "session context replaced");
            self.channel.set_context(context);
        }
        self.selection.clear();
        self.drag.cancel();
        self.text_selection = None;
        self.pending_caret = None;
        self.awaiting_echo = false;
        self.channel.send(Message::PathChange(PathChangePayload {
            path: path.to_string(),
        }))?;
        Ok(())
    }

    // === Incoming ===

    /// Handle a raw `message` event payload.
    pub fn handle(&mut self, origin: &str, raw: Value) -> Vec<BridgeEvent> {
        match self.channel.accept_json(origin, raw) {
            Some(message) => self.receive(message),
            None => Vec::new(),
        }
    }

    /// Handle an accepted message.
    pub fn receive(&mut self, message: Message) -> Vec<BridgeEvent> {
        match message {
            Message::EditChange(EditChangePayload {
                tree,
                partial,
                selected,
            }) => {
                let mut events = self.receive_tree(tree, partial);
                if let Some(id) = selected {
                    if self.selection.select(Some(id.clone())) {
                        events.push(BridgeEvent::Selected(Some(id)));
                    }
                }
                events
            }
            Message::ResyncResponse(payload) => {
                tracing::info!("resync received");
                self.receive_tree(payload.tree, false)
            }
            Message::BlockAction(BlockAction::Select { block_id }) => {
                if self.selection.select(block_id.clone()) {
                    vec![BridgeEvent::Selected(block_id)]
                } else {
                    Vec::new()
                }
            }
            Message::BlockAction(BlockAction::SelectParent { block_id }) => {
                self.selection.select(Some(block_id));
                match self.selection.select_parent(&self.scanned) {
                    Some(parent) => vec![BridgeEvent::Selected(Some(parent))],
                    None => Vec::new(),
                }
            }
            Message::FormatAction(payload) => {
                if let Err(e) = self.format(payload.op, payload.mark) {
                    tracing::debug!(error = %e, "format action not applied");
                }
                Vec::new()
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring message");
                Vec::new()
            }
        }
    }

    fn receive_tree(&mut self, tree: BlockTree, partial: bool) -> Vec<BridgeEvent> {
        if partial {
            let BlockTree {
                blocks,
                root,
                metadata,
            } = tree;
            self.tree.blocks.extend(blocks);
            self.tree.root = root;
            self.tree.metadata = metadata;
            prune_unreachable(&mut self.tree);
        } else {
            self.tree = tree;
        }
        if self.is_editing() {
            ContainerResolver::new(&self.registry).ensure_min(&mut self.tree);
        }
        self.awaiting_echo = false;
        if let Err(e) = self.tree.validate() {
            tracing::warn!(error = %e, "received tree is inconsistent");
            self.request_resync(&format!("inconsistent tree: {e}"));
        }
        vec![BridgeEvent::Render {
            tree: self.tree.clone(),
            partial,
        }]
    }

    /// Ask the admin UI for the full tree. Failures are logged.
    pub fn request_resync(&mut self, reason: &str) {
        if let Err(e) = self.channel.request_resync(reason) {
            tracing::warn!(error = %e, "resync request failed");
        }
    }

    // === Scanning ===

    /// Rescan after a mutation batch.
    pub fn rescan<D: DomTree + ?Sized>(&mut self, dom: &D, root: &D::Node) -> ScanResult<D::Node> {
        let result = scan(dom, root, &self.registry, Some(&self.tree));
        for warning in &result.warnings {
            tracing::warn!(warning = %warning, "scan");
        }
        self.scanned = result.tree.clone();
        self.unfilled = if self.is_editing() {
            self.scanned.unfilled_slots(&self.registry, &self.tree)
        } else {
            Vec::new()
        };
        for slot in &self.unfilled {
            tracing::warn!(parent = ?slot.parent, slot = %slot.slot, "required slot rendered no placeholder");
        }
        if self.selection.retain(&self.scanned) {
            self.send_select(None);
        }
        result
    }

    /// Caret to restore after the echo of the last edit was rendered.
    ///
    /// `None` while the echo is outstanding or when there is nothing to
    /// restore. A caret that cannot be placed triggers a resync.
    pub fn take_caret(&mut self) -> Option<(FieldRef, TextPoint)> {
        if self.awaiting_echo {
            return None;
        }
        let pending = self.pending_caret.take()?;
        let restored = self
            .rich_value(&pending.field)
            .ok()
            .and_then(|(_, doc)| doc.restore_caret(&pending.caret));
        match restored {
            Some(point) => Some((pending.field, point)),
            None => {
                self.request_resync("caret lost");
                None
            }
        }
    }

    // === Field edits ===

    fn resolve(&self, field: &FieldRef) -> Result<FieldTarget, BridgeError> {
        let path = FieldPath::parse(&field.path)?;
        match &field.block_id {
            Some(id) => Ok(self.tree.resolve_field(id, &path)?),
            None => Ok(FieldTarget {
                owner: FieldOwner::Page,
                field: path.field().clone(),
            }),
        }
    }

    fn rich_value(&self, field: &FieldRef) -> Result<(FieldTarget, RichText), BridgeError> {
        let target = self.resolve(field)?;
        let value = self
            .tree
            .field_value(&target)
            .ok_or_else(|| RichTextError::InvalidValue(format!("field {} has no value", target.field)))?;
        Ok((target, RichText::from_value(value)?))
    }

    fn store(&mut self, target: &FieldTarget, value: Value) {
        let fields = match &target.owner {
            FieldOwner::Page => Some(&mut self.tree.metadata),
            FieldOwner::Block(id) => self.tree.get_mut(id).map(|b| &mut b.fields),
        };
        if let Some(fields) = fields {
            fields.insert(target.field.to_string(), value);
        }
    }

    fn send_update(
        &mut self,
        target: &FieldTarget,
        value: Value,
        edits: Vec<TextEdit>,
        caret: Option<TextPoint>,
    ) -> Result<(), BridgeError> {
        let block_id = match &target.owner {
            FieldOwner::Block(id) => Some(id.clone()),
            FieldOwner::Page => None,
        };
        self.store(target, value.clone());
        self.channel.send(Message::BlockUpdate(BlockUpdatePayload {
            block_id,
            field: target.field.clone(),
            value,
            edits,
            caret,
        }))?;
        self.awaiting_echo = true;
        Ok(())
    }

    /// Replace a plain, media or link field value.
    pub fn update_field(&mut self, field: &FieldRef, value: Value) -> Result<(), BridgeError> {
        self.require_editable(field)?;
        let target = self.resolve(field)?;
        if self.tree.field_value(&target) == Some(&value) {
            return Ok(());
        }
        self.send_update(&target, value, Vec::new(), None)
    }

    /// Translate a `beforeinput` event on a rich-text field.
    ///
    /// `Edits` means the caller must cancel the native event; the update has
    /// already been sent.
    pub fn input(
        &mut self,
        field: &FieldRef,
        input_type: &str,
        data: Option<&str>,
        selection: &TextRange,
    ) -> Result<InputAction, BridgeError> {
        self.require_editable(field)?;
        let (target, mut doc) = self.rich_value(field)?;
        let action = match translate_input(&doc, input_type, data, selection) {
            Ok(action) => action,
            Err(e) => return Err(self.desync(e)),
        };
        if let InputAction::Edits(edits) = &action {
            let caret = self.apply_edits(&mut doc, edits)?;
            self.pending_caret = caret.clone().map(|caret| PendingCaret {
                field: field.clone(),
                caret,
            });
            self.send_update(&target, doc.to_value(), edits.clone(), caret)?;
        }
        Ok(action)
    }

    /// Pick up edits the browser made to a rich-text field on its own.
    ///
    /// Returns whether an update was sent.
    pub fn reconcile<D: DomTree + ?Sized>(
        &mut self,
        field: &FieldRef,
        dom: &D,
        element: &D::Node,
    ) -> Result<bool, BridgeError> {
        self.require_editable(field)?;
        let (target, mut doc) = self.rich_value(field)?;
        let edits = derive_text_edits(&doc, dom, element);
        if edits.is_empty() {
            return Ok(false);
        }
        let caret = self.apply_edits(&mut doc, &edits)?;
        self.send_update(&target, doc.to_value(), edits, caret)?;
        Ok(true)
    }

    fn apply_edits(&mut self, doc: &mut RichText, edits: &[TextEdit]) -> Result<Option<TextPoint>, BridgeError> {
        let mut caret = None;
        for edit in edits {
            match doc.apply(edit) {
                Ok(point) => caret = Some(point),
                Err(e) => return Err(self.desync(e)),
            }
        }
        Ok(caret)
    }

    /// Out-of-range positions mean the DOM and the model disagree.
    fn desync(&mut self, e: RichTextError) -> BridgeError {
        if matches!(
            e,
            RichTextError::UnknownNode(_) | RichTextError::OffsetOutOfRange { .. }
        ) {
            self.request_resync(&e.to_string());
        }
        e.into()
    }

    /// Text selection inside a rich-text field moved.
    pub fn set_text_selection(&mut self, field: FieldRef, range: Option<TextRange>) -> Result<(), BridgeError> {
        let active_marks = match &range {
            Some(r) => self
                .rich_value(&field)
                .ok()
                .and_then(|(_, doc)| doc.active_marks(r).ok())
                .unwrap_or_default(),
            None => Vec::new(),
        };
        self.channel.send(Message::SelectionChange(SelectionChangePayload {
            block_id: field.block_id.clone(),
            field: field.path.clone(),
            range: range.clone(),
            active_marks,
        }))?;
        self.text_selection = range.map(|r| (field, r));
        Ok(())
    }

    /// Apply a toolbar format request to the current text selection.
    pub fn format(&mut self, op: FormatOp, mark: Mark) -> Result<(), BridgeError> {
        let Some((field, range)) = self.text_selection.clone() else {
            return Ok(());
        };
        self.require_editable(&field)?;
        if range.is_collapsed() {
            return Ok(());
        }
        let (target, mut doc) = self.rich_value(&field)?;
        let edits = match op {
            FormatOp::Apply => vec![TextEdit::AddMark { range: range.clone(), mark }],
            FormatOp::Remove => vec![TextEdit::RemoveMark { range: range.clone(), mark }],
            FormatOp::Toggle => match toggle_mark(&doc, &range, mark) {
                Ok(InputAction::Edits(edits)) => edits,
                Ok(_) => return Ok(()),
                Err(e) => return Err(self.desync(e)),
            },
        };
        self.apply_edits(&mut doc, &edits)?;
        self.send_update(&target, doc.to_value(), edits, None)?;
        let active_marks = doc.active_marks(&range).unwrap_or_default();
        self.channel.send(Message::SelectionChange(SelectionChangePayload {
            block_id: field.block_id.clone(),
            field: field.path.clone(),
            range: Some(range),
            active_marks,
        }))?;
        Ok(())
    }

    // === Selection ===

    fn send_select(&mut self, block_id: Option<BlockId>) {
        let message = Message::BlockAction(BlockAction::Select { block_id });
        if let Err(e) = self.channel.send(message) {
            tracing::warn!(error = %e, "select not delivered");
        }
    }

    /// Click on `hit`, the innermost block under the pointer.
    pub fn click(&mut self, hit: &str, pointer: PointerKind) -> Option<BlockId> {
        let selected = self.selection.click(&self.scanned, hit, pointer)?;
        self.send_select(Some(selected.clone()));
        Some(selected)
    }

    pub fn select_parent(&mut self) -> Option<BlockId> {
        let parent = self.selection.select_parent(&self.scanned)?;
        self.send_select(Some(parent.clone()));
        Some(parent)
    }

    /// Activate a `data-block-selector` affordance.
    pub fn follow_selector(&mut self, owner: Option<&str>, target: &BlockSelectorTarget) -> Option<BlockId> {
        let selected = self.selection.follow_selector(&self.scanned, owner, target)?;
        self.send_select(Some(selected.clone()));
        Some(selected)
    }

    /// Escape or a click outside the selection and toolbar.
    pub fn escape(&mut self) -> bool {
        let dragged = self.drag.cancel();
        self.text_selection = None;
        if self.selection.clear() {
            self.send_select(None);
            return true;
        }
        dragged
    }

    // === Structural edits ===

    /// Add a block after `after`. Without a type the slot decides: a single
    /// allowed type is inserted directly, otherwise the admin UI shows its
    /// chooser.
    pub fn add_after(&mut self, after: &str, block_type: Option<&str>) -> Result<(), BridgeError> {
        self.require_editing()?;
        let pos = self
            .tree
            .position(after)
            .ok_or_else(|| TreeError::UnknownBlock(after.into()))?;
        self.add(pos.parent.as_deref(), &pos.slot, Some(after), block_type)
    }

    /// Add a block at the end of a slot.
    pub fn add_into(&mut self, parent: Option<&str>, slot: &str, block_type: Option<&str>) -> Result<(), BridgeError> {
        self.require_editing()?;
        self.add(parent, slot, None, block_type)
    }

    fn add(
        &mut self,
        parent: Option<&str>,
        slot: &str,
        after: Option<&str>,
        block_type: Option<&str>,
    ) -> Result<(), BridgeError> {
        let resolver = ContainerResolver::new(&self.registry);
        let block_type = match block_type {
            Some(t) => Some(SmolStr::from(t)),
            None => match resolver.insertion_choice(&self.tree, parent, slot) {
                InsertionChoice::Direct(t) => Some(t),
                InsertionChoice::Chooser => None,
            },
        };
        match &block_type {
            Some(t) => resolver.check_add(&self.tree, parent, slot, t)?,
            None => resolver.check_capacity(&self.tree, parent, slot)?,
        }
        // A placeholder anchor stands for an empty slot.
        let after = after.filter(|a| self.tree.get(a).is_some_and(|b| !b.placeholder));
        self.channel.send(Message::BlockAction(BlockAction::Add {
            parent_id: parent.map(BlockId::from),
            slot: slot.into(),
            after: after.map(BlockId::from),
            block_type,
        }))?;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<(), BridgeError> {
        self.require_editing()?;
        let plan = ContainerResolver::new(&self.registry).check_remove(&self.tree, id)?;
        if self.tree.get(id).is_some_and(|b| b.placeholder) {
            tracing::debug!(block = id, "placeholder cannot be removed");
            return Ok(());
        }
        tracing::debug!(block = id, placeholder = ?plan.placeholder, "remove");
        self.channel.send(Message::BlockAction(BlockAction::Remove { block_id: id.into() }))?;
        if self.selection.selected().is_some_and(|s| s == id) {
            self.selection.clear();
        }
        Ok(())
    }

    pub fn copy(&mut self, id: &str) -> Result<(), BridgeError> {
        self.require_editing()?;
        let block = self
            .tree
            .get(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        let pos = self
            .tree
            .position(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        ContainerResolver::new(&self.registry).check_add(
            &self.tree,
            pos.parent.as_deref(),
            &pos.slot,
            &block.block_type,
        )?;
        self.channel.send(Message::BlockAction(BlockAction::Copy { block_id: id.into() }))?;
        Ok(())
    }

    /// Validate and send a move.
    pub fn move_block(&mut self, mut intent: MoveIntent) -> Result<(), BridgeError> {
        self.require_editing()?;
        // A placeholder anchor stands for the next persisted block, or the end.
        if let Some(before) = intent.before_block_id.take() {
            intent.before_block_id = if self.tree.get(&before).is_some_and(|b| b.placeholder) {
                self.tree.persisted_from(&before)
            } else {
                Some(before)
            };
        }
        ContainerResolver::new(&self.registry).check_move(
            &self.tree,
            &intent.block_id,
            intent.new_parent_id.as_deref(),
            &intent.new_slot,
        )?;
        if intent.is_noop(&self.tree) {
            return Ok(());
        }
        self.channel.send(Message::BlockAction(intent.into_action()))?;
        Ok(())
    }

    // === Drag ===

    pub fn drag_begin(&mut self, block_id: &str, pointer: Point) -> Result<(), BridgeError> {
        self.require_editing()?;
        self.drag.begin(block_id.into(), pointer);
        Ok(())
    }

    pub fn drag_update(&mut self, pointer: Point, hit: Option<(&str, Rect)>, viewport: &Rect) -> DragFrame {
        let resolver = ContainerResolver::new(&self.registry);
        self.drag.update(pointer, hit, viewport, &self.tree, &resolver)
    }

    pub fn drag_scroll(&self) -> f64 {
        self.drag.scroll_delta()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    /// Pointer-up: send the move, if any. Returns it.
    pub fn drag_end(&mut self) -> Result<Option<MoveIntent>, BridgeError> {
        let Some(intent) = self.drag.drop(&self.tree) else {
            return Ok(None);
        };
        self.move_block(intent.clone())?;
        Ok(Some(intent))
    }

    pub fn drag_cancel(&mut self) -> bool {
        self.drag.cancel()
    }

    // === Overlay ===

    /// Add-button side for a block.
    pub fn add_side(&self, id: &str) -> AddSide {
        let explicit = self.scanned.get(id).and_then(|b| b.add_direction);
        let resolver = ContainerResolver::new(&self.registry);
        let orientation_of = |block: &str| {
            self.tree
                .position(block)
                .and_then(|pos| resolver.slot_spec(&self.tree, pos.parent.as_deref(), &pos.slot).orientation)
        };
        let parent_orientation = self.tree.parent_of(id).and_then(|p| orientation_of(p.as_str()));
        resolve_add_side(explicit, orientation_of(id), parent_orientation, self.tree.depth(id))
    }

    /// Report the selected block's geometry to the admin UI.
    pub fn report_geometry(&self, rect: Rect, viewport: Rect) -> Result<(), BridgeError> {
        let Some(id) = self.selection.selected() else {
            return Ok(());
        };
        self.channel.send(Message::BlockGeometry(BlockGeometryPayload {
            block_id: id.clone(),
            rect,
            viewport,
            add_side: self.add_side(id),
        }))?;
        Ok(())
    }
}

/// Drop blocks no longer reachable from the page root.
fn prune_unreachable(tree: &mut BlockTree) {
    let mut reachable = std::collections::HashSet::new();
    let roots: Vec<BlockId> = tree.root.values().flatten().cloned().collect();
    for id in roots {
        reachable.extend(tree.subtree(&id));
    }
    let before = tree.blocks.len();
    tree.blocks.retain(|id, _| reachable.contains(id));
    if tree.blocks.len() != before {
        tracing::trace!(dropped = before - tree.blocks.len(), "pruned unreachable blocks");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dom::MemoryDom;
    use crate::protocol::{Envelope, RecordingTransport};

    const ADMIN: &str = "https://admin.example";

    fn context(mode: &str) -> SessionContext {
        SessionContext::from_frame_name(&format!("hydra-{mode}:{ADMIN}"))
            .unwrap()
            .unwrap()
    }

    fn config() -> BridgeConfig {
        serde_json::from_value(json!({
            "allowedBlocks": ["slate", "image", "columns"],
            "blockSchema": {
                "columns": {"slots": {"columns": {"allowed": ["column"], "min": 1, "max": 2}}},
                "column": {"slots": {"blocks": {"defaultType": "slate", "min": 1}}}
            }
        }))
        .unwrap()
    }

    fn page_tree() -> Value {
        json!({
            "blocks": {
                "a": {"id": "a", "@type": "slate", "fields": {"value": [
                    {"type": "p", "children": [{"text": "hello"}]}
                ]}},
                "b": {"id": "b", "@type": "slate", "fields": {"value": [
                    {"type": "p", "children": [{"text": "locked"}]}
                ]}},
                "grid": {"id": "grid", "@type": "columns", "slots": {"columns": ["c1"]}},
                "c1": {"id": "c1", "@type": "column", "parentId": "grid"}
            },
            "root": {"blocks": ["a", "b", "grid"]},
            "metadata": {"title": "Home"}
        })
    }

    const PAGE: &str = r#"
        <h1 data-editable-field="/title">Home</h1>
        <div data-block-uid="a"><p data-editable-field="value" data-node-id="0">hello</p></div>
        <div data-block-readonly>
          <div data-block-uid="b"><p data-editable-field="value" data-node-id="0">locked</p></div>
        </div>
        <div data-block-uid="grid"><div data-block-uid="c1"></div></div>
    "#;

    fn bridge(mode: &str) -> (Bridge<RecordingTransport>, MemoryDom) {
        let mut bridge = Bridge::new(RecordingTransport::new(), context(mode), config());
        let envelope = json!({
            "type": "EDIT_CHANGE",
            "payload": {"tree": page_tree()},
            "sessionTag": format!("{mode}:{ADMIN}"),
        });
        let events = bridge.handle(ADMIN, envelope);
        assert!(matches!(events.as_slice(), [BridgeEvent::Render { partial: false, .. }]));
        let dom = MemoryDom::parse(PAGE);
        bridge.rescan(&dom, &dom.root());
        bridge.transport().take();
        (bridge, dom)
    }

    fn sent(bridge: &Bridge<RecordingTransport>) -> Vec<Message> {
        bridge.transport().take().into_iter().map(|e| e.message).collect()
    }

    #[test]
    fn test_placeholder_synthesized_in_edit_mode() {
        let (bridge, _) = bridge("edit");
        let children = bridge.tree().children(Some("c1"), "blocks");
        assert_eq!(children.len(), 1);
        assert!(bridge.tree().get(&children[0]).unwrap().placeholder);

        let (view, _) = bridge_view();
        assert!(view.tree().children(Some("c1"), "blocks").is_empty());
    }

    fn bridge_view() -> (Bridge<RecordingTransport>, MemoryDom) {
        bridge("view")
    }

    #[test]
    fn test_typing_sends_block_update() {
        let (mut bridge, _) = bridge("edit");
        let field = FieldRef::new(Some("a"), "value");
        let caret = TextRange::caret(TextPoint::new("0", 5));
        let action = bridge.input(&field, "insertText", Some("!"), &caret).unwrap();
        assert!(matches!(action, InputAction::Edits(_)));

        let messages = sent(&bridge);
        let [Message::BlockUpdate(update)] = messages.as_slice() else {
            panic!("expected one update, got {messages:?}");
        };
        assert_eq!(update.block_id.as_deref(), Some("a"));
        assert_eq!(update.field, "value");
        assert_eq!(update.caret, Some(TextPoint::new("0", 6)));
        assert_eq!(
            update.value,
            json!([{"type": "p", "nodeId": "0", "children": [{"text": "hello!"}]}])
        );
    }

    #[test]
    fn test_readonly_field_sends_nothing() {
        let (mut bridge, _) = bridge("edit");
        let field = FieldRef::new(Some("b"), "value");
        let caret = TextRange::caret(TextPoint::new("0", 1));
        let result = bridge.input(&field, "insertText", Some("x"), &caret);
        assert!(matches!(result, Err(BridgeError::Readonly { .. })));
        assert!(bridge.update_field(&field, json!("x")).is_err());
        assert!(sent(&bridge).is_empty());
    }

    #[test]
    fn test_view_mode_never_edits() {
        let (mut bridge, _) = bridge("view");
        let field = FieldRef::new(Some("a"), "value");
        let caret = TextRange::caret(TextPoint::new("0", 1));
        assert_eq!(
            bridge.input(&field, "insertText", Some("x"), &caret),
            Err(BridgeError::NotEditing)
        );
        assert!(sent(&bridge).is_empty());
    }

    #[test]
    fn test_page_field_update() {
        let (mut bridge, _) = bridge("edit");
        let field = FieldRef::new(None, "/title");
        bridge.update_field(&field, json!("Start")).unwrap();
        let messages = sent(&bridge);
        let [Message::BlockUpdate(update)] = messages.as_slice() else {
            panic!("expected one update");
        };
        assert_eq!(update.block_id, None);
        assert_eq!(update.field, "title");
        // Unchanged values are not re-sent.
        bridge.update_field(&field, json!("Start")).unwrap();
        assert!(sent(&bridge).is_empty());
    }

    #[test]
    fn test_caret_restored_after_echo() {
        let (mut bridge, _) = bridge("edit");
        let field = FieldRef::new(Some("a"), "value");
        bridge
            .input(&field, "insertText", Some("!"), &TextRange::caret(TextPoint::new("0", 5)))
            .unwrap();
        // Echo not yet received.
        assert_eq!(bridge.take_caret(), None);

        let mut tree: BlockTree = serde_json::from_value(page_tree()).unwrap();
        tree.get_mut("a").unwrap().fields.insert(
            "value".into(),
            json!([{"type": "p", "children": [{"text": "hello!"}]}]),
        );
        bridge.receive(Message::EditChange(EditChangePayload {
            tree,
            partial: false,
            selected: None,
        }));
        assert_eq!(bridge.take_caret(), Some((field, TextPoint::new("0", 6))));
        assert_eq!(bridge.take_caret(), None);
    }

    #[test]
    fn test_lost_caret_requests_resync() {
        let (mut bridge, _) = bridge("edit");
        let field = FieldRef::new(Some("a"), "value");
        bridge
            .input(&field, "insertText", Some("!"), &TextRange::caret(TextPoint::new("0", 5)))
            .unwrap();
        let mut tree: BlockTree = serde_json::from_value(page_tree()).unwrap();
        tree.get_mut("a").unwrap().fields.insert(
            "value".into(),
            json!([{"type": "p", "children": [{"text": "hi"}]}]),
        );
        bridge.receive(Message::EditChange(EditChangePayload {
            tree,
            partial: false,
            selected: None,
        }));
        bridge.transport().take();
        assert_eq!(bridge.take_caret(), None);
        assert!(matches!(sent(&bridge).as_slice(), [Message::ResyncRequest(_)]));
    }

    #[test]
    fn test_format_action_toggles_selection() {
        let (mut bridge, _) = bridge("edit");
        let field = FieldRef::new(Some("a"), "value");
        let range = TextRange::new(TextPoint::new("0", 0), TextPoint::new("0", 5));
        bridge.set_text_selection(field, Some(range)).unwrap();
        bridge.transport().take();

        let envelope = Envelope::new(
            Message::FormatAction(crate::protocol::FormatActionPayload {
                op: FormatOp::Toggle,
                mark: Mark::Strong,
            }),
            context("edit").tag,
        );
        bridge.handle(ADMIN, serde_json::to_value(&envelope).unwrap());
        let messages = sent(&bridge);
        assert!(matches!(messages.as_slice(), [Message::BlockUpdate(_), Message::SelectionChange(_)]));
        let Message::SelectionChange(change) = &messages[1] else {
            unreachable!()
        };
        assert_eq!(change.active_marks, vec![Mark::Strong]);
    }

    #[test]
    fn test_add_after_respects_container() {
        let (mut bridge, _) = bridge("edit");
        // Single allowed type goes in directly.
        bridge.add_after("c1", None).unwrap();
        let messages = sent(&bridge);
        assert_eq!(
            messages,
            vec![Message::BlockAction(BlockAction::Add {
                parent_id: Some("grid".into()),
                slot: "columns".into(),
                after: Some("c1".into()),
                block_type: Some("column".into()),
            })]
        );
        // Page slot with several types opens the chooser.
        bridge.add_after("a", None).unwrap();
        let messages = sent(&bridge);
        assert!(matches!(
            messages.as_slice(),
            [Message::BlockAction(BlockAction::Add { block_type: None, .. })]
        ));
        // Disallowed type is rejected locally.
        assert!(bridge.add_after("c1", Some("slate")).is_err());
        assert!(sent(&bridge).is_empty());
    }

    #[test]
    fn test_drag_sends_single_move() {
        let (mut bridge, _) = bridge("edit");
        let viewport = Rect::new(0.0, 0.0, 800.0, 600.0);
        bridge.drag_begin("a", Point::new(10.0, 10.0)).unwrap();
        let frame = bridge.drag_update(
            Point::new(10.0, 175.0),
            Some(("b", Rect::new(0.0, 100.0, 400.0, 100.0))),
            &viewport,
        );
        assert!(frame.target.is_some());
        let intent = bridge.drag_end().unwrap().unwrap();
        assert_eq!(intent.before_block_id.as_deref(), Some("grid"));
        assert_eq!(
            sent(&bridge),
            vec![Message::BlockAction(BlockAction::Move {
                block_id: "a".into(),
                new_parent_id: None,
                new_slot: "blocks".into(),
                before_block_id: Some("grid".into()),
            })]
        );
    }

    #[test]
    fn test_drag_into_empty_slot_never_sends_placeholder() {
        let (mut bridge, _) = bridge("edit");
        let viewport = Rect::new(0.0, 0.0, 800.0, 600.0);
        let ph = bridge.tree().children(Some("c1"), "blocks")[0].clone();
        bridge.drag_begin("a", Point::new(10.0, 10.0)).unwrap();
        // Upper half of the placeholder.
        let frame = bridge.drag_update(
            Point::new(10.0, 310.0),
            Some((ph.as_str(), Rect::new(0.0, 300.0, 400.0, 100.0))),
            &viewport,
        );
        assert_eq!(frame.target.unwrap().edge, crate::drag::DropEdge::Before);
        bridge.drag_end().unwrap().unwrap();
        assert_eq!(
            sent(&bridge),
            vec![Message::BlockAction(BlockAction::Move {
                block_id: "a".into(),
                new_parent_id: Some("c1".into()),
                new_slot: "blocks".into(),
                before_block_id: None,
            })]
        );

        // A move handed in directly is cleaned the same way.
        bridge
            .move_block(MoveIntent {
                block_id: "a".into(),
                new_parent_id: Some("c1".into()),
                new_slot: "blocks".into(),
                before_block_id: Some(ph),
            })
            .unwrap();
        assert!(matches!(
            sent(&bridge).as_slice(),
            [Message::BlockAction(BlockAction::Move { before_block_id: None, .. })]
        ));
    }

    #[test]
    fn test_drag_below_last_block_appends() {
        let (mut bridge, _) = bridge("edit");
        let viewport = Rect::new(0.0, 0.0, 800.0, 600.0);
        bridge.drag_begin("a", Point::new(10.0, 10.0)).unwrap();
        bridge.drag_update(
            Point::new(10.0, 390.0),
            Some(("grid", Rect::new(0.0, 300.0, 400.0, 100.0))),
            &viewport,
        );
        let intent = bridge.drag_end().unwrap().unwrap();
        assert_eq!(intent.new_parent_id, None);
        assert_eq!(intent.before_block_id, None);
        assert_eq!(sent(&bridge).len(), 1);
    }

    #[test]
    fn test_unrendered_placeholder_reported() {
        let (mut bridge, dom) = bridge("edit");
        assert_eq!(
            bridge.unfilled_slots(),
            &[UnfilledSlot {
                parent: Some("c1".into()),
                slot: "blocks".into(),
            }]
        );

        let ph = bridge.tree().children(Some("c1"), "blocks")[0].clone();
        let page = PAGE.replace(
            r#"<div data-block-uid="c1"></div>"#,
            &format!(r#"<div data-block-uid="c1"><div data-block-uid="{ph}"></div></div>"#),
        );
        let dom2 = MemoryDom::parse(&page);
        bridge.rescan(&dom2, &dom2.root());
        assert!(bridge.unfilled_slots().is_empty());

        let (mut view, _) = bridge_view();
        view.rescan(&dom, &dom.root());
        assert!(view.unfilled_slots().is_empty());
    }

    #[test]
    fn test_selection_round_trip() {
        let (mut bridge, _) = bridge("edit");
        assert_eq!(bridge.click("c1", PointerKind::Mouse), Some("c1".into()));
        assert_eq!(bridge.select_parent(), Some("grid".into()));
        assert!(bridge.escape());
        assert_eq!(
            sent(&bridge),
            vec![
                Message::BlockAction(BlockAction::Select { block_id: Some("c1".into()) }),
                Message::BlockAction(BlockAction::Select { block_id: Some("grid".into()) }),
                Message::BlockAction(BlockAction::Select { block_id: None }),
            ]
        );
        let events = bridge.receive(Message::BlockAction(BlockAction::Select {
            block_id: Some("a".into()),
        }));
        assert_eq!(events, vec![BridgeEvent::Selected(Some("a".into()))]);
    }

    #[test]
    fn test_partial_edit_change_merges() {
        let (mut bridge, _) = bridge("edit");
        let partial: BlockTree = serde_json::from_value(json!({
            "blocks": {"a": {"id": "a", "@type": "slate", "fields": {"value": []}}},
            "root": {"blocks": ["a", "grid"]}
        }))
        .unwrap();
        bridge.receive(Message::EditChange(EditChangePayload {
            tree: partial,
            partial: true,
            selected: None,
        }));
        assert!(!bridge.tree().contains("b"));
        assert!(bridge.tree().contains("c1"));
        assert!(bridge.tree().validate().is_ok());
    }
}
