//! Drag-and-drop reordering.
//!
//! `idle -> pending -> dragging -> (dropped | cancelled) -> idle`. The engine
//! only sees geometry and block ids: the browser layer hit-tests the pointer,
//! maps the element to a block through the scan markers, and feeds the result
//! in once per animation frame.

use serde::{Deserialize, Serialize};

use crate::block::BlockTree;
use crate::container::ContainerResolver;
use crate::protocol::BlockAction;
use crate::schema::DragConfig;
use crate::types::{BlockId, Orientation, Point, Rect, SlotName};

/// Thickness of the drop indicator.
pub const INDICATOR_WIDTH: f64 = 2.0;

/// Which edge of the target the dragged block lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropEdge {
    Before,
    After,
}

/// Classify a pointer against a target box.
///
/// The first half (top for vertical slots, left for horizontal ones) is
/// `Before`; the midpoint itself counts as `After`.
pub fn classify(rect: &Rect, pointer: Point, orientation: Orientation) -> DropEdge {
    let (pos, start, extent) = match orientation {
        Orientation::Vertical => (pointer.y, rect.top(), rect.height),
        Orientation::Horizontal => (pointer.x, rect.left(), rect.width),
    };
    if pos < start + extent / 2.0 {
        DropEdge::Before
    } else {
        DropEdge::After
    }
}

/// Drop indicator line at the chosen edge.
pub fn indicator(rect: &Rect, edge: DropEdge, orientation: Orientation) -> Rect {
    let half = INDICATOR_WIDTH / 2.0;
    match (orientation, edge) {
        (Orientation::Vertical, DropEdge::Before) => {
            Rect::new(rect.x, rect.top() - half, rect.width, INDICATOR_WIDTH)
        }
        (Orientation::Vertical, DropEdge::After) => {
            Rect::new(rect.x, rect.bottom() - half, rect.width, INDICATOR_WIDTH)
        }
        (Orientation::Horizontal, DropEdge::Before) => {
            Rect::new(rect.left() - half, rect.y, INDICATOR_WIDTH, rect.height)
        }
        (Orientation::Horizontal, DropEdge::After) => {
            Rect::new(rect.right() - half, rect.y, INDICATOR_WIDTH, rect.height)
        }
    }
}

/// Scroll delta for a pointer near the viewport's top or bottom edge.
pub fn autoscroll_delta(pointer: Point, viewport: &Rect, config: &DragConfig) -> f64 {
    if pointer.y < viewport.top() + config.edge_margin {
        -config.scroll_step
    } else if pointer.y > viewport.bottom() - config.edge_margin {
        config.scroll_step
    } else {
        0.0
    }
}

/// A reparent/reorder the drop would perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveIntent {
    pub block_id: BlockId,
    pub new_parent_id: Option<BlockId>,
    pub new_slot: SlotName,
    pub before_block_id: Option<BlockId>,
}

impl MoveIntent {
    /// Whether applying the move leaves the tree as it is.
    pub fn is_noop(&self, tree: &BlockTree) -> bool {
        let Some(pos) = tree.position(&self.block_id) else {
            return false;
        };
        if pos.parent != self.new_parent_id || pos.slot != self.new_slot {
            return false;
        }
        self.before_block_id.as_ref() == Some(&self.block_id)
            || tree.persisted_next(&self.block_id) == self.before_block_id
    }

    pub fn into_action(self) -> BlockAction {
        BlockAction::Move {
            block_id: self.block_id,
            new_parent_id: self.new_parent_id,
            new_slot: self.new_slot,
            before_block_id: self.before_block_id,
        }
    }
}

/// Resolved drop target under the pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTarget {
    pub block_id: BlockId,
    pub edge: DropEdge,
    pub orientation: Orientation,
    /// Indicator line in iframe-viewport coordinates.
    pub indicator: Rect,
    pub intent: MoveIntent,
}

/// State of one drag gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub block_id: BlockId,
    pub start: Point,
    pub pointer: Point,
    /// Pointer travelled past the start threshold.
    pub started: bool,
    pub target: Option<DropTarget>,
    /// Pixels to scroll per frame while the pointer stays near an edge.
    pub scroll: f64,
}

/// What a pointer sample changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DragFrame {
    pub target: Option<DropTarget>,
    pub scroll: f64,
    /// The gesture just crossed the start threshold.
    pub started: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DragEngine {
    config: DragConfig,
    session: Option<DragSession>,
}

impl DragEngine {
    pub fn new(config: DragConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.started)
    }

    /// Pointer-down on a drag affordance.
    pub fn begin(&mut self, block_id: BlockId, pointer: Point) {
        tracing::debug!(block = %block_id, "drag pending");
        self.session = Some(DragSession {
            block_id,
            start: pointer,
            pointer,
            started: false,
            target: None,
            scroll: 0.0,
        });
    }

    /// Pointer sample.
    ///
    /// `hit` is the innermost block under the pointer with its viewport rect;
    /// `viewport` is the iframe's visible area.
    pub fn update(
        &mut self,
        pointer: Point,
        hit: Option<(&str, Rect)>,
        viewport: &Rect,
        tree: &BlockTree,
        resolver: &ContainerResolver<'_>,
    ) -> DragFrame {
        let config = self.config.clone();
        let Some(session) = self.session.as_mut() else {
            return DragFrame::default();
        };
        session.pointer = pointer;
        let mut just_started = false;
        if !session.started {
            let dx = pointer.x - session.start.x;
            let dy = pointer.y - session.start.y;
            if (dx * dx + dy * dy).sqrt() < config.start_threshold {
                return DragFrame::default();
            }
            session.started = true;
            just_started = true;
            tracing::debug!(block = %session.block_id, "drag started");
        }

        session.scroll = autoscroll_delta(pointer, viewport, &config);
        session.target = hit.and_then(|(id, rect)| resolve_target(&session.block_id, id, rect, pointer, tree, resolver));
        DragFrame {
            target: session.target.clone(),
            scroll: session.scroll,
            started: just_started,
        }
    }

    /// Current auto-scroll delta, polled once per animation frame.
    pub fn scroll_delta(&self) -> f64 {
        self.session.as_ref().map(|s| s.scroll).unwrap_or(0.0)
    }

    /// Pointer-up. Returns the move to send, if there is one.
    pub fn drop(&mut self, tree: &BlockTree) -> Option<MoveIntent> {
        let session = self.session.take()?;
        if !session.started {
            return None;
        }
        let intent = session.target?.intent;
        if intent.is_noop(tree) {
            tracing::debug!(block = %intent.block_id, "drop leaves tree unchanged");
            return None;
        }
        tracing::debug!(
            block = %intent.block_id,
            parent = ?intent.new_parent_id,
            slot = %intent.new_slot,
            before = ?intent.before_block_id,
            "drop"
        );
        Some(intent)
    }

    /// Escape or lost pointer capture.
    pub fn cancel(&mut self) -> bool {
        let had = self.session.take().is_some();
        if had {
            tracing::debug!("drag cancelled");
        }
        had
    }
}

fn resolve_target(
    dragged: &str,
    hit: &str,
    rect: Rect,
    pointer: Point,
    tree: &BlockTree,
    resolver: &ContainerResolver<'_>,
) -> Option<DropTarget> {
    if tree.is_within(hit, dragged) {
        return None;
    }
    let pos = tree.position(hit)?;
    let orientation = resolver
        .slot_spec(tree, pos.parent.as_deref(), &pos.slot)
        .orientation
        .unwrap_or_default();
    if let Err(e) = resolver.check_move(tree, dragged, pos.parent.as_deref(), &pos.slot) {
        tracing::trace!(target = hit, error = %e, "drop target rejected");
        return None;
    }
    let edge = classify(&rect, pointer, orientation);
    let before_block_id = match edge {
        DropEdge::Before => tree.persisted_from(hit),
        DropEdge::After => tree.persisted_next(hit),
    };
    Some(DropTarget {
        block_id: hit.into(),
        edge,
        orientation,
        indicator: indicator(&rect, edge, orientation),
        intent: MoveIntent {
            block_id: dragged.into(),
            new_parent_id: pos.parent,
            new_slot: pos.slot,
            before_block_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::block::Block;
    use crate::schema::{BridgeConfig, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(
            serde_json::from_value::<BridgeConfig>(json!({
                "blockSchema": {
                    "columns": {"slots": {"columns": {"allowed": ["column"], "orientation": "horizontal"}}},
                    "column": {"slots": {"blocks": {}}}
                }
            }))
            .unwrap(),
        )
    }

    fn tree() -> BlockTree {
        let mut t = BlockTree::new();
        for (i, id) in ["x", "y", "z"].into_iter().enumerate() {
            t.insert(None, "blocks", i, Block::new(id, "slate")).unwrap();
        }
        t.insert(None, "blocks", 3, Block::new("grid", "columns")).unwrap();
        t.insert(Some("grid"), "columns", 0, Block::new("c1", "column")).unwrap();
        t.insert(Some("grid"), "columns", 1, Block::new("c2", "column")).unwrap();
        t
    }

    const VIEWPORT: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 800.0,
        height: 600.0,
    };

    fn drag(
        engine: &mut DragEngine,
        tree: &BlockTree,
        reg: &SchemaRegistry,
        block: &str,
        hit: &str,
        rect: Rect,
        pointer: Point,
    ) -> DragFrame {
        let resolver = ContainerResolver::new(reg);
        engine.begin(block.into(), Point::new(pointer.x, pointer.y + 100.0));
        engine.update(pointer, Some((hit, rect)), &VIEWPORT, tree, &resolver)
    }

    #[test]
    fn test_classification_boundaries() {
        let rect = Rect::new(0.0, 100.0, 200.0, 100.0);
        assert_eq!(classify(&rect, Point::new(10.0, 125.0), Orientation::Vertical), DropEdge::Before);
        assert_eq!(classify(&rect, Point::new(10.0, 175.0), Orientation::Vertical), DropEdge::After);
        assert_eq!(classify(&rect, Point::new(10.0, 149.9), Orientation::Vertical), DropEdge::Before);
        assert_eq!(classify(&rect, Point::new(10.0, 150.0), Orientation::Vertical), DropEdge::After);
        assert_eq!(classify(&rect, Point::new(50.0, 190.0), Orientation::Horizontal), DropEdge::Before);
        assert_eq!(classify(&rect, Point::new(150.0, 110.0), Orientation::Horizontal), DropEdge::After);
    }

    #[test]
    fn test_drop_after_emits_next_sibling() {
        let reg = registry();
        let t = tree();
        let mut engine = DragEngine::default();
        let rect = Rect::new(0.0, 200.0, 400.0, 100.0);
        let frame = drag(&mut engine, &t, &reg, "x", "y", rect, Point::new(20.0, 275.0));
        let target = frame.target.unwrap();
        assert_eq!(target.edge, DropEdge::After);
        assert_eq!(target.indicator, Rect::new(0.0, 299.0, 400.0, INDICATOR_WIDTH));

        let intent = engine.drop(&t).unwrap();
        assert_eq!(
            intent,
            MoveIntent {
                block_id: "x".into(),
                new_parent_id: None,
                new_slot: "blocks".into(),
                before_block_id: Some("z".into()),
            }
        );
        assert!(engine.session().is_none());
    }

    #[test]
    fn test_noop_drop_is_suppressed() {
        let reg = registry();
        let t = tree();
        let mut engine = DragEngine::default();
        // Upper half of y: x would land exactly where it is.
        let rect = Rect::new(0.0, 200.0, 400.0, 100.0);
        drag(&mut engine, &t, &reg, "x", "y", rect, Point::new(20.0, 210.0));
        assert_eq!(engine.drop(&t), None);
        // Lower half of x itself.
        drag(&mut engine, &t, &reg, "y", "x", rect, Point::new(20.0, 290.0));
        assert_eq!(engine.drop(&t), None);
    }

    #[test]
    fn test_invalid_targets() {
        let reg = registry();
        let t = tree();
        let mut engine = DragEngine::default();
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        // Onto itself.
        let frame = drag(&mut engine, &t, &reg, "grid", "grid", rect, Point::new(10.0, 10.0));
        assert_eq!(frame.target, None);
        // Into its own descendant.
        let frame = drag(&mut engine, &t, &reg, "grid", "c1", rect, Point::new(10.0, 10.0));
        assert_eq!(frame.target, None);
        // Slot does not accept the type.
        let frame = drag(&mut engine, &t, &reg, "x", "c1", rect, Point::new(10.0, 10.0));
        assert_eq!(frame.target, None);
        assert_eq!(engine.drop(&t), None);
    }

    #[test]
    fn test_horizontal_slot_uses_width() {
        let reg = registry();
        let t = tree();
        let mut engine = DragEngine::default();
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        let frame = drag(&mut engine, &t, &reg, "c2", "c1", rect, Point::new(40.0, 90.0));
        let target = frame.target.unwrap();
        assert_eq!(target.orientation, Orientation::Horizontal);
        assert_eq!(target.edge, DropEdge::Before);
        let intent = engine.drop(&t).unwrap();
        assert_eq!(intent.new_parent_id.as_deref(), Some("grid"));
        assert_eq!(intent.before_block_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_small_movement_is_a_click() {
        let reg = registry();
        let t = tree();
        let resolver = ContainerResolver::new(&reg);
        let mut engine = DragEngine::default();
        engine.begin("x".into(), Point::new(10.0, 10.0));
        let frame = engine.update(
            Point::new(11.0, 11.0),
            Some(("z", Rect::new(0.0, 0.0, 100.0, 100.0))),
            &VIEWPORT,
            &t,
            &resolver,
        );
        assert!(!frame.started);
        assert!(!engine.is_dragging());
        assert_eq!(engine.drop(&t), None);
    }

    #[test]
    fn test_drop_on_placeholder_targets_empty_slot() {
        let reg = registry();
        let mut t = tree();
        let mut ph = Block::new("c1~blocks~0", "slate");
        ph.placeholder = true;
        t.insert(Some("c1"), "blocks", 0, ph).unwrap();
        let rect = Rect::new(0.0, 300.0, 400.0, 100.0);

        for pointer in [Point::new(10.0, 310.0), Point::new(10.0, 390.0)] {
            let mut engine = DragEngine::default();
            let frame = drag(&mut engine, &t, &reg, "x", "c1~blocks~0", rect, pointer);
            assert_eq!(frame.target.unwrap().intent.before_block_id, None);
            let intent = engine.drop(&t).unwrap();
            assert_eq!(
                intent,
                MoveIntent {
                    block_id: "x".into(),
                    new_parent_id: Some("c1".into()),
                    new_slot: "blocks".into(),
                    before_block_id: None,
                }
            );
        }
    }

    #[test]
    fn test_drop_after_last_child_appends() {
        let reg = registry();
        let t = tree();
        let mut engine = DragEngine::default();
        let rect = Rect::new(0.0, 300.0, 400.0, 100.0);
        let frame = drag(&mut engine, &t, &reg, "x", "grid", rect, Point::new(10.0, 390.0));
        assert_eq!(frame.target.unwrap().edge, DropEdge::After);
        let intent = engine.drop(&t).unwrap();
        assert_eq!(intent.new_parent_id, None);
        assert_eq!(intent.before_block_id, None);
        // The last block dropped after itself stays put.
        drag(&mut engine, &t, &reg, "grid", "z", rect, Point::new(10.0, 390.0));
        assert_eq!(engine.drop(&t), None);
    }

    #[test]
    fn test_autoscroll_near_edges() {
        let config = DragConfig::default();
        assert_eq!(autoscroll_delta(Point::new(0.0, 20.0), &VIEWPORT, &config), -12.0);
        assert_eq!(autoscroll_delta(Point::new(0.0, 580.0), &VIEWPORT, &config), 12.0);
        assert_eq!(autoscroll_delta(Point::new(0.0, 300.0), &VIEWPORT, &config), 0.0);
    }

    #[test]
    fn test_cancel_sends_nothing() {
        let reg = registry();
        let t = tree();
        let mut engine = DragEngine::default();
        let rect = Rect::new(0.0, 200.0, 400.0, 100.0);
        drag(&mut engine, &t, &reg, "x", "z", rect, Point::new(20.0, 290.0));
        assert!(engine.cancel());
        assert_eq!(engine.drop(&t), None);
    }
}
