//! Selection and overlay geometry.
//!
//! The overlay chrome (outline, toolbar, add-button) lives in the parent
//! window while the selected block lives inside the iframe. Block rects are
//! read in iframe-viewport coordinates and translated by the iframe element's
//! own box in the parent document.

use serde::{Deserialize, Serialize};

use crate::scanner::{BlockSelectorTarget, ScannedTree};
use crate::schema::OverlayConfig;
use crate::types::{AddSide, BlockId, Orientation, Point, Rect};

/// Thickness of the bottom-line outline.
pub const LINE_WIDTH: f64 = 2.0;

// === Geometry ===

/// How the selected block is outlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutlineStyle {
    /// Full rectangle around the block.
    Box,
    /// Thin line along the bottom edge.
    BottomLine,
}

/// Overlay chrome positions in parent-window coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLayout {
    /// Any part of the block is inside the visible iframe area.
    pub visible: bool,
    pub style: OutlineStyle,
    /// Outline rectangle, clipped to the iframe box.
    pub outline: Rect,
    /// Top-left of the toolbar.
    pub toolbar: Point,
    /// Top-left of the add-button; `None` when it would be off-frame.
    pub add_button: Option<Point>,
    pub add_side: AddSide,
}

/// Translate an iframe-viewport rect into parent coordinates.
pub fn to_parent(frame: &Rect, rect: &Rect) -> Rect {
    rect.offset(frame.x, frame.y)
}

/// Pick the outline style for a block.
///
/// Blocks shorter than the threshold, or wider than the frame by more than
/// the threshold (carousels, horizontally scrolled strips), get a bottom line.
pub fn outline_style(block: &Rect, frame: &Rect, config: &OverlayConfig) -> OutlineStyle {
    let threshold = config.bottom_line_threshold;
    let overflow_x = (frame.left() - block.left()).max(0.0) + (block.right() - frame.right()).max(0.0);
    if block.height < threshold || overflow_x > threshold {
        OutlineStyle::BottomLine
    } else {
        OutlineStyle::Box
    }
}

/// Compute the overlay layout.
///
/// `block` is in iframe-viewport coordinates, `frame` is the iframe element's
/// box in the parent document.
pub fn compute_overlay(
    block: &Rect,
    frame: &Rect,
    add_side: AddSide,
    config: &OverlayConfig,
) -> OverlayLayout {
    let parent = to_parent(frame, block);
    let style = outline_style(&parent, frame, config);
    let clipped = parent.intersect(frame);
    let visible = clipped.is_some_and(|r| r.width > 0.0 || r.height > 0.0);
    let clipped = clipped.unwrap_or(Rect::new(parent.x, parent.y, 0.0, 0.0));

    let outline = match style {
        OutlineStyle::Box => clipped,
        OutlineStyle::BottomLine => Rect::new(
            clipped.x,
            parent.bottom() - LINE_WIDTH,
            clipped.width,
            LINE_WIDTH,
        ),
    };

    // Toolbar sits above the block, pinned inside the frame when the block
    // top scrolls out of view.
    let toolbar_y = (parent.top() - config.toolbar_height - config.gap)
        .min(frame.bottom() - config.toolbar_height)
        .max(frame.top());
    let toolbar_x = clipped.left().max(frame.left());
    let toolbar = Point::new(toolbar_x, toolbar_y);

    let size = config.add_button_size;
    let anchor = match add_side {
        AddSide::Bottom => Point::new(parent.right() - size, parent.bottom() + config.gap),
        AddSide::Right => Point::new(parent.right() + config.gap, parent.bottom() - size),
    };
    let button = Rect::new(anchor.x, anchor.y, size, size);
    let add_button = (visible && button.intersect(frame).is_some()).then_some(anchor);

    OverlayLayout {
        visible,
        style,
        outline,
        toolbar,
        add_button,
        add_side,
    }
}

/// Side for the add-button.
///
/// An explicit `data-block-add` wins. Otherwise the block's own slot
/// orientation decides; failing that, the opposite of the parent's slot
/// orientation; failing that, sides alternate with depth starting at bottom.
pub fn resolve_add_side(
    explicit: Option<AddSide>,
    slot_orientation: Option<Orientation>,
    parent_orientation: Option<Orientation>,
    depth: usize,
) -> AddSide {
    if let Some(side) = explicit {
        return side;
    }
    if let Some(o) = slot_orientation {
        return AddSide::for_orientation(o);
    }
    if let Some(o) = parent_orientation {
        return AddSide::for_orientation(o.flip());
    }
    if depth % 2 == 0 {
        AddSide::Bottom
    } else {
        AddSide::Right
    }
}

// === Selection ===

/// Input device behind a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

impl PointerKind {
    /// Map a `PointerEvent.pointerType`.
    pub fn parse(s: &str) -> Self {
        match s {
            "touch" => PointerKind::Touch,
            "pen" => PointerKind::Pen,
            _ => PointerKind::Mouse,
        }
    }
}

/// Current block selection and the rules for moving it.
#[derive(Debug, Clone, Default)]
pub struct SelectionResolver {
    selected: Option<BlockId>,
}

impl SelectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&BlockId> {
        self.selected.as_ref()
    }

    /// Set the selection. Returns whether it changed.
    pub fn select(&mut self, id: Option<BlockId>) -> bool {
        if self.selected == id {
            return false;
        }
        tracing::debug!(from = ?self.selected, to = ?id, "selection changed");
        self.selected = id;
        true
    }

    pub fn clear(&mut self) -> bool {
        self.select(None)
    }

    /// Drop the selection if its block disappeared from the scan.
    pub fn retain(&mut self, tree: &ScannedTree) -> bool {
        match &self.selected {
            Some(id) if !tree.contains(id) => self.clear(),
            _ => false,
        }
    }

    /// Block a click on `hit` (the innermost block under the pointer) selects.
    ///
    /// Pointer devices select `hit` directly. Touch selects the outermost
    /// ancestor first and then one level deeper per tap on the same chain.
    pub fn resolve_click(&self, tree: &ScannedTree, hit: &str, pointer: PointerKind) -> BlockId {
        if pointer != PointerKind::Touch {
            return hit.into();
        }
        // Outermost first.
        let mut chain = chain_to(tree, hit);
        chain.reverse();
        let next = self
            .selected
            .as_ref()
            .and_then(|s| chain.iter().position(|c| c == s))
            .map(|i| (i + 1).min(chain.len() - 1))
            .unwrap_or(0);
        chain[next].clone()
    }

    /// Apply a click. Returns the new selection if it changed.
    pub fn click(&mut self, tree: &ScannedTree, hit: &str, pointer: PointerKind) -> Option<BlockId> {
        let target = self.resolve_click(tree, hit, pointer);
        self.select(Some(target.clone())).then_some(target)
    }

    /// Move the selection to the parent block.
    pub fn select_parent(&mut self, tree: &ScannedTree) -> Option<BlockId> {
        let parent = tree.get(self.selected.as_ref()?)?.parent_id.clone()?;
        self.select(Some(parent.clone()));
        Some(parent)
    }

    /// Resolve a `data-block-selector` affordance rendered inside `owner`.
    pub fn follow_selector(
        &mut self,
        tree: &ScannedTree,
        owner: Option<&str>,
        target: &BlockSelectorTarget,
    ) -> Option<BlockId> {
        let resolved = resolve_selector(tree, owner, target)?;
        self.select(Some(resolved.clone()));
        Some(resolved)
    }
}

/// Hit block followed by its ancestors, innermost first.
fn chain_to(tree: &ScannedTree, hit: &str) -> Vec<BlockId> {
    let mut chain = vec![BlockId::from(hit)];
    let mut current = tree.get(hit).and_then(|b| b.parent_id.clone());
    while let Some(id) = current {
        if chain.contains(&id) {
            break;
        }
        current = tree.get(&id).and_then(|b| b.parent_id.clone());
        chain.push(id);
    }
    chain
}

/// Block a selector affordance points at, when it exists.
pub fn resolve_selector(
    tree: &ScannedTree,
    owner: Option<&str>,
    target: &BlockSelectorTarget,
) -> Option<BlockId> {
    let anchor = target.anchor.as_deref().or(owner)?;
    let block = tree.get(anchor)?;
    if target.step == 0 {
        return Some(block.block_id.clone());
    }
    let siblings = match &block.parent_id {
        Some(p) => &tree.get(p)?.children,
        None => &tree.roots,
    };
    let index = siblings.iter().position(|s| s == anchor)? as i64 + i64::from(target.step);
    usize::try_from(index)
        .ok()
        .and_then(|i| siblings.get(i))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use crate::scanner::scan;
    use crate::schema::SchemaRegistry;

    fn config() -> OverlayConfig {
        OverlayConfig::default()
    }

    #[test]
    fn test_parent_coordinates() {
        let frame = Rect::new(200.0, 100.0, 800.0, 600.0);
        let block = Rect::new(10.0, 20.0, 300.0, 50.0);
        assert_eq!(to_parent(&frame, &block), Rect::new(210.0, 120.0, 300.0, 50.0));

        let layout = compute_overlay(&block, &frame, AddSide::Bottom, &config());
        assert!(layout.visible);
        assert_eq!(layout.style, OutlineStyle::Box);
        assert_eq!(layout.outline, Rect::new(210.0, 120.0, 300.0, 50.0));
        assert_eq!(layout.add_button, Some(Point::new(486.0, 174.0)));
    }

    #[test]
    fn test_toolbar_clamped_into_frame() {
        let frame = Rect::new(0.0, 50.0, 800.0, 600.0);
        // Block top scrolled above the viewport.
        let block = Rect::new(0.0, -100.0, 400.0, 300.0);
        let layout = compute_overlay(&block, &frame, AddSide::Bottom, &config());
        assert_eq!(layout.toolbar.y, 50.0);
        assert_eq!(layout.outline, Rect::new(0.0, 50.0, 400.0, 200.0));
    }

    #[test]
    fn test_bottom_line_threshold() {
        let frame = Rect::new(0.0, 0.0, 800.0, 600.0);
        let thin = Rect::new(0.0, 100.0, 400.0, 6.0);
        assert_eq!(outline_style(&thin, &frame, &config()), OutlineStyle::BottomLine);

        let carousel = Rect::new(0.0, 100.0, 2400.0, 300.0);
        let layout = compute_overlay(&carousel, &frame, AddSide::Bottom, &config());
        assert_eq!(layout.style, OutlineStyle::BottomLine);
        assert_eq!(layout.outline, Rect::new(0.0, 398.0, 800.0, LINE_WIDTH));

        let slight = Rect::new(0.0, 100.0, 805.0, 300.0);
        assert_eq!(outline_style(&slight, &frame, &config()), OutlineStyle::Box);
    }

    #[test]
    fn test_offscreen_block_is_hidden() {
        let frame = Rect::new(0.0, 0.0, 800.0, 600.0);
        let block = Rect::new(0.0, 900.0, 400.0, 100.0);
        let layout = compute_overlay(&block, &frame, AddSide::Right, &config());
        assert!(!layout.visible);
        assert_eq!(layout.add_button, None);
    }

    #[test]
    fn test_add_side_resolution() {
        use Orientation::*;
        assert_eq!(resolve_add_side(Some(AddSide::Right), Some(Vertical), None, 0), AddSide::Right);
        assert_eq!(resolve_add_side(None, Some(Horizontal), None, 0), AddSide::Right);
        assert_eq!(resolve_add_side(None, None, Some(Horizontal), 1), AddSide::Bottom);
        assert_eq!(resolve_add_side(None, None, Some(Vertical), 1), AddSide::Right);
        assert_eq!(resolve_add_side(None, None, None, 0), AddSide::Bottom);
        assert_eq!(resolve_add_side(None, None, None, 1), AddSide::Right);
        assert_eq!(resolve_add_side(None, None, None, 2), AddSide::Bottom);
    }

    fn nested() -> ScannedTree {
        let dom = MemoryDom::parse(
            r#"<div data-block-uid="grid">
                 <div data-block-uid="col">
                   <p data-block-uid="text" data-editable-field="value">hi</p>
                 </div>
               </div>
               <div data-block-uid="after"></div>"#,
        );
        scan(&dom, &dom.root(), &SchemaRegistry::default(), None).tree
    }

    #[test]
    fn test_pointer_selects_innermost() {
        let tree = nested();
        let mut sel = SelectionResolver::new();
        assert_eq!(sel.click(&tree, "text", PointerKind::Mouse), Some("text".into()));
    }

    #[test]
    fn test_touch_walks_inwards() {
        let tree = nested();
        let mut sel = SelectionResolver::new();
        assert_eq!(sel.click(&tree, "text", PointerKind::Touch), Some("grid".into()));
        assert_eq!(sel.click(&tree, "text", PointerKind::Touch), Some("col".into()));
        assert_eq!(sel.click(&tree, "text", PointerKind::Touch), Some("text".into()));
        // Innermost stays selected.
        assert_eq!(sel.click(&tree, "text", PointerKind::Touch), None);
        // Tapping elsewhere starts from the outside again.
        assert_eq!(sel.click(&tree, "after", PointerKind::Touch), Some("after".into()));
    }

    #[test]
    fn test_select_parent() {
        let tree = nested();
        let mut sel = SelectionResolver::new();
        sel.select(Some("text".into()));
        assert_eq!(sel.select_parent(&tree), Some("col".into()));
        assert_eq!(sel.select_parent(&tree), Some("grid".into()));
        assert_eq!(sel.select_parent(&tree), None);
        assert_eq!(sel.selected().map(|s| s.as_str()), Some("grid"));
    }

    #[test]
    fn test_selector_targets() {
        let tree = nested();
        let step = |anchor: Option<&str>, step| BlockSelectorTarget {
            anchor: anchor.map(Into::into),
            step,
        };
        assert_eq!(resolve_selector(&tree, Some("text"), &step(Some("grid"), 0)), Some("grid".into()));
        assert_eq!(resolve_selector(&tree, Some("grid"), &step(None, 1)), Some("after".into()));
        assert_eq!(resolve_selector(&tree, Some("after"), &step(None, -1)), Some("grid".into()));
        assert_eq!(resolve_selector(&tree, Some("after"), &step(None, 1)), None);
        assert_eq!(resolve_selector(&tree, None, &step(None, 1)), None);
    }
}
