//! Pointer side of drag-and-drop: hit testing, the dragged-block shadow, the
//! drop indicator and auto-scroll.
//!
//! Target resolution and the move itself are decided by the core
//! `DragEngine`; this module only measures and paints.

use hydra_bridge_core::{BlockId, DomMarkers, DomTree, DropTarget, Point, Rect, WATCHED_ATTRIBUTES};
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlElement, Node};

use crate::dom::{WebDom, place, set_visible};
use crate::{PlatformError, document, window};

/// The iframe viewport in its own coordinates.
pub fn viewport_rect() -> Result<Rect, PlatformError> {
    let window = window()?;
    let width = window.inner_width()?.as_f64().unwrap_or(0.0);
    let height = window.inner_height()?.as_f64().unwrap_or(0.0);
    Ok(Rect::new(0.0, 0.0, width, height))
}

/// Innermost scanned block under `point` with its box.
///
/// Elements with `pointer-events: none` (the shadow) are skipped by the
/// browser's hit test.
pub fn hit_block(markers: &DomMarkers<Node>, point: Point) -> Option<(BlockId, Rect)> {
    let doc = web_sys::window()?.document()?;
    let hit = doc.element_from_point(point.x as f32, point.y as f32)?;
    let node: &Node = hit.as_ref();
    let id = markers.block_at(&WebDom, node)?;
    let rect = WebDom.bounding_rect(markers.primary(&id)?)?;
    Some((id, rect))
}

/// Scroll the document vertically by `delta` pixels.
pub fn apply_scroll(delta: f64) {
    if delta == 0.0 {
        return;
    }
    if let Some(window) = web_sys::window() {
        window.scroll_by_with_x_and_y(0.0, delta);
    }
}

/// Parent for drag chrome: the `<html>` element, outside the observed
/// `<body>`, so adding and removing chrome never triggers a rescan.
fn chrome_parent() -> Result<Element, PlatformError> {
    document()?.document_element().ok_or_else(|| "no document element".into())
}

/// Remove every bridge annotation from `root` and its descendants.
fn strip_markers(root: &Element) -> Result<(), PlatformError> {
    let selector = WATCHED_ATTRIBUTES
        .iter()
        .map(|a| format!("[{a}]"))
        .collect::<Vec<_>>()
        .join(",");
    let nested = root.query_selector_all(&selector)?;
    let mut elements = vec![root.clone()];
    for i in 0..nested.length() {
        if let Some(el) = nested.get(i).and_then(|n| n.dyn_into::<Element>().ok()) {
            elements.push(el);
        }
    }
    for el in elements {
        for attr in WATCHED_ATTRIBUTES.iter().copied().chain(["contenteditable"]) {
            el.remove_attribute(attr)?;
        }
    }
    Ok(())
}

/// Visual elements of an active drag.
pub struct DragChrome {
    shadow: HtmlElement,
    indicator: HtmlElement,
    /// Pointer offset inside the dragged block at pointer-down.
    grab: Point,
}

impl DragChrome {
    /// Clone `source` as a translucent shadow and create the indicator line.
    pub fn new(source: &HtmlElement, pointer: Point) -> Result<Self, PlatformError> {
        let doc = document()?;
        let parent = chrome_parent()?;
        let rect = crate::dom::dom_rect(&source.get_bounding_client_rect());

        let shadow: HtmlElement = source.clone_node_with_deep(true)?.dyn_into().map_err(|_| "clone is not HtmlElement")?;
        strip_markers(&shadow)?;
        let style = shadow.style();
        style.set_property("pointer-events", "none")?;
        style.set_property("opacity", "0.6")?;
        style.set_property("z-index", "2147483646")?;
        place(&shadow, &rect);
        parent.append_child(&shadow)?;

        let indicator: HtmlElement = doc.create_element("div")?.dyn_into().map_err(|_| "div is not HtmlElement")?;
        indicator.set_class_name("hydra-drop-indicator");
        let style = indicator.style();
        style.set_property("pointer-events", "none")?;
        style.set_property("background", "#007eb1")?;
        style.set_property("z-index", "2147483647")?;
        set_visible(&indicator, false);
        parent.append_child(&indicator)?;

        Ok(Self {
            shadow,
            indicator,
            grab: Point::new(pointer.x - rect.x, pointer.y - rect.y),
        })
    }

    /// Follow the pointer and show the indicator for `target`.
    pub fn update(&self, pointer: Point, target: Option<&DropTarget>) {
        let style = self.shadow.style();
        let _ = style.set_property("left", &format!("{}px", pointer.x - self.grab.x));
        let _ = style.set_property("top", &format!("{}px", pointer.y - self.grab.y));
        match target {
            Some(target) => {
                place(&self.indicator, &target.indicator);
                set_visible(&self.indicator, true);
            }
            None => set_visible(&self.indicator, false),
        }
    }
}

impl Drop for DragChrome {
    fn drop(&mut self) {
        self.shadow.remove();
        self.indicator.remove();
    }
}

/// Grip shown at the selected block's top-left corner; pointer-down on it
/// starts a drag.
pub struct DragHandle {
    el: HtmlElement,
    block: Option<BlockId>,
}

/// Side length of the handle.
const HANDLE_SIZE: f64 = 20.0;

impl DragHandle {
    pub fn new() -> Result<Self, PlatformError> {
        let doc = document()?;
        let el: HtmlElement = doc.create_element("div")?.dyn_into().map_err(|_| "div is not HtmlElement")?;
        el.set_class_name("hydra-drag-handle");
        el.set_attribute("aria-label", "Drag block")?;
        let style = el.style();
        style.set_property("cursor", "grab")?;
        style.set_property("touch-action", "none")?;
        style.set_property("z-index", "2147483645")?;
        set_visible(&el, false);
        chrome_parent()?.append_child(&el)?;
        Ok(Self { el, block: None })
    }

    pub fn element(&self) -> &HtmlElement {
        &self.el
    }

    /// Block the handle is attached to.
    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn attach(&mut self, block: BlockId, rect: &Rect) {
        let at = Rect::new((rect.x - HANDLE_SIZE).max(0.0), rect.y.max(0.0), HANDLE_SIZE, HANDLE_SIZE);
        place(&self.el, &at);
        set_visible(&self.el, true);
        self.block = Some(block);
    }

    pub fn detach(&mut self) {
        set_visible(&self.el, false);
        self.block = None;
    }
}

impl Drop for DragHandle {
    fn drop(&mut self) {
        self.el.remove();
    }
}
