//! [`DomTree`] over the live browser document.

use hydra_bridge_core::scanner::ATTR_BLOCK_UID;
use hydra_bridge_core::{DomTree, NodeKind, Rect};
use wasm_bindgen::JsCast;
use web_sys::{Element, Node};

/// The page DOM, read through `web_sys`.
///
/// Stateless: node handles are `web_sys::Node` and compare by identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebDom;

impl WebDom {
    pub fn new() -> Self {
        Self
    }
}

impl DomTree for WebDom {
    type Node = Node;

    fn kind(&self, node: &Node) -> NodeKind {
        match node.node_type() {
            Node::ELEMENT_NODE => NodeKind::Element,
            Node::TEXT_NODE | Node::CDATA_SECTION_NODE => NodeKind::Text,
            Node::COMMENT_NODE => NodeKind::Comment,
            _ => NodeKind::Other,
        }
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        let list = node.child_nodes();
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn tag_name(&self, node: &Node) -> Option<String> {
        node.dyn_ref::<Element>()
            .map(|el| el.tag_name().to_ascii_lowercase())
    }

    fn data(&self, node: &Node) -> Option<String> {
        match self.kind(node) {
            NodeKind::Text | NodeKind::Comment => node.node_value(),
            _ => None,
        }
    }

    fn matches(&self, node: &Node, selector: &str) -> bool {
        let Some(el) = node.dyn_ref::<Element>() else {
            return false;
        };
        match el.matches(selector) {
            Ok(m) => m,
            Err(e) => {
                tracing::trace!(selector, error = ?e, "invalid selector");
                false
            }
        }
    }

    fn query_selector(&self, scope: &Node, selector: &str) -> Option<Node> {
        let found = if let Some(el) = scope.dyn_ref::<Element>() {
            el.query_selector(selector)
        } else if let Some(doc) = scope.dyn_ref::<web_sys::Document>() {
            doc.query_selector(selector)
        } else {
            return None;
        };
        match found {
            Ok(el) => el.map(Node::from),
            Err(e) => {
                tracing::trace!(selector, error = ?e, "invalid selector");
                None
            }
        }
    }

    fn bounding_rect(&self, node: &Node) -> Option<Rect> {
        node.dyn_ref::<Element>()
            .map(|el| dom_rect(&el.get_bounding_client_rect()))
    }

    fn contains(&self, ancestor: &Node, node: &Node) -> bool {
        ancestor.contains(Some(node))
    }
}

pub fn dom_rect(rect: &web_sys::DomRect) -> Rect {
    Rect::new(rect.x(), rect.y(), rect.width(), rect.height())
}

/// Nearest element at or above `node` (text and comment nodes resolve to
/// their parent).
pub fn element_of(node: &Node) -> Option<Element> {
    match node.dyn_ref::<Element>() {
        Some(el) => Some(el.clone()),
        None => node.parent_element(),
    }
}

/// Nearest `data-block-uid` element at or above `node`, with its id.
pub fn closest_block(node: &Node) -> Option<(String, Element)> {
    let el = element_of(node)?
        .closest(&format!("[{ATTR_BLOCK_UID}]"))
        .ok()
        .flatten()?;
    let id = el.get_attribute(ATTR_BLOCK_UID)?;
    Some((id, el))
}

/// Position a fixed overlay element over `rect`.
pub(crate) fn place(el: &web_sys::HtmlElement, rect: &Rect) {
    let style = el.style();
    let _ = style.set_property("position", "fixed");
    let _ = style.set_property("left", &format!("{}px", rect.x));
    let _ = style.set_property("top", &format!("{}px", rect.y));
    let _ = style.set_property("width", &format!("{}px", rect.width));
    let _ = style.set_property("height", &format!("{}px", rect.height));
}

pub(crate) fn set_visible(el: &web_sys::HtmlElement, visible: bool) {
    let _ = el
        .style()
        .set_property("display", if visible { "block" } else { "none" });
}
