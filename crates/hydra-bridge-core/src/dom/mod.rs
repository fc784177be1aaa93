//! DOM abstraction shared by the scanner and the rich-text mapper.
//!
//! The browser crate implements [`DomTree`] over `web_sys`; [`MemoryDom`] is an
//! arena-backed implementation for native tests and tooling.

mod memory;
mod selector;

pub use memory::{MemoryDom, NodeRef};
pub use selector::{Selector, SelectorError};

use crate::types::Rect;

/// Coarse node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
    /// Document, doctype, fragments.
    Other,
}

/// Read access to a DOM tree.
///
/// Only the operations the bridge needs are required; everything else is
/// derived from them.
pub trait DomTree {
    /// Cheap node handle.
    type Node: Clone + PartialEq + std::fmt::Debug;

    fn kind(&self, node: &Self::Node) -> NodeKind;

    /// Child nodes in document order (elements, text and comments).
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// Lowercase tag name for elements.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    /// Character data of text and comment nodes.
    fn data(&self, node: &Self::Node) -> Option<String>;

    /// Whether an element matches a CSS selector.
    fn matches(&self, node: &Self::Node, selector: &str) -> bool;

    /// First descendant (not including `scope`) matching a CSS selector.
    fn query_selector(&self, scope: &Self::Node, selector: &str) -> Option<Self::Node>;

    /// Viewport-relative bounding box, when layout is available.
    fn bounding_rect(&self, node: &Self::Node) -> Option<Rect>;

    fn is_element(&self, node: &Self::Node) -> bool {
        self.kind(node) == NodeKind::Element
    }

    fn has_attribute(&self, node: &Self::Node, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Element children only.
    fn element_children(&self, node: &Self::Node) -> Vec<Self::Node> {
        self.children(node)
            .into_iter()
            .filter(|c| self.is_element(c))
            .collect()
    }

    /// Ancestors from the parent upwards.
    fn ancestors(&self, node: &Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(n) = current {
            current = self.parent(&n);
            out.push(n);
        }
        out
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool {
        if ancestor == node {
            return true;
        }
        let mut current = self.parent(node);
        while let Some(n) = current {
            if &n == ancestor {
                return true;
            }
            current = self.parent(&n);
        }
        false
    }

    /// Concatenated text of all descendant text nodes.
    fn text_content(&self, node: &Self::Node) -> String {
        let mut out = String::new();
        self.visit_text(node, &mut |_, text| out.push_str(text));
        out
    }

    /// Visit descendant text nodes in document order.
    fn visit_text(&self, node: &Self::Node, f: &mut dyn FnMut(&Self::Node, &str)) {
        match self.kind(node) {
            NodeKind::Text => {
                if let Some(text) = self.data(node) {
                    f(node, &text);
                }
            }
            NodeKind::Comment => {}
            NodeKind::Element | NodeKind::Other => {
                for child in self.children(node) {
                    self.visit_text(&child, f);
                }
            }
        }
    }

    /// Element or self match, then descendants.
    fn select_self_or_descendant(&self, scope: &Self::Node, selector: &str) -> Option<Self::Node> {
        if self.is_element(scope) && self.matches(scope, selector) {
            return Some(scope.clone());
        }
        self.query_selector(scope, selector)
    }
}
