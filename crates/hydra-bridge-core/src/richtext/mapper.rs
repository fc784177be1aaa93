//! Mapping between rich-text points and rendered DOM positions.
//!
//! The frontend renders each node however it likes, as long as the element for
//! a node (and every styling wrapper around it) carries `data-node-id`. DOM
//! positions map to the outermost element with the nearest id; text below
//! untagged elements counts toward that tagged ancestor. Subtrees marked
//! `contenteditable="false"` are decoration and contribute no text.
//!
//! DOM offsets are UTF-16 code units; model offsets are characters.

use smol_str::SmolStr;

use super::{RichText, TextEdit, TextPoint, TextRange, path_id};
use crate::dom::{DomTree, NodeKind};
use crate::scanner::ATTR_NODE_ID;

/// Character count of the first `utf16` code units of `s`.
pub fn utf16_to_chars(s: &str, utf16: usize) -> usize {
    let mut units = 0;
    for (i, c) in s.chars().enumerate() {
        if units >= utf16 {
            return i;
        }
        units += c.len_utf16();
    }
    s.chars().count()
}

/// UTF-16 length of the first `chars` characters of `s`.
pub fn chars_to_utf16(s: &str, chars: usize) -> usize {
    s.chars().take(chars).map(char::len_utf16).sum()
}

fn is_decoration<D: DomTree + ?Sized>(dom: &D, node: &D::Node) -> bool {
    dom.is_element(node) && dom.attribute(node, "contenteditable").as_deref() == Some("false")
}

/// Editable text nodes under `node`, in document order.
fn text_nodes<D: DomTree + ?Sized>(dom: &D, node: &D::Node, out: &mut Vec<D::Node>) {
    for child in dom.children(node) {
        match dom.kind(&child) {
            NodeKind::Text => out.push(child),
            NodeKind::Element if !is_decoration(dom, &child) => text_nodes(dom, &child, out),
            _ => {}
        }
    }
}

fn editable_text<D: DomTree + ?Sized>(dom: &D, node: &D::Node) -> String {
    let mut nodes = Vec::new();
    text_nodes(dom, node, &mut nodes);
    nodes
        .iter()
        .filter_map(|n| dom.data(n))
        .collect::<Vec<_>>()
        .concat()
}

fn char_len<D: DomTree + ?Sized>(dom: &D, node: &D::Node) -> usize {
    match dom.kind(node) {
        NodeKind::Text => dom.data(node).map(|t| t.chars().count()).unwrap_or(0),
        NodeKind::Element if is_decoration(dom, node) => 0,
        _ => editable_text(dom, node).chars().count(),
    }
}

/// Outermost element sharing the nearest `data-node-id` at or above `node`,
/// stopping at `root`.
fn tagged_ancestor<D: DomTree + ?Sized>(
    dom: &D,
    root: &D::Node,
    node: &D::Node,
) -> Option<(D::Node, SmolStr)> {
    let mut current = Some(node.clone());
    let mut found: Option<(D::Node, SmolStr)> = None;
    while let Some(n) = current {
        if dom.is_element(&n) {
            if let Some(id) = dom.attribute(&n, ATTR_NODE_ID) {
                match &found {
                    None => found = Some((n.clone(), id.into())),
                    Some((_, seen)) if seen == id.as_str() => found = Some((n.clone(), id.into())),
                    Some(_) => break,
                }
            } else if found.is_some() {
                break;
            }
        }
        if n == *root {
            break;
        }
        current = dom.parent(&n);
    }
    found
}

enum Boundary {
    /// UTF-16 offset into a text node.
    Text(usize),
    /// Before the child at this index.
    Child(usize),
}

fn count_until<D: DomTree + ?Sized>(
    dom: &D,
    node: &D::Node,
    target: &D::Node,
    boundary: &Boundary,
    count: &mut usize,
) -> bool {
    if node == target {
        match boundary {
            Boundary::Text(units) => {
                let text = dom.data(node).unwrap_or_default();
                *count += utf16_to_chars(&text, *units);
            }
            Boundary::Child(index) => {
                for child in dom.children(node).iter().take(*index) {
                    *count += char_len(dom, child);
                }
            }
        }
        return true;
    }
    match dom.kind(node) {
        NodeKind::Text => {
            *count += dom.data(node).map(|t| t.chars().count()).unwrap_or(0);
            false
        }
        NodeKind::Element if is_decoration(dom, node) => false,
        NodeKind::Comment => false,
        _ => dom
            .children(node)
            .iter()
            .any(|child| count_until(dom, child, target, boundary, count)),
    }
}

/// Model point for a DOM position inside a rich-text field rooted at `root`.
///
/// `offset` follows the Selection API: UTF-16 units for text nodes, child
/// index for elements.
pub fn dom_to_point<D: DomTree + ?Sized>(
    dom: &D,
    root: &D::Node,
    node: &D::Node,
    offset: usize,
) -> Option<TextPoint> {
    if !dom.contains(root, node) {
        return None;
    }
    let (tagged, id) = tagged_ancestor(dom, root, node)?;
    let boundary = match dom.kind(node) {
        NodeKind::Text => Boundary::Text(offset),
        _ => Boundary::Child(offset),
    };
    let mut count = 0;
    if !count_until(dom, &tagged, node, &boundary, &mut count) {
        tracing::trace!(node_id = %id, "position inside decoration");
        return None;
    }
    tracing::trace!(node_id = %id, offset = count, "dom_to_point");
    Some(TextPoint::new(id, count))
}

/// Model range for a DOM selection.
pub fn dom_to_range<D: DomTree + ?Sized>(
    dom: &D,
    root: &D::Node,
    anchor: (&D::Node, usize),
    focus: (&D::Node, usize),
) -> Option<TextRange> {
    Some(TextRange::new(
        dom_to_point(dom, root, anchor.0, anchor.1)?,
        dom_to_point(dom, root, focus.0, focus.1)?,
    ))
}

/// Outermost element rendered for a node id.
fn element_for<D: DomTree + ?Sized>(dom: &D, root: &D::Node, id: &str) -> Option<D::Node> {
    dom.select_self_or_descendant(root, &format!("[{ATTR_NODE_ID}=\"{id}\"]"))
}

/// DOM position for a model point: a text node and UTF-16 offset, or the
/// element itself at offset 0 when it renders no text.
pub fn point_to_dom<D: DomTree + ?Sized>(
    dom: &D,
    root: &D::Node,
    point: &TextPoint,
) -> Option<(D::Node, usize)> {
    let el = element_for(dom, root, &point.node_id)?;
    let mut nodes = Vec::new();
    text_nodes(dom, &el, &mut nodes);
    if nodes.is_empty() {
        return (point.offset == 0).then_some((el, 0));
    }

    let mut remaining = point.offset;
    for node in &nodes {
        let text = dom.data(node).unwrap_or_default();
        let len = text.chars().count();
        if remaining <= len {
            return Some((node.clone(), chars_to_utf16(&text, remaining)));
        }
        remaining -= len;
    }
    tracing::warn!(node_id = %point.node_id, offset = point.offset, "point past rendered text");
    None
}

/// Distinct node ids rendered under `root`, wrappers counted once.
pub fn node_ids_in_dom<D: DomTree + ?Sized>(dom: &D, root: &D::Node) -> Vec<SmolStr> {
    fn walk<D: DomTree + ?Sized>(dom: &D, node: &D::Node, enclosing: Option<&str>, out: &mut Vec<SmolStr>) {
        for child in dom.element_children(node) {
            let id = dom.attribute(&child, ATTR_NODE_ID);
            match id.as_deref() {
                Some(id) if Some(id) != enclosing => {
                    out.push(id.into());
                    walk(dom, &child, Some(id), out);
                }
                _ => walk(dom, &child, id.as_deref().or(enclosing), out),
            }
        }
    }
    let mut out = Vec::new();
    walk(dom, root, None, &mut out);
    out
}

/// Edits that turn each model text block into what the DOM now shows.
///
/// Used when the browser mutated the DOM itself (composition, spellcheck
/// replacements). Each block yields at most a delete and an insert around the
/// common prefix and suffix.
pub fn derive_text_edits<D: DomTree + ?Sized>(
    model: &RichText,
    dom: &D,
    root: &D::Node,
) -> Vec<TextEdit> {
    let mut edits = Vec::new();
    for path in model.text_blocks() {
        let id = path_id(&path);
        let Some(block) = model.block(&path) else {
            continue;
        };
        let Some(el) = element_for(dom, root, &id) else {
            tracing::trace!(node_id = %id, "text block not rendered");
            continue;
        };
        let old: Vec<char> = block.text().chars().collect();
        let new: Vec<char> = editable_text(dom, &el).chars().collect();
        if old == new {
            continue;
        }

        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        if old.len() - suffix > prefix {
            edits.push(TextEdit::DeleteRange {
                range: TextRange::new(
                    TextPoint::new(id.clone(), prefix),
                    TextPoint::new(id.clone(), old.len() - suffix),
                ),
            });
        }
        if new.len() - suffix > prefix {
            edits.push(TextEdit::InsertText {
                at: TextPoint::new(id.clone(), prefix),
                text: new[prefix..new.len() - suffix].iter().collect(),
            });
        }
    }
    edits
}
