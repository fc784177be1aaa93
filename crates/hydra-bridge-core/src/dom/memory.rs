//! Arena-backed DOM for native tests and tooling.
//!
//! Parses a forgiving HTML subset (elements, attributes, text, comments, void
//! elements, basic entities). Layout is not computed; tests assign rectangles
//! explicitly with [`MemoryDom::set_rect`].

use std::collections::HashMap;

use super::{DomTree, NodeKind, Selector};
use crate::types::Rect;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Handle into a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

/// In-memory DOM tree.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<Node>,
    rects: HashMap<NodeRef, Rect>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Empty document.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            rects: HashMap::new(),
        }
    }

    /// Parse an HTML fragment into a fresh document.
    pub fn parse(html: &str) -> Self {
        let mut dom = Self::new();
        let root = dom.root();
        dom.append_html(root, html);
        dom
    }

    pub fn root(&self) -> NodeRef {
        NodeRef(0)
    }

    fn push(&mut self, data: NodeData, parent: NodeRef) -> NodeRef {
        let id = NodeRef(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Parse `html` and append the resulting nodes to `parent`.
    pub fn append_html(&mut self, parent: NodeRef, html: &str) {
        let mut stack = vec![parent];
        let mut rest = html;

        while !rest.is_empty() {
            let current = *stack.last().unwrap_or(&parent);
            if let Some(after) = rest.strip_prefix("<!--") {
                let (body, tail) = match after.find("-->") {
                    Some(end) => (&after[..end], &after[end + 3..]),
                    None => (after, ""),
                };
                self.push(NodeData::Comment(body.to_string()), current);
                rest = tail;
            } else if let Some(after) = rest.strip_prefix("</") {
                let end = after.find('>').unwrap_or(after.len());
                let name = after[..end].trim().to_ascii_lowercase();
                rest = after.get(end + 1..).unwrap_or("");
                // Pop to the matching open element; ignore stray closers.
                if let Some(pos) = stack.iter().rposition(|n| self.tag_of(*n) == Some(name.as_str())) {
                    if pos > 0 {
                        stack.truncate(pos);
                    }
                }
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                let (tag, attrs, self_closing, tail) = parse_start_tag(&rest[1..]);
                let void = VOID_ELEMENTS.contains(&tag.as_str());
                let node = self.push(NodeData::Element { tag, attrs }, current);
                if !self_closing && !void {
                    stack.push(node);
                }
                rest = tail;
            } else {
                let end = rest
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| *c == '<')
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                let text = decode_entities(&rest[..end]);
                self.push(NodeData::Text(text), current);
                rest = &rest[end..];
            }
        }
    }

    fn tag_of(&self, node: NodeRef) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    /// First element matching `selector` anywhere in the document.
    pub fn find(&self, selector: &str) -> Option<NodeRef> {
        self.query_selector(&self.root(), selector)
    }

    /// All elements matching `selector`, in document order.
    pub fn find_all(&self, selector: &str) -> Vec<NodeRef> {
        let Ok(parsed) = Selector::parse(selector) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        self.walk(self.root(), &mut |n| {
            if parsed.matches(self, &n) {
                out.push(n);
            }
        });
        out
    }

    fn walk(&self, node: NodeRef, f: &mut dyn FnMut(NodeRef)) {
        for &child in &self.nodes[node.0].children {
            f(child);
            self.walk(child, f);
        }
    }

    pub fn set_attribute(&mut self, node: NodeRef, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data {
            match attrs.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeRef, name: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data {
            attrs.retain(|(n, _)| n != name);
        }
    }

    /// Replace the character data of a text or comment node.
    pub fn set_data(&mut self, node: NodeRef, value: &str) {
        match &mut self.nodes[node.0].data {
            NodeData::Text(t) | NodeData::Comment(t) => *t = value.to_string(),
            _ => {}
        }
    }

    /// Replace all children of `node` with parsed `html`.
    pub fn set_inner_html(&mut self, node: NodeRef, html: &str) {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        self.append_html(node, html);
    }

    /// Detach a node from its parent.
    pub fn detach(&mut self, node: NodeRef) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    /// Assign a layout rectangle.
    pub fn set_rect(&mut self, node: NodeRef, rect: Rect) {
        self.rects.insert(node, rect);
    }
}

impl DomTree for MemoryDom {
    type Node = NodeRef;

    fn kind(&self, node: &NodeRef) -> NodeKind {
        match self.nodes[node.0].data {
            NodeData::Document => NodeKind::Other,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
        }
    }

    fn children(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.nodes[node.0].children.clone()
    }

    fn parent(&self, node: &NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    fn attribute(&self, node: &NodeRef, name: &str) -> Option<String> {
        match &self.nodes[node.0].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    fn tag_name(&self, node: &NodeRef) -> Option<String> {
        self.tag_of(*node).map(str::to_string)
    }

    fn data(&self, node: &NodeRef) -> Option<String> {
        match &self.nodes[node.0].data {
            NodeData::Text(t) | NodeData::Comment(t) => Some(t.clone()),
            _ => None,
        }
    }

    fn matches(&self, node: &NodeRef, selector: &str) -> bool {
        match Selector::parse(selector) {
            Ok(parsed) => parsed.matches(self, node),
            Err(e) => {
                tracing::warn!(error = %e, "MemoryDom::matches: bad selector");
                false
            }
        }
    }

    fn query_selector(&self, scope: &NodeRef, selector: &str) -> Option<NodeRef> {
        let parsed = match Selector::parse(selector) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "MemoryDom::query_selector: bad selector");
                return None;
            }
        };
        let mut found = None;
        self.walk(*scope, &mut |n| {
            if found.is_none() && parsed.matches(self, &n) {
                found = Some(n);
            }
        });
        found
    }

    fn bounding_rect(&self, node: &NodeRef) -> Option<Rect> {
        self.rects.get(node).copied()
    }
}

/// Parse the inside of a start tag (after `<`).
///
/// Returns tag name, attributes, whether it was self-closing, and the rest of
/// the input after `>`.
fn parse_start_tag(input: &str) -> (String, Vec<(String, String)>, bool, &str) {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }
    let tag = input[..i].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return (tag, attrs, self_closing, "");
        }
        match bytes[i] {
            b'>' => return (tag, attrs, self_closing, &input[i + 1..]),
            b'/' => {
                self_closing = true;
                i += 1;
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && bytes[i] != b'='
                    && bytes[i] != b'>'
                    && bytes[i] != b'/'
                {
                    i += 1;
                }
                let name = input[start..i].to_ascii_lowercase();
                let mut value = String::new();
                if i < bytes.len() && bytes[i] == b'=' {
                    i += 1;
                    if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                        let quote = bytes[i];
                        i += 1;
                        let vstart = i;
                        while i < bytes.len() && bytes[i] != quote {
                            i += 1;
                        }
                        value = decode_entities(&input[vstart..i]);
                        i = (i + 1).min(bytes.len());
                    } else {
                        let vstart = i;
                        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                            i += 1;
                        }
                        value = decode_entities(&input[vstart..i]);
                    }
                }
                self_closing = false;
                attrs.push((name, value));
            }
        }
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let dom = MemoryDom::parse(r#"<div id="a" class="x y"><p>hi <b>there</b></p><br><img src=x.png></div>"#);
        let div = dom.find("div#a").unwrap();
        assert_eq!(dom.element_children(&div).len(), 3);
        let p = dom.find("div > p").unwrap();
        assert_eq!(dom.text_content(&p), "hi there");
        assert!(dom.matches(&div, ".x.y"));
        assert!(dom.find("img[src='x.png']").is_some());
    }

    #[test]
    fn test_parse_comments() {
        let dom = MemoryDom::parse("<!-- hydra block-uid=c1 --><div>x</div><!-- /hydra -->");
        let children = dom.children(&dom.root());
        assert_eq!(children.len(), 3);
        assert_eq!(dom.kind(&children[0]), NodeKind::Comment);
        assert_eq!(dom.data(&children[0]).as_deref(), Some(" hydra block-uid=c1 "));
    }

    #[test]
    fn test_query_selector_excludes_scope() {
        let dom = MemoryDom::parse(r#"<div class="t"><h2 class="t">Hi</h2></div>"#);
        let div = dom.find("div").unwrap();
        let found = dom.query_selector(&div, ".t").unwrap();
        assert_eq!(dom.tag_name(&found).as_deref(), Some("h2"));
        assert_eq!(dom.select_self_or_descendant(&div, ".t"), Some(div));
    }

    #[test]
    fn test_descendant_vs_child() {
        let dom = MemoryDom::parse("<section><div><span>x</span></div></section>");
        assert!(dom.find("section span").is_some());
        assert!(dom.find("section > span").is_none());
        assert!(dom.find("div > span").is_some());
    }

    #[test]
    fn test_entities_and_stray_close() {
        let dom = MemoryDom::parse("<p>a &amp; b</span></p>");
        let p = dom.find("p").unwrap();
        assert_eq!(dom.text_content(&p), "a & b");
    }
}
