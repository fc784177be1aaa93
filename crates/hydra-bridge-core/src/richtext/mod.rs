//! Rich-text node tree.
//!
//! Field values use the Slate-shaped JSON the admin UI stores: elements are
//! `{"type", "nodeId", "children", ...attrs}`, leaves are `{"text", ...attrs}`.
//! Formatting is carried by inline elements (`strong`, `em`, `del`, `link`, ...)
//! rather than leaf flags.
//!
//! Node ids are index paths (`"0"`, `"0.1"`). Text leaves occupy an index but
//! carry no id. Editing text inside a leaf never changes the shape of the tree,
//! so every id survives; anything that adds, removes or regroups nodes reissues
//! ids with [`RichText::assign_ids`].

mod edit;
mod input;
mod mapper;

pub use edit::TextEdit;
pub use input::{InputAction, translate_input};
pub(crate) use input::toggle as toggle_mark;
pub use mapper::{
    derive_text_edits, dom_to_point, dom_to_range, node_ids_in_dom, point_to_dom, utf16_to_chars,
    chars_to_utf16,
};

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::RichTextError;

// === Model ===

/// Inline element kinds. Everything else is block-level.
pub const INLINE_KINDS: &[&str] = &["strong", "em", "del", "link", "u", "code", "sub", "sup", "span"];

/// A node in the rich-text tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RichNode {
    Element(Element),
    Text(TextLeaf),
}

impl RichNode {
    pub fn text(s: impl Into<String>) -> Self {
        RichNode::Text(TextLeaf::new(s))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            RichNode::Element(e) => Some(e),
            RichNode::Text(_) => None,
        }
    }

    /// Number of characters in this subtree.
    pub fn text_len(&self) -> usize {
        match self {
            RichNode::Text(t) => t.text.chars().count(),
            RichNode::Element(e) => e.text_len(),
        }
    }

    fn push_text(&self, out: &mut String) {
        match self {
            RichNode::Text(t) => out.push_str(&t.text),
            RichNode::Element(e) => e.children.iter().for_each(|c| c.push_text(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: SmolStr,
    #[serde(rename = "nodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<SmolStr>,
    #[serde(default)]
    pub children: Vec<RichNode>,
    /// Remaining properties (`url` on links, custom block data).
    #[serde(flatten)]
    pub attrs: serde_json::Map<String, Value>,
}

impl Element {
    pub fn new(kind: impl Into<SmolStr>, children: Vec<RichNode>) -> Self {
        Self {
            kind: kind.into(),
            node_id: None,
            children,
            attrs: serde_json::Map::new(),
        }
    }

    pub fn is_inline(&self) -> bool {
        INLINE_KINDS.contains(&self.kind.as_str())
    }

    /// Block-level element whose children are all inline content.
    pub fn is_text_block(&self) -> bool {
        !self.is_inline()
            && self.children.iter().all(|c| match c {
                RichNode::Text(_) => true,
                RichNode::Element(e) => e.is_inline(),
            })
    }

    pub fn text_len(&self) -> usize {
        self.children.iter().map(RichNode::text_len).sum()
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        self.children.iter().for_each(|c| c.push_text(&mut out));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLeaf {
    pub text: String,
    #[serde(flatten)]
    pub attrs: serde_json::Map<String, Value>,
}

impl TextLeaf {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attrs: serde_json::Map::new(),
        }
    }
}

/// Formatting applied through inline elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Strong,
    Em,
    Del,
    U,
    Code,
    Sub,
    Sup,
    Link { url: String },
}

impl Mark {
    pub fn kind(&self) -> &'static str {
        match self {
            Mark::Strong => "strong",
            Mark::Em => "em",
            Mark::Del => "del",
            Mark::U => "u",
            Mark::Code => "code",
            Mark::Sub => "sub",
            Mark::Sup => "sup",
            Mark::Link { .. } => "link",
        }
    }

    /// Nesting order when rebuilding inline content: lower wraps higher.
    fn rank(&self) -> u8 {
        match self {
            Mark::Link { .. } => 0,
            Mark::Strong => 1,
            Mark::Em => 2,
            Mark::Del => 3,
            Mark::U => 4,
            Mark::Code => 5,
            Mark::Sub => 6,
            Mark::Sup => 7,
        }
    }

    /// Same mark kind, ignoring link targets.
    pub fn same_kind(&self, other: &Mark) -> bool {
        self.kind() == other.kind()
    }

    pub fn from_element(el: &Element) -> Option<Mark> {
        Some(match el.kind.as_str() {
            "strong" => Mark::Strong,
            "em" => Mark::Em,
            "del" => Mark::Del,
            "u" => Mark::U,
            "code" => Mark::Code,
            "sub" => Mark::Sub,
            "sup" => Mark::Sup,
            "link" => Mark::Link {
                url: el
                    .attrs
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => return None,
        })
    }

    fn to_element(&self, children: Vec<RichNode>) -> Element {
        let mut el = Element::new(self.kind(), children);
        if let Mark::Link { url } = self {
            el.attrs.insert("url".into(), Value::String(url.clone()));
        }
        el
    }
}

// === Points and ranges ===

/// A caret position: element node id plus a character offset into that
/// element's text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPoint {
    pub node_id: SmolStr,
    pub offset: usize,
}

impl TextPoint {
    pub fn new(node_id: impl Into<SmolStr>, offset: usize) -> Self {
        Self {
            node_id: node_id.into(),
            offset,
        }
    }
}

/// A selection: anchor and focus, in either order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub anchor: TextPoint,
    pub focus: TextPoint,
}

impl TextRange {
    pub fn new(anchor: TextPoint, focus: TextPoint) -> Self {
        Self { anchor, focus }
    }

    pub fn caret(point: TextPoint) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A point resolved to its text block: block path plus offset in the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Location {
    pub block: Vec<usize>,
    pub offset: usize,
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block
            .cmp(&other.block)
            .then(self.offset.cmp(&other.offset))
    }
}

// === Document ===

/// A rich-text field value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText {
    pub nodes: Vec<RichNode>,
}

/// Node id for an index path.
pub fn path_id(path: &[usize]) -> SmolStr {
    let parts: Vec<String> = path.iter().map(usize::to_string).collect();
    SmolStr::new(parts.join("."))
}

/// Index path encoded in a node id, if it is one.
pub fn parse_path(id: &str) -> Option<Vec<usize>> {
    id.split('.').map(|p| p.parse().ok()).collect()
}

pub(crate) fn node_at<'a>(nodes: &'a [RichNode], path: &[usize]) -> Option<&'a RichNode> {
    let (first, rest) = path.split_first()?;
    let node = nodes.get(*first)?;
    if rest.is_empty() {
        return Some(node);
    }
    match node {
        RichNode::Element(e) => node_at(&e.children, rest),
        RichNode::Text(_) => None,
    }
}

pub(crate) fn element_at_mut<'a>(
    nodes: &'a mut [RichNode],
    path: &[usize],
) -> Option<&'a mut Element> {
    let (first, rest) = path.split_first()?;
    let RichNode::Element(e) = nodes.get_mut(*first)? else {
        return None;
    };
    if rest.is_empty() {
        Some(e)
    } else {
        element_at_mut(&mut e.children, rest)
    }
}

fn assign(nodes: &mut [RichNode], prefix: &mut Vec<usize>) {
    for (i, node) in nodes.iter_mut().enumerate() {
        if let RichNode::Element(e) = node {
            prefix.push(i);
            e.node_id = Some(path_id(prefix));
            assign(&mut e.children, prefix);
            prefix.pop();
        }
    }
}

fn find(nodes: &[RichNode], id: &str, prefix: &mut Vec<usize>) -> Option<Vec<usize>> {
    for (i, node) in nodes.iter().enumerate() {
        if let RichNode::Element(e) = node {
            prefix.push(i);
            if e.node_id.as_deref() == Some(id) {
                return Some(prefix.clone());
            }
            if let Some(found) = find(&e.children, id, prefix) {
                return Some(found);
            }
            prefix.pop();
        }
    }
    None
}

fn collect_text_blocks(nodes: &[RichNode], prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    for (i, node) in nodes.iter().enumerate() {
        if let RichNode::Element(e) = node {
            prefix.push(i);
            if e.is_text_block() {
                out.push(prefix.clone());
            } else if !e.is_inline() {
                collect_text_blocks(&e.children, prefix, out);
            }
            prefix.pop();
        }
    }
}

impl RichText {
    pub fn new(nodes: Vec<RichNode>) -> Self {
        let mut doc = Self { nodes };
        doc.assign_ids();
        doc
    }

    /// Parse a field value, assigning ids where they are missing.
    pub fn from_value(value: &Value) -> Result<Self, RichTextError> {
        let mut doc: RichText = serde_json::from_value(value.clone())
            .map_err(|e| RichTextError::InvalidValue(e.to_string()))?;
        doc.assign_ids();
        Ok(doc)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reissue every element id from its index path.
    pub fn assign_ids(&mut self) {
        assign(&mut self.nodes, &mut Vec::new());
    }

    /// Path of the element with this id.
    pub fn path_of(&self, id: &str) -> Option<Vec<usize>> {
        // Ids are paths; check the fast route before searching.
        if let Some(path) = parse_path(id) {
            if let Some(RichNode::Element(e)) = node_at(&self.nodes, &path) {
                if e.node_id.as_deref() == Some(id) {
                    return Some(path);
                }
            }
        }
        find(&self.nodes, id, &mut Vec::new())
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        let path = self.path_of(id)?;
        node_at(&self.nodes, &path)?.as_element()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.path_of(id).is_some()
    }

    /// All element ids in document order.
    pub fn node_ids(&self) -> Vec<SmolStr> {
        fn walk(nodes: &[RichNode], out: &mut Vec<SmolStr>) {
            for node in nodes {
                if let RichNode::Element(e) = node {
                    if let Some(id) = &e.node_id {
                        out.push(id.clone());
                    }
                    walk(&e.children, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, &mut out);
        out
    }

    /// Paths of all text blocks in document order.
    pub(crate) fn text_blocks(&self) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        collect_text_blocks(&self.nodes, &mut Vec::new(), &mut out);
        out
    }

    /// Plain text, text blocks separated by newlines.
    pub fn plain_text(&self) -> String {
        self.text_blocks()
            .iter()
            .filter_map(|p| node_at(&self.nodes, p).and_then(RichNode::as_element))
            .map(Element::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn block(&self, path: &[usize]) -> Option<&Element> {
        node_at(&self.nodes, path)?.as_element()
    }

    /// Resolve a point to its text block and block-relative offset.
    pub(crate) fn locate(&self, point: &TextPoint) -> Result<Location, RichTextError> {
        let path = self
            .path_of(&point.node_id)
            .ok_or_else(|| RichTextError::UnknownNode(point.node_id.clone()))?;

        // Nearest block-level ancestor-or-self.
        let mut block_len = path.len();
        while block_len > 0 {
            match node_at(&self.nodes, &path[..block_len]) {
                Some(RichNode::Element(e)) if !e.is_inline() => break,
                _ => block_len -= 1,
            }
        }
        if block_len == 0 {
            return Err(RichTextError::NotTextBlock(point.node_id.clone()));
        }
        let block_path = path[..block_len].to_vec();
        let block = self
            .block(&block_path)
            .filter(|b| b.is_text_block())
            .ok_or_else(|| RichTextError::NotTextBlock(point.node_id.clone()))?;

        let node_len = node_at(&self.nodes, &path)
            .map(RichNode::text_len)
            .unwrap_or_default();
        if point.offset > node_len {
            return Err(RichTextError::OffsetOutOfRange {
                node_id: point.node_id.clone(),
                offset: point.offset,
                len: node_len,
            });
        }
        let before = chars_before(&block.children, &path[block_len..]);
        Ok(Location {
            block: block_path,
            offset: before + point.offset,
        })
    }

    /// Express a location as a point on its text block.
    pub(crate) fn point_at(&self, loc: &Location) -> TextPoint {
        TextPoint::new(path_id(&loc.block), loc.offset)
    }

    /// Map a caret from before a re-render onto this tree.
    ///
    /// Keeps the caret when its node survives with enough text; otherwise
    /// tries the nearest surviving sibling (then the parent) at the same
    /// offset. `None` means the caret cannot be placed and the caller should
    /// resync.
    pub fn restore_caret(&self, caret: &TextPoint) -> Option<TextPoint> {
        let fits = |id: &str| {
            self.element(id)
                .is_some_and(|e| caret.offset <= e.text_len())
        };
        if fits(&caret.node_id) {
            return Some(caret.clone());
        }
        if self.contains(&caret.node_id) {
            tracing::warn!(node_id = %caret.node_id, offset = caret.offset, "caret offset out of range");
            return None;
        }

        let mut path = parse_path(&caret.node_id)?;
        while let Some(index) = path.pop() {
            let siblings: &[RichNode] = if path.is_empty() {
                &self.nodes
            } else {
                match node_at(&self.nodes, &path) {
                    Some(RichNode::Element(e)) => &e.children,
                    _ => continue,
                }
            };
            let mut candidates: Vec<usize> = Vec::new();
            for d in 1..=siblings.len().max(index + 1) {
                if let Some(before) = index.checked_sub(d) {
                    candidates.push(before);
                }
                candidates.push(index + d - 1);
            }
            for i in candidates {
                let Some(RichNode::Element(e)) = siblings.get(i) else {
                    continue;
                };
                if let Some(id) = &e.node_id {
                    if caret.offset <= e.text_len() {
                        tracing::debug!(from = %caret.node_id, to = %id, "caret moved to sibling");
                        return Some(TextPoint::new(id.clone(), caret.offset));
                    }
                }
            }
            if !path.is_empty() && fits(&path_id(&path)) {
                return Some(TextPoint::new(path_id(&path), caret.offset));
            }
        }
        tracing::warn!(node_id = %caret.node_id, "caret could not be restored");
        None
    }

    /// Marks active on every character of the range (or at the caret).
    pub fn active_marks(&self, range: &TextRange) -> Result<Vec<Mark>, RichTextError> {
        let (start, end) = self.ordered(range)?;
        let mut common: Option<Vec<Mark>> = None;

        for block_path in self.text_blocks() {
            if block_path < start.block || block_path > end.block {
                continue;
            }
            let Some(block) = self.block(&block_path) else {
                continue;
            };
            let runs = edit::runs_of(block);
            let from = if block_path == start.block { start.offset } else { 0 };
            let to = if block_path == end.block {
                end.offset
            } else {
                block.text_len()
            };

            let mut pos = 0;
            for run in &runs {
                let len = run.text.chars().count();
                let (run_start, run_end) = (pos, pos + len);
                pos = run_end;
                let covers = if from == to {
                    // Caret: marks of the character before it, or after at 0.
                    (from > run_start && from <= run_end) || (from == 0 && run_start == 0 && len > 0)
                } else {
                    run_start < to && run_end > from
                };
                if !covers {
                    continue;
                }
                common = Some(match common {
                    None => run.marks.clone(),
                    Some(prev) => prev.into_iter().filter(|m| run.marks.contains(m)).collect(),
                });
            }
        }
        Ok(common.unwrap_or_default())
    }

    /// Locations of a range's endpoints, start first.
    pub(crate) fn ordered(&self, range: &TextRange) -> Result<(Location, Location), RichTextError> {
        let a = self.locate(&range.anchor)?;
        let b = self.locate(&range.focus)?;
        Ok(if a <= b { (a, b) } else { (b, a) })
    }
}

/// Characters in `children` before the node at `rel_path`.
fn chars_before(children: &[RichNode], rel_path: &[usize]) -> usize {
    let Some((first, rest)) = rel_path.split_first() else {
        return 0;
    };
    let mut count: usize = children.iter().take(*first).map(RichNode::text_len).sum();
    if let Some(RichNode::Element(e)) = children.get(*first) {
        count += chars_before(&e.children, rest);
    }
    count
}
