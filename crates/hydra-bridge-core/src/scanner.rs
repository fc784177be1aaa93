//! DOM annotation scanner.
//!
//! Walks a rendered document and rebuilds the block structure the frontend
//! rendered, from `data-*` attributes and comment pragmas. The result has two
//! halves: a [`ScannedTree`] that is plain data (comparable, serializable, sent
//! to the admin UI) and [`DomMarkers`] that keep the element handles the overlay,
//! drag and rich-text code need. Markers are rebuilt on every scan and never
//! outlive the batch that produced them.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

use crate::block::{BlockTree, FieldPath};
use crate::dom::{DomTree, NodeKind};
use crate::pragma::{FieldBinding, Pragma, PragmaAttrs, PragmaError, parse_comment};
use crate::schema::{FieldKind, SchemaRegistry, SlotSpec};
use crate::types::{AddSide, BlockId, SlotName};

// === Attribute names ===

pub const ATTR_BLOCK_UID: &str = "data-block-uid";
pub const ATTR_EDITABLE_FIELD: &str = "data-editable-field";
pub const ATTR_MEDIA_FIELD: &str = "data-media-field";
pub const ATTR_LINKABLE_FIELD: &str = "data-linkable-field";
pub const ATTR_LINKABLE_ALLOW: &str = "data-linkable-allow";
pub const ATTR_BLOCK_READONLY: &str = "data-block-readonly";
pub const ATTR_BLOCK_ADD: &str = "data-block-add";
pub const ATTR_BLOCK_SELECTOR: &str = "data-block-selector";
pub const ATTR_NODE_ID: &str = "data-node-id";

/// Field name used when `data-editable-field` is present without a value.
const DEFAULT_FIELD: &str = "value";

// === Scanned tree ===

/// A field discovered in the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedField {
    /// Field path as written in the markup.
    pub path: SmolStr,
    pub kind: FieldKind,
    pub readonly: bool,
    /// Link types accepted by a linkable field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<SmolStr>,
}

/// A block discovered in the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedBlock {
    pub block_id: BlockId,
    pub parent_id: Option<BlockId>,
    /// Child blocks in document order.
    pub children: Vec<BlockId>,
    pub fields: Vec<ScannedField>,
    pub readonly: bool,
    pub add_direction: Option<AddSide>,
    /// Slots declared by the block's schema, when its type is known.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub container: BTreeMap<SlotName, SlotSpec>,
}

impl ScannedBlock {
    fn new(block_id: BlockId, parent_id: Option<BlockId>) -> Self {
        Self {
            block_id,
            parent_id,
            children: Vec::new(),
            fields: Vec::new(),
            readonly: false,
            add_direction: None,
            container: BTreeMap::new(),
        }
    }

    pub fn field(&self, path: &str) -> Option<&ScannedField> {
        self.fields.iter().find(|f| f.path == path)
    }
}

/// A slot that must hold at least one child but rendered none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnfilledSlot {
    pub parent: Option<BlockId>,
    pub slot: SlotName,
}

/// Block structure as rendered, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedTree {
    pub blocks: Vec<ScannedBlock>,
    /// Top-level blocks.
    pub roots: Vec<BlockId>,
    /// Fields outside any block (usually `/field` page metadata).
    pub page_fields: Vec<ScannedField>,
}

impl ScannedTree {
    pub fn get(&self, id: &str) -> Option<&ScannedBlock> {
        self.blocks.iter().find(|b| b.block_id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.iter().map(|b| &b.block_id)
    }

    /// Whether a field on a block accepts edits.
    ///
    /// Unknown blocks and fields are treated as not editable.
    pub fn is_editable(&self, block_id: Option<&str>, path: &str) -> bool {
        let field = match block_id {
            Some(id) => self.get(id).and_then(|b| b.field(path)),
            None => self.page_fields.iter().find(|f| f.path == path),
        };
        field.is_some_and(|f| !f.readonly)
    }

    /// Slots with `min >= 1` that rendered no children.
    ///
    /// Slot membership comes from `tree`; the scan alone cannot tell which slot
    /// a rendered child belongs to.
    pub fn unfilled_slots(&self, registry: &SchemaRegistry, tree: &BlockTree) -> Vec<UnfilledSlot> {
        let mut out = Vec::new();
        let rendered_under = |ids: &[BlockId]| ids.iter().any(|id| self.contains(id));

        for (slot, spec) in registry.slots(None) {
            if spec.min >= 1 && !rendered_under(tree.children(None, &slot)) {
                out.push(UnfilledSlot { parent: None, slot });
            }
        }
        for scanned in &self.blocks {
            let Some(block) = tree.get(&scanned.block_id) else {
                continue;
            };
            for (slot, spec) in registry.slots(Some(&block.block_type)) {
                if spec.min >= 1 && !rendered_under(tree.children(Some(&scanned.block_id), &slot)) {
                    out.push(UnfilledSlot {
                        parent: Some(scanned.block_id.clone()),
                        slot,
                    });
                }
            }
        }
        out
    }

    /// Indented outline, one block per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.write_outline(&mut out, root, 0);
        }
        out
    }

    fn write_outline(&self, out: &mut String, id: &str, depth: usize) {
        let Some(block) = self.get(id) else {
            return;
        };
        let _ = write!(out, "{}{}", "  ".repeat(depth), block.block_id);
        if !block.fields.is_empty() {
            let names: Vec<String> = block
                .fields
                .iter()
                .map(|f| match (f.kind, f.readonly) {
                    (FieldKind::Editable, false) => f.path.to_string(),
                    (FieldKind::Editable, true) => format!("{}!", f.path),
                    (kind, ro) => format!("{}:{:?}{}", f.path, kind, if ro { "!" } else { "" }),
                })
                .collect();
            let _ = write!(out, " [{}]", names.join(", "));
        }
        if block.readonly {
            out.push_str(" readonly");
        }
        if let Some(side) = block.add_direction {
            let _ = write!(out, " add={side:?}");
        }
        out.push('\n');
        for child in &block.children {
            self.write_outline(out, child, depth + 1);
        }
    }
}

// === DOM markers ===

/// Element bound to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMarker<N> {
    /// Owning block; `None` for fields outside any block.
    pub block_id: Option<BlockId>,
    pub path: SmolStr,
    pub kind: FieldKind,
    pub readonly: bool,
    pub element: N,
}

/// Target of a `data-block-selector` affordance: `id`, `id:+n`, `+n`, `-n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSelectorTarget {
    /// Named block; `None` means the block owning the affordance.
    pub anchor: Option<BlockId>,
    /// Sibling step from the anchor.
    pub step: i32,
}

impl BlockSelectorTarget {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let parse_step = |s: &str| -> Option<i32> {
            if !s.starts_with(['+', '-']) {
                return None;
            }
            s.parse().ok()
        };
        if let Some(step) = parse_step(value) {
            return Some(Self { anchor: None, step });
        }
        match value.rsplit_once(':') {
            Some((anchor, step)) => Some(Self {
                anchor: (!anchor.is_empty()).then(|| anchor.into()),
                step: parse_step(step)?,
            }),
            None => Some(Self {
                anchor: Some(value.into()),
                step: 0,
            }),
        }
    }
}

/// Element carrying a `data-block-selector` affordance.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorMarker<N> {
    pub element: N,
    /// Block the affordance is rendered inside.
    pub owner: Option<BlockId>,
    pub target: BlockSelectorTarget,
}

/// Element handles found by the last scan.
#[derive(Debug, Clone)]
pub struct DomMarkers<N> {
    blocks: HashMap<BlockId, Vec<N>>,
    pub fields: Vec<FieldMarker<N>>,
    pub selectors: Vec<SelectorMarker<N>>,
}

impl<N> Default for DomMarkers<N> {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
            fields: Vec::new(),
            selectors: Vec::new(),
        }
    }
}

impl<N: Clone + PartialEq> DomMarkers<N> {
    /// All elements rendered for a block, first occurrence first.
    pub fn elements(&self, id: &str) -> &[N] {
        self.blocks.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The block's first element.
    pub fn primary(&self, id: &str) -> Option<&N> {
        self.elements(id).first()
    }

    pub fn field(&self, block_id: Option<&str>, path: &str) -> Option<&FieldMarker<N>> {
        self.fields
            .iter()
            .find(|f| f.block_id.as_deref() == block_id && f.path == path)
    }

    /// Block whose element is `node` or its nearest marked ancestor.
    pub fn block_at<D: DomTree<Node = N> + ?Sized>(&self, dom: &D, node: &N) -> Option<BlockId> {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if let Some((id, _)) = self.blocks.iter().find(|(_, els)| els.contains(&n)) {
                return Some(id.clone());
            }
            current = dom.parent(&n);
        }
        None
    }

    /// Innermost field whose element contains `node`.
    pub fn field_at<D: DomTree<Node = N> + ?Sized>(
        &self,
        dom: &D,
        node: &N,
    ) -> Option<&FieldMarker<N>> {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if let Some(field) = self.fields.iter().find(|f| f.element == n) {
                return Some(field);
            }
            current = dom.parent(&n);
        }
        None
    }

    /// Affordance at `node` or its nearest ancestor.
    pub fn selector_at<D: DomTree<Node = N> + ?Sized>(
        &self,
        dom: &D,
        node: &N,
    ) -> Option<&SelectorMarker<N>> {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if let Some(marker) = self.selectors.iter().find(|s| s.element == n) {
                return Some(marker);
            }
            current = dom.parent(&n);
        }
        None
    }
}

// === Warnings ===

/// Problems found while scanning. None of them abort the scan.
#[derive(Error, Debug, Clone, Diagnostic)]
#[non_exhaustive]
pub enum ScanWarning {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pragma(#[from] PragmaError),

    /// A block id reappeared under a different parent.
    #[error("block {block_id} rendered under {found:?} but first seen under {first:?}")]
    #[diagnostic(code(hydra::scan::reparented_duplicate))]
    ReparentedDuplicate {
        block_id: BlockId,
        first: Option<BlockId>,
        found: Option<BlockId>,
    },

    /// A field selector matched nothing inside the pragma root.
    #[error("field {path} selector {selector:?} matched nothing")]
    #[diagnostic(code(hydra::scan::unresolved_selector))]
    UnresolvedSelector { path: SmolStr, selector: String },

    #[error("invalid field path {0:?}")]
    #[diagnostic(code(hydra::scan::field_path))]
    InvalidFieldPath(SmolStr),

    #[error("unsupported data-block-selector value {0:?}")]
    #[diagnostic(code(hydra::scan::block_selector))]
    InvalidBlockSelector(String),
}

// === Scan ===

/// Output of one scan.
#[derive(Debug, Clone)]
pub struct ScanResult<N> {
    pub tree: ScannedTree,
    pub markers: DomMarkers<N>,
    pub warnings: Vec<ScanWarning>,
}

#[derive(Debug, Clone, Default)]
struct Ctx {
    block: Option<BlockId>,
    readonly: bool,
}

struct Scanner<'a, D: DomTree + ?Sized> {
    dom: &'a D,
    registry: &'a SchemaRegistry,
    tree: Option<&'a BlockTree>,
    scanned: ScannedTree,
    index: HashMap<BlockId, usize>,
    markers: DomMarkers<D::Node>,
    warnings: Vec<ScanWarning>,
}

/// Scan the subtree under `root`.
///
/// `tree` is the last block tree received from the admin UI; when present it
/// supplies block types for container specs.
pub fn scan<D: DomTree + ?Sized>(
    dom: &D,
    root: &D::Node,
    registry: &SchemaRegistry,
    tree: Option<&BlockTree>,
) -> ScanResult<D::Node> {
    let mut scanner = Scanner {
        dom,
        registry,
        tree,
        scanned: ScannedTree::default(),
        index: HashMap::new(),
        markers: DomMarkers::default(),
        warnings: Vec::new(),
    };
    scanner.walk_children(root, &Ctx::default());

    tracing::debug!(
        blocks = scanner.scanned.blocks.len(),
        fields = scanner.markers.fields.len(),
        warnings = scanner.warnings.len(),
        "scan complete"
    );
    for warning in &scanner.warnings {
        tracing::warn!(%warning, "scan warning");
    }

    ScanResult {
        tree: scanner.scanned,
        markers: scanner.markers,
        warnings: scanner.warnings,
    }
}

impl<D: DomTree + ?Sized> Scanner<'_, D> {
    fn walk_children(&mut self, node: &D::Node, ctx: &Ctx) {
        let mut pending: Option<PragmaAttrs> = None;
        let mut ranges: Vec<PragmaAttrs> = Vec::new();

        for child in self.dom.children(node) {
            match self.dom.kind(&child) {
                NodeKind::Comment => {
                    let data = self.dom.data(&child).unwrap_or_default();
                    match parse_comment(&data) {
                        Ok(None) => {}
                        Ok(Some(Pragma::Open(attrs))) => ranges.push(attrs),
                        Ok(Some(Pragma::SelfClosing(attrs))) => pending = Some(attrs),
                        Ok(Some(Pragma::Close)) => {
                            if ranges.pop().is_none() {
                                tracing::trace!("stray /hydra close");
                            }
                        }
                        Err(err) => {
                            // Keep open/close pairing intact with an inert range.
                            if !data.trim_end().ends_with('/') {
                                ranges.push(PragmaAttrs::default());
                            }
                            self.warnings.push(err.into());
                        }
                    }
                }
                NodeKind::Element => {
                    let mut attrs = self.element_attrs(&child);
                    if let Some(p) = pending.take() {
                        merge_attrs(&mut attrs, p);
                    }
                    if let Some(range) = ranges.last() {
                        merge_attrs(&mut attrs, range.clone());
                    }
                    self.visit_element(&child, attrs, ctx);
                }
                NodeKind::Text | NodeKind::Other => {}
            }
        }

        if !ranges.is_empty() {
            tracing::trace!(open = ranges.len(), "unclosed hydra pragma ranges");
        }
    }

    /// Annotations carried directly by an element's attributes.
    fn element_attrs(&self, el: &D::Node) -> PragmaAttrs {
        let dom = self.dom;
        let mut attrs = PragmaAttrs {
            block_uid: dom
                .attribute(el, ATTR_BLOCK_UID)
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().into()),
            ..PragmaAttrs::default()
        };

        for (name, kind) in [
            (ATTR_EDITABLE_FIELD, FieldKind::Editable),
            (ATTR_MEDIA_FIELD, FieldKind::Media),
            (ATTR_LINKABLE_FIELD, FieldKind::Linkable),
        ] {
            if let Some(value) = dom.attribute(el, name) {
                let value = value.trim();
                let path = if value.is_empty() { DEFAULT_FIELD } else { value };
                attrs.fields.push(FieldBinding {
                    kind,
                    path: path.into(),
                    selector: None,
                });
            }
        }

        attrs.readonly = dom
            .attribute(el, ATTR_BLOCK_READONLY)
            .map(|v| v.trim() != "false");
        attrs.add = dom
            .attribute(el, ATTR_BLOCK_ADD)
            .and_then(|v| AddSide::parse(&v));
        attrs.block_selector = dom.attribute(el, ATTR_BLOCK_SELECTOR);
        attrs
    }

    fn visit_element(&mut self, el: &D::Node, attrs: PragmaAttrs, ctx: &Ctx) {
        let mut inner = ctx.clone();
        if let Some(readonly) = attrs.readonly {
            inner.readonly = readonly;
        }

        if let Some(uid) = &attrs.block_uid {
            if self.register_block(uid, el, ctx.block.clone(), &attrs, inner.readonly) {
                inner.block = Some(uid.clone());
            }
        }

        for binding in &attrs.fields {
            self.register_field(el, binding, &inner);
        }

        if let Some(value) = &attrs.block_selector {
            match BlockSelectorTarget::parse(value) {
                Some(target) => self.markers.selectors.push(SelectorMarker {
                    element: el.clone(),
                    owner: inner.block.clone(),
                    target,
                }),
                None => self
                    .warnings
                    .push(ScanWarning::InvalidBlockSelector(value.clone())),
            }
        }

        self.walk_children(el, &inner);
    }

    /// Returns whether the element now represents `uid`.
    fn register_block(
        &mut self,
        uid: &BlockId,
        el: &D::Node,
        parent: Option<BlockId>,
        attrs: &PragmaAttrs,
        readonly: bool,
    ) -> bool {
        if let Some(&idx) = self.index.get(uid) {
            let first = self.scanned.blocks[idx].parent_id.clone();
            if first != parent {
                self.warnings.push(ScanWarning::ReparentedDuplicate {
                    block_id: uid.clone(),
                    first,
                    found: parent,
                });
                return false;
            }
            tracing::trace!(block_id = %uid, "merging duplicate block element");
            self.markers.blocks.entry(uid.clone()).or_default().push(el.clone());
            let block = &mut self.scanned.blocks[idx];
            block.readonly &= readonly;
            if block.add_direction.is_none() {
                block.add_direction = attrs.add;
            }
            return true;
        }

        let mut block = ScannedBlock::new(uid.clone(), parent.clone());
        block.readonly = readonly;
        block.add_direction = attrs.add;
        if let Some(existing) = self.tree.and_then(|t| t.get(uid)) {
            block.container = self.registry.slots(Some(&existing.block_type));
        }

        match &parent {
            Some(p) => {
                if let Some(&pidx) = self.index.get(p) {
                    self.scanned.blocks[pidx].children.push(uid.clone());
                }
            }
            None => self.scanned.roots.push(uid.clone()),
        }
        self.index.insert(uid.clone(), self.scanned.blocks.len());
        self.scanned.blocks.push(block);
        self.markers.blocks.insert(uid.clone(), vec![el.clone()]);
        true
    }

    fn register_field(&mut self, root: &D::Node, binding: &FieldBinding, ctx: &Ctx) {
        if FieldPath::parse(&binding.path).is_err() {
            self.warnings
                .push(ScanWarning::InvalidFieldPath(binding.path.clone()));
            return;
        }

        let element = match &binding.selector {
            None => root.clone(),
            Some(selector) => match self.dom.select_self_or_descendant(root, selector) {
                Some(el) => el,
                None => {
                    self.warnings.push(ScanWarning::UnresolvedSelector {
                        path: binding.path.clone(),
                        selector: selector.clone(),
                    });
                    return;
                }
            },
        };

        // A field element may re-assert editability below a readonly ancestor.
        let readonly = match self.dom.attribute(&element, ATTR_BLOCK_READONLY) {
            Some(v) if element != *root => v.trim() != "false",
            _ => ctx.readonly,
        };
        let allow: Vec<SmolStr> = self
            .dom
            .attribute(&element, ATTR_LINKABLE_ALLOW)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(SmolStr::from)
                    .collect()
            })
            .unwrap_or_default();

        let scanned = ScannedField {
            path: binding.path.clone(),
            kind: binding.kind,
            readonly,
            allow,
        };
        let list = match &ctx.block {
            Some(id) => match self.index.get(id) {
                Some(&idx) => &mut self.scanned.blocks[idx].fields,
                None => return,
            },
            None => &mut self.scanned.page_fields,
        };
        match list.iter_mut().find(|f| f.path == scanned.path) {
            // Duplicated rendering of the same field: editable only if every
            // occurrence is.
            Some(existing) => existing.readonly |= scanned.readonly,
            None => list.push(scanned),
        }

        tracing::trace!(
            block_id = ?ctx.block,
            path = %binding.path,
            readonly,
            "field bound"
        );
        self.markers.fields.push(FieldMarker {
            block_id: ctx.block.clone(),
            path: binding.path.clone(),
            kind: binding.kind,
            readonly,
            element,
        });
    }
}

/// Fill unset annotations in `into` from `from`.
fn merge_attrs(into: &mut PragmaAttrs, from: PragmaAttrs) {
    if into.block_uid.is_none() {
        into.block_uid = from.block_uid;
    }
    for field in from.fields {
        if !into.fields.iter().any(|f| f.path == field.path) {
            into.fields.push(field);
        }
    }
    into.readonly = into.readonly.or(from.readonly);
    into.add = into.add.or(from.add);
    if into.block_selector.is_none() {
        into.block_selector = from.block_selector;
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::block::Block;
    use crate::dom::MemoryDom;

    fn scan_html(html: &str) -> (MemoryDom, ScanResult<crate::dom::NodeRef>) {
        let dom = MemoryDom::parse(html);
        let result = scan(&dom, &dom.root(), &SchemaRegistry::default(), None);
        (dom, result)
    }

    #[test]
    fn test_attribute_scan() {
        let (_, result) = scan_html(
            r#"<div data-block-uid="a"><p data-block-uid="b" data-editable-field="value">hi</p></div>"#,
        );
        let a = result.tree.get("a").unwrap();
        assert_eq!(a.parent_id, None);
        assert_eq!(a.children, vec!["b"]);
        let b = result.tree.get("b").unwrap();
        assert_eq!(b.parent_id.as_deref(), Some("a"));
        assert_eq!(b.fields.len(), 1);
        assert_eq!(b.fields[0].path, "value");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_pragma_selector_targets_inner_element() {
        let (dom, result) = scan_html(
            r#"<!-- hydra block-uid=c1 editable-field=title(.t) --><div><h2 class="t">Hi</h2></div><!-- /hydra -->"#,
        );
        let marker = result.markers.field(Some("c1"), "title").unwrap();
        assert_eq!(dom.tag_name(&marker.element).as_deref(), Some("h2"));
        assert_eq!(dom.tag_name(result.markers.primary("c1").unwrap()).as_deref(), Some("div"));
    }

    #[test]
    fn test_self_closing_applies_to_next_sibling_only() {
        let (_, result) = scan_html(
            r#"<!-- hydra block-uid=x media-field=image /--><figure><img></figure><section></section>"#,
        );
        assert_eq!(result.tree.roots, vec!["x"]);
        assert_eq!(result.markers.elements("x").len(), 1);
        assert_eq!(result.tree.get("x").unwrap().fields[0].kind, FieldKind::Media);
    }

    #[test]
    fn test_readonly_propagates_and_reasserts() {
        let (_, result) = scan_html(
            r#"<div data-block-uid="a" data-block-readonly>
                 <h2 data-editable-field="title">T</h2>
                 <p data-editable-field="body" data-block-readonly="false">B</p>
               </div>"#,
        );
        let a = result.tree.get("a").unwrap();
        assert!(a.readonly);
        assert!(a.field("title").unwrap().readonly);
        assert!(!a.field("body").unwrap().readonly);
        assert!(!result.tree.is_editable(Some("a"), "title"));
        assert!(result.tree.is_editable(Some("a"), "body"));
    }

    #[test]
    fn test_duplicate_ids_merge() {
        let (_, result) = scan_html(
            r#"<div data-block-uid="a"></div><div data-block-uid="a"></div>
               <div data-block-uid="p"><div data-block-uid="a"></div></div>"#,
        );
        assert_eq!(result.tree.roots, vec!["a", "p"]);
        assert_eq!(result.markers.elements("a").len(), 2);
        assert!(result.tree.get("p").unwrap().children.is_empty());
        assert!(matches!(
            result.warnings.as_slice(),
            [ScanWarning::ReparentedDuplicate { .. }]
        ));
    }

    #[test]
    fn test_malformed_pragma_is_plain_content() {
        let (_, result) = scan_html(
            r#"<!-- hydra block-uid=x editable-field=title(.t --><div><h2 class="t">T</h2></div><!-- /hydra -->
               <div data-block-uid="y"></div>"#,
        );
        assert!(!result.tree.contains("x"));
        assert_eq!(result.tree.roots, vec!["y"]);
        assert!(matches!(result.warnings.as_slice(), [ScanWarning::Pragma(_)]));
    }

    #[test]
    fn test_page_fields_and_selectors() {
        let (dom, result) = scan_html(
            r#"<h1 data-editable-field="/title">Home</h1>
               <div data-block-uid="a"><span class="up" data-block-selector="-1"></span></div>"#,
        );
        assert_eq!(result.tree.page_fields[0].path, "/title");
        let span = dom.find(".up").unwrap();
        let marker = result.markers.selector_at(&dom, &span).unwrap();
        assert_eq!(marker.owner.as_deref(), Some("a"));
        assert_eq!(marker.target, BlockSelectorTarget { anchor: None, step: -1 });
    }

    #[test]
    fn test_block_selector_target_parse() {
        assert_eq!(
            BlockSelectorTarget::parse("c1:+2"),
            Some(BlockSelectorTarget {
                anchor: Some("c1".into()),
                step: 2
            })
        );
        assert_eq!(
            BlockSelectorTarget::parse("c1"),
            Some(BlockSelectorTarget {
                anchor: Some("c1".into()),
                step: 0
            })
        );
        assert_eq!(BlockSelectorTarget::parse("c1:x"), None);
        assert_eq!(BlockSelectorTarget::parse(""), None);
    }

    #[test]
    fn test_block_at_walks_up() {
        let (dom, result) = scan_html(
            r#"<div data-block-uid="a"><p><em class="deep">x</em></p></div>"#,
        );
        let em = dom.find(".deep").unwrap();
        assert_eq!(result.markers.block_at(&dom, &em).as_deref(), Some("a"));
    }

    #[test]
    fn test_unfilled_slots() {
        let config = serde_json::from_value(serde_json::json!({
            "blockSchema": {
                "columns": {"slots": {"columns": {"allowed": ["column"], "min": 1}}}
            }
        }))
        .unwrap();
        let registry = SchemaRegistry::new(config);
        let mut tree = BlockTree::new();
        tree.insert(None, "blocks", 0, Block::new("a", "columns")).unwrap();

        let dom = MemoryDom::parse(r#"<div data-block-uid="a"></div>"#);
        let result = scan(&dom, &dom.root(), &registry, Some(&tree));
        assert_eq!(
            result.tree.unfilled_slots(&registry, &tree),
            vec![UnfilledSlot {
                parent: Some("a".into()),
                slot: "columns".into()
            }]
        );
        assert!(result.tree.get("a").unwrap().container.contains_key("columns"));
    }

    #[test]
    fn test_outline_snapshot() {
        let (_, result) = scan_html(
            r#"<div data-block-uid="a" data-block-add="right">
                 <div data-block-uid="b"><h2 data-editable-field="title">x</h2><img data-media-field="image"></div>
                 <div data-block-uid="c" data-block-readonly><p data-editable-field="text">y</p></div>
               </div>"#,
        );
        assert_snapshot!(result.tree.outline(), @r"
        a add=Right
          b [title, image:Media]
          c [text!] readonly
        ");
    }
}
