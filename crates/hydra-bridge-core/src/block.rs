//! Block tree data model.
//!
//! The canonical tree is owned by the admin UI. The bridge keeps a read copy
//! (received over the channel) and only mutates it to synthesize placeholders
//! for edit mode or to preview a proposed edit before sending it.
//!
//! Invariants checked by [`BlockTree::validate`]:
//! - block ids are unique (guaranteed by the map),
//! - every block is listed in exactly one slot of exactly one parent,
//! - `parent_id` agrees with that slot's owner.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::{SmolStr, format_smolstr};

use crate::error::TreeError;
use crate::types::{BlockId, SlotName};

/// A structured content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "@type")]
    pub block_type: SmolStr,
    /// `None` means the block sits directly on the page.
    #[serde(default)]
    pub parent_id: Option<BlockId>,
    /// Ordered child ids per named slot.
    #[serde(default)]
    pub slots: BTreeMap<SlotName, Vec<BlockId>>,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    /// Synthesized to satisfy a slot minimum; never persisted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl Block {
    pub fn new(id: impl Into<BlockId>, block_type: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            block_type: block_type.into(),
            parent_id: None,
            slots: BTreeMap::new(),
            fields: serde_json::Map::new(),
            placeholder: false,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// Where a block lives: its parent (or page), slot and index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPosition {
    pub parent: Option<BlockId>,
    pub slot: SlotName,
    pub index: usize,
}

/// Owner of a resolved field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOwner {
    Block(BlockId),
    Page,
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTarget {
    pub owner: FieldOwner,
    pub field: SmolStr,
}

/// Parsed editable-field path.
///
/// `title` → own field, `../title` → parent's field (repeatable),
/// `/title` → page metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Own(SmolStr),
    Ancestor { levels: usize, field: SmolStr },
    Page(SmolStr),
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, TreeError> {
        let path = path.trim();
        if let Some(field) = path.strip_prefix('/') {
            if field.is_empty() || field.contains('/') {
                return Err(TreeError::InvalidFieldPath(path.to_string()));
            }
            return Ok(FieldPath::Page(field.into()));
        }

        let mut rest = path;
        let mut levels = 0;
        while let Some(stripped) = rest.strip_prefix("../") {
            levels += 1;
            rest = stripped;
        }
        if rest.is_empty() || rest.contains('/') {
            return Err(TreeError::InvalidFieldPath(path.to_string()));
        }
        if levels == 0 {
            Ok(FieldPath::Own(rest.into()))
        } else {
            Ok(FieldPath::Ancestor {
                levels,
                field: rest.into(),
            })
        }
    }

    /// Final field name.
    pub fn field(&self) -> &SmolStr {
        match self {
            FieldPath::Own(f) | FieldPath::Page(f) => f,
            FieldPath::Ancestor { field, .. } => field,
        }
    }
}

/// The page's block tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTree {
    #[serde(default)]
    pub blocks: HashMap<BlockId, Block>,
    /// Slots on the page root.
    #[serde(default)]
    pub root: BTreeMap<SlotName, Vec<BlockId>>,
    /// Page-level metadata fields (`/field` paths).
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.blocks.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Child ids of a slot on a block, or on the page when `parent` is `None`.
    pub fn children(&self, parent: Option<&str>, slot: &str) -> &[BlockId] {
        let slots = match parent {
            Some(p) => match self.blocks.get(p) {
                Some(b) => &b.slots,
                None => return &[],
            },
            None => &self.root,
        };
        slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    fn slots_mut(
        &mut self,
        parent: Option<&str>,
    ) -> Result<&mut BTreeMap<SlotName, Vec<BlockId>>, TreeError> {
        match parent {
            Some(p) => self
                .blocks
                .get_mut(p)
                .map(|b| &mut b.slots)
                .ok_or_else(|| TreeError::UnknownBlock(p.into())),
            None => Ok(&mut self.root),
        }
    }

    /// Parent, slot and index of a block.
    pub fn position(&self, id: &str) -> Option<SlotPosition> {
        let block = self.blocks.get(id)?;
        let parent = block.parent_id.clone();
        let slots = match &parent {
            Some(p) => &self.blocks.get(p)?.slots,
            None => &self.root,
        };
        slots.iter().find_map(|(slot, ids)| {
            ids.iter().position(|c| c == id).map(|index| SlotPosition {
                parent: parent.clone(),
                slot: slot.clone(),
                index,
            })
        })
    }

    pub fn parent_of(&self, id: &str) -> Option<&BlockId> {
        self.blocks.get(id)?.parent_id.as_ref()
    }

    /// The sibling following `id` in its slot.
    pub fn next_sibling(&self, id: &str) -> Option<&BlockId> {
        let pos = self.position(id)?;
        self.children(pos.parent.as_deref(), &pos.slot)
            .get(pos.index + 1)
    }

    /// The sibling preceding `id` in its slot.
    pub fn prev_sibling(&self, id: &str) -> Option<&BlockId> {
        let pos = self.position(id)?;
        let index = pos.index.checked_sub(1)?;
        self.children(pos.parent.as_deref(), &pos.slot).get(index)
    }

    /// First persisted block at or after `id` in its slot. Placeholders are
    /// skipped: they never reach the admin UI and cannot anchor an insert.
    pub fn persisted_from(&self, id: &str) -> Option<BlockId> {
        let pos = self.position(id)?;
        self.children(pos.parent.as_deref(), &pos.slot)
            .iter()
            .skip(pos.index)
            .find(|c| self.get(c.as_str()).is_some_and(|b| !b.placeholder))
            .cloned()
    }

    /// First persisted sibling after `id`.
    pub fn persisted_next(&self, id: &str) -> Option<BlockId> {
        let next = self.next_sibling(id)?.clone();
        self.persisted_from(&next)
    }

    /// Ancestors from the immediate parent up to the top-level block.
    pub fn ancestors(&self, id: &str) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut current = self.parent_of(id).cloned();
        while let Some(p) = current {
            if out.contains(&p) {
                break;
            }
            current = self.parent_of(&p).cloned();
            out.push(p);
        }
        out
    }

    /// Nesting depth: top-level blocks are depth 0.
    pub fn depth(&self, id: &str) -> usize {
        self.ancestors(id).len()
    }

    /// Whether `id` is `ancestor` or lies beneath it.
    pub fn is_within(&self, id: &str, ancestor: &str) -> bool {
        id == ancestor || self.ancestors(id).iter().any(|a| a == ancestor)
    }

    /// All ids in the subtree rooted at `id`, root first.
    pub fn subtree(&self, id: &str) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![BlockId::from(id)];
        while let Some(current) = stack.pop() {
            if let Some(block) = self.blocks.get(&current) {
                for ids in block.slots.values().rev() {
                    stack.extend(ids.iter().rev().cloned());
                }
                out.push(current);
            }
        }
        out
    }

    /// Insert a new block into a slot at `index` (clamped to the slot length).
    pub fn insert(
        &mut self,
        parent: Option<&str>,
        slot: &str,
        index: usize,
        mut block: Block,
    ) -> Result<(), TreeError> {
        if self.blocks.contains_key(&block.id) {
            return Err(TreeError::DuplicateBlock(block.id));
        }
        let id = block.id.clone();
        let slots = self.slots_mut(parent)?;
        let ids = slots.entry(slot.into()).or_default();
        let index = index.min(ids.len());
        ids.insert(index, id.clone());
        block.parent_id = parent.map(BlockId::from);
        self.blocks.insert(id, block);
        Ok(())
    }

    /// Remove a block and its descendants, returning the removed root.
    pub fn remove(&mut self, id: &str) -> Result<Block, TreeError> {
        let pos = self
            .position(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        let slots = self.slots_mut(pos.parent.as_deref())?;
        if let Some(ids) = slots.get_mut(&pos.slot) {
            ids.remove(pos.index);
        }
        let subtree = self.subtree(id);
        let mut root = None;
        for removed in subtree {
            let block = self.blocks.remove(&removed);
            if removed == id {
                root = block;
            }
        }
        root.ok_or_else(|| TreeError::UnknownBlock(id.into()))
    }

    /// Move a block to a slot, before `before` (or to the end when `None`).
    pub fn move_block(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
        slot: &str,
        before: Option<&str>,
    ) -> Result<(), TreeError> {
        if !self.blocks.contains_key(id) {
            return Err(TreeError::UnknownBlock(id.into()));
        }
        if let Some(p) = new_parent {
            if !self.blocks.contains_key(p) {
                return Err(TreeError::UnknownBlock(p.into()));
            }
            if self.is_within(p, id) {
                return Err(TreeError::Cycle { id: id.into() });
            }
        }
        let pos = self
            .position(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        if let Some(ids) = self.slots_mut(pos.parent.as_deref())?.get_mut(&pos.slot) {
            ids.remove(pos.index);
        }

        let ids = self.slots_mut(new_parent)?.entry(slot.into()).or_default();
        let index = before
            .and_then(|b| ids.iter().position(|c| c == b))
            .unwrap_or(ids.len());
        ids.insert(index, id.into());
        if let Some(block) = self.blocks.get_mut(id) {
            block.parent_id = new_parent.map(BlockId::from);
        }
        Ok(())
    }

    /// Duplicate a block and its descendants right after the original.
    ///
    /// New ids are produced by `fresh_id`. Returns the id of the copy.
    pub fn copy_block(
        &mut self,
        id: &str,
        mut fresh_id: impl FnMut() -> BlockId,
    ) -> Result<BlockId, TreeError> {
        let pos = self
            .position(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        let subtree = self.subtree(id);
        let mapping: HashMap<BlockId, BlockId> =
            subtree.iter().map(|old| (old.clone(), fresh_id())).collect();

        for old in &subtree {
            let Some(original) = self.blocks.get(old) else {
                continue;
            };
            let mut copy = original.clone();
            copy.id = mapping[old].clone();
            if old != id {
                copy.parent_id = copy.parent_id.as_ref().and_then(|p| mapping.get(p)).cloned();
            }
            for ids in copy.slots.values_mut() {
                for child in ids.iter_mut() {
                    if let Some(mapped) = mapping.get(child) {
                        *child = mapped.clone();
                    }
                }
            }
            self.blocks.insert(copy.id.clone(), copy);
        }

        let new_id = mapping[id].clone();
        if let Some(ids) = self.slots_mut(pos.parent.as_deref())?.get_mut(&pos.slot) {
            ids.insert(pos.index + 1, new_id.clone());
        }
        Ok(new_id)
    }

    /// Resolve an editable-field path relative to a block.
    pub fn resolve_field(&self, block_id: &str, path: &FieldPath) -> Result<FieldTarget, TreeError> {
        if !self.blocks.contains_key(block_id) {
            return Err(TreeError::UnknownBlock(block_id.into()));
        }
        match path {
            FieldPath::Own(field) => Ok(FieldTarget {
                owner: FieldOwner::Block(block_id.into()),
                field: field.clone(),
            }),
            FieldPath::Page(field) => Ok(FieldTarget {
                owner: FieldOwner::Page,
                field: field.clone(),
            }),
            FieldPath::Ancestor { levels, field } => {
                let mut current: Option<BlockId> = Some(block_id.into());
                for _ in 0..*levels {
                    match current {
                        Some(id) => current = self.parent_of(&id).cloned(),
                        None => {
                            return Err(TreeError::FieldPathEscapes(format_smolstr!(
                                "{}{}",
                                "../".repeat(*levels),
                                field
                            )));
                        }
                    }
                }
                Ok(FieldTarget {
                    owner: current.map(FieldOwner::Block).unwrap_or(FieldOwner::Page),
                    field: field.clone(),
                })
            }
        }
    }

    /// Read a resolved field value.
    pub fn field_value(&self, target: &FieldTarget) -> Option<&Value> {
        match &target.owner {
            FieldOwner::Page => self.metadata.get(target.field.as_str()),
            FieldOwner::Block(id) => self.blocks.get(id)?.fields.get(target.field.as_str()),
        }
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut listed: HashMap<&BlockId, Vec<Option<&BlockId>>> = HashMap::new();
        for ids in self.root.values() {
            for id in ids {
                listed.entry(id).or_default().push(None);
            }
        }
        for block in self.blocks.values() {
            for ids in block.slots.values() {
                for id in ids {
                    listed.entry(id).or_default().push(Some(&block.id));
                }
            }
        }

        for (id, owners) in &listed {
            if !self.blocks.contains_key(*id) {
                return Err(TreeError::UnknownBlock((*id).clone()));
            }
            if owners.len() != 1 {
                return Err(TreeError::SlotMembership {
                    id: (*id).clone(),
                    count: owners.len(),
                });
            }
        }

        for block in self.blocks.values() {
            let Some(owners) = listed.get(&block.id) else {
                return Err(TreeError::SlotMembership {
                    id: block.id.clone(),
                    count: 0,
                });
            };
            let actual = owners[0];
            if actual != block.parent_id.as_ref() {
                return Err(TreeError::ParentMismatch {
                    id: block.id.clone(),
                    claimed: block.parent_id.clone(),
                    actual: actual.cloned(),
                });
            }
        }
        Ok(())
    }

    /// Copy of the tree with placeholder blocks removed.
    pub fn persisted(&self) -> BlockTree {
        let mut out = self.clone();
        out.blocks.retain(|_, b| !b.placeholder);
        let keep = |ids: &mut Vec<BlockId>, blocks: &HashMap<BlockId, Block>| {
            ids.retain(|id| blocks.contains_key(id));
        };
        let blocks = out.blocks.clone();
        for ids in out.root.values_mut() {
            keep(ids, &blocks);
        }
        for block in out.blocks.values_mut() {
            for ids in block.slots.values_mut() {
                keep(ids, &blocks);
            }
        }
        out
    }
}
