//! Structural constraints on slots.
//!
//! Every proposed add/remove/move is checked here before it is sent. Rejected
//! edits never reach the channel. Placeholders keep slots at their minimum
//! while in edit mode and are stripped by [`BlockTree::persisted`].

use smol_str::{SmolStr, format_smolstr};

use crate::block::{Block, BlockTree};
use crate::error::{ContainerError, TreeError};
use crate::schema::{SchemaRegistry, SlotMode, SlotSpec};
use crate::types::{BlockId, SlotName};

/// Type given to placeholders in slots with no single obvious type. The admin
/// UI renders it as a block chooser.
pub const CHOOSER_TYPE: &str = "empty";

/// What adding to a slot should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionChoice {
    /// Exactly one type fits; insert it without asking.
    Direct(SmolStr),
    /// Ask the user to pick a type.
    Chooser,
}

/// Consequence of a removal that passed the checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovePlan {
    pub parent: Option<BlockId>,
    pub slot: SlotName,
    /// Type of the placeholder that will refill the slot, if one is needed.
    pub placeholder: Option<SmolStr>,
}

/// Checks structural edits against the schema.
#[derive(Debug, Clone, Copy)]
pub struct ContainerResolver<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ContainerResolver<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Spec for a slot. Undeclared slots are unconstrained.
    pub fn slot_spec(&self, tree: &BlockTree, parent: Option<&str>, slot: &str) -> SlotSpec {
        let parent_type = parent.and_then(|p| tree.get(p)).map(|b| b.block_type.as_str());
        if parent.is_some() && parent_type.is_none() {
            return SlotSpec::default();
        }
        self.registry
            .slot_spec(parent_type, slot)
            .unwrap_or_default()
    }

    /// Validate adding a block of `block_type` to a slot.
    pub fn check_add(
        &self,
        tree: &BlockTree,
        parent: Option<&str>,
        slot: &str,
        block_type: &str,
    ) -> Result<(), ContainerError> {
        if let Some(p) = parent {
            if !tree.contains(p) {
                return Err(TreeError::UnknownBlock(p.into()).into());
            }
        }
        let spec = self.slot_spec(tree, parent, slot);
        if !spec.allows(block_type) {
            return Err(ContainerError::TypeNotAllowed {
                slot: slot.into(),
                block_type: block_type.into(),
            });
        }
        self.check_capacity(tree, parent, slot)
    }

    /// Validate that a slot has room for one more block of any type.
    pub fn check_capacity(
        &self,
        tree: &BlockTree,
        parent: Option<&str>,
        slot: &str,
    ) -> Result<(), ContainerError> {
        let spec = self.slot_spec(tree, parent, slot);
        if let Some(max) = spec.max {
            if real_children(tree, parent, slot) >= max {
                return Err(ContainerError::MaxExceeded {
                    slot: slot.into(),
                    max,
                });
            }
        }
        Ok(())
    }

    /// Validate removing a block and report whether a placeholder follows.
    pub fn check_remove(&self, tree: &BlockTree, id: &str) -> Result<RemovePlan, ContainerError> {
        let pos = tree
            .position(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        let spec = self.slot_spec(tree, pos.parent.as_deref(), &pos.slot);
        let remaining = tree
            .children(pos.parent.as_deref(), &pos.slot)
            .iter()
            .filter(|c| c.as_str() != id)
            .count();
        let placeholder = (remaining < spec.min).then(|| placeholder_type(&spec));
        Ok(RemovePlan {
            parent: pos.parent,
            slot: pos.slot,
            placeholder,
        })
    }

    /// Validate moving a block into `new_parent`/`new_slot`.
    pub fn check_move(
        &self,
        tree: &BlockTree,
        id: &str,
        new_parent: Option<&str>,
        new_slot: &str,
    ) -> Result<(), ContainerError> {
        let block = tree
            .get(id)
            .ok_or_else(|| TreeError::UnknownBlock(id.into()))?;
        if let Some(p) = new_parent {
            if !tree.contains(p) {
                return Err(TreeError::UnknownBlock(p.into()).into());
            }
            if tree.is_within(p, id) {
                return Err(TreeError::Cycle { id: id.into() }.into());
            }
        }
        let spec = self.slot_spec(tree, new_parent, new_slot);
        if !spec.allows(&block.block_type) {
            return Err(ContainerError::TypeNotAllowed {
                slot: new_slot.into(),
                block_type: block.block_type.clone(),
            });
        }
        let same_slot = tree
            .position(id)
            .is_some_and(|pos| pos.parent.as_deref() == new_parent && pos.slot == new_slot);
        if let (false, Some(max)) = (same_slot, spec.max) {
            if real_children(tree, new_parent, new_slot) >= max {
                return Err(ContainerError::MaxExceeded {
                    slot: new_slot.into(),
                    max,
                });
            }
        }
        Ok(())
    }

    /// Whether adding to a slot can skip the chooser.
    pub fn insertion_choice(&self, tree: &BlockTree, parent: Option<&str>, slot: &str) -> InsertionChoice {
        let spec = self.slot_spec(tree, parent, slot);
        match spec.sole_type() {
            Some(t) => InsertionChoice::Direct(t.clone()),
            None => InsertionChoice::Chooser,
        }
    }

    /// Fill every declared slot up to its minimum with placeholders.
    ///
    /// Placeholder ids are derived from the slot, so repeated calls on the
    /// same tree yield the same ids. Returns the ids added.
    pub fn ensure_min(&self, tree: &mut BlockTree) -> Vec<BlockId> {
        let mut added = Vec::new();
        let mut owners: Vec<Option<BlockId>> = vec![None];
        owners.extend(tree.blocks.keys().cloned().map(Some));
        // Placeholders added here may declare slots of their own.
        while let Some(owner) = owners.pop() {
            let block_type = match &owner {
                Some(id) => match tree.get(id) {
                    Some(b) => Some(b.block_type.clone()),
                    None => continue,
                },
                None => None,
            };
            for (slot, spec) in self.registry.slots(block_type.as_deref()) {
                let mut have = tree.children(owner.as_deref(), &slot).len();
                let mut n = 0usize;
                while have < spec.min {
                    let id = placeholder_id(owner.as_deref(), &slot, n);
                    n += 1;
                    if tree.contains(&id) {
                        continue;
                    }
                    let mut block = Block::new(id.clone(), placeholder_type(&spec));
                    block.placeholder = true;
                    if let Err(e) = tree.insert(owner.as_deref(), &slot, usize::MAX, block) {
                        tracing::warn!(error = %e, slot = %slot, "could not synthesize placeholder");
                        break;
                    }
                    tracing::debug!(id = %id, parent = ?owner, slot = %slot, "placeholder synthesized");
                    have += 1;
                    owners.push(Some(id.clone()));
                    added.push(id);
                }
            }
        }
        added
    }

    // === Table mode ===

    fn table(&self, tree: &BlockTree, table: &str, slot: &str) -> Result<(SmolStr, SlotName, SmolStr), ContainerError> {
        if !tree.contains(table) {
            return Err(TreeError::UnknownBlock(table.into()).into());
        }
        let spec = self.slot_spec(tree, Some(table), slot);
        match &spec.mode {
            SlotMode::Table {
                cell_slot,
                cell_type,
            } => Ok((placeholder_type(&spec), cell_slot.clone(), cell_type.clone())),
            SlotMode::List => Err(TreeError::UnknownSlot {
                parent: Some(table.into()),
                slot: slot.into(),
            }
            .into()),
        }
    }

    /// Number of columns: the widest row.
    pub fn column_count(&self, tree: &BlockTree, table: &str, slot: &str) -> Result<usize, ContainerError> {
        let (_, cell_slot, _) = self.table(tree, table, slot)?;
        Ok(tree
            .children(Some(table), slot)
            .iter()
            .map(|row| tree.children(Some(row), &cell_slot).len())
            .max()
            .unwrap_or(0))
    }

    /// Insert a cell at `column` in every row. Returns the new cell ids.
    pub fn insert_column(
        &self,
        tree: &mut BlockTree,
        table: &str,
        slot: &str,
        column: usize,
        mut fresh_id: impl FnMut() -> BlockId,
    ) -> Result<Vec<BlockId>, ContainerError> {
        let (_, cell_slot, cell_type) = self.table(tree, table, slot)?;
        let columns = self.column_count(tree, table, slot)?;
        if column > columns {
            return Err(ContainerError::ColumnOutOfRange { column, columns });
        }
        let rows = tree.children(Some(table), slot).to_vec();
        let mut added = Vec::with_capacity(rows.len());
        for row in rows {
            let id = fresh_id();
            tree.insert(Some(&row), &cell_slot, column, Block::new(id.clone(), cell_type.clone()))?;
            added.push(id);
        }
        Ok(added)
    }

    /// Remove the cell at `column` from every row that has one.
    pub fn remove_column(
        &self,
        tree: &mut BlockTree,
        table: &str,
        slot: &str,
        column: usize,
    ) -> Result<Vec<Block>, ContainerError> {
        let (_, cell_slot, _) = self.table(tree, table, slot)?;
        let columns = self.column_count(tree, table, slot)?;
        if column >= columns {
            return Err(ContainerError::ColumnOutOfRange { column, columns });
        }
        let rows = tree.children(Some(table), slot).to_vec();
        let mut removed = Vec::new();
        for row in rows {
            let Some(cell) = tree.children(Some(&row), &cell_slot).get(column).cloned() else {
                continue;
            };
            removed.push(tree.remove(&cell)?);
        }
        Ok(removed)
    }

    /// Pad a row with cells until it matches the table's column count.
    pub fn pad_row(
        &self,
        tree: &mut BlockTree,
        table: &str,
        slot: &str,
        row: &str,
        mut fresh_id: impl FnMut() -> BlockId,
    ) -> Result<Vec<BlockId>, ContainerError> {
        let (_, cell_slot, cell_type) = self.table(tree, table, slot)?;
        if tree.parent_of(row).map(|p| p.as_str()) != Some(table) {
            return Err(ContainerError::NotInSlot(row.into()));
        }
        let columns = self.column_count(tree, table, slot)?;
        let mut added = Vec::new();
        while tree.children(Some(row), &cell_slot).len() < columns {
            let id = fresh_id();
            tree.insert(Some(row), &cell_slot, usize::MAX, Block::new(id.clone(), cell_type.clone()))?;
            added.push(id);
        }
        Ok(added)
    }

    /// Insert a row at `index` and pad it to the column count.
    pub fn insert_row(
        &self,
        tree: &mut BlockTree,
        table: &str,
        slot: &str,
        index: usize,
        mut fresh_id: impl FnMut() -> BlockId,
    ) -> Result<BlockId, ContainerError> {
        let (row_type, _, _) = self.table(tree, table, slot)?;
        self.check_add(tree, Some(table), slot, &row_type)?;
        let id = fresh_id();
        tree.insert(Some(table), slot, index, Block::new(id.clone(), row_type))?;
        self.pad_row(tree, table, slot, &id, fresh_id)?;
        Ok(id)
    }
}

fn real_children(tree: &BlockTree, parent: Option<&str>, slot: &str) -> usize {
    tree.children(parent, slot)
        .iter()
        .filter(|c| tree.get(c).is_some_and(|b| !b.placeholder))
        .count()
}

fn placeholder_type(spec: &SlotSpec) -> SmolStr {
    spec.default_type
        .clone()
        .or_else(|| spec.sole_type().cloned())
        .unwrap_or_else(|| SmolStr::new_static(CHOOSER_TYPE))
}

fn placeholder_id(parent: Option<&str>, slot: &str, n: usize) -> BlockId {
    format_smolstr!("{}~{slot}~{n}", parent.unwrap_or("page"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::BridgeConfig;

    fn registry() -> SchemaRegistry {
        let config: BridgeConfig = serde_json::from_value(json!({
            "allowedBlocks": ["slate", "image", "columns", "table"],
            "blockSchema": {
                "columns": {"slots": {
                    "columns": {"allowed": ["column"], "min": 1, "max": 2, "orientation": "horizontal"}
                }},
                "column": {"slots": {
                    "blocks": {"allowed": ["slate", "image"], "defaultType": "slate", "min": 1}
                }},
                "table": {"slots": {
                    "rows": {"allowed": ["row"], "mode": {"kind": "table", "cellSlot": "cells", "cellType": "cell"}}
                }}
            }
        }))
        .unwrap();
        SchemaRegistry::new(config)
    }

    fn tree() -> BlockTree {
        let mut t = BlockTree::new();
        t.insert(None, "blocks", 0, Block::new("grid", "columns")).unwrap();
        t.insert(Some("grid"), "columns", 0, Block::new("c1", "column")).unwrap();
        t.insert(Some("c1"), "blocks", 0, Block::new("t1", "slate")).unwrap();
        t.insert(None, "blocks", 1, Block::new("img", "image")).unwrap();
        t
    }

    #[test]
    fn test_allowed_types() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let t = tree();
        assert!(r.check_add(&t, Some("grid"), "columns", "column").is_ok());
        assert_eq!(
            r.check_add(&t, Some("grid"), "columns", "slate"),
            Err(ContainerError::TypeNotAllowed {
                slot: "columns".into(),
                block_type: "slate".into()
            })
        );
        assert!(r.check_add(&t, None, "blocks", "column").is_err());
    }

    #[test]
    fn test_max_count() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let mut t = tree();
        t.insert(Some("grid"), "columns", 1, Block::new("c2", "column")).unwrap();
        assert_eq!(
            r.check_add(&t, Some("grid"), "columns", "column"),
            Err(ContainerError::MaxExceeded {
                slot: "columns".into(),
                max: 2
            })
        );
        // Reordering within a full slot is fine.
        assert!(r.check_move(&t, "c2", Some("grid"), "columns").is_ok());
    }

    #[test]
    fn test_move_rules() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let t = tree();
        assert!(r.check_move(&t, "img", Some("c1"), "blocks").is_ok());
        assert_eq!(
            r.check_move(&t, "grid", Some("c1"), "blocks"),
            Err(ContainerError::Tree(TreeError::Cycle { id: "grid".into() }))
        );
        assert!(matches!(
            r.check_move(&t, "t1", Some("grid"), "columns"),
            Err(ContainerError::TypeNotAllowed { .. })
        ));
    }

    #[test]
    fn test_removing_last_child_leaves_one_placeholder() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let mut t = tree();
        let plan = r.check_remove(&t, "t1").unwrap();
        assert_eq!(plan.placeholder.as_deref(), Some("slate"));

        t.remove("t1").unwrap();
        let added = r.ensure_min(&mut t);
        assert_eq!(added.len(), 1);
        let children = t.children(Some("c1"), "blocks");
        assert_eq!(children.len(), 1);
        let placeholder = t.get(&children[0]).unwrap();
        assert!(placeholder.placeholder);
        assert_eq!(placeholder.block_type, "slate");

        // Idempotent.
        assert!(r.ensure_min(&mut t).is_empty());
        assert_eq!(t.children(Some("c1"), "blocks").len(), 1);
        assert!(t.validate().is_ok());
        assert!(t.persisted().children(Some("c1"), "blocks").is_empty());
    }

    #[test]
    fn test_ensure_min_recurses_into_placeholders() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let mut t = BlockTree::new();
        t.insert(None, "blocks", 0, Block::new("grid", "columns")).unwrap();
        let added = r.ensure_min(&mut t);
        // A column placeholder, then a slate placeholder inside it.
        assert_eq!(added.len(), 2);
        let col = &t.children(Some("grid"), "columns")[0];
        assert_eq!(t.get(col).unwrap().block_type, "column");
        assert_eq!(t.children(Some(col), "blocks").len(), 1);
    }

    #[test]
    fn test_insertion_choice() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let t = tree();
        assert_eq!(
            r.insertion_choice(&t, Some("grid"), "columns"),
            InsertionChoice::Direct("column".into())
        );
        assert_eq!(r.insertion_choice(&t, Some("c1"), "blocks"), InsertionChoice::Chooser);
        assert_eq!(r.insertion_choice(&t, None, "blocks"), InsertionChoice::Chooser);
    }

    fn table_tree() -> BlockTree {
        let mut t = BlockTree::new();
        t.insert(None, "blocks", 0, Block::new("tbl", "table")).unwrap();
        for (r, cells) in [("r1", 2), ("r2", 2)] {
            t.insert(Some("tbl"), "rows", usize::MAX, Block::new(r, "row")).unwrap();
            for c in 0..cells {
                t.insert(Some(r), "cells", usize::MAX, Block::new(format!("{r}c{c}"), "cell"))
                    .unwrap();
            }
        }
        t
    }

    fn ids() -> impl FnMut() -> BlockId {
        let mut n = 0;
        move || {
            n += 1;
            format_smolstr!("new{n}")
        }
    }

    #[test]
    fn test_insert_column_propagates() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let mut t = table_tree();
        let added = r.insert_column(&mut t, "tbl", "rows", 1, ids()).unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(t.children(Some("r1"), "cells"), &["r1c0", "new1", "r1c1"]);
        assert_eq!(t.children(Some("r2"), "cells"), &["r2c0", "new2", "r2c1"]);
        assert_eq!(r.column_count(&t, "tbl", "rows").unwrap(), 3);
    }

    #[test]
    fn test_remove_column_propagates() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let mut t = table_tree();
        let removed = r.remove_column(&mut t, "tbl", "rows", 0).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(t.children(Some("r1"), "cells"), &["r1c1"]);
        assert_eq!(
            r.remove_column(&mut t, "tbl", "rows", 5),
            Err(ContainerError::ColumnOutOfRange { column: 5, columns: 1 })
        );
    }

    #[test]
    fn test_new_rows_are_padded() {
        let reg = registry();
        let r = ContainerResolver::new(&reg);
        let mut t = table_tree();
        let row = r.insert_row(&mut t, "tbl", "rows", 2, ids()).unwrap();
        assert_eq!(t.get(&row).unwrap().block_type, "row");
        assert_eq!(t.children(Some(&row), "cells").len(), 2);
        assert!(t.validate().is_ok());
    }
}
