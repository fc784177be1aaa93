//! Block schema and bridge configuration.
//!
//! The frontend hands the bridge a closed configuration at init: which block
//! types may be added, the per-type schema (fields, child slots) and an optional
//! schema enhancer. Everything here deserializes from the camelCase JSON the
//! admin UI already uses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::types::{DEFAULT_SLOT, Orientation, SlotName};

fn default_slot_field() -> SlotName {
    SmolStr::new_static(DEFAULT_SLOT)
}

/// How a slot arranges its children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SlotMode {
    /// Plain ordered list of child blocks.
    #[default]
    List,
    /// Rows of cells. Each child is a row whose `cell_slot` holds the cells.
    #[serde(rename_all = "camelCase")]
    Table {
        cell_slot: SlotName,
        cell_type: SmolStr,
    },
}

/// Structural constraints for one named slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpec {
    /// Allowed child types. Empty means any type.
    #[serde(default)]
    pub allowed: Vec<SmolStr>,
    /// Type inserted by default (and used for placeholders).
    #[serde(default)]
    pub default_type: Option<SmolStr>,
    #[serde(default)]
    pub min: usize,
    #[serde(default)]
    pub max: Option<usize>,
    /// Layout direction; `None` lets the overlay infer it from depth.
    #[serde(default)]
    pub orientation: Option<Orientation>,
    /// Field on the parent block that stores this slot's ids.
    #[serde(default = "default_slot_field")]
    pub field: SlotName,
    #[serde(default)]
    pub mode: SlotMode,
}

impl Default for SlotSpec {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            default_type: None,
            min: 0,
            max: None,
            orientation: None,
            field: default_slot_field(),
            mode: SlotMode::List,
        }
    }
}

impl SlotSpec {
    /// Whether a block type may live in this slot.
    pub fn allows(&self, block_type: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|t| t == block_type)
    }

    /// The single allowed type, when the slot names exactly one.
    pub fn sole_type(&self) -> Option<&SmolStr> {
        match self.allowed.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Kind of an editable field, mirroring the three DOM annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Plain or rich text edited in place.
    #[default]
    Editable,
    /// Image/media picker.
    Media,
    /// Link target picker.
    Linkable,
}

/// Widget kind of a field in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldWidget {
    #[default]
    String,
    Textarea,
    Slate,
    Image,
    Link,
    Object,
}

/// One field in a block schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: SmolStr,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub widget: FieldWidget,
}

impl FieldSpec {
    pub fn new(name: impl Into<SmolStr>, widget: FieldWidget) -> Self {
        Self {
            name: name.into(),
            title: None,
            widget,
        }
    }
}

/// One skiplogic rule: hide `field` when `when` equals `equals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipRule {
    pub field: SmolStr,
    pub when: SmolStr,
    pub equals: Value,
}

/// Closed set of schema transformations a block type may declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "camelCase")]
pub enum SchemaEnhancer {
    /// Append the fields of the block type named by this block's `field` value.
    #[serde(rename_all = "camelCase")]
    InheritSchemaFrom { field: SmolStr },
    /// Hide these fields when the parent block already owns them.
    #[serde(rename_all = "camelCase")]
    HideParentOwnedFields { fields: Vec<SmolStr> },
    /// Conditionally hide fields based on other field values.
    #[serde(rename_all = "camelCase")]
    Skiplogic { rules: Vec<SkipRule> },
}

/// Per-type schema.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSchema {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub slots: BTreeMap<SlotName, SlotSpec>,
    #[serde(default)]
    pub schema_enhancer: Option<SchemaEnhancer>,
}

/// Overlay tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayConfig {
    /// Pixels of clipped height (or total height) below which the outline
    /// degrades to a bottom line.
    pub bottom_line_threshold: f64,
    pub toolbar_height: f64,
    pub add_button_size: f64,
    pub gap: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bottom_line_threshold: 10.0,
            toolbar_height: 32.0,
            add_button_size: 24.0,
            gap: 4.0,
        }
    }
}

/// Drag-and-drop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DragConfig {
    /// Distance from the viewport edge that triggers auto-scroll.
    pub edge_margin: f64,
    /// Pixels scrolled per animation frame while auto-scrolling.
    pub scroll_step: f64,
    /// Pointer travel before a press becomes a drag.
    pub start_threshold: f64,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            edge_margin: 50.0,
            scroll_step: 12.0,
            start_threshold: 4.0,
        }
    }
}

/// Configuration passed to the bridge at init.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Block types offered by the chooser at page level.
    pub allowed_blocks: Vec<SmolStr>,
    pub block_schema: BTreeMap<SmolStr, BlockSchema>,
    /// Slots on the page root. Defaults to one unconstrained `blocks` slot.
    pub page_slots: BTreeMap<SlotName, SlotSpec>,
    pub overlay: OverlayConfig,
    pub drag: DragConfig,
}

/// Read access to schemas with enhancers applied.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    config: BridgeConfig,
}

impl SchemaRegistry {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn schema(&self, block_type: &str) -> Option<&BlockSchema> {
        self.config.block_schema.get(block_type)
    }

    /// Slot spec for a block type's slot, or for the page root when
    /// `block_type` is `None`.
    ///
    /// The page root always has a `blocks` slot restricted to `allowed_blocks`.
    pub fn slot_spec(&self, block_type: Option<&str>, slot: &str) -> Option<SlotSpec> {
        match block_type {
            Some(t) => self.schema(t).and_then(|s| s.slots.get(slot)).cloned(),
            None => {
                if let Some(spec) = self.config.page_slots.get(slot) {
                    return Some(spec.clone());
                }
                (slot == DEFAULT_SLOT).then(|| SlotSpec {
                    allowed: self.config.allowed_blocks.clone(),
                    ..SlotSpec::default()
                })
            }
        }
    }

    /// All slots declared for a block type (page root when `None`).
    pub fn slots(&self, block_type: Option<&str>) -> BTreeMap<SlotName, SlotSpec> {
        match block_type {
            Some(t) => self.schema(t).map(|s| s.slots.clone()).unwrap_or_default(),
            None => {
                let mut slots = self.config.page_slots.clone();
                if slots.is_empty() {
                    if let Some(spec) = self.slot_spec(None, DEFAULT_SLOT) {
                        slots.insert(SmolStr::new_static(DEFAULT_SLOT), spec);
                    }
                }
                slots
            }
        }
    }

    /// Fields shown for a block after applying its schema enhancer.
    ///
    /// `values` are the block's own field values; `parent_type` is the type of
    /// the block's parent (for `hideParentOwnedFields`).
    pub fn visible_fields(
        &self,
        block_type: &str,
        values: &serde_json::Map<String, Value>,
        parent_type: Option<&str>,
    ) -> Vec<FieldSpec> {
        let Some(schema) = self.schema(block_type) else {
            return Vec::new();
        };
        let mut fields = schema.fields.clone();

        match &schema.schema_enhancer {
            None => {}
            Some(SchemaEnhancer::InheritSchemaFrom { field }) => {
                let inherited = values
                    .get(field.as_str())
                    .and_then(Value::as_str)
                    .and_then(|t| self.schema(t));
                if let Some(inherited) = inherited {
                    for f in &inherited.fields {
                        if !fields.iter().any(|existing| existing.name == f.name) {
                            fields.push(f.clone());
                        }
                    }
                }
            }
            Some(SchemaEnhancer::HideParentOwnedFields { fields: owned }) => {
                let parent_fields: Vec<&SmolStr> = parent_type
                    .and_then(|t| self.schema(t))
                    .map(|s| s.fields.iter().map(|f| &f.name).collect())
                    .unwrap_or_default();
                fields.retain(|f| !(owned.contains(&f.name) && parent_fields.contains(&&f.name)));
            }
            Some(SchemaEnhancer::Skiplogic { rules }) => {
                fields.retain(|f| {
                    !rules.iter().any(|rule| {
                        rule.field == f.name && values.get(rule.when.as_str()) == Some(&rule.equals)
                    })
                });
            }
        }

        fields
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> SchemaRegistry {
        let config: BridgeConfig = serde_json::from_value(json!({
            "allowedBlocks": ["slate", "image", "columns"],
            "blockSchema": {
                "columns": {
                    "fields": [{"name": "title"}],
                    "slots": {
                        "columns": {"allowed": ["column"], "min": 1, "max": 4, "orientation": "horizontal"}
                    }
                },
                "column": {
                    "fields": [{"name": "title"}, {"name": "width"}],
                    "schemaEnhancer": {"kind": "hideParentOwnedFields", "params": {"fields": ["title"]}}
                },
                "teaser": {
                    "fields": [{"name": "href", "widget": "link"}, {"name": "preview"}],
                    "schemaEnhancer": {"kind": "skiplogic", "params": {"rules": [
                        {"field": "preview", "when": "overwrite", "equals": false}
                    ]}}
                },
                "listing": {
                    "fields": [{"name": "variation"}],
                    "schemaEnhancer": {"kind": "inheritSchemaFrom", "params": {"field": "variation"}}
                },
                "summary": {"fields": [{"name": "showDate"}]}
            }
        }))
        .expect("valid config");
        SchemaRegistry::new(config)
    }

    #[test]
    fn test_page_slot_defaults_to_allowed_blocks() {
        let reg = registry();
        let spec = reg.slot_spec(None, "blocks").expect("page slot");
        assert!(spec.allows("image"));
        assert!(!spec.allows("column"));
        assert_eq!(spec.field, "blocks");
    }

    #[test]
    fn test_slot_spec_deserializes() {
        let reg = registry();
        let spec = reg.slot_spec(Some("columns"), "columns").expect("slot");
        assert_eq!(spec.min, 1);
        assert_eq!(spec.max, Some(4));
        assert_eq!(spec.orientation, Some(Orientation::Horizontal));
        assert_eq!(spec.sole_type().map(|s| s.as_str()), Some("column"));
        assert_eq!(spec.mode, SlotMode::List);
    }

    #[test]
    fn test_hide_parent_owned_fields() {
        let reg = registry();
        let values = serde_json::Map::new();
        let names: Vec<_> = reg
            .visible_fields("column", &values, Some("columns"))
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["width"]);

        let names: Vec<_> = reg
            .visible_fields("column", &values, None)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["title", "width"]);
    }

    #[test]
    fn test_skiplogic() {
        let reg = registry();
        let mut values = serde_json::Map::new();
        values.insert("overwrite".into(), json!(false));
        let names: Vec<_> = reg
            .visible_fields("teaser", &values, None)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["href"]);
    }

    #[test]
    fn test_inherit_schema_from() {
        let reg = registry();
        let mut values = serde_json::Map::new();
        values.insert("variation".into(), json!("summary"));
        let names: Vec<_> = reg
            .visible_fields("listing", &values, None)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["variation", "showDate"]);
    }
}
