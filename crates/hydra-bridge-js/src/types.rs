//! Types exposed to JavaScript via wasm-bindgen.

use hydra_bridge_core::BridgeConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tsify_next::Tsify;
use wasm_bindgen::prelude::*;

/// Options for `initBridge`, minus the `pathToApiPath` function which is
/// read off the object separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct InitOptions {
    /// Block types offered at page level.
    pub allowed_blocks: Vec<String>,
    /// Block schemas, slots, overlay and drag tuning.
    #[tsify(type = "HydraConfig | undefined")]
    pub volto_config: Option<Value>,
}

impl InitOptions {
    /// Merge into a bridge configuration. `allowedBlocks` overrides the
    /// list in `voltoConfig` when given.
    pub fn into_config(self) -> Result<BridgeConfig, serde_json::Error> {
        let mut config: BridgeConfig = match self.volto_config {
            Some(value) => serde_json::from_value(value)?,
            None => BridgeConfig::default(),
        };
        if !self.allowed_blocks.is_empty() {
            config.allowed_blocks = self.allowed_blocks.into_iter().map(Into::into).collect();
        }
        Ok(config)
    }
}

/// Options for the admin-side overlay.
#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct AdminOptions {
    /// `"edit"` or `"view"`.
    pub mode: String,
    /// Origin of the page rendered in the iframe.
    pub frontend_origin: String,
    #[tsify(type = "HydraConfig | undefined")]
    #[serde(default)]
    pub config: Option<Value>,
}

#[wasm_bindgen(typescript_custom_section)]
const TS_TYPES: &'static str = r#"
export interface HydraSlot {
    allowed?: string[];
    defaultType?: string;
    min?: number;
    max?: number;
    orientation?: "vertical" | "horizontal";
    field?: string;
    mode?: { kind: "list" } | { kind: "table"; cellSlot: string; cellType: string };
}

export interface HydraConfig {
    allowedBlocks?: string[];
    blockSchema?: Record<string, { title?: string; fields?: unknown[]; schemaEnhancer?: unknown; slots?: Record<string, HydraSlot> }>;
    pageSlots?: Record<string, HydraSlot>;
    overlay?: { bottomLineThreshold?: number; toolbarHeight?: number; addButtonSize?: number; gap?: number };
    drag?: { edgeMargin?: number; scrollStep?: number; startThreshold?: number };
}

export type HydraBlockAction =
    | { action: "select"; blockId: string | null }
    | { action: "selectParent"; blockId: string }
    | { action: "add"; parentId: string | null; slot: string; after: string | null; blockType: string | null }
    | { action: "move"; blockId: string; newParentId: string | null; newSlot: string; beforeBlockId: string | null }
    | { action: "copy"; blockId: string }
    | { action: "remove"; blockId: string };
"#;
