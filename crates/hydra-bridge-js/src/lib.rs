//! WASM bindings for the hydra editing bridge.
//!
//! Two entry points:
//!
//! - `initBridge` runs inside the frontend iframe and connects the rendered
//!   page to the admin window.
//! - `createAdminOverlay` runs in the admin window and draws the selection
//!   chrome over the iframe.

mod admin;
mod frontend;
mod types;

pub use admin::*;
pub use frontend::*;
pub use types::*;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;
use tracing_wasm::{WASMLayer, WASMLayerConfigBuilder};
use wasm_bindgen::prelude::*;

/// Install the panic hook and console logging.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();

    let level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let wasm_layer = WASMLayer::new(WASMLayerConfigBuilder::new().set_max_level(level).build());
    let subscriber = Registry::default().with(wasm_layer);
    // A host page may load the module twice; keep the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
