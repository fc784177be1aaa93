//! Browser DOM layer for the hydra editing bridge.
//!
//! Everything here talks to `web_sys` and assumes a `wasm32-unknown-unknown`
//! target. The editing logic itself lives in `hydra-bridge-core`; this crate
//! only supplies the browser half of each seam.
//!
//! # Architecture
//!
//! - `dom`: `WebDom`, the [`DomTree`] implementation over the live document
//! - `channel`: `postMessage` transport and `message` event decoding
//! - `session`: frame name, page URL and sessionStorage token store
//! - `observer`: `MutationObserver` feeding a frame-coalesced rescan
//! - `cursor`: Selection API reads and caret restoration
//! - `events`: `beforeinput` extraction
//! - `drag`: pointer hit-testing and auto-scroll
//! - `overlay`: admin-side chrome positioning over the iframe
//!
//! # Re-exports
//!
//! This crate re-exports `hydra-bridge-core` so consumers only need to depend
//! on `hydra-bridge-browser`.

pub use hydra_bridge_core;
pub use hydra_bridge_core::*;

pub mod channel;
pub mod cursor;
pub mod dom;
pub mod drag;
pub mod events;
pub mod frame;
pub mod observer;
pub mod overlay;
pub mod session;

pub use channel::{PostMessageTransport, decode_message, listen};
pub use cursor::{read_selection, restore_caret, restore_caret_after_paint};
pub use dom::{WebDom, dom_rect};
pub use drag::{DragChrome, DragHandle, apply_scroll, hit_block, viewport_rect};
pub use events::{KeyCommand, get_data_from_event, get_target_range_from_event, key_command};
pub use frame::{cancel_frame, request_frame};
pub use observer::MutationWatcher;
pub use overlay::OverlayChrome;
pub use session::{SessionStorageTokenStore, frame_name, page_path, page_url};

/// Error type for browser operations.
#[derive(Debug, Clone)]
pub struct PlatformError(pub String);

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformError {}

impl From<&str> for PlatformError {
    fn from(s: &str) -> Self {
        PlatformError(s.to_string())
    }
}

impl From<String> for PlatformError {
    fn from(s: String) -> Self {
        PlatformError(s)
    }
}

impl From<wasm_bindgen::JsValue> for PlatformError {
    fn from(v: wasm_bindgen::JsValue) -> Self {
        PlatformError(format!("{v:?}"))
    }
}

pub(crate) fn window() -> Result<web_sys::Window, PlatformError> {
    web_sys::window().ok_or_else(|| "no window".into())
}

pub(crate) fn document() -> Result<web_sys::Document, PlatformError> {
    window()?.document().ok_or_else(|| "no document".into())
}
