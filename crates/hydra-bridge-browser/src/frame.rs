//! Animation-frame scheduling.

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::{PlatformError, window};

/// Run `f` before the next paint. Returns the frame handle.
pub fn request_frame(f: impl FnOnce() + 'static) -> Result<i32, PlatformError> {
    let closure = Closure::once(f);
    let handle = window()?.request_animation_frame(closure.as_ref().unchecked_ref())?;
    // The browser owns the callback until it fires.
    closure.forget();
    Ok(handle)
}

pub fn cancel_frame(handle: i32) {
    if let Some(window) = web_sys::window() {
        let _ = window.cancel_animation_frame(handle);
    }
}
