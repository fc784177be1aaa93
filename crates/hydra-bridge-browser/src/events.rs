//! Browser event extraction.
//!
//! Pulls what the core needs out of `beforeinput` and `keydown` events. The
//! decision of what an event means is made in `hydra-bridge-core`.

use hydra_bridge_core::richtext::dom_to_range;
use hydra_bridge_core::{Mark, TextRange};
use wasm_bindgen::prelude::*;
use web_sys::{Element, Node};

use crate::dom::WebDom;

// === StaticRange binding ===
//
// StaticRange is returned by InputEvent.getTargetRanges() and does not
// update when the DOM changes.

#[wasm_bindgen]
extern "C" {
    pub type StaticRange;

    #[wasm_bindgen(method, getter, structural)]
    pub fn startContainer(this: &StaticRange) -> web_sys::Node;

    #[wasm_bindgen(method, getter, structural)]
    pub fn startOffset(this: &StaticRange) -> u32;

    #[wasm_bindgen(method, getter, structural)]
    pub fn endContainer(this: &StaticRange) -> web_sys::Node;

    #[wasm_bindgen(method, getter, structural)]
    pub fn endOffset(this: &StaticRange) -> u32;
}

// === beforeinput ===

/// The range the browser intends to modify, as a model range inside `field`.
pub fn get_target_range_from_event(event: &web_sys::InputEvent, field: &Element) -> Option<TextRange> {
    use wasm_bindgen::JsCast;

    let ranges = event.get_target_ranges();
    if ranges.length() == 0 {
        return None;
    }
    let static_range: StaticRange = ranges.get(0).unchecked_into();
    let root: &Node = field.as_ref();
    dom_to_range(
        &WebDom,
        root,
        (&static_range.startContainer(), static_range.startOffset() as usize),
        (&static_range.endContainer(), static_range.endOffset() as usize),
    )
}

/// Inserted text, from `data` or, for paste and drop, the plain-text
/// transfer item.
pub fn get_data_from_event(event: &web_sys::InputEvent) -> Option<String> {
    if let Some(data) = event.data() {
        if !data.is_empty() {
            return Some(data);
        }
    }
    if let Some(data_transfer) = event.data_transfer() {
        if let Ok(text) = data_transfer.get_data("text/plain") {
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

// === keydown ===

/// Keyboard commands the bridge handles itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Collapse the selection and abort drag or popups.
    Escape,
    /// Move the block selection to the parent.
    SelectParent,
    /// Toggle a mark on the text selection.
    Format(Mark),
}

/// Interpret a key press. `in_text` is whether focus is inside an editable
/// field, where arrows belong to the caret.
pub fn key_command(key: &str, ctrl_or_meta: bool, alt: bool, in_text: bool) -> Option<KeyCommand> {
    match key {
        "Escape" => Some(KeyCommand::Escape),
        "ArrowUp" if !in_text || alt => Some(KeyCommand::SelectParent),
        "b" | "B" if ctrl_or_meta && in_text => Some(KeyCommand::Format(Mark::Strong)),
        "i" | "I" if ctrl_or_meta && in_text => Some(KeyCommand::Format(Mark::Em)),
        "u" | "U" if ctrl_or_meta && in_text => Some(KeyCommand::Format(Mark::U)),
        _ => None,
    }
}

pub fn key_command_from_event(event: &web_sys::KeyboardEvent, in_text: bool) -> Option<KeyCommand> {
    key_command(
        &event.key(),
        event.ctrl_key() || event.meta_key(),
        event.alt_key(),
        in_text,
    )
}
