//! Selection API reads and caret restoration for rich-text fields.
//!
//! Positions cross this boundary as model [`TextPoint`]s; the UTF-16 and
//! child-index arithmetic happens in the core mapper over [`WebDom`].

use hydra_bridge_core::richtext::{dom_to_range, point_to_dom};
use hydra_bridge_core::{TextPoint, TextRange};
use web_sys::{Element, Node};

use crate::dom::WebDom;
use crate::frame::request_frame;
use crate::{PlatformError, document, window};

/// The document selection as a model range inside `field`, or `None` when
/// the selection is elsewhere or inside decoration.
pub fn read_selection(field: &Element) -> Option<TextRange> {
    let selection = web_sys::window()?.get_selection().ok()??;
    let anchor = selection.anchor_node()?;
    let focus = selection.focus_node()?;
    let anchor_offset = selection.anchor_offset() as usize;
    let focus_offset = selection.focus_offset() as usize;

    tracing::trace!(
        anchor_node_name = %anchor.node_name(),
        anchor_offset,
        focus_node_name = %focus.node_name(),
        focus_offset,
        "read_selection: browser selection state"
    );

    let root: &Node = field.as_ref();
    dom_to_range(&WebDom, root, (&anchor, anchor_offset), (&focus, focus_offset))
}

/// Collapse the document selection to `point` inside `field`.
pub fn restore_caret(field: &Element, point: &TextPoint) -> Result<(), PlatformError> {
    let root: &Node = field.as_ref();
    let (node, offset) = point_to_dom(&WebDom, root, point)
        .ok_or_else(|| format!("no DOM position for node {} offset {}", point.node_id, point.offset))?;

    tracing::trace!(
        target: "hydra::cursor",
        node_id = %point.node_id,
        offset = point.offset,
        dom_offset = offset,
        "restoring caret"
    );

    let selection = window()?
        .get_selection()
        .map_err(|e| format!("get_selection failed: {:?}", e))?
        .ok_or("no selection object")?;
    let range = document()?
        .create_range()
        .map_err(|e| format!("create_range failed: {:?}", e))?;
    range
        .set_start(&node, offset as u32)
        .map_err(|e| format!("set_start failed: {:?}", e))?;
    range.collapse_with_to_start(true);

    selection
        .remove_all_ranges()
        .map_err(|e| format!("remove_all_ranges failed: {:?}", e))?;
    selection
        .add_range(&range)
        .map_err(|e| format!("add_range failed: {:?}", e))?;
    Ok(())
}

/// Restore the caret after the frontend's next paint.
pub fn restore_caret_after_paint(field: Element, point: TextPoint) {
    let scheduled = request_frame(move || {
        if let Err(e) = restore_caret(&field, &point) {
            tracing::warn!("caret restoration failed: {}", e);
        }
    });
    if let Err(e) = scheduled {
        tracing::warn!(error = %e, "could not schedule caret restoration");
    }
}
