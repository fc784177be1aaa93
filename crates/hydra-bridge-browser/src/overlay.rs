//! Admin-window overlay chrome.
//!
//! The frontend reports the selected block's box with `BLOCK_GEOMETRY`; the
//! admin side adds its own iframe element box and positions an outline, a
//! toolbar anchor and an add-button over the iframe.

use hydra_bridge_core::overlay::LINE_WIDTH;
use hydra_bridge_core::protocol::BlockGeometryPayload;
use hydra_bridge_core::{AddSide, OutlineStyle, OverlayConfig, OverlayLayout, Rect, compute_overlay};
use wasm_bindgen::JsCast;
use web_sys::{HtmlElement, HtmlIFrameElement};

use crate::dom::{dom_rect, place, set_visible};
use crate::{PlatformError, document};

pub struct OverlayChrome {
    frame: HtmlIFrameElement,
    config: OverlayConfig,
    outline: HtmlElement,
    toolbar: HtmlElement,
    add_button: HtmlElement,
    last: Option<BlockGeometryPayload>,
}

fn create(class: &str) -> Result<HtmlElement, PlatformError> {
    let doc = document()?;
    let el: HtmlElement = doc
        .create_element("div")?
        .dyn_into()
        .map_err(|_| "div is not HtmlElement")?;
    el.set_class_name(class);
    el.style().set_property("z-index", "1000")?;
    set_visible(&el, false);
    doc.body().ok_or("no body")?.append_child(&el)?;
    Ok(el)
}

impl OverlayChrome {
    pub fn new(frame: HtmlIFrameElement, config: OverlayConfig) -> Result<Self, PlatformError> {
        let outline = create("hydra-outline")?;
        outline.style().set_property("pointer-events", "none")?;
        Ok(Self {
            frame,
            config,
            outline,
            toolbar: create("hydra-toolbar")?,
            add_button: create("hydra-add-button")?,
            last: None,
        })
    }

    /// Toolbar container; the admin UI renders its buttons inside it.
    pub fn toolbar(&self) -> &HtmlElement {
        &self.toolbar
    }

    pub fn add_button(&self) -> &HtmlElement {
        &self.add_button
    }

    pub fn selected(&self) -> Option<&str> {
        self.last.as_ref().map(|g| g.block_id.as_str())
    }

    /// The iframe element's box in the admin window.
    pub fn frame_rect(&self) -> Rect {
        dom_rect(&self.frame.get_bounding_client_rect())
    }

    /// Position the chrome for a geometry report.
    pub fn show(&mut self, geometry: BlockGeometryPayload) -> OverlayLayout {
        let layout = compute_overlay(&geometry.rect, &self.frame_rect(), geometry.add_side, &self.config);
        tracing::trace!(block = %geometry.block_id, ?layout, "overlay");
        self.apply(&layout);
        self.last = Some(geometry);
        layout
    }

    /// Re-run the last layout after the admin window scrolled or resized.
    pub fn reposition(&mut self) -> Option<OverlayLayout> {
        let geometry = self.last.take()?;
        Some(self.show(geometry))
    }

    pub fn hide(&mut self) {
        self.last = None;
        for el in [&self.outline, &self.toolbar, &self.add_button] {
            set_visible(el, false);
        }
    }

    fn apply(&self, layout: &OverlayLayout) {
        set_visible(&self.outline, layout.visible);
        set_visible(&self.toolbar, layout.visible);
        if !layout.visible {
            set_visible(&self.add_button, false);
            return;
        }

        place(&self.outline, &layout.outline);
        let style = self.outline.style();
        let _ = match layout.style {
            OutlineStyle::Box => style.set_property("border", &format!("{LINE_WIDTH}px solid #007eb1")),
            OutlineStyle::BottomLine => style.set_property("border", "none"),
        };
        let _ = style.set_property("background", match layout.style {
            OutlineStyle::Box => "transparent",
            OutlineStyle::BottomLine => "#007eb1",
        });
        let _ = style.set_property("box-sizing", "border-box");

        let toolbar = Rect::new(layout.toolbar.x, layout.toolbar.y, 0.0, self.config.toolbar_height);
        place(&self.toolbar, &toolbar);
        let _ = self.toolbar.style().set_property("width", "auto");

        match layout.add_button {
            Some(at) => {
                let size = self.config.add_button_size;
                place(&self.add_button, &Rect::new(at.x, at.y, size, size));
                let _ = self
                    .add_button
                    .set_attribute("data-side", match layout.add_side {
                        AddSide::Bottom => "bottom",
                        AddSide::Right => "right",
                    });
                set_visible(&self.add_button, true);
            }
            None => set_visible(&self.add_button, false),
        }
    }
}

impl Drop for OverlayChrome {
    fn drop(&mut self) {
        self.outline.remove();
        self.toolbar.remove();
        self.add_button.remove();
    }
}
