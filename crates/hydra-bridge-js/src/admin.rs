//! Admin side: the overlay drawn over the frontend iframe and the message
//! link into it.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_events::EventListener;
use hydra_bridge_browser::{OverlayChrome, PostMessageTransport, listen};
use hydra_bridge_core::{
    BlockAction, BridgeConfig, Envelope, Message, Mode, SessionContext, SessionTag, Transport,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use web_sys::{EventTarget, HtmlElement, HtmlIFrameElement};

use crate::types::AdminOptions;

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

fn parse_mode(s: &str) -> Result<Mode, JsError> {
    match s {
        "edit" => Ok(Mode::Edit),
        "view" => Ok(Mode::View),
        other => Err(JsError::new(&format!("unknown mode: {other}"))),
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

struct AdminState {
    chrome: OverlayChrome,
    on_message: Option<js_sys::Function>,
}

/// Apply a frontend message to the chrome. Returns whether it is forwarded.
fn apply(state: &mut AdminState, message: &Message) -> bool {
    match message {
        Message::BlockGeometry(geometry) => {
            state.chrome.show(geometry.clone());
            false
        }
        Message::BlockAction(BlockAction::Select { block_id: None })
        | Message::BlockAction(BlockAction::Remove { .. })
        | Message::PathChange(_) => {
            state.chrome.hide();
            true
        }
        _ => true,
    }
}

/// Overlay and channel for one frontend iframe.
#[wasm_bindgen]
pub struct JsAdminOverlay {
    state: Rc<RefCell<AdminState>>,
    transport: PostMessageTransport,
    context: SessionContext,
    _listeners: Vec<EventListener>,
}

#[wasm_bindgen]
impl JsAdminOverlay {
    /// Name to give the iframe before loading the frontend page.
    #[wasm_bindgen(js_name = frameName)]
    pub fn frame_name(&self) -> String {
        self.context.frame_name()
    }

    /// Register `(message) => void` for messages from the frontend.
    #[wasm_bindgen(js_name = onMessage)]
    pub fn on_message(&self, callback: js_sys::Function) {
        self.state.borrow_mut().on_message = Some(callback);
    }

    /// Send `{type, payload}` into the iframe, stamped with the session tag.
    pub fn send(&self, message: JsValue) -> Result<(), JsError> {
        let message: Message = serde_wasm_bindgen::from_value(message).map_err(js_err)?;
        if matches!(message, Message::PathChange(_)) {
            self.state.borrow_mut().chrome.hide();
        }
        let envelope = Envelope::new(message, self.context.tag.clone());
        self.transport.post(&envelope).map_err(js_err)
    }

    /// Toolbar container to render buttons into.
    pub fn toolbar(&self) -> HtmlElement {
        self.state.borrow().chrome.toolbar().clone()
    }

    #[wasm_bindgen(js_name = addButton)]
    pub fn add_button(&self) -> HtmlElement {
        self.state.borrow().chrome.add_button().clone()
    }

    #[wasm_bindgen(js_name = selectedBlock)]
    pub fn selected_block(&self) -> Option<String> {
        self.state.borrow().chrome.selected().map(str::to_string)
    }

    pub fn hide(&self) {
        self.state.borrow_mut().chrome.hide();
    }
}

/// Attach the overlay to `iframe`.
///
/// Messages are accepted only from `frontendOrigin` and only with this
/// admin window's session tag.
#[wasm_bindgen(js_name = createAdminOverlay)]
pub fn create_admin_overlay(iframe: HtmlIFrameElement, options: AdminOptions) -> Result<JsAdminOverlay, JsError> {
    let window = web_sys::window().ok_or_else(|| JsError::new("no window"))?;
    let own_origin = window.location().origin().map_err(|e| JsError::new(&format!("{e:?}")))?;
    let mode = parse_mode(&options.mode)?;
    let context = SessionContext::new(mode, &own_origin).map_err(js_err)?;

    let config: BridgeConfig = match options.config {
        Some(value) => serde_json::from_value(value).map_err(js_err)?,
        None => BridgeConfig::default(),
    };
    let transport = PostMessageTransport::to_frame(&iframe, options.frontend_origin.clone()).map_err(js_err)?;
    let chrome = OverlayChrome::new(iframe, config.overlay).map_err(js_err)?;
    let state = Rc::new(RefCell::new(AdminState {
        chrome,
        on_message: None,
    }));

    let target: &EventTarget = window.as_ref();
    let mut listeners = Vec::new();

    let frontend_origin = options.frontend_origin;
    let tag: SessionTag = context.tag.clone();
    let weak = Rc::downgrade(&state);
    listeners.push(listen(target, move |origin, value| {
        if !same_origin(&origin, &frontend_origin) {
            return;
        }
        let Some(state) = weak.upgrade() else {
            return;
        };
        let envelope = match Envelope::from_json(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::trace!(error = %e, "ignoring foreign message");
                return;
            }
        };
        if envelope.session_tag != tag {
            tracing::debug!(tag = %envelope.session_tag, "message from another session");
            return;
        }
        let forward = apply(&mut state.borrow_mut(), &envelope.message);
        if !forward {
            return;
        }
        let callback = state.borrow().on_message.clone();
        if let Some(callback) = callback {
            let value = envelope
                .message
                .serialize(&serde_wasm_bindgen::Serializer::json_compatible());
            match value {
                Ok(value) => {
                    if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                        tracing::warn!(error = ?e, "onMessage threw");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "message not convertible"),
            }
        }
    }));

    for kind in ["scroll", "resize"] {
        let weak = Rc::downgrade(&state);
        listeners.push(EventListener::new(target, kind, move |_| {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().chrome.reposition();
            }
        }));
    }

    tracing::info!(mode = %context.mode, frame = %context.frame_name(), "admin overlay attached");
    Ok(JsAdminOverlay {
        state,
        transport,
        context,
        _listeners: listeners,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin_ignores_trailing_slash() {
        assert!(same_origin("https://site.example", "https://site.example/"));
        assert!(!same_origin("https://site.example", "https://other.example"));
    }
}
