//! `postMessage` transport and `message` event decoding.

use gloo_events::EventListener;
use gloo_utils::format::JsValueSerdeExt;
use hydra_bridge_core::{Envelope, ProtocolError, Transport};
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{HtmlIFrameElement, MessageEvent, Window};

use crate::PlatformError;

/// Posts envelopes to another window, restricted to one origin.
#[derive(Debug, Clone)]
pub struct PostMessageTransport {
    target: Window,
    target_origin: String,
}

impl PostMessageTransport {
    pub fn new(target: Window, target_origin: impl Into<String>) -> Self {
        Self {
            target,
            target_origin: target_origin.into(),
        }
    }

    /// Transport from the iframe to the admin window hosting it.
    pub fn to_parent(target_origin: impl Into<String>) -> Result<Self, PlatformError> {
        let window = crate::window()?;
        let parent = window
            .parent()?
            .ok_or("not inside a frame")?;
        Ok(Self::new(parent, target_origin))
    }

    /// Transport from the admin window into a frontend iframe.
    pub fn to_frame(
        frame: &HtmlIFrameElement,
        target_origin: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        let target = frame.content_window().ok_or("iframe has no window")?;
        Ok(Self::new(target, target_origin))
    }

    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }
}

impl Transport for PostMessageTransport {
    fn post(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let value = JsValue::from_serde(envelope)?;
        self.target
            .post_message(&value, &self.target_origin)
            .map_err(|e| ProtocolError::Transport(format!("{e:?}")))?;
        tracing::trace!(kind = envelope.message.kind(), origin = %self.target_origin, "posted");
        Ok(())
    }
}

/// Origin and JSON data of a `message` event. `None` for data that is not
/// JSON-representable.
pub fn decode_message(event: &MessageEvent) -> Option<(String, Value)> {
    let data = event.data();
    match data.into_serde::<Value>() {
        Ok(value) => Some((event.origin(), value)),
        Err(e) => {
            tracing::trace!(error = %e, "ignoring non-JSON message");
            None
        }
    }
}

/// Listen for `message` events on `target`. Dropping the listener
/// unsubscribes.
pub fn listen(
    target: &web_sys::EventTarget,
    mut on_message: impl FnMut(String, Value) + 'static,
) -> EventListener {
    EventListener::new(target, "message", move |event| {
        let Some(event) = event.dyn_ref::<MessageEvent>() else {
            return;
        };
        if let Some((origin, value)) = decode_message(event) {
            on_message(origin, value);
        }
    })
}
