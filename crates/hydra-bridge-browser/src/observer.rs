//! `MutationObserver` wiring.
//!
//! Records are reduced to [`Mutation`]s and folded into a [`FrameCoalescer`];
//! the host's callback runs at most once per animation frame with the
//! accumulated [`Batch`].

use std::cell::RefCell;
use std::rc::Rc;

use hydra_bridge_core::{Batch, FrameCoalescer, Mutation, WATCHED_ATTRIBUTES};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{MutationObserver, MutationObserverInit, MutationRecord, Node};

use crate::PlatformError;
use crate::dom::closest_block;
use crate::frame::request_frame;

type ObserverCallback = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

pub struct MutationWatcher {
    observer: MutationObserver,
    _callback: ObserverCallback,
}

impl MutationWatcher {
    /// Observe `root` and its subtree.
    pub fn observe(root: &Node, on_batch: impl FnMut(Batch) + 'static) -> Result<Self, PlatformError> {
        let coalescer = Rc::new(RefCell::new(FrameCoalescer::new()));
        let on_batch = Rc::new(RefCell::new(on_batch));

        let callback: ObserverCallback = Closure::new(move |records: js_sys::Array, _: MutationObserver| {
            let mut needs_frame = false;
            for record in records.iter() {
                let record: MutationRecord = record.unchecked_into();
                if let Some(mutation) = reduce(&record) {
                    needs_frame |= coalescer.borrow_mut().note(mutation);
                }
            }
            if !needs_frame {
                return;
            }
            let coalescer = coalescer.clone();
            let on_batch = on_batch.clone();
            let scheduled = request_frame(move || {
                let batch = coalescer.borrow_mut().take();
                if let Some(batch) = batch {
                    (on_batch.borrow_mut())(batch);
                }
            });
            if let Err(e) = scheduled {
                tracing::warn!(error = %e, "could not schedule rescan");
            }
        });

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_character_data(true);
        init.set_attributes(true);
        let filter: js_sys::Array = WATCHED_ATTRIBUTES.iter().map(|a| JsValue::from_str(a)).collect();
        init.set_attribute_filter(&filter);
        observer.observe_with_options(root, &init)?;
        tracing::debug!("mutation observer attached");

        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for MutationWatcher {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

fn reduce(record: &MutationRecord) -> Option<Mutation> {
    let target = record.target()?;
    let block = closest_block(&target).map(|(id, _)| id.into());
    let mutation = match record.type_().as_str() {
        "childList" => Mutation::ChildList { block },
        "attributes" => Mutation::Attribute {
            name: record.attribute_name()?,
            block,
        },
        "characterData" => Mutation::CharacterData {
            block,
            comment: target.node_type() == Node::COMMENT_NODE,
        },
        other => {
            tracing::trace!(kind = other, "unknown mutation record");
            return None;
        }
    };
    Some(mutation)
}
