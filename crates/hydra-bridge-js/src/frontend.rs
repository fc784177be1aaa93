//! Frontend side: `initBridge` and the handle it returns.
//!
//! The iframe page calls `initBridge` once. Outside an admin iframe the
//! returned handle is dormant. In view mode it only relays tree updates and
//! navigation; in edit mode it also watches the DOM and turns clicks, typing,
//! keyboard commands and drags into bridge operations.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use gloo_events::{EventListener, EventListenerOptions};
use hydra_bridge_browser::{
    DragChrome, DragHandle, KeyCommand, MutationWatcher, PlatformError, PostMessageTransport,
    SessionStorageTokenStore, WebDom, apply_scroll, cancel_frame, events::key_command_from_event,
    frame_name, get_data_from_event, get_target_range_from_event, hit_block, listen, page_path,
    page_url, read_selection, request_frame, restore_caret_after_paint, viewport_rect,
};
use hydra_bridge_core::scanner::FieldMarker;
use hydra_bridge_core::schema::FieldKind;
use hydra_bridge_core::{
    Batch, BlockAction, Bridge, BridgeError, BridgeEvent, DomMarkers, DomTree, FieldRef, FormatOp,
    InputAction, ModeController, MoveIntent, Point, PointerKind, RichTextError,
};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Element, EventTarget, HtmlElement, Node};

use crate::types::InitOptions;

type FrontendBridge = Bridge<PostMessageTransport>;

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

// === Host state ===

struct ActiveDrag {
    chrome: DragChrome,
    pointer: Point,
    /// Scheduled sampling frame.
    frame: Option<i32>,
}

struct Host {
    bridge: FrontendBridge,
    controller: ModeController,
    path_to_api_path: Option<js_sys::Function>,
    on_edit_change: Option<js_sys::Function>,
    root: Node,
    markers: DomMarkers<Node>,
    pointer: PointerKind,
    text_field: Option<FieldRef>,
    handle: Option<DragHandle>,
    drag: Option<ActiveDrag>,
}

/// Apply the frontend's `pathToApiPath` hook. Called with no host borrow
/// held, since the hook may call back into the bridge handle.
fn api_path(hook: Option<&js_sys::Function>, path: &str) -> String {
    let Some(hook) = hook else {
        return path.to_string();
    };
    match hook.call1(&JsValue::NULL, &JsValue::from_str(path)) {
        Ok(value) => value.as_string().unwrap_or_else(|| path.to_string()),
        Err(e) => {
            tracing::warn!(error = ?e, "pathToApiPath failed");
            path.to_string()
        }
    }
}

impl Host {
    fn rescan(&mut self) {
        let result = self.bridge.rescan(&WebDom, &self.root);
        self.markers = result.markers;
        if !self.bridge.is_editing() {
            return;
        }
        for field in &self.markers.fields {
            if field.kind != FieldKind::Editable || field.readonly {
                continue;
            }
            if let Some(el) = field.element.dyn_ref::<Element>() {
                if el.get_attribute("contenteditable").as_deref() != Some("true") {
                    let _ = el.set_attribute("contenteditable", "true");
                }
            }
        }
    }

    /// Text fields touched by a text-only batch.
    fn touched_fields(&self, batch: &Batch) -> Vec<FieldMarker<Node>> {
        self.markers
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::Editable && !f.readonly)
            .filter(|f| match &f.block_id {
                Some(id) => batch.blocks.contains(id),
                None => batch.page,
            })
            .cloned()
            .collect()
    }

    /// Pick up text the browser changed itself.
    fn reconcile(&mut self, marker: &FieldMarker<Node>) {
        let field = FieldRef::new(marker.block_id.as_deref(), &marker.path);
        match self.bridge.reconcile(&field, &WebDom, &marker.element) {
            Ok(_) => {}
            // Not a rich-text value: send the plain text.
            Err(BridgeError::RichText(RichTextError::InvalidValue(_))) => {
                let text = WebDom.text_content(&marker.element);
                if let Err(e) = self.bridge.update_field(&field, Value::String(text)) {
                    tracing::debug!(error = %e, "plain field update dropped");
                }
            }
            Err(e) => tracing::debug!(error = %e, field = %field.path, "reconcile failed"),
        }
    }

    fn restore_caret(&mut self) {
        let Some((field, point)) = self.bridge.take_caret() else {
            return;
        };
        let element = self
            .markers
            .field(field.block_id.as_deref(), &field.path)
            .and_then(|m| m.element.dyn_ref::<Element>().cloned());
        match element {
            Some(el) => restore_caret_after_paint(el, point),
            None => tracing::warn!(field = %field.path, "caret field not rendered"),
        }
    }

    /// Report the selected block's box and move the drag handle.
    fn sync_selection_chrome(&mut self) {
        let selected = self.bridge.selected().cloned();
        let rect = selected
            .as_ref()
            .and_then(|id| self.markers.primary(id))
            .and_then(|el| WebDom.bounding_rect(el));
        let (Some(id), Some(rect)) = (selected, rect) else {
            if let Some(handle) = &mut self.handle {
                handle.detach();
            }
            return;
        };
        match viewport_rect() {
            Ok(viewport) => {
                if let Err(e) = self.bridge.report_geometry(rect, viewport) {
                    tracing::warn!(error = %e, "geometry not delivered");
                }
            }
            Err(e) => tracing::warn!(error = %e, "no viewport"),
        }
        if let Some(handle) = &mut self.handle {
            handle.attach(id, &rect);
        }
    }

    fn end_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            if let Some(frame) = drag.frame {
                cancel_frame(frame);
            }
        }
    }
}

// === Event plumbing ===

/// Run host events, with no borrow held while JS callbacks run.
fn dispatch(host: &Rc<RefCell<Host>>, events: Vec<BridgeEvent>) {
    for event in events {
        match event {
            BridgeEvent::Render { tree, partial } => {
                let callback = host.borrow().on_edit_change.clone();
                let Some(callback) = callback else {
                    tracing::debug!("tree received before onEditChange was registered");
                    continue;
                };
                match to_js(&tree) {
                    Ok(value) => {
                        if let Err(e) = callback.call2(&JsValue::NULL, &value, &JsValue::from_bool(partial)) {
                            tracing::warn!(error = ?e, "onEditChange threw");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "tree not convertible"),
                }
            }
            BridgeEvent::Selected(_) => host.borrow_mut().sync_selection_chrome(),
        }
    }
}

fn on_batch(host: &Rc<RefCell<Host>>, batch: Batch) {
    let mut guard = host.borrow_mut();
    if batch.structural {
        guard.rescan();
    } else {
        for marker in guard.touched_fields(&batch) {
            guard.reconcile(&marker);
        }
    }
    guard.restore_caret();
    guard.sync_selection_chrome();
}

fn event_node(event: &web_sys::Event) -> Option<Node> {
    event.target()?.dyn_into::<Node>().ok()
}

fn schedule_drag_frame(weak: Weak<RefCell<Host>>) -> Option<i32> {
    let scheduled = request_frame(move || {
        if let Some(host) = weak.upgrade() {
            drag_frame(&host, Rc::downgrade(&host));
        }
    });
    match scheduled {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "could not schedule drag frame");
            None
        }
    }
}

/// One sampled drag step: hit test, indicator, auto-scroll.
fn drag_frame(host: &Rc<RefCell<Host>>, weak: Weak<RefCell<Host>>) {
    let mut guard = host.borrow_mut();
    let host = &mut *guard;
    let Some(drag) = &mut host.drag else {
        return;
    };
    drag.frame = None;
    let pointer = drag.pointer;
    let viewport = match viewport_rect() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "no viewport");
            return;
        }
    };
    let hit = hit_block(&host.markers, pointer);
    let frame = host
        .bridge
        .drag_update(pointer, hit.as_ref().map(|(id, rect)| (id.as_str(), *rect)), &viewport);
    drag.chrome.update(pointer, frame.target.as_ref());
    if frame.scroll != 0.0 {
        apply_scroll(frame.scroll);
        // Keep scrolling while the pointer rests near the edge.
        drag.frame = schedule_drag_frame(weak);
    }
}

fn on_pointer_down(host: &Rc<RefCell<Host>>, event: &web_sys::PointerEvent) {
    let mut guard = host.borrow_mut();
    let host_ref = &mut *guard;
    host_ref.pointer = PointerKind::parse(&event.pointer_type());

    let Some(handle) = &host_ref.handle else {
        return;
    };
    let on_handle = event_node(event).is_some_and(|n| {
        let el: &Node = handle.element().as_ref();
        el.contains(Some(&n))
    });
    let Some(block) = handle.block().cloned().filter(|_| on_handle) else {
        return;
    };
    let Some(source) = host_ref
        .markers
        .primary(&block)
        .and_then(|n| n.dyn_ref::<HtmlElement>().cloned())
    else {
        return;
    };
    let pointer = Point::new(event.client_x() as f64, event.client_y() as f64);
    if let Err(e) = host_ref.bridge.drag_begin(&block, pointer) {
        tracing::debug!(error = %e, "drag not started");
        return;
    }
    match DragChrome::new(&source, pointer) {
        Ok(chrome) => {
            event.prevent_default();
            host_ref.drag = Some(ActiveDrag {
                chrome,
                pointer,
                frame: None,
            });
        }
        Err(e) => {
            tracing::warn!(error = %e, "drag chrome failed");
            host_ref.bridge.drag_cancel();
        }
    }
}

fn on_pointer_move(host: &Rc<RefCell<Host>>, event: &web_sys::PointerEvent) {
    let mut guard = host.borrow_mut();
    let Some(drag) = &mut guard.drag else {
        return;
    };
    drag.pointer = Point::new(event.client_x() as f64, event.client_y() as f64);
    if drag.frame.is_none() {
        drag.frame = schedule_drag_frame(Rc::downgrade(host));
    }
}

fn on_pointer_up(host: &Rc<RefCell<Host>>) {
    let mut guard = host.borrow_mut();
    if guard.drag.is_none() {
        return;
    }
    match guard.bridge.drag_end() {
        Ok(Some(intent)) => tracing::debug!(block = %intent.block_id, "dropped"),
        Ok(None) => tracing::debug!("drop without target"),
        Err(e) => tracing::warn!(error = %e, "move rejected"),
    }
    guard.end_drag();
}

fn on_click(host: &Rc<RefCell<Host>>, event: &web_sys::Event) {
    let Some(node) = event_node(event) else {
        return;
    };
    let mut guard = host.borrow_mut();
    let host = &mut *guard;
    if host.drag.is_some() {
        return;
    }
    if let Some(handle) = &host.handle {
        let el: &Node = handle.element().as_ref();
        if el.contains(Some(&node)) {
            return;
        }
    }
    if let Some(marker) = host.markers.selector_at(&WebDom, &node).cloned() {
        host.bridge.follow_selector(marker.owner.as_deref(), &marker.target);
    } else if let Some(id) = host.markers.block_at(&WebDom, &node) {
        host.bridge.click(&id, host.pointer);
    } else {
        host.bridge.escape();
    }
    host.sync_selection_chrome();
}

fn on_key_down(host: &Rc<RefCell<Host>>, event: &web_sys::KeyboardEvent) {
    let mut guard = host.borrow_mut();
    let host = &mut *guard;
    let in_text = event_node(event).is_some_and(|n| host.markers.field_at(&WebDom, &n).is_some());
    let Some(command) = key_command_from_event(event, in_text) else {
        return;
    };
    match command {
        KeyCommand::Escape => {
            host.end_drag();
            host.bridge.escape();
        }
        KeyCommand::SelectParent => {
            if host.bridge.select_parent().is_some() {
                event.prevent_default();
            }
        }
        KeyCommand::Format(mark) => {
            event.prevent_default();
            if let Err(e) = host.bridge.format(FormatOp::Toggle, mark) {
                tracing::debug!(error = %e, "format shortcut ignored");
            }
        }
    }
    host.sync_selection_chrome();
}

fn on_before_input(host: &Rc<RefCell<Host>>, event: &web_sys::InputEvent) {
    if event.is_composing() {
        return;
    }
    let Some(node) = event_node(event) else {
        return;
    };
    let mut guard = host.borrow_mut();
    let host = &mut *guard;
    let Some(marker) = host.markers.field_at(&WebDom, &node).cloned() else {
        return;
    };
    if marker.kind != FieldKind::Editable {
        return;
    }
    let Some(element) = marker.element.dyn_ref::<Element>() else {
        return;
    };
    let Some(range) = get_target_range_from_event(event, element).or_else(|| read_selection(element)) else {
        return;
    };
    let field = FieldRef::new(marker.block_id.as_deref(), &marker.path);
    let data = get_data_from_event(event);
    match host.bridge.input(&field, &event.input_type(), data.as_deref(), &range) {
        Ok(InputAction::Edits(_)) | Ok(InputAction::Noop) => event.prevent_default(),
        Ok(InputAction::Unsupported) => {}
        // Plain-text field: the browser edits, the next batch reconciles.
        Err(BridgeError::RichText(RichTextError::InvalidValue(_))) => {}
        Err(e) => {
            tracing::debug!(error = %e, "input blocked");
            event.prevent_default();
        }
    }
}

fn on_selection_change(host: &Rc<RefCell<Host>>) {
    let anchor = web_sys::window()
        .and_then(|w| w.get_selection().ok().flatten())
        .and_then(|s| s.anchor_node());
    let mut guard = host.borrow_mut();
    let host = &mut *guard;
    let marker = anchor.and_then(|n| host.markers.field_at(&WebDom, &n).cloned());
    let update = match marker {
        Some(marker) if marker.kind == FieldKind::Editable => {
            let field = FieldRef::new(marker.block_id.as_deref(), &marker.path);
            let range = marker.element.dyn_ref::<Element>().and_then(read_selection);
            Some((field, range))
        }
        // Left the field.
        _ => host.text_field.take().map(|field| (field, None)),
    };
    let Some((field, range)) = update else {
        return;
    };
    host.text_field = range.is_some().then(|| field.clone());
    if let Err(e) = host.bridge.set_text_selection(field, range) {
        tracing::debug!(error = %e, "selection change not sent");
    }
}

fn on_navigate(host: &Rc<RefCell<Host>>) {
    let name = match frame_name() {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(error = %e, "frame name unreadable");
            return;
        }
    };
    let path = page_path().unwrap_or_default();
    let hook = host.borrow().path_to_api_path.clone();
    let api_path = api_path(hook.as_ref(), &path);
    let mut guard = host.borrow_mut();
    let host = &mut *guard;
    match host.controller.refresh(&name) {
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "frame name invalid after navigation");
            return;
        }
    }
    let Some(context) = host.controller.context().cloned() else {
        tracing::info!("no longer hosted by an admin window");
        return;
    };
    host.end_drag();
    if let Some(handle) = &mut host.handle {
        handle.detach();
    }
    if let Err(e) = host.bridge.navigate(&api_path, context) {
        tracing::warn!(error = %e, "path change not delivered");
    }
}

fn attach(host: &Rc<RefCell<Host>>, editing: bool) -> Result<(Vec<EventListener>, Option<MutationWatcher>), PlatformError> {
    let window = web_sys::window().ok_or("no window")?;
    let document = window.document().ok_or("no document")?;
    let win: &EventTarget = window.as_ref();
    let doc: &EventTarget = document.as_ref();
    let mut listeners = Vec::new();

    let weak = Rc::downgrade(host);
    listeners.push(listen(win, move |origin, value| {
        let Some(host) = weak.upgrade() else {
            return;
        };
        let events = host.borrow_mut().bridge.handle(&origin, value);
        dispatch(&host, events);
    }));

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new(win, "popstate", move |_| {
        if let Some(host) = weak.upgrade() {
            on_navigate(&host);
        }
    }));

    if !editing {
        return Ok((listeners, None));
    }

    let prevent = EventListenerOptions::enable_prevent_default();

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new(doc, "click", move |event| {
        if let Some(host) = weak.upgrade() {
            on_click(&host, event);
        }
    }));

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new_with_options(doc, "pointerdown", prevent, move |event| {
        if let (Some(host), Some(event)) = (weak.upgrade(), event.dyn_ref::<web_sys::PointerEvent>()) {
            on_pointer_down(&host, event);
        }
    }));

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new(win, "pointermove", move |event| {
        if let (Some(host), Some(event)) = (weak.upgrade(), event.dyn_ref::<web_sys::PointerEvent>()) {
            on_pointer_move(&host, event);
        }
    }));

    for kind in ["pointerup", "pointercancel"] {
        let weak = Rc::downgrade(host);
        listeners.push(EventListener::new(win, kind, move |_| {
            if let Some(host) = weak.upgrade() {
                on_pointer_up(&host);
            }
        }));
    }

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new_with_options(doc, "keydown", prevent, move |event| {
        if let (Some(host), Some(event)) = (weak.upgrade(), event.dyn_ref::<web_sys::KeyboardEvent>()) {
            on_key_down(&host, event);
        }
    }));

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new_with_options(doc, "beforeinput", prevent, move |event| {
        if let (Some(host), Some(event)) = (weak.upgrade(), event.dyn_ref::<web_sys::InputEvent>()) {
            on_before_input(&host, event);
        }
    }));

    let weak = Rc::downgrade(host);
    listeners.push(EventListener::new(doc, "selectionchange", move |_| {
        if let Some(host) = weak.upgrade() {
            on_selection_change(&host);
        }
    }));

    for kind in ["scroll", "resize"] {
        let weak = Rc::downgrade(host);
        listeners.push(EventListener::new(win, kind, move |_| {
            if let Some(host) = weak.upgrade() {
                host.borrow_mut().sync_selection_chrome();
            }
        }));
    }

    let weak = Rc::downgrade(host);
    let root = host.borrow().root.clone();
    let watcher = MutationWatcher::observe(&root, move |batch| {
        if let Some(host) = weak.upgrade() {
            on_batch(&host, batch);
        }
    })?;

    Ok((listeners, Some(watcher)))
}

// === JS handle ===

/// Handle returned by `initBridge`.
#[wasm_bindgen]
pub struct JsBridge {
    host: Option<Rc<RefCell<Host>>>,
    access_token: Option<String>,
    _listeners: Vec<EventListener>,
    _watcher: Option<MutationWatcher>,
}

impl JsBridge {
    fn host(&self) -> Result<&Rc<RefCell<Host>>, JsError> {
        self.host
            .as_ref()
            .ok_or_else(|| JsError::new("bridge is dormant: page is not inside an admin iframe"))
    }
}

#[wasm_bindgen]
impl JsBridge {
    /// Register the re-render callback: `(tree, partial) => void`.
    #[wasm_bindgen(js_name = onEditChange)]
    pub fn on_edit_change(&self, callback: js_sys::Function) {
        if let Some(host) = &self.host {
            host.borrow_mut().on_edit_change = Some(callback);
        }
    }

    /// Send a field value edited by frontend-owned widgets.
    #[wasm_bindgen(js_name = sendBlockUpdate)]
    pub fn send_block_update(&self, block_id: Option<String>, field: &str, value: JsValue) -> Result<(), JsError> {
        let value: Value = serde_wasm_bindgen::from_value(value).map_err(js_err)?;
        let field = FieldRef::new(block_id.as_deref(), field);
        self.host()?
            .borrow_mut()
            .bridge
            .update_field(&field, value)
            .map_err(js_err)
    }

    /// Send a structural action (`HydraBlockAction`).
    #[wasm_bindgen(js_name = sendBlockAction)]
    pub fn send_block_action(&self, action: JsValue) -> Result<(), JsError> {
        let action: BlockAction = serde_wasm_bindgen::from_value(action).map_err(js_err)?;
        let host = self.host()?;
        let result = {
            let mut guard = host.borrow_mut();
            let bridge = &mut guard.bridge;
            match action {
                BlockAction::Select { block_id: Some(id) } => {
                    bridge.click(&id, PointerKind::Mouse);
                    Ok(())
                }
                BlockAction::Select { block_id: None } => {
                    bridge.escape();
                    Ok(())
                }
                BlockAction::SelectParent { block_id } => {
                    if bridge.selected() != Some(&block_id) {
                        bridge.click(&block_id, PointerKind::Mouse);
                    }
                    bridge.select_parent();
                    Ok(())
                }
                BlockAction::Add {
                    parent_id,
                    slot,
                    after: Some(after),
                    block_type,
                } => {
                    tracing::trace!(parent = ?parent_id, slot = %slot, "add after");
                    bridge.add_after(&after, block_type.as_deref())
                }
                BlockAction::Add {
                    parent_id,
                    slot,
                    after: None,
                    block_type,
                } => bridge.add_into(parent_id.as_deref(), &slot, block_type.as_deref()),
                BlockAction::Move {
                    block_id,
                    new_parent_id,
                    new_slot,
                    before_block_id,
                } => bridge.move_block(MoveIntent {
                    block_id,
                    new_parent_id,
                    new_slot,
                    before_block_id,
                }),
                BlockAction::Copy { block_id } => bridge.copy(&block_id),
                BlockAction::Remove { block_id } => bridge.remove(&block_id),
            }
        };
        host.borrow_mut().sync_selection_chrome();
        result.map_err(js_err)
    }

    #[wasm_bindgen(js_name = getAccessToken)]
    pub fn get_access_token(&self) -> Option<String> {
        self.access_token.clone()
    }

    /// `"edit"`, `"view"`, or `undefined` when dormant.
    pub fn mode(&self) -> Option<String> {
        let host = self.host.as_ref()?;
        let mode = host.borrow().controller.mode()?;
        Some(mode.to_string())
    }

    #[wasm_bindgen(js_name = selectedBlock)]
    pub fn selected_block(&self) -> Option<String> {
        let host = self.host.as_ref()?;
        let selected = host.borrow().bridge.selected().map(|id| id.to_string());
        selected
    }

    /// Tell the bridge about a client-side navigation the router performed.
    pub fn navigate(&self) -> Result<(), JsError> {
        on_navigate(self.host()?);
        Ok(())
    }

    /// Rescan the page now instead of waiting for the next mutation batch.
    pub fn rescan(&self) -> Result<(), JsError> {
        let mut host = self.host()?.borrow_mut();
        host.rescan();
        host.sync_selection_chrome();
        Ok(())
    }
}

/// Start the bridge on a frontend page.
///
/// `options` is `{allowedBlocks, voltoConfig, pathToApiPath}`.
#[wasm_bindgen(js_name = initBridge)]
pub fn init_bridge(options: JsValue) -> Result<JsBridge, JsError> {
    let path_to_api_path = js_sys::Reflect::get(&options, &JsValue::from_str("pathToApiPath"))
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok());
    let init: InitOptions = if options.is_undefined() || options.is_null() {
        InitOptions::default()
    } else {
        serde_wasm_bindgen::from_value(options).map_err(js_err)?
    };
    let config = init.into_config().map_err(js_err)?;

    let name = frame_name().map_err(js_err)?;
    let url = page_url().map_err(js_err)?;
    let mut store = SessionStorageTokenStore::new();
    let controller = ModeController::new(&name, &url, &mut store).map_err(js_err)?;
    let access_token = controller.access_token().map(str::to_string);

    let Some(context) = controller.context().cloned() else {
        tracing::info!("not inside an admin iframe; bridge dormant");
        return Ok(JsBridge {
            host: None,
            access_token,
            _listeners: Vec::new(),
            _watcher: None,
        });
    };

    let transport = PostMessageTransport::to_parent(context.admin_origin.clone()).map_err(js_err)?;
    let editing = context.is_editing();
    let root: Node = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.body())
        .map(Node::from)
        .ok_or_else(|| JsError::new("document has no body"))?;
    let handle = if editing {
        Some(DragHandle::new().map_err(js_err)?)
    } else {
        None
    };

    let initial_path = api_path(path_to_api_path.as_ref(), &page_path().unwrap_or_default());

    tracing::info!(mode = %context.mode, admin = %context.admin_origin, "hydra bridge starting");
    let host = Rc::new(RefCell::new(Host {
        bridge: Bridge::new(transport, context, config),
        controller,
        path_to_api_path,
        on_edit_change: None,
        root,
        markers: DomMarkers::default(),
        pointer: PointerKind::Mouse,
        text_field: None,
        handle,
        drag: None,
    }));

    let (listeners, watcher) = attach(&host, editing).map_err(js_err)?;
    {
        let mut guard = host.borrow_mut();
        if editing {
            guard.rescan();
        }
        guard.bridge.announce(&initial_path).map_err(js_err)?;
    }

    Ok(JsBridge {
        host: Some(host),
        access_token,
        _listeners: listeners,
        _watcher: watcher,
    })
}

#[cfg(test)]
mod tests {
    use wasm_bindgen_test::*;

    use super::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_api_path_hook() {
        let hook = js_sys::Function::new_with_args("p", "return '/++api++' + p");
        assert_eq!(api_path(Some(&hook), "/news"), "/++api++/news");
        assert_eq!(api_path(None, "/news"), "/news");
    }

    #[wasm_bindgen_test]
    fn test_api_path_hook_failure_keeps_path() {
        let throws = js_sys::Function::new_with_args("p", "throw new Error('nope')");
        assert_eq!(api_path(Some(&throws), "/news"), "/news");
        let not_a_string = js_sys::Function::new_no_args("return 42");
        assert_eq!(api_path(Some(&not_a_string), "/news"), "/news");
    }
}
