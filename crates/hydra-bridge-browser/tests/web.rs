//! WASM browser tests for hydra-bridge-browser.
//!
//! Run with: `wasm-pack test --headless --firefox` or `--chrome`

use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

use hydra_bridge_browser::{
    DomTree, DragChrome, KeyCommand, Mark, Point, SchemaRegistry, SessionStorageTokenStore,
    TextPoint, TextRange, TokenStore, WebDom, key_command, read_selection, restore_caret, scan,
};
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlElement, Node};

/// Mount `html` in a fresh container attached to the body.
fn mount(html: &str) -> Element {
    let doc = web_sys::window().unwrap().document().unwrap();
    let container = doc.create_element("div").unwrap();
    container.set_inner_html(html);
    doc.body().unwrap().append_child(&container).unwrap();
    container
}

// === WebDom ===

#[wasm_bindgen_test]
fn test_web_dom_basics() {
    let root = mount(r#"<p class="x" data-block-uid="a">hi<!-- note --></p>"#);
    let root: Node = root.into();
    let p = WebDom.query_selector(&root, "p").unwrap();
    assert_eq!(WebDom.tag_name(&p).as_deref(), Some("p"));
    assert!(WebDom.matches(&p, ".x"));
    assert!(!WebDom.matches(&p, "[[invalid"));
    assert_eq!(WebDom.attribute(&p, "data-block-uid").as_deref(), Some("a"));
    let children = WebDom.children(&p);
    assert_eq!(children.len(), 2);
    assert_eq!(WebDom.data(&children[0]).as_deref(), Some("hi"));
    assert_eq!(WebDom.data(&children[1]).as_deref(), Some(" note "));
    assert!(WebDom.contains(&root, &children[0]));
    assert!(WebDom.bounding_rect(&p).is_some());
}

#[wasm_bindgen_test]
fn test_scan_live_document() {
    let root = mount(
        r#"<div data-block-uid="g">
             <div data-block-uid="t1"><h3 data-editable-field="title">One</h3></div>
             <!-- hydra block-uid=t2 editable-field=title(.t) --><article><h3 class="t">Two</h3></article><!-- /hydra -->
           </div>"#,
    );
    let root: Node = root.into();
    let result = scan(&WebDom, &root, &SchemaRegistry::default(), None);
    assert!(result.warnings.is_empty());
    assert_eq!(result.tree.get("g").unwrap().children, vec!["t1", "t2"]);
    let field = result.markers.field(Some("t2"), "title").unwrap();
    assert_eq!(field.element.text_content().as_deref(), Some("Two"));
}

// === Cursor ===

#[wasm_bindgen_test]
fn test_caret_restore_through_wrappers() {
    let root = mount(
        r#"<div data-editable-field="value" contenteditable="true"><p data-node-id="0">Plain <span class="b" data-node-id="0.1"><strong data-node-id="0.1">bold</strong></span></p></div>"#,
    );
    let field = root.first_element_child().unwrap();
    restore_caret(&field, &TextPoint::new("0", 8)).unwrap();
    // Read back against the innermost tagged element.
    let range = read_selection(&field).unwrap();
    assert_eq!(range, TextRange::caret(TextPoint::new("0.1", 2)));
}

#[wasm_bindgen_test]
fn test_caret_restore_counts_scalar_values() {
    let root = mount(r#"<div data-editable-field="value"><p data-node-id="0">a😀b</p></div>"#);
    let field = root.first_element_child().unwrap();
    restore_caret(&field, &TextPoint::new("0", 2)).unwrap();

    let selection = web_sys::window().unwrap().get_selection().unwrap().unwrap();
    // 'a' plus the surrogate pair.
    assert_eq!(selection.anchor_offset(), 3);
    assert_eq!(read_selection(&field).unwrap().focus, TextPoint::new("0", 2));
}

#[wasm_bindgen_test]
fn test_restore_unknown_node_fails() {
    let root = mount(r#"<div data-editable-field="value"><p data-node-id="0">x</p></div>"#);
    let field = root.first_element_child().unwrap();
    assert!(restore_caret(&field, &TextPoint::new("7", 0)).is_err());
}

// === Drag chrome ===

#[wasm_bindgen_test]
fn test_drag_chrome_leaves_scan_unchanged() {
    let doc = web_sys::window().unwrap().document().unwrap();
    let container = mount(
        r#"<div data-block-uid="dragme"><h3 data-editable-field="title">T</h3>
             <div data-block-uid="inner"><p data-editable-field="value" data-node-id="0">x</p></div>
           </div>"#,
    );
    let body: Node = doc.body().unwrap().into();
    let before = scan(&WebDom, &body, &SchemaRegistry::default(), None);
    let fields_before = doc.query_selector_all("[data-editable-field]").unwrap().length();
    let html = doc.document_element().unwrap();
    let chrome_before = html.child_element_count();

    let source: HtmlElement = container.first_element_child().unwrap().dyn_into().unwrap();
    let chrome = DragChrome::new(&source, Point::new(5.0, 5.0)).unwrap();
    // Shadow and indicator sit next to <body>, not inside it.
    assert_eq!(html.child_element_count(), chrome_before + 2);
    assert_eq!(doc.query_selector_all("[data-editable-field]").unwrap().length(), fields_before);
    assert_eq!(doc.query_selector_all("[data-block-uid=inner]").unwrap().length(), 1);
    assert_eq!(scan(&WebDom, &body, &SchemaRegistry::default(), None).tree, before.tree);

    drop(chrome);
    assert_eq!(html.child_element_count(), chrome_before);
    assert_eq!(scan(&WebDom, &body, &SchemaRegistry::default(), None).tree, before.tree);
}

// === Keyboard ===

#[wasm_bindgen_test]
fn test_key_commands() {
    assert_eq!(key_command("Escape", false, false, true), Some(KeyCommand::Escape));
    assert_eq!(key_command("ArrowUp", false, false, false), Some(KeyCommand::SelectParent));
    assert_eq!(key_command("ArrowUp", false, false, true), None);
    assert_eq!(key_command("b", true, false, true), Some(KeyCommand::Format(Mark::Strong)));
    assert_eq!(key_command("b", true, false, false), None);
}

// === Session ===

#[wasm_bindgen_test]
fn test_session_storage_token_store() {
    let mut store = SessionStorageTokenStore::new();
    store.set("tok-1");
    assert_eq!(SessionStorageTokenStore::new().get().as_deref(), Some("tok-1"));
    let storage = web_sys::window().unwrap().session_storage().unwrap().unwrap();
    storage.clear().unwrap();
    assert_eq!(store.get(), None);
}
