//! End-to-end scenarios: admin envelopes in, DOM scanned, user gestures out.

use serde_json::{Value, json};

use hydra_bridge_core::{
    BlockAction, BlockTree, Bridge, BridgeConfig, BridgeError, ContainerResolver, DropEdge,
    Envelope, FieldRef, MemoryDom, Message, Orientation, Point, RecordingTransport, Rect,
    RichText, SchemaRegistry, SessionContext, TextPoint, TextRange, classify, scan,
};
use hydra_bridge_core::richtext::{RichNode, node_ids_in_dom};

const ADMIN: &str = "https://admin.example";

fn session() -> SessionContext {
    SessionContext::from_frame_name(&format!("hydra-edit:{ADMIN}"))
        .unwrap()
        .unwrap()
}

fn config() -> BridgeConfig {
    serde_json::from_value(json!({
        "allowedBlocks": ["slate", "teaser", "grid"],
        "blockSchema": {
            "grid": {"slots": {"blocks": {"allowed": ["teaser", "slate"], "defaultType": "teaser", "min": 1}}}
        }
    }))
    .unwrap()
}

fn envelope(message: Message) -> Value {
    serde_json::to_value(Envelope::new(message, session().tag)).unwrap()
}

fn edit_change(tree: Value) -> Value {
    json!({"type": "EDIT_CHANGE", "payload": {"tree": tree}, "sessionTag": format!("edit:{ADMIN}")})
}

fn render(nodes: &[RichNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            RichNode::Text(leaf) => out.push_str(&leaf.text),
            RichNode::Element(el) => {
                let tag = if el.kind == "link" { "a" } else { el.kind.as_str() };
                let id = el.node_id.as_deref().unwrap_or_default();
                // Bold text gets an extra styling wrapper carrying the same id.
                if el.kind == "strong" {
                    out.push_str(&format!(
                        r#"<span class="b" data-node-id="{id}"><strong data-node-id="{id}">{}</strong></span>"#,
                        render(&el.children)
                    ));
                } else {
                    out.push_str(&format!(r#"<{tag} data-node-id="{id}">{}</{tag}>"#, render(&el.children)));
                }
            }
        }
    }
    out
}

#[test]
fn test_scanned_ids_unique_with_valid_parents() {
    let dom = MemoryDom::parse(
        r#"<main>
             <div data-block-uid="a"><p data-block-uid="b" data-editable-field="value">hi</p></div>
             <div data-block-uid="g">
               <!-- hydra block-uid=t1 editable-field=title(.t) --><article><h3 class="t">One</h3></article><!-- /hydra -->
               <div data-block-uid="t2"><h3 data-editable-field="title">Two</h3></div>
               <div data-block-uid="t2"></div>
             </div>
           </main>"#,
    );
    let result = scan(&dom, &dom.root(), &SchemaRegistry::default(), None);
    let mut ids: Vec<_> = result.tree.ids().cloned().collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
    for block in &result.tree.blocks {
        if let Some(parent) = &block.parent_id {
            assert!(result.tree.contains(parent), "{} has dangling parent {parent}", block.block_id);
        }
    }
    assert_eq!(result.tree.get("g").unwrap().children, vec!["t1", "t2"]);
}

#[test]
fn test_rescan_is_idempotent() {
    let dom = MemoryDom::parse(
        r#"<div data-block-uid="a" data-block-add="right">
             <!-- hydra block-readonly /--><p data-editable-field="value">x</p>
             <div data-block-uid="b"><a data-linkable-field="href" data-linkable-allow="internal">l</a></div>
           </div>"#,
    );
    let registry = SchemaRegistry::new(config());
    let first = scan(&dom, &dom.root(), &registry, None);
    let second = scan(&dom, &dom.root(), &registry, None);
    assert_eq!(first.tree, second.tree);
}

#[test]
fn test_text_edit_keeps_unaffected_node_ids() {
    let mut doc = RichText::from_value(&json!([
        {"type": "p", "children": [{"text": "Plain "}, {"type": "strong", "children": [{"text": "bold"}]}]},
        {"type": "p", "children": [{"text": "second"}]},
        {"type": "p", "children": [{"text": "third"}]}
    ]))
    .unwrap();
    let html = format!(r#"<div class="f">{}</div>"#, render(&doc.nodes));
    let dom = MemoryDom::parse(&html);
    let before = node_ids_in_dom(&dom, &dom.find(".f").unwrap());
    assert_eq!(before, doc.node_ids());

    doc.apply(&hydra_bridge_core::TextEdit::InsertText {
        at: TextPoint::new("1", 3),
        text: "-ish".into(),
    })
    .unwrap();
    let html = format!(r#"<div class="f">{}</div>"#, render(&doc.nodes));
    let dom = MemoryDom::parse(&html);
    let after = node_ids_in_dom(&dom, &dom.find(".f").unwrap());
    assert_eq!(after, before);
    assert_eq!(doc.plain_text(), "Plain bold\nsec-ishond\nthird");
}

#[test]
fn test_drop_classification_quartiles() {
    let rect = Rect::new(0.0, 40.0, 300.0, 80.0);
    assert_eq!(classify(&rect, Point::new(5.0, 60.0), Orientation::Vertical), DropEdge::Before);
    assert_eq!(classify(&rect, Point::new(5.0, 100.0), Orientation::Vertical), DropEdge::After);
    let wide = Rect::new(100.0, 0.0, 200.0, 50.0);
    assert_eq!(classify(&wide, Point::new(150.0, 5.0), Orientation::Horizontal), DropEdge::Before);
    assert_eq!(classify(&wide, Point::new(250.0, 5.0), Orientation::Horizontal), DropEdge::After);
}

#[test]
fn test_removing_last_child_yields_one_placeholder() {
    let registry = SchemaRegistry::new(config());
    let resolver = ContainerResolver::new(&registry);
    let mut tree: BlockTree = serde_json::from_value(json!({
        "blocks": {
            "g": {"id": "g", "@type": "grid", "slots": {"blocks": ["only"]}},
            "only": {"id": "only", "@type": "teaser", "parentId": "g"}
        },
        "root": {"blocks": ["g"]}
    }))
    .unwrap();
    let plan = resolver.check_remove(&tree, "only").unwrap();
    assert_eq!(plan.placeholder.as_deref(), Some("teaser"));
    tree.remove("only").unwrap();
    resolver.ensure_min(&mut tree);
    resolver.ensure_min(&mut tree);
    let children = tree.children(Some("g"), "blocks");
    assert_eq!(children.len(), 1);
    assert!(tree.get(&children[0]).unwrap().placeholder);
}

#[test]
fn test_drag_to_lower_half_moves_before_next_sibling() {
    let mut bridge = Bridge::new(RecordingTransport::new(), session(), config());
    bridge.handle(
        ADMIN,
        edit_change(json!({
            "blocks": {
                "x": {"id": "x", "@type": "slate"},
                "y": {"id": "y", "@type": "slate"},
                "z": {"id": "z", "@type": "slate"}
            },
            "root": {"blocks": ["x", "y", "z"]}
        })),
    );
    let viewport = Rect::new(0.0, 0.0, 1024.0, 768.0);
    let y_rect = Rect::new(0.0, 300.0, 600.0, 200.0);
    bridge.drag_begin("x", Point::new(20.0, 100.0)).unwrap();
    bridge.drag_update(Point::new(20.0, 450.0), Some(("y", y_rect)), &viewport);
    bridge.drag_end().unwrap();

    let sent: Vec<_> = bridge.transport().take().into_iter().map(|e| e.message).collect();
    assert_eq!(
        sent,
        vec![Message::BlockAction(BlockAction::Move {
            block_id: "x".into(),
            new_parent_id: None,
            new_slot: "blocks".into(),
            before_block_id: Some("z".into()),
        })]
    );
}

#[test]
fn test_readonly_ancestor_blocks_typing() {
    let mut bridge = Bridge::new(RecordingTransport::new(), session(), config());
    bridge.handle(
        ADMIN,
        edit_change(json!({
            "blocks": {"r": {"id": "r", "@type": "slate", "fields": {"value": [
                {"type": "p", "children": [{"text": "fixed"}]}
            ]}}},
            "root": {"blocks": ["r"]}
        })),
    );
    let dom = MemoryDom::parse(
        r#"<section data-block-readonly>
             <div data-block-uid="r"><div data-editable-field="value"><p data-node-id="0">fixed</p></div></div>
           </section>"#,
    );
    bridge.rescan(&dom, &dom.root());
    bridge.transport().take();

    let field = FieldRef::new(Some("r"), "value");
    let result = bridge.input(&field, "insertText", Some("!"), &TextRange::caret(TextPoint::new("0", 5)));
    assert!(matches!(result, Err(BridgeError::Readonly { .. })));
    let updates = bridge
        .transport()
        .take()
        .into_iter()
        .filter(|e| matches!(e.message, Message::BlockUpdate(_)))
        .count();
    assert_eq!(updates, 0);
}

#[test]
fn test_stale_session_messages_are_dropped() {
    let mut bridge = Bridge::new(RecordingTransport::new(), session(), config());
    let stale = json!({
        "type": "EDIT_CHANGE",
        "payload": {"tree": {"blocks": {}, "root": {"blocks": []}}},
        "sessionTag": format!("view:{ADMIN}")
    });
    assert!(bridge.handle(ADMIN, stale).is_empty());
    let select = envelope(Message::BlockAction(BlockAction::Select { block_id: Some("a".into()) }));
    assert!(bridge.handle("https://elsewhere.example", select.clone()).is_empty());
    assert_eq!(bridge.handle(ADMIN, select).len(), 1);
}
