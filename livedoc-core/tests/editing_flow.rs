//! Cross-module flows: merge review, paste normalization, and the
//! full plugin stack working on one state.

use std::sync::Arc;

use livedoc_core::diff::{resolve_delete, resolve_keep, DiffSet};
use livedoc_core::plugins::horizontal_rule_rule;
use livedoc_core::{
    CodemarkPlugin, EditorState, EnterRulesPlugin, LoremPlugin, Node, PastePlugin, Plugin,
    Selection, TableFixPlugin,
};
use livedoc_types::{DiffOrigin, NodeKind};

fn full_stack() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(CodemarkPlugin),
        Arc::new(EnterRulesPlugin::new(vec![horizontal_rule_rule()])),
        Arc::new(LoremPlugin),
        Arc::new(PastePlugin),
        Arc::new(TableFixPlugin),
    ]
}

/// intro(7) + upstream region(9) + mid(5) + local region(8).
fn review_doc() -> Node {
    Node::doc(vec![
        Node::paragraph("intro"),
        Node::block(NodeKind::DiffUpstream, vec![Node::paragraph("added")]),
        Node::paragraph("mid"),
        Node::block(NodeKind::DiffLocal, vec![Node::paragraph("gone")]),
    ])
}

#[test]
fn test_review_flow_keep_then_delete() {
    let mut st = EditorState::new(review_doc()).unwrap();
    let mut set = DiffSet::collect(&st.doc);
    assert_eq!(set.regions.len(), 2);
    assert_eq!(set.regions[0].origin, DiffOrigin::Upstream);
    assert_eq!(set.regions[0].pos, 7);
    assert_eq!(set.regions[1].pos, 21);

    // Keep the upstream region; the second region's anchor shifts.
    let tr = resolve_keep(&st, set.regions[0].pos).unwrap().unwrap();
    let mapping = tr.mapping();
    st.apply(tr).unwrap();
    set.map_through(&mapping);
    assert_eq!(set.regions.len(), 2);

    // Delete the local region at its remapped anchor.
    let tr = resolve_delete(&st, set.regions[1].pos).unwrap().unwrap();
    let mapping = tr.mapping();
    st.apply(tr).unwrap();
    set.map_through(&mapping);

    assert_eq!(st.doc.text_content(), "introaddedmid");
    assert!(st
        .doc
        .children
        .iter()
        .all(|n| !n.kind.is_diff_wrapper()));
    // The deleted region dropped out of the set.
    assert_eq!(set.regions.len(), 1);
}

#[test]
fn test_editing_before_region_keeps_anchor_valid() {
    let mut st = EditorState::new(review_doc()).unwrap();
    let mut set = DiffSet::collect(&st.doc);

    let mut tr = st.tr();
    tr.insert_text(1, "hey ").unwrap();
    let mapping = tr.mapping();
    st.apply(tr).unwrap();
    set.map_through(&mapping);

    // The remapped anchor still resolves to the wrapper.
    let tr = resolve_keep(&st, set.regions[0].pos).unwrap().unwrap();
    st.apply(tr).unwrap();
    assert_eq!(st.doc.children[1].kind, NodeKind::Paragraph);
    assert_eq!(st.doc.children[1].text_content(), "added");
}

#[test]
fn test_paste_dash_paragraph_through_state() {
    let mut st =
        EditorState::with_plugins(Node::doc(vec![Node::paragraph("x")]), full_stack()).unwrap();
    st.selection = Selection::cursor(3);

    st.paste(vec![
        Node::paragraph("a"),
        Node::paragraph("---"),
        Node::paragraph("b"),
    ])
    .unwrap();

    let kinds: Vec<NodeKind> = st.doc.children.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NodeKind::Paragraph,
            NodeKind::Paragraph,
            NodeKind::HorizontalRule,
            NodeKind::Paragraph,
        ]
    );
}

#[test]
fn test_word_html_rewritten_through_state() {
    let st = EditorState::with_plugins(Node::doc(vec![]), full_stack()).unwrap();
    let html = r#"<meta name="ProgId" content="Word.Document"><div>a</div><div>b</div>"#;
    let out = st.transform_pasted_html(html);
    assert_eq!(out.matches("<hr>").count(), 1);

    // Non-Word HTML passes through untouched.
    let plain = "<div>a</div><div>b</div>";
    assert_eq!(st.transform_pasted_html(plain), plain);
}

#[test]
fn test_full_stack_typing_and_table_repair_coexist() {
    let header = livedoc_core::table::rebuild_header_row("Data", 2);
    let cell = |t: &str| Node::block(NodeKind::TableCell, vec![Node::paragraph(t)]);
    let body = Node::block(NodeKind::TableRow, vec![cell("a"), cell("b")]);
    let table = Node::block(NodeKind::Table, vec![header, body]);
    let mut st = EditorState::with_plugins(
        Node::doc(vec![Node::paragraph("note"), table]),
        full_stack(),
    )
    .unwrap();

    // Ordinary typing commits without any table correction.
    st.selection = Selection::cursor(5);
    let batch = st.insert_input_text("!").unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(st.doc.children[0].text_content(), "note!");

    // Growing the table triggers exactly one repair.
    let mut tr = st.tr();
    // Paragraph now 7 tokens; body row content ends at 7 + 1 + 10 + 1 + 10 = 29.
    tr.insert(29, vec![cell("c")]).unwrap();
    let batch = st.apply(tr).unwrap();
    assert_eq!(batch.len(), 2);

    let header = &st.doc.children[1].children[0];
    assert_eq!(header.children.len(), 1);
    assert_eq!(header.children[0].attr_u64("colspan"), Some(3));
}
