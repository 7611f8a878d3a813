use lightbox_core::{Command, Document, EditorConfig, EditorState, Marks, Node, Point, Selection};

fn state_with(children: Vec<Node>) -> EditorState {
    EditorState::new(Document::new(children), EditorConfig::default()).unwrap()
}

fn leaves(state: &EditorState, block: usize) -> Vec<(String, bool, bool)> {
    let Node::Element(el) = &state.doc().children[block] else {
        panic!("expected element block");
    };
    el.children
        .iter()
        .map(|node| match node {
            Node::Text(t) => (t.text.clone(), t.marks.bold, t.marks.italic),
            _ => (String::new(), false, false),
        })
        .collect()
}

#[test]
fn toggle_bold_only_affects_selection_range() {
    let mut state = state_with(vec![Node::paragraph("abcde")]);
    state.select(Point::new(vec![0, 0], 1), Point::new(vec![0, 0], 3));

    state.apply(Command::ToggleBold).unwrap();

    assert_eq!(
        leaves(&state, 0),
        vec![
            ("a".into(), false, false),
            ("bc".into(), true, false),
            ("de".into(), false, false),
        ]
    );
    assert!(state.is_active(&Command::ToggleBold));
    assert_eq!(state.to_html(), "<p>a<strong>bc</strong>de</p>");
}

#[test]
fn second_toggle_restores_and_merges_leaves() {
    let original = vec![Node::paragraph("abcde")];
    let mut state = state_with(original.clone());
    state.select(Point::new(vec![0, 0], 1), Point::new(vec![0, 0], 3));

    state.apply(Command::ToggleBold).unwrap();
    state.apply(Command::ToggleBold).unwrap();

    assert_eq!(state.doc().children, original);
    assert!(!state.is_active(&Command::ToggleBold));
}

#[test]
fn mixed_selection_becomes_uniformly_marked() {
    let bold = Marks {
        bold: true,
        ..Marks::default()
    };
    let mut state = state_with(vec![Node::element(
        lightbox_core::ElementKind::Paragraph,
        vec![Node::marked_text("ab", bold), Node::text("cd")],
    )]);
    state.select(Point::new(vec![0, 0], 0), Point::new(vec![0, 1], 2));

    state.apply(Command::ToggleBold).unwrap();

    assert_eq!(leaves(&state, 0), vec![("abcd".into(), true, false)]);
}

#[test]
fn bold_and_italic_stack() {
    let mut state = state_with(vec![Node::paragraph("word")]);
    state.select(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 4));

    state.apply(Command::ToggleBold).unwrap();
    state.apply(Command::ToggleItalic).unwrap();

    assert_eq!(leaves(&state, 0), vec![("word".into(), true, true)]);
    assert_eq!(state.to_html(), "<p><strong><em>word</em></strong></p>");
}

#[test]
fn collapsed_toggle_marks_the_next_typed_text() {
    let mut state = state_with(vec![Node::paragraph("ab")]);
    state.set_selection(Selection::collapsed(Point::new(vec![0, 0], 2)));

    state.apply(Command::ToggleBold).unwrap();
    assert_eq!(state.doc().children, vec![Node::paragraph("ab")]);
    assert!(state.active_marks().bold);
    assert!(!state.can_undo(), "stored marks are not a document change");

    state.apply(Command::InsertText("cd".into())).unwrap();
    assert_eq!(
        leaves(&state, 0),
        vec![("ab".into(), false, false), ("cd".into(), true, false)]
    );
    assert!(state.stored_marks().is_none());
}

#[test]
fn toggles_span_several_blocks() {
    let mut state = state_with(vec![Node::paragraph("one"), Node::paragraph("two")]);
    state.select(Point::new(vec![0, 0], 1), Point::new(vec![1, 0], 2));

    state.apply(Command::ToggleItalic).unwrap();

    assert_eq!(state.to_html(), "<p>o<em>ne</em></p><p><em>tw</em>o</p>");
}
