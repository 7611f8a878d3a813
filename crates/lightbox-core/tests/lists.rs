use lightbox_core::{Command, Document, EditorConfig, EditorState, Node, Point};

fn state_with(children: Vec<Node>) -> EditorState {
    EditorState::new(Document::new(children), EditorConfig::default()).unwrap()
}

fn item(text: &str) -> Node {
    Node::list_item(vec![Node::paragraph(text)])
}

#[test]
fn bullet_list_wraps_selected_blocks_and_unwraps_again() {
    let original = vec![Node::paragraph("a"), Node::paragraph("b")];
    let mut state = state_with(original.clone());
    state.select(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1));

    state.apply(Command::ToggleBulletList).unwrap();
    assert_eq!(
        state.doc().children,
        vec![Node::bullet_list(vec![item("a"), item("b")])]
    );
    assert!(state.is_active(&Command::ToggleBulletList));
    assert!(!state.is_active(&Command::ToggleOrderedList));
    assert_eq!(
        state.to_html(),
        "<ul><li><p>a</p></li><li><p>b</p></li></ul>"
    );

    state.apply(Command::ToggleBulletList).unwrap();
    assert_eq!(state.doc().children, original);
}

#[test]
fn other_list_kind_switches_in_place() {
    let mut state = state_with(vec![Node::bullet_list(vec![item("a"), item("b")])]);

    state.apply(Command::ToggleOrderedList).unwrap();

    assert_eq!(
        state.doc().children,
        vec![Node::ordered_list(vec![item("a"), item("b")])]
    );
    assert!(state.is_active(&Command::ToggleOrderedList));
}

#[test]
fn lifting_a_middle_item_splits_the_list() {
    let mut state = state_with(vec![Node::ordered_list(vec![
        item("a"),
        item("b"),
        item("c"),
    ])]);
    state.select(Point::new(vec![0, 1, 0, 0], 0), Point::new(vec![0, 1, 0, 0], 0));

    state.apply(Command::ToggleOrderedList).unwrap();

    assert_eq!(
        state.doc().children,
        vec![
            Node::ordered_list(vec![item("a")]),
            Node::paragraph("b"),
            Node::ordered_list(vec![item("c")]),
        ]
    );
    assert_eq!(state.selection().focus.path, vec![1, 0]);
}

#[test]
fn list_toggle_is_one_undo_step() {
    let original = vec![Node::paragraph("a")];
    let mut state = state_with(original.clone());

    state.apply(Command::ToggleBulletList).unwrap();
    state.apply(Command::Undo).unwrap();

    assert_eq!(state.doc().children, original);
    assert!(state.can_redo());
}
