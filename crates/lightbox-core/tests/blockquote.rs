use lightbox_core::{Command, Document, EditorConfig, EditorState, Node, Point};

fn state_with(children: Vec<Node>) -> EditorState {
    EditorState::new(Document::new(children), EditorConfig::default()).unwrap()
}

#[test]
fn blockquote_wraps_and_unwraps() {
    let original = vec![Node::paragraph("quote"), Node::paragraph("after")];
    let mut state = state_with(original.clone());

    state.apply(Command::ToggleBlockquote).unwrap();
    assert_eq!(
        state.doc().children,
        vec![
            Node::blockquote(vec![Node::paragraph("quote")]),
            Node::paragraph("after"),
        ]
    );
    assert!(state.is_active(&Command::ToggleBlockquote));
    assert_eq!(state.selection().focus.path, vec![0, 0, 0]);

    state.apply(Command::ToggleBlockquote).unwrap();
    assert_eq!(state.doc().children, original);
    assert!(!state.is_active(&Command::ToggleBlockquote));
}

#[test]
fn blockquote_wraps_a_range_of_blocks() {
    let mut state = state_with(vec![
        Node::paragraph("a"),
        Node::heading(2, "b"),
        Node::paragraph("c"),
    ]);
    state.select(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1));

    state.apply(Command::ToggleBlockquote).unwrap();

    assert_eq!(
        state.doc().children,
        vec![
            Node::blockquote(vec![Node::paragraph("a"), Node::heading(2, "b")]),
            Node::paragraph("c"),
        ]
    );
    assert_eq!(
        state.to_html(),
        "<blockquote><p>a</p><h2>b</h2></blockquote><p>c</p>"
    );
}

#[test]
fn quoting_inside_a_list_item_stays_in_the_item() {
    let mut state = state_with(vec![Node::bullet_list(vec![Node::list_item(vec![
        Node::paragraph("x"),
    ])])]);

    state.apply(Command::ToggleBlockquote).unwrap();

    assert_eq!(
        state.doc().children,
        vec![Node::bullet_list(vec![Node::list_item(vec![
            Node::blockquote(vec![Node::paragraph("x")]),
        ])])]
    );
    assert!(state.is_active(&Command::ToggleBulletList));
}
