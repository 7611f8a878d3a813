use lightbox_core::{Command, Document, EditorConfig, EditorState, Node, Point, TextAlign, html};

fn state_with(children: Vec<Node>) -> EditorState {
    EditorState::new(Document::new(children), EditorConfig::default()).unwrap()
}

#[test]
fn align_toggle_sets_and_clears() {
    let mut state = state_with(vec![Node::paragraph("x")]);
    assert!(!state.is_active(&Command::ToggleAlign(TextAlign::Center)));

    state.apply(Command::ToggleAlign(TextAlign::Center)).unwrap();
    assert_eq!(state.to_html(), "<p style=\"text-align: center\">x</p>");
    assert!(state.is_active(&Command::ToggleAlign(TextAlign::Center)));

    state.apply(Command::ToggleAlign(TextAlign::Center)).unwrap();
    assert_eq!(state.doc().children, vec![Node::paragraph("x")]);
}

#[test]
fn align_switches_between_values() {
    let mut state = state_with(vec![Node::paragraph("a"), Node::heading(1, "b")]);
    state.select(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1));

    state.apply(Command::ToggleAlign(TextAlign::Right)).unwrap();
    state.apply(Command::ToggleAlign(TextAlign::Center)).unwrap();

    assert_eq!(
        state.to_html(),
        "<p style=\"text-align: center\">a</p><h1 style=\"text-align: center\">b</h1>"
    );
}

#[test]
fn parsed_alignment_is_case_insensitive() {
    let doc = html::parse("<p style=\"TEXT-ALIGN: Right\">x</p>").unwrap();
    assert_eq!(html::serialize(&doc), "<p style=\"text-align: right\">x</p>");
}

#[test]
fn unaligned_block_reports_no_active_alignment() {
    let mut state = state_with(vec![Node::paragraph("x")]);
    let left = Command::ToggleAlign(TextAlign::Left);
    assert!(!state.is_active(&left));

    state.apply(left.clone()).unwrap();
    assert!(state.is_active(&left));
    assert_eq!(state.to_html(), "<p style=\"text-align: left\">x</p>");

    state.apply(left.clone()).unwrap();
    assert!(!state.is_active(&left));
    assert_eq!(state.doc().children, vec![Node::paragraph("x")]);
}
