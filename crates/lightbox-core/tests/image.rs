use lightbox_core::{
    Command, CommandError, Document, EditorConfig, EditorState, ImageFile, ImageLayout,
    ImageNode, ImageRequest, ImageWidth, ImageWrap, Node, Point, Resolution, Selection,
    UploadSlot, encode_data_url,
};

fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.resize(len, 0);
    bytes
}

fn state_with(children: Vec<Node>) -> EditorState {
    EditorState::new(Document::new(children), EditorConfig::default()).unwrap()
}

#[test]
fn half_width_left_wrap_style_is_exact() {
    let layout = ImageLayout::new(ImageWidth::Half, ImageWrap::Left);
    assert_eq!(
        layout.style(),
        "width:50%;height:auto;float:left;margin:0 1rem 1rem 0;border-radius:0.5rem"
    );
}

#[test]
fn default_layout_is_centered_and_fluid() {
    assert_eq!(
        ImageLayout::default().style(),
        "max-width:100%;height:auto;display:block;margin:1rem auto;border-radius:0.5rem"
    );
    assert_eq!(
        ImageLayout::new(ImageWidth::Px300, ImageWrap::Right).style(),
        "width:300px;height:auto;float:right;margin:0 0 1rem 1rem;border-radius:0.5rem"
    );
}

#[tokio::test]
async fn png_upload_is_embedded_as_data_url() {
    let file = ImageFile::new("beach.png", png_bytes(10 * 1024));
    let request = ImageRequest::file(file)
        .layout(ImageLayout::new(ImageWidth::Half, ImageWrap::Left))
        .alt("Beach")
        .caption("Sunset");
    let mut slot = UploadSlot::default();

    let resolution = slot.begin(request).unwrap();
    assert!(matches!(resolution, Resolution::Pending));
    assert!(slot.is_busy());

    let node = slot.wait().await.unwrap().unwrap();
    assert!(!slot.is_busy());
    assert!(node.src.starts_with("data:image/png;base64,"));
    assert!(node.style.contains("border-radius:0.5rem"));
    assert_eq!(node.alt, "Beach");
    assert_eq!(node.caption.as_deref(), Some("Sunset"));
    assert_eq!(node.src, encode_data_url("image/png", &png_bytes(10 * 1024)));
}

#[tokio::test]
async fn second_upload_is_rejected_while_busy() {
    let mut slot = UploadSlot::default();
    slot.begin(ImageRequest::file(ImageFile::new("a.png", png_bytes(64))))
        .unwrap();

    let err = slot
        .begin(ImageRequest::file(ImageFile::new("b.png", png_bytes(64))))
        .unwrap_err();
    assert!(matches!(err, CommandError::UploadInProgress));

    slot.abandon();
    assert!(!slot.is_busy());
    assert!(slot.wait().await.is_none());
}

#[test]
fn non_image_file_is_rejected_before_encoding() {
    let mut slot = UploadSlot::default();
    let err = slot
        .begin(ImageRequest::file(ImageFile::new("notes.txt", b"hello".to_vec())))
        .unwrap_err();

    assert!(matches!(err, CommandError::InvalidFileType(name) if name == "notes.txt"));
    assert!(!slot.is_busy());
}

#[test]
fn url_sources_resolve_without_a_runtime() {
    let mut slot = UploadSlot::default();

    let resolution = slot
        .begin(ImageRequest::url("https://img.example/a.jpg"))
        .unwrap();
    let Resolution::Ready(node) = resolution else {
        panic!("expected an immediate node");
    };
    assert_eq!(node.src, "https://img.example/a.jpg");
    assert!(!slot.is_busy());

    let err = slot.begin(ImageRequest::url("  ")).unwrap_err();
    assert!(matches!(err, CommandError::InvalidCommandArgument(_)));
}

#[test]
fn insert_image_splits_text_and_moves_caret_after() {
    let mut state = state_with(vec![Node::paragraph("ab")]);
    state.set_selection(Selection::collapsed(Point::new(vec![0, 0], 1)));
    let mut image = ImageNode::new("https://img.example/a.jpg");
    image.style = ImageLayout::default().style();

    state.apply(Command::InsertImage(image.clone())).unwrap();

    let Node::Element(paragraph) = &state.doc().children[0] else {
        panic!("expected paragraph");
    };
    assert_eq!(
        paragraph.children,
        vec![Node::text("a"), Node::Image(image), Node::text("b")]
    );
    assert_eq!(state.selection().focus, Point::new(vec![0, 2], 0));

    state.apply(Command::Undo).unwrap();
    assert_eq!(state.doc().children, vec![Node::paragraph("ab")]);
}

#[test]
fn image_at_block_end_gets_a_trailing_caret_leaf() {
    let mut state = state_with(vec![Node::paragraph("ab")]);
    state.set_selection(Selection::collapsed(Point::new(vec![0, 0], 2)));

    state
        .apply(Command::InsertImage(ImageNode::new("x.png")))
        .unwrap();

    let Node::Element(paragraph) = &state.doc().children[0] else {
        panic!("expected paragraph");
    };
    assert_eq!(paragraph.children.len(), 3);
    assert_eq!(paragraph.children[2], Node::text(""));
    assert_eq!(state.to_html(), "<p>ab<img src=\"x.png\" alt=\"\"></p>");
}

#[test]
fn empty_image_source_is_rejected() {
    let mut state = state_with(vec![Node::paragraph("ab")]);
    let err = state
        .apply(Command::InsertImage(ImageNode::new(" ")))
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidCommandArgument(_)));
    assert!(!state.can_undo());
}

#[test]
fn url_source_is_used_as_given() {
    let mut slot = UploadSlot::default();
    let Resolution::Ready(node) = slot
        .begin(ImageRequest::url(" https://img.example/a.jpg"))
        .unwrap()
    else {
        panic!("expected an immediate node");
    };
    assert_eq!(node.src, " https://img.example/a.jpg");

    let mut state = state_with(vec![Node::paragraph("ab")]);
    state.apply(Command::InsertImage(node.clone())).unwrap();
    let reparsed = lightbox_core::html::parse(&state.to_html()).unwrap();
    assert_eq!(&reparsed, state.doc());
}
