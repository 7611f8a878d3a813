use lightbox_core::{
    AppContext, Command, CommandError, EditingSession, EditorConfig, ImageFile, ImageInsertion,
    ImageRequest, Node, PostRecord, SessionError,
};
use time::macros::datetime;

fn signed_in() -> AppContext {
    let mut ctx = AppContext::new();
    ctx.sign_in("ana");
    ctx
}

fn post() -> PostRecord {
    let mut post = PostRecord::new("p1", "Trip");
    post.content = "<p>Day one</p>".into();
    post
}

#[test]
fn editing_requires_authorization() {
    let ctx = AppContext::new();
    let err = EditingSession::start(&ctx, post(), EditorConfig::default()).unwrap_err();
    assert!(matches!(err, SessionError::Unauthorized));
}

#[test]
fn context_tracks_user_and_theme() {
    let mut ctx = signed_in();
    assert_eq!(ctx.user(), Some("ana"));
    assert!(ctx.is_authorized());
    assert!(ctx.toggle_dark_mode());

    ctx.sign_out();
    assert!(!ctx.is_authorized());
    assert_eq!(ctx.user(), None);
    assert!(ctx.dark_mode());
    ctx.teardown();
}

#[test]
fn finish_writes_the_document_back() {
    let ctx = signed_in();
    let mut session = EditingSession::start(&ctx, post(), EditorConfig::default()).unwrap();
    session.apply(Command::ToggleHeading { level: 2 }).unwrap();
    session.set_excerpt(Some("First day".into()));

    let now = datetime!(2024-04-01 9:00 UTC);
    let saved = session.finish(true, now).unwrap();

    assert_eq!(saved.content, "<h2>Day one</h2>");
    assert!(saved.published);
    assert_eq!(saved.published_at, Some(now));
    assert_eq!(saved.excerpt.as_deref(), Some("First day"));
}

#[test]
fn finish_rejects_missing_fields_and_keeps_the_record() {
    let ctx = signed_in();
    let mut session = EditingSession::start(&ctx, post(), EditorConfig::default()).unwrap();
    session.set_title("  ");

    let err = session.finish(true, datetime!(2024-04-01 9:00 UTC)).unwrap_err();

    assert!(matches!(err, SessionError::Post(_)));
    assert!(!session.post().published);
    assert_eq!(session.post().content, "<p>Day one</p>");
}

#[test]
fn url_images_insert_immediately() {
    let ctx = signed_in();
    let mut session = EditingSession::start(&ctx, post(), EditorConfig::default()).unwrap();

    let outcome = session
        .insert_image(ImageRequest::url("https://img.test/a.jpg").alt("A"))
        .unwrap();

    assert_eq!(outcome, ImageInsertion::Inserted);
    assert!(session.editor().to_html().contains("<img src=\"https://img.test/a.jpg\" alt=\"A\""));
    assert!(session.editor().can_undo());
}

#[tokio::test]
async fn file_upload_completes_through_the_session() {
    let ctx = signed_in();
    let mut session = EditingSession::start(&ctx, post(), EditorConfig::default()).unwrap();
    let mut bytes = vec![0x89, b'P', b'N', b'G'];
    bytes.resize(2048, 7);

    let outcome = session
        .insert_image(ImageRequest::file(ImageFile::new("pic.png", bytes)))
        .unwrap();
    assert_eq!(outcome, ImageInsertion::Pending);
    assert!(session.is_uploading());

    session.apply(Command::ToggleBold).unwrap();
    let err = session
        .insert_image(ImageRequest::url("https://img.test/b.jpg"))
        .unwrap_err();
    assert!(matches!(err, CommandError::UploadInProgress));

    session.finish_upload().await.unwrap().unwrap();
    assert!(!session.is_uploading());

    let Node::Element(paragraph) = &session.editor().doc().children[0] else {
        panic!("expected paragraph");
    };
    let image = paragraph
        .children
        .iter()
        .find_map(|node| match node {
            Node::Image(image) => Some(image),
            _ => None,
        })
        .expect("image inserted at the caret");
    assert!(image.src.starts_with("data:image/png;base64,"));
}

#[test]
fn bad_stored_content_still_opens() {
    let ctx = signed_in();
    let mut broken = post();
    broken.content = "<p>unclosed <b>bold".into();

    let session = EditingSession::start(&ctx, broken, EditorConfig::default()).unwrap();

    assert_eq!(session.editor().to_html(), "<p>unclosed <strong>bold</strong></p>");
}

#[tokio::test]
async fn polling_inserts_the_upload_once_it_is_ready() {
    let ctx = signed_in();
    let mut session = EditingSession::start(&ctx, post(), EditorConfig::default()).unwrap();
    let mut bytes = vec![0xff, 0xd8, 0xff];
    bytes.resize(4096, 1);

    let outcome = session
        .insert_image(ImageRequest::file(ImageFile::new("pic.jpg", bytes)))
        .unwrap();
    assert_eq!(outcome, ImageInsertion::Pending);

    let result = loop {
        if let Some(result) = session.poll_upload() {
            break result;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    result.unwrap();

    assert!(!session.is_uploading());
    assert!(session.poll_upload().is_none());
    assert!(session.editor().to_html().contains("src=\"data:image/jpeg;base64,"));
}

#[test]
fn admin_actions_require_authorization() {
    let ctx = AppContext::new();
    assert!(matches!(ctx.authorize("delete"), Err(SessionError::Unauthorized)));
    assert!(signed_in().authorize("delete").is_ok());
}
