use lightbox_core::{PostImage, PostRecord, build_feed, render_feed};
use time::OffsetDateTime;
use time::macros::datetime;

fn published(id: &str, at: OffsetDateTime) -> PostRecord {
    let mut post = PostRecord::new(id, format!("Post {id}"));
    post.content = "<p>x</p>".into();
    post.published = true;
    post.published_at = Some(at);
    post
}

#[test]
fn feed_lists_published_posts_newest_first() {
    let mut draft = PostRecord::new("draft", "Draft");
    draft.content = "<p>x</p>".into();
    let posts = vec![
        published("old", datetime!(2023-01-01 0:00 UTC)),
        draft,
        published("new", datetime!(2024-06-30 0:00 UTC)),
    ];

    let entries = build_feed(&posts).unwrap();

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
    assert_eq!(entries[0].number, "01");
    assert_eq!(entries[1].number, "02");
    assert_eq!(entries[0].date, "30/06/24");
}

#[test]
fn cover_and_excerpt_are_optional() {
    let mut with_cover = published("a", datetime!(2024-01-01 0:00 UTC));
    with_cover.images = vec![
        PostImage::new("second.jpg", 2),
        PostImage::new("first.jpg", 1),
    ];
    with_cover.excerpt = Some("Short".into());
    let mut bare = published("b", datetime!(2023-01-01 0:00 UTC));
    bare.excerpt = Some(" ".into());

    let entries = build_feed(&[with_cover, bare]).unwrap();

    let cover = entries[0].cover.as_ref().unwrap();
    assert_eq!(cover.url, "first.jpg");
    assert_eq!(cover.alt, "Post a");
    assert_eq!(entries[0].excerpt.as_deref(), Some("Short"));
    assert!(entries[1].cover.is_none());
    assert!(entries[1].excerpt.is_none());
}

#[test]
fn rendered_cards_escape_their_text() {
    let mut post = published("x", datetime!(2024-01-01 0:00 UTC));
    post.title = "<Tom & Jerry>".into();
    let entries = build_feed(&[post]).unwrap();

    let html = render_feed(&entries).unwrap();

    assert!(html.contains("<span class=\"number\">01</span>"));
    assert!(html.contains("<h2>&lt;Tom &amp; Jerry&gt;</h2>"));
    assert!(html.contains("<time>01/01/24</time>"));
    assert!(html.contains("href=\"/blog/x\""));
    assert!(html.starts_with("<section class=\"feed\"><article class=\"card\">"));
    assert!(html.ends_with("</a></article></section>"));
}

#[test]
fn empty_feed_renders_an_empty_section() {
    assert_eq!(render_feed(&[]).unwrap(), "<section class=\"feed\"></section>");
}

#[test]
fn numbering_pads_to_two_digits() {
    let posts: Vec<PostRecord> = (0..12)
        .map(|day| {
            let at = datetime!(2024-01-01 0:00 UTC) + time::Duration::days(day);
            published(&format!("p{day}"), at)
        })
        .collect();

    let entries = build_feed(&posts).unwrap();

    assert_eq!(entries[8].number, "09");
    assert_eq!(entries[11].number, "12");
    assert_eq!(entries[0].id, "p11");
}
