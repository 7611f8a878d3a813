use lightbox_core::{
    MetadataVisibility, PostImage, PostRecord, RenderError, format_post_date, render_content,
    render_post, render_preview,
};
use time::macros::datetime;

fn post() -> PostRecord {
    let mut post = PostRecord::new("p1", "Sun & Sand");
    post.content = "<p>Hello <strong>there</strong></p>".into();
    post.published = true;
    post.published_at = Some(datetime!(2024-03-05 10:00 UTC));
    let mut dunes = PostImage::new("https://img.test/dunes.jpg", 2);
    dunes.caption = Some("Dunes".into());
    dunes.exif_data = Some(serde_json::json!({ "iso": 100 }));
    post.images = vec![dunes, PostImage::new("https://img.test/beach.jpg", 1)];
    post
}

#[test]
fn scripts_and_handlers_are_stripped() {
    let html = render_content("<p onclick=\"x()\">a<script>alert(1)</script></p>").unwrap();
    assert_eq!(html, "<p>a</p>");
}

#[test]
fn images_get_display_attributes() {
    let style = "width:50%;height:auto;float:left;margin:0 1rem 1rem 0;border-radius:0.5rem";
    let html = render_content(&format!(
        "<p><img src=\"data:image/png;base64,AA\" alt=\"Sea\" style=\"{style}\"></p>"
    ))
    .unwrap();

    assert!(html.contains("src=\"data:image/png;base64,AA\""));
    assert!(html.contains(&format!("style=\"{style}\"")));
    assert!(html.contains("class=\"editor-image\""));
    assert!(html.contains("loading=\"lazy\""));
}

#[test]
fn unsafe_urls_and_styles_are_removed() {
    let html = render_content(
        "<p style=\"text-align: center; color: red\"><a href=\"javascript:alert(1)\">x</a>\
         <img src=\"data:text/html;base64,AA\"></p>",
    )
    .unwrap();

    assert!(html.contains("style=\"text-align:center\""));
    assert!(!html.contains("javascript"));
    assert!(!html.contains("data:text/html"));
    assert!(!html.contains("color"));
}

#[test]
fn links_open_in_a_new_tab() {
    let html = render_content("<p><a href=\"https://x.test\">x</a></p>").unwrap();
    assert!(html.contains("target=\"_blank\""));
    assert!(html.contains("rel=\"noopener noreferrer nofollow\""));
}

#[test]
fn post_page_has_header_gallery_and_body() {
    let html = render_post(&post(), &MetadataVisibility::new()).unwrap();

    assert!(html.contains("<time datetime=\"2024-03-05T10:00:00Z\">05/03/24</time>"));
    assert!(html.contains("<h1>Sun &amp; Sand</h1>"));

    let beach = html.find("beach.jpg").unwrap();
    let dunes = html.find("dunes.jpg").unwrap();
    assert!(beach < dunes, "gallery follows display order");
    assert!(html.contains("alt=\"Photo 1\""));
    assert!(html.contains("alt=\"Dunes\""));
    assert!(html.contains("<p class=\"caption\">Dunes</p>"));

    assert_eq!(html.matches("<button").count(), 1);
    assert!(html.contains("Show technical details"));
    assert!(!html.contains("<pre"));
    assert!(html.contains("<div class=\"post-content\"><p>Hello <strong>there</strong></p></div>"));
}

#[test]
fn expanded_metadata_shows_pretty_json() {
    let mut visibility = MetadataVisibility::new();
    visibility.toggle(1);

    let html = render_post(&post(), &visibility).unwrap();

    assert!(html.contains("Hide technical details"));
    let start = html.find("<pre class=\"exif\">").unwrap();
    let end = html[start..].find("</pre>").unwrap() + start;
    let details = &html[start..end];
    assert!(details.contains("iso"));
    assert!(details.contains(": 100\n}"));
    assert!(!details.contains('"'), "JSON quotes are escaped");
}

#[test]
fn public_page_hides_drafts() {
    let mut draft = post();
    draft.published = false;

    let err = render_post(&draft, &MetadataVisibility::new()).unwrap_err();
    assert!(matches!(err, RenderError::NotFound { ref id } if id == "p1"));
}

#[test]
fn draft_preview_renders_without_a_date() {
    let mut draft = post();
    draft.published = false;
    draft.published_at = None;

    let html = render_preview(&draft, &MetadataVisibility::new()).unwrap();
    assert!(!html.contains("<time"));
    assert!(html.starts_with("<article class=\"post\"><header><h1>"));
}

#[test]
fn page_text_is_escaped_but_body_markup_is_kept() {
    let mut post = post();
    post.title = "<script>x</script>".into();
    post.images[0].caption = Some("\"quoted\" <b>".into());

    let html = render_post(&post, &MetadataVisibility::new()).unwrap();

    assert!(html.contains("<h1>&lt;script&gt;x&lt;/script&gt;</h1>"));
    assert!(!html.contains("<b>"));
    assert!(!html.contains("\"quoted\""));
    assert!(html.contains("<strong>there</strong>"));
}

#[test]
fn dates_use_two_digit_years() {
    assert_eq!(
        format_post_date(datetime!(2009-12-31 23:59 UTC)).unwrap(),
        "31/12/09"
    );
}
