use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use ammonia::Builder as AmmoniaBuilder;
use askama::Template;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::warn;

use crate::post::{PostImage, PostRecord};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markup rewrite failed: {message}")]
    Rewrite { message: String },
    #[error("date formatting failed: {message}")]
    Date { message: String },
    #[error("post not found: {id}")]
    NotFound { id: String },
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
}

const STYLE_PROPERTIES: [&str; 8] = [
    "width",
    "max-width",
    "height",
    "float",
    "margin",
    "display",
    "border-radius",
    "text-align",
];

/// Which gallery images currently show their technical details. Pure view
/// state; nothing here is saved with the post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataVisibility {
    visible: BTreeSet<usize>,
}

impl MetadataVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, index: usize) -> bool {
        if !self.visible.remove(&index) {
            self.visible.insert(index);
            return true;
        }
        false
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.contains(&index)
    }
}

/// Turns stored post HTML into display markup. Same input, same output.
pub fn render_content(html: &str) -> Result<String, RenderError> {
    let cleaned = content_sanitizer().clean(html).to_string();
    decorate(&cleaned)
}

fn content_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "blockquote",
        "br",
        "b",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "i",
        "img",
        "li",
        "ol",
        "p",
        "strong",
        "ul",
    ]);
    builder.tags(tags);

    builder.add_tag_attributes("img", &["src", "alt", "title", "style"]);
    for tag in ["p", "h1", "h2", "h3", "h4", "h5", "h6"] {
        builder.add_tag_attributes(tag, &["style"]);
    }
    builder.add_url_schemes(["http", "https", "mailto", "data"].iter().copied());
    builder.link_rel(Some("noopener noreferrer nofollow"));

    builder.attribute_filter(|element, attribute, value| {
        let kept = filter_attribute(element, attribute, value);
        if kept.is_none() {
            warn!(element, attribute, "sanitizer dropped attribute");
        }
        kept
    });

    builder
}

fn filter_attribute<'u>(element: &str, attribute: &str, value: &'u str) -> Option<Cow<'u, str>> {
    let lower = value.trim_start().to_ascii_lowercase();
    match (element, attribute) {
        (_, "style") => sanitize_style_attribute(value).map(Cow::Owned),
        ("img", "src") if lower.starts_with("data:") && !lower.starts_with("data:image/") => None,
        ("a", "href") if lower.starts_with("data:") => None,
        _ => Some(Cow::Borrowed(value)),
    }
}

/// Keeps only layout declarations with harmless values.
fn sanitize_style_attribute(value: &str) -> Option<String> {
    let kept: Vec<String> = value
        .split(';')
        .filter_map(|declaration| {
            let (property, val) = declaration.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let val = val.trim();
            (STYLE_PROPERTIES.contains(&property.as_str()) && is_safe_style_value(val))
                .then(|| format!("{property}:{val}"))
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join(";"))
    }
}

fn is_safe_style_value(value: &str) -> bool {
    const FORBIDDEN: [&str; 6] = ["url(", "expression(", "javascript:", "@import", "\\", "<"];

    let lower = value.to_ascii_lowercase();
    !value.is_empty() && !FORBIDDEN.iter().any(|needle| lower.contains(needle))
}

fn decorate(html: &str) -> Result<String, RenderError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img", |el| {
                    let class = match el.get_attribute("class") {
                        Some(existing) if !existing.trim().is_empty() => {
                            format!("{existing} editor-image")
                        }
                        _ => "editor-image".to_string(),
                    };
                    el.set_attribute("class", &class)?;
                    el.set_attribute("loading", "lazy")?;
                    Ok(())
                }),
                element!("a[href]", |el| {
                    el.set_attribute("target", "_blank")?;
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Rewrite {
        message: err.to_string(),
    })
}

/// `dd/MM/yy`, as shown on the post page and the feed.
pub fn format_post_date(date: OffsetDateTime) -> Result<String, RenderError> {
    date.format(format_description!("[day]/[month]/[year repr:last_two]"))
        .map_err(|err| RenderError::Date {
            message: err.to_string(),
        })
}

struct PostDate {
    stamp: String,
    display: String,
}

struct ExifView {
    label: &'static str,
    details: Option<String>,
}

struct GalleryImageView<'a> {
    index: usize,
    url: &'a str,
    alt: String,
    caption: Option<&'a str>,
    exif: Option<ExifView>,
}

#[derive(Template)]
#[template(path = "post.html")]
struct PostTemplate<'a> {
    title: &'a str,
    date: Option<PostDate>,
    gallery: Vec<GalleryImageView<'a>>,
    content: String,
}

/// The public post page. Drafts are not served.
pub fn render_post(
    post: &PostRecord,
    visibility: &MetadataVisibility,
) -> Result<String, RenderError> {
    if !post.published {
        return Err(RenderError::NotFound {
            id: post.id.clone(),
        });
    }
    render_preview(post, visibility)
}

/// Full post page: header, gallery and the rendered body. Drafts render
/// without a date.
pub fn render_preview(
    post: &PostRecord,
    visibility: &MetadataVisibility,
) -> Result<String, RenderError> {
    let date = post.published_at.map(post_date).transpose()?;
    let gallery = post
        .sorted_images()
        .into_iter()
        .enumerate()
        .map(|(index, image)| gallery_image(image, index, visibility.is_visible(index)))
        .collect();

    let template = PostTemplate {
        title: &post.title,
        date,
        gallery,
        content: render_content(&post.content)?,
    };
    Ok(template.render()?)
}

fn post_date(published_at: OffsetDateTime) -> Result<PostDate, RenderError> {
    let stamp = published_at
        .format(&Rfc3339)
        .map_err(|err| RenderError::Date {
            message: err.to_string(),
        })?;
    Ok(PostDate {
        stamp,
        display: format_post_date(published_at)?,
    })
}

fn gallery_image(image: &PostImage, index: usize, show_metadata: bool) -> GalleryImageView<'_> {
    let caption = image.caption.as_deref().filter(|caption| !caption.is_empty());
    let alt = match caption {
        Some(caption) => caption.to_string(),
        None => format!("Photo {}", index + 1),
    };
    let exif = image.exif_data.as_ref().map(|exif| ExifView {
        label: if show_metadata {
            "Hide technical details"
        } else {
            "Show technical details"
        },
        details: show_metadata.then(|| {
            serde_json::to_string_pretty(exif).unwrap_or_else(|_| exif.to_string())
        }),
    });

    GalleryImageView {
        index,
        url: &image.url,
        alt,
        caption,
        exif,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_filter_keeps_layout_only() {
        assert_eq!(
            sanitize_style_attribute("width:50%; color:red; float:left").as_deref(),
            Some("width:50%;float:left")
        );
        assert_eq!(sanitize_style_attribute("background:url(x)"), None);
        assert_eq!(sanitize_style_attribute("width:expression(alert(1))"), None);
    }

    #[test]
    fn visibility_toggles_per_index() {
        let mut visibility = MetadataVisibility::new();
        assert!(visibility.toggle(2));
        assert!(visibility.is_visible(2));
        assert!(!visibility.is_visible(0));
        assert!(!visibility.toggle(2));
        assert!(!visibility.is_visible(2));
    }

    #[test]
    fn non_image_data_urls_are_dropped() {
        assert!(filter_attribute("img", "src", "data:text/html;base64,AA").is_none());
        assert!(filter_attribute("img", "src", "data:image/png;base64,AA").is_some());
        assert!(filter_attribute("a", "href", "data:image/png;base64,AA").is_none());
    }
}
