use askama::Template;
use serde::Serialize;

use crate::post::PostRecord;
use crate::render::{RenderError, format_post_date};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedCover {
    pub url: String,
    pub alt: String,
}

/// One card on the public blog list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub number: String,
    pub id: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub cover: Option<FeedCover>,
    pub date: String,
}

/// Published posts, newest first, numbered from `01`.
pub fn build_feed(posts: &[PostRecord]) -> Result<Vec<FeedEntry>, RenderError> {
    let mut published: Vec<&PostRecord> = posts
        .iter()
        .filter(|post| post.published && post.published_at.is_some())
        .collect();
    published.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    published
        .into_iter()
        .enumerate()
        .map(|(index, post)| {
            let date = match post.published_at {
                Some(at) => format_post_date(at)?,
                None => String::new(),
            };
            Ok(FeedEntry {
                number: format!("{:02}", index + 1),
                id: post.id.clone(),
                title: post.title.clone(),
                excerpt: post
                    .excerpt
                    .as_ref()
                    .filter(|excerpt| !excerpt.trim().is_empty())
                    .cloned(),
                cover: post.cover_image().map(|image| FeedCover {
                    url: image.url.clone(),
                    alt: post.title.clone(),
                }),
                date,
            })
        })
        .collect()
}

#[derive(Template)]
#[template(path = "feed.html")]
struct FeedTemplate<'a> {
    entries: &'a [FeedEntry],
}

pub fn render_feed(entries: &[FeedEntry]) -> Result<String, RenderError> {
    Ok(FeedTemplate { entries }.render()?)
}
