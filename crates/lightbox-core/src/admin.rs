use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::post::{PostError, PostRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Published,
    Draft,
}

impl PostStatus {
    pub fn of(post: &PostRecord) -> Self {
        if post.published {
            PostStatus::Published
        } else {
            PostStatus::Draft
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Published => "published",
            PostStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One line of the admin post list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminRow {
    pub id: String,
    pub title: String,
    pub status: PostStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Every post, drafts included, newest first by creation date. Posts that
/// were never saved have no creation date and come last.
pub fn admin_listing(posts: &[PostRecord]) -> Vec<AdminRow> {
    let mut rows: Vec<AdminRow> = posts
        .iter()
        .map(|post| AdminRow {
            id: post.id.clone(),
            title: post.title.clone(),
            status: PostStatus::of(post),
            created_at: post.created_at,
            updated_at: post.updated_at,
        })
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

/// Removes the post with `id`, returning the position it held.
pub fn delete_post(
    posts: &mut Vec<PostRecord>,
    id: &str,
) -> Result<(usize, PostRecord), PostError> {
    let index = posts
        .iter()
        .position(|post| post.id == id)
        .ok_or_else(|| PostError::NotFound(id.to_string()))?;
    let removed = posts.remove(index);
    info!(post = %removed.id, "post deleted");
    Ok((index, removed))
}
