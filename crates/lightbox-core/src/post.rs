use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::{Document, Node};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("post not found: {0}")]
    NotFound(String),
    #[error("invalid post record: {0}")]
    Json(#[from] serde_json::Error),
}

/// One gallery picture attached to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif_data: Option<Value>,
    #[serde(default)]
    pub display_order: i32,
}

impl PostImage {
    pub fn new(url: impl Into<String>, display_order: i32) -> Self {
        Self {
            url: url.into(),
            caption: None,
            exif_data: None,
            display_order,
        }
    }
}

/// A post as the backend stores it. `content` is the serialized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub images: Vec<PostImage>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl PostRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            excerpt: None,
            content: String::new(),
            published: false,
            published_at: None,
            images: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn from_json(input: &str) -> Result<Self, PostError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String, PostError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Title and body must both be present before a save.
    pub fn validate(&self) -> Result<(), PostError> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if content_is_blank(&self.content) {
            missing.push("content");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PostError::MissingFields(missing))
        }
    }

    /// Saves as draft or published. `published_at` is stamped only when a
    /// draft goes live; saving a published post as draft keeps the stamp.
    /// The first save also sets `created_at`.
    pub fn save(&mut self, publish: bool, now: OffsetDateTime) -> Result<(), PostError> {
        self.validate()?;
        if let Some(excerpt) = &self.excerpt {
            if excerpt.trim().is_empty() {
                self.excerpt = None;
            }
        }
        if publish && !self.published {
            self.published_at = Some(now);
        }
        self.published = publish;
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
        tracing::debug!(post = %self.id, publish, "post saved");
        Ok(())
    }

    /// The admin list's publish switch.
    pub fn toggle_publish(&mut self, now: OffsetDateTime) {
        self.published = !self.published;
        self.published_at = self.published.then_some(now);
        self.updated_at = Some(now);
        tracing::debug!(post = %self.id, published = self.published, "publish toggled");
    }

    /// Gallery images in display order.
    pub fn sorted_images(&self) -> Vec<&PostImage> {
        let mut images: Vec<&PostImage> = self.images.iter().collect();
        images.sort_by_key(|image| image.display_order);
        images
    }

    pub fn cover_image(&self) -> Option<&PostImage> {
        self.images.iter().min_by_key(|image| image.display_order)
    }
}

/// An empty string or a document with no text and no images.
fn content_is_blank(content: &str) -> bool {
    if content.trim().is_empty() {
        return true;
    }
    match crate::html::parse(content) {
        Ok(doc) => document_is_blank(&doc),
        Err(_) => false,
    }
}

pub(crate) fn document_is_blank(doc: &Document) -> bool {
    fn blank(nodes: &[Node]) -> bool {
        nodes.iter().all(|node| match node {
            Node::Text(t) => t.text.trim().is_empty(),
            Node::Image(_) => false,
            Node::Element(el) => blank(&el.children),
        })
    }
    blank(&doc.children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_paragraph_counts_as_missing_content() {
        assert!(content_is_blank("<p></p>"));
        assert!(content_is_blank("  "));
        assert!(!content_is_blank("<p><img src=\"a.png\"></p>"));
        assert!(!content_is_blank("<p>x</p>"));
    }

    #[test]
    fn missing_fields_lists_both() {
        let post = PostRecord::new("1", " ");
        let err = post.validate().unwrap_err();
        assert_eq!(err.to_string(), "missing fields: title, content");
    }
}
