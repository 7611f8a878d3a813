mod admin;
mod commands;
mod core;
mod editor;
mod feed;
mod history;
pub mod html;
mod image;
mod normalize;
mod ops;
mod post;
mod render;
mod session;

pub use crate::admin::*;
pub use crate::commands::*;
pub use crate::core::*;
pub use crate::editor::*;
pub use crate::feed::*;
pub use crate::history::*;
pub use crate::image::*;
pub use crate::normalize::{
    NormalizePass, is_normalized, normalize_document, normalize_ops, normalize_selection, passes,
};
pub use crate::ops::*;
pub use crate::post::*;
pub use crate::render::*;
pub use crate::session::*;
