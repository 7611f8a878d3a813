//! Command-line front end for the lightbox photo journal editor.
//!
//! The editing model lives in `lightbox-core`; this crate adds settings
//! loading and the `lightbox` binary.

pub mod config;
