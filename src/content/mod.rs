//! Content module - normalized posts and rich-text rendering

mod post;
pub mod rich_text;

pub use post::{Banner, BodySegment, ContentBlock, ContentError, Post, PostPagination, Span};
