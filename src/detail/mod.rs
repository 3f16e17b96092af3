//! Detail page controller
//!
//! A detail page is either still being generated (`Fallback`) or ready to
//! render. Read time and rich-text markup are only computed for ready posts.

use serde::Serialize;

use crate::content::{rich_text, ContentBlock, Post};
use crate::helpers::{date_xml, format_publication_date};

/// Assumed reading speed, in words per minute
pub const WORDS_PER_MINUTE: u32 = 200;

/// Estimated minutes to read the content at `WORDS_PER_MINUTE`
pub fn read_time(content: &[ContentBlock]) -> u32 {
    read_time_at(content, WORDS_PER_MINUTE)
}

/// Estimated minutes to read the content, rounded up
pub fn read_time_at(content: &[ContentBlock], words_per_minute: u32) -> u32 {
    let words = word_count(content);
    let wpm = words_per_minute.max(1) as usize;
    words.div_ceil(wpm) as u32
}

/// Whitespace-separated tokens across every body segment
pub fn word_count(content: &[ContentBlock]) -> usize {
    content
        .iter()
        .flat_map(|block| block.body.iter())
        .map(|segment| segment.text.split_whitespace().count())
        .sum()
}

/// What the detail route should show
#[derive(Debug, Clone)]
pub enum DetailView {
    /// The post is still being generated on first request
    Fallback,
    Ready(Post),
}

/// Template-ready detail data
#[derive(Debug, Clone, Serialize)]
pub struct PostDetailData {
    pub uid: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub date: String,
    pub date_xml: Option<String>,
    pub banner_url: Option<String>,
    pub read_time: u32,
    pub sections: Vec<SectionData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionData {
    pub heading: String,
    pub html: String,
}

impl DetailView {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DetailView::Fallback)
    }

    /// Build render data; `None` while in fallback
    pub fn render_data(&self, words_per_minute: u32) -> Option<PostDetailData> {
        match self {
            DetailView::Fallback => None,
            DetailView::Ready(post) => Some(PostDetailData::new(post, words_per_minute)),
        }
    }
}

impl PostDetailData {
    pub fn new(post: &Post, words_per_minute: u32) -> Self {
        Self {
            uid: post.uid.clone().unwrap_or_default(),
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            author: post.author.clone(),
            date: format_publication_date(post.first_publication_date.as_deref()),
            date_xml: date_xml(post.first_publication_date.as_deref()),
            banner_url: post.banner_url().map(str::to_string),
            read_time: read_time_at(&post.content, words_per_minute),
            sections: post
                .content
                .iter()
                .map(|block| SectionData {
                    heading: block.heading.clone(),
                    html: rich_text::as_html(&block.body),
                })
                .collect(),
        }
    }
}
