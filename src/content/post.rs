//! Post model and the normalizer from raw CMS documents
//!
//! `Post::from_listing` keeps only the fields the listing page shows;
//! `Post::from_document` also keeps the banner and content blocks for the
//! detail page. Values are copied as-is: dates stay in their ISO-8601 form
//! and are formatted at render time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cms::{RawContentBlock, RawDocument, RawPagination, RawRichText, RawSpan};

/// Raised when a CMS document lacks a field the page needs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("Document {uid} is missing required field `{field}`")]
    MissingField { uid: String, field: &'static str },
}

/// A blog post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier, also the detail page slug
    pub uid: Option<String>,

    /// ISO-8601 timestamp, `None` when never published
    pub first_publication_date: Option<String>,

    pub title: String,
    pub subtitle: String,
    pub author: String,

    /// Banner image (detail only)
    pub banner: Option<Banner>,

    /// Content blocks (detail only)
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub url: Option<String>,
}

/// A headed section of the post body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub heading: String,
    pub body: Vec<BodySegment>,
}

/// One rich-text element of a content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySegment {
    pub text: String,
    /// Element type such as `paragraph` or `heading2`
    pub kind: String,
    pub spans: Vec<Span>,
}

impl BodySegment {
    /// A plain paragraph
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: "paragraph".to_string(),
            spans: Vec::new(),
        }
    }
}

/// Inline formatting over `start..end` (UTF-16 code units) of the segment text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: String,
    pub url: Option<String>,
}

/// One page of normalized posts plus the cursor to the next page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostPagination {
    pub results: Vec<Post>,
    pub next_page: Option<String>,
}

impl PostPagination {
    /// Normalize a raw listing page
    pub fn from_listing(raw: RawPagination) -> Result<Self, ContentError> {
        let results = raw
            .results
            .into_iter()
            .map(Post::from_listing)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            results,
            next_page: raw.next_page.filter(|next| !next.is_empty()),
        })
    }
}

impl Post {
    /// Normalize for the listing page: uid, date, title, subtitle, author
    pub fn from_listing(doc: RawDocument) -> Result<Self, ContentError> {
        let uid_label = doc.uid.clone().unwrap_or_else(|| "<no uid>".to_string());
        let data = doc.data;

        Ok(Self {
            uid: doc.uid,
            first_publication_date: doc.first_publication_date,
            title: required(data.title, &uid_label, "title")?,
            subtitle: required(data.subtitle, &uid_label, "subtitle")?,
            author: required(data.author, &uid_label, "author")?,
            banner: None,
            content: Vec::new(),
        })
    }

    /// Normalize for the detail page, keeping banner and content
    pub fn from_document(mut doc: RawDocument) -> Result<Self, ContentError> {
        let banner = doc.data.banner.take().map(|image| Banner { url: image.url });
        let content = doc.data.content.take().unwrap_or_default();

        let mut post = Self::from_listing(doc)?;
        post.banner = banner;
        post.content = content.into_iter().map(convert_block).collect();
        Ok(post)
    }

    /// Slug used in the detail page route
    pub fn slug(&self) -> Option<&str> {
        self.uid.as_deref().filter(|uid| !uid.is_empty())
    }

    pub fn banner_url(&self) -> Option<&str> {
        self.banner.as_ref().and_then(|b| b.url.as_deref())
    }
}

fn required(
    value: Option<String>,
    uid: &str,
    field: &'static str,
) -> Result<String, ContentError> {
    value.ok_or_else(|| ContentError::MissingField {
        uid: uid.to_string(),
        field,
    })
}

fn convert_block(block: RawContentBlock) -> ContentBlock {
    ContentBlock {
        heading: block.heading.unwrap_or_default(),
        body: block.body.into_iter().map(convert_segment).collect(),
    }
}

fn convert_segment(segment: RawRichText) -> BodySegment {
    BodySegment {
        text: segment.text,
        kind: if segment.kind.is_empty() {
            "paragraph".to_string()
        } else {
            segment.kind
        },
        spans: segment.spans.into_iter().map(convert_span).collect(),
    }
}

fn convert_span(span: RawSpan) -> Span {
    Span {
        start: span.start,
        end: span.end,
        kind: span.kind,
        url: span.data.and_then(|d| d.url),
    }
}
