//! Raw document shapes returned by the CMS
//!
//! Every field the CMS may leave out or send as `null` is optional here.
//! Required-field checks happen in the post normalizer.

use serde::{Deserialize, Serialize};

/// API root response, used to discover the master ref
#[derive(Debug, Clone, Deserialize)]
pub struct ApiInfo {
    #[serde(default)]
    pub refs: Vec<ApiRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRef {
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "isMasterRef", default)]
    pub is_master_ref: bool,
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results_size: u32,
    pub next_page: Option<String>,
    pub results: Vec<RawDocument>,
}

/// A document as stored in the CMS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: Option<String>,
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub first_publication_date: Option<String>,
    pub last_publication_date: Option<String>,
    pub lang: Option<String>,
    #[serde(default)]
    pub data: RawPostData,
}

/// Custom fields of a `post` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPostData {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub banner: Option<RawImage>,
    pub content: Option<Vec<RawContentBlock>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawImage {
    pub url: Option<String>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContentBlock {
    pub heading: Option<String>,
    #[serde(default)]
    pub body: Vec<RawRichText>,
}

/// One rich-text element (paragraph, heading, list item...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRichText {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub spans: Vec<RawSpan>,
}

/// Inline formatting over a UTF-16 range of the element text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Option<RawSpanData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSpanData {
    pub url: Option<String>,
    pub target: Option<String>,
}
