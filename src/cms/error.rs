//! Content client errors

use thiserror::Error;

/// Errors raised while talking to the CMS
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("Request to {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("API at {0} did not advertise a master ref")]
    NoMasterRef(String),
}

impl CmsError {
    /// Whether the payload arrived but could not be understood
    pub fn is_parse(&self) -> bool {
        matches!(self, CmsError::Parse { .. } | CmsError::NoMasterRef(_))
    }
}
