//! Content client for the headless CMS
//!
//! Wraps the CMS REST API: predicate queries, lookups by uid, and
//! following `next_page` cursors. Every request goes through a bounded
//! timeout and a transient-error retry policy.

mod document;
mod error;
#[cfg(test)]
pub(crate) mod mock;
mod predicate;

pub use document::{
    ApiInfo, ApiRef, RawContentBlock, RawDocument, RawImage, RawPagination, RawPostData,
    RawRichText, RawSpan, RawSpanData,
};
pub use error::CmsError;
pub use predicate::{query_string, Predicate};

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

use crate::config::CmsConfig;

/// Largest page size the search endpoint accepts
const MAX_PAGE_SIZE: usize = 100;

/// How long a looked-up master ref is reused
const MASTER_REF_TTL: Duration = Duration::from_secs(30);

/// Options for a predicate query
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Restrict returned fields, e.g. `post.title`
    pub fetch: Vec<String>,
    pub page_size: Option<usize>,
    pub page: Option<u32>,
    /// Ordering clause, e.g. `[document.first_publication_date desc]`
    pub orderings: Option<String>,
}

impl QueryOptions {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            ..Default::default()
        }
    }
}

/// Anything that can resolve a `next_page` cursor into the next page
pub trait PageSource {
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<RawPagination, CmsError>> + Send;
}

#[derive(Debug, Clone)]
struct CachedRef {
    reference: String,
    fetched_at: Instant,
}

/// HTTP client for the CMS REST API
///
/// Clones share the cached master ref.
#[derive(Clone)]
pub struct ContentClient {
    http: ClientWithMiddleware,
    endpoint: Url,
    access_token: Option<String>,
    cached_ref: Arc<Mutex<Option<CachedRef>>>,
}

impl ContentClient {
    /// Build a client from configuration
    pub fn new(config: &CmsConfig) -> Result<Self, CmsError> {
        let endpoint = parse_url(config.endpoint.trim_end_matches('/'))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("spacetraveling/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CmsError::Client)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let http = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            http,
            endpoint,
            access_token: config.access_token.clone(),
            cached_ref: Arc::new(Mutex::new(None)),
        })
    }

    /// Run a predicate query against the current master ref
    pub async fn query_posts(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<RawPagination, CmsError> {
        let reference = self.master_ref().await?;
        let url = self.search_url(&reference, predicates, options)?;
        tracing::debug!("Querying {}", url);
        self.get_json(url).await
    }

    /// Collect the uid of every matching document, following all pages
    pub async fn query_all_post_uids(
        &self,
        predicates: &[Predicate],
    ) -> Result<Vec<String>, CmsError> {
        let options = QueryOptions::with_page_size(MAX_PAGE_SIZE);
        let mut page = self.query_posts(predicates, &options).await?;
        let mut uids = Vec::new();

        loop {
            for doc in page.results {
                match doc.uid {
                    Some(uid) => uids.push(uid),
                    None => tracing::debug!("Skipping document {:?} without uid", doc.id),
                }
            }

            match page.next_page.filter(|next| !next.is_empty()) {
                Some(next) => page = self.fetch_page(&next).await?,
                None => break,
            }
        }

        Ok(uids)
    }

    /// Fetch a single document by type and uid; `None` when it does not exist
    pub async fn get_by_uid(
        &self,
        doc_type: &str,
        uid: &str,
    ) -> Result<Option<RawDocument>, CmsError> {
        let predicates = [
            Predicate::document_type(doc_type),
            Predicate::uid(doc_type, uid),
        ];
        let page = self
            .query_posts(&predicates, &QueryOptions::with_page_size(1))
            .await?;
        Ok(page.results.into_iter().next())
    }

    /// Current master ref, looked up at most once per `MASTER_REF_TTL`
    async fn master_ref(&self) -> Result<String, CmsError> {
        let mut cached = self.cached_ref.lock().await;
        if let Some(hit) = cached
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < MASTER_REF_TTL)
        {
            return Ok(hit.reference.clone());
        }

        let reference = self.fetch_master_ref().await?;
        *cached = Some(CachedRef {
            reference: reference.clone(),
            fetched_at: Instant::now(),
        });
        Ok(reference)
    }

    async fn fetch_master_ref(&self) -> Result<String, CmsError> {
        let mut url = self.endpoint.clone();
        if let Some(token) = &self.access_token {
            url.query_pairs_mut().append_pair("access_token", token);
        }

        let api: ApiInfo = self.get_json(url).await?;
        api.refs
            .into_iter()
            .find(|r| r.is_master_ref)
            .map(|r| r.reference)
            .ok_or_else(|| CmsError::NoMasterRef(self.endpoint.to_string()))
    }

    fn search_url(
        &self,
        reference: &str,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<Url, CmsError> {
        let mut url = parse_url(&format!(
            "{}/documents/search",
            self.endpoint.as_str().trim_end_matches('/')
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ref", reference);
            if !predicates.is_empty() {
                query.append_pair("q", &query_string(predicates));
            }
            if !options.fetch.is_empty() {
                query.append_pair("fetch", &options.fetch.join(","));
            }
            if let Some(size) = options.page_size {
                query.append_pair("pageSize", &size.min(MAX_PAGE_SIZE).to_string());
            }
            if let Some(page) = options.page {
                query.append_pair("page", &page.to_string());
            }
            if let Some(orderings) = &options.orderings {
                query.append_pair("orderings", orderings);
            }
            if let Some(token) = &self.access_token {
                query.append_pair("access_token", token);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CmsError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| CmsError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(|source| CmsError::Body {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_slice(&bytes).map_err(|source| CmsError::Parse {
            url: url.to_string(),
            source,
        })
    }
}

impl PageSource for ContentClient {
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<RawPagination, CmsError>> + Send {
        async move {
            let url = parse_url(url)?;
            tracing::debug!("Fetching page {}", url);
            self.get_json(url).await
        }
    }
}

fn parse_url(url: &str) -> Result<Url, CmsError> {
    Url::parse(url).map_err(|source| CmsError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::mock::{MockCms, SLOW_RESPONSE};
    use super::*;
    use crate::listing::LoadError;

    #[tokio::test]
    async fn test_query_posts_first_page() {
        let cms = MockCms::with_posts(7).await;
        let client = cms.client();

        let options = QueryOptions {
            fetch: vec!["post.title".to_string()],
            page_size: Some(5),
            ..Default::default()
        };
        let page = client
            .query_posts(&[Predicate::document_type("post")], &options)
            .await
            .unwrap();

        assert_eq!(page.results.len(), 5);
        assert_eq!(page.results[0].uid.as_deref(), Some("post-1"));
        assert!(page.next_page.is_some());
    }

    #[tokio::test]
    async fn test_fetch_page_follows_cursor() {
        let cms = MockCms::with_posts(7).await;
        let client = cms.client();

        let first = client
            .query_posts(
                &[Predicate::document_type("post")],
                &QueryOptions::with_page_size(5),
            )
            .await
            .unwrap();
        let second = client
            .fetch_page(first.next_page.as_deref().unwrap())
            .await
            .unwrap();

        let uids: Vec<_> = second.results.iter().filter_map(|d| d.uid.clone()).collect();
        assert_eq!(uids, vec!["post-6", "post-7"]);
        assert!(second.next_page.is_none());
    }

    #[tokio::test]
    async fn test_query_all_post_uids() {
        let cms = MockCms::with_posts(3).await;
        let uids = cms
            .client()
            .query_all_post_uids(&[Predicate::document_type("post")])
            .await
            .unwrap();
        assert_eq!(uids, vec!["post-1", "post-2", "post-3"]);
    }

    #[tokio::test]
    async fn test_get_by_uid() {
        let cms = MockCms::with_posts(3).await;
        let client = cms.client();

        let doc = client.get_by_uid("post", "post-2").await.unwrap().unwrap();
        assert_eq!(doc.uid.as_deref(), Some("post-2"));
        assert!(doc.data.content.is_some());

        assert!(client.get_by_uid("post", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let cms = MockCms::with_posts(1).await;
        let err = cms
            .client()
            .fetch_page(&cms.url("/broken"))
            .await
            .unwrap_err();
        assert!(err.is_parse(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let cms = MockCms::with_posts(1).await;
        let err = cms
            .client()
            .fetch_page(&cms.url("/unavailable"))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::Status { .. }));
        assert!(!err.is_parse());
    }

    #[tokio::test]
    async fn test_invalid_cursor() {
        let cms = MockCms::with_posts(1).await;
        let err = cms.client().fetch_page("not a url").await.unwrap_err();
        assert!(matches!(err, CmsError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_master_ref_is_reused() {
        let cms = MockCms::with_posts(3).await;
        let client = cms.client();

        client
            .query_posts(&[Predicate::document_type("post")], &QueryOptions::default())
            .await
            .unwrap();
        for uid in ["post-1", "post-2", "post-3"] {
            client.get_by_uid("post", uid).await.unwrap().unwrap();
        }
        // Clones share the lookup too
        client.clone().query_all_post_uids(&[]).await.unwrap();

        assert_eq!(cms.api_hits(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let cms = MockCms::with_posts(1).await;
        let config = CmsConfig {
            max_retries: 1,
            ..cms.config()
        };
        let client = ContentClient::new(&config).unwrap();

        let page = client.fetch_page(&cms.url("/flaky")).await.unwrap();
        assert!(page.results.is_empty());
        assert_eq!(cms.flaky_hits(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_without_retries() {
        let cms = MockCms::with_posts(1).await;
        let err = cms
            .client()
            .fetch_page(&cms.url("/flaky"))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::Status { .. }));
        assert_eq!(cms.flaky_hits(), 1);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let cms = MockCms::with_posts(1).await;
        let config = CmsConfig {
            timeout_secs: 1,
            ..cms.config()
        };
        assert!(Duration::from_secs(config.timeout_secs) < SLOW_RESPONSE);
        let client = ContentClient::new(&config).unwrap();

        let started = Instant::now();
        let err = client.fetch_page(&cms.url("/slow")).await.unwrap_err();
        assert!(started.elapsed() < SLOW_RESPONSE);
        assert!(matches!(err, CmsError::Request { .. }), "unexpected error: {}", err);
        assert!(matches!(LoadError::from(err), LoadError::Fetch(_)));
    }

    #[test]
    fn test_search_url() {
        let config = CmsConfig {
            endpoint: "https://repo.cdn.prismic.io/api/v2/".to_string(),
            access_token: Some("tok".to_string()),
            ..Default::default()
        };
        let client = ContentClient::new(&config).unwrap();
        let options = QueryOptions {
            fetch: vec!["post.title".to_string(), "post.author".to_string()],
            page_size: Some(500),
            ..Default::default()
        };
        let url = client
            .search_url("master", &[Predicate::document_type("post")], &options)
            .unwrap();

        assert_eq!(url.path(), "/api/v2/documents/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("ref".to_string(), "master".to_string())));
        assert!(pairs.contains(&(
            "q".to_string(),
            r#"[[at(document.type, "post")]]"#.to_string()
        )));
        assert!(pairs.contains(&("fetch".to_string(), "post.title,post.author".to_string())));
        assert!(pairs.contains(&("pageSize".to_string(), "100".to_string())));
        assert!(pairs.contains(&("access_token".to_string(), "tok".to_string())));
    }
}
