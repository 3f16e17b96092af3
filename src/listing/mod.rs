//! Listing page controller
//!
//! Holds the posts shown so far and the cursor to the next page. Loading
//! more is a two-step operation (`begin_load` / `finish_load`) so the
//! trigger can be disabled while a fetch is in flight; `load_more` runs
//! both under one exclusive borrow. New pages are merged with
//! `ListingState::append`, always against the current state.

use thiserror::Error;

use crate::cms::{CmsError, PageSource, RawPagination};
use crate::content::{ContentError, Post, PostPagination};

/// Why loading the next page failed; both cases can be retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Could not fetch more posts: {0}")]
    Fetch(String),

    #[error("Received an unreadable page of posts: {0}")]
    Parse(String),
}

impl From<CmsError> for LoadError {
    fn from(err: CmsError) -> Self {
        if err.is_parse() {
            LoadError::Parse(err.to_string())
        } else {
            LoadError::Fetch(err.to_string())
        }
    }
}

impl From<ContentError> for LoadError {
    fn from(err: ContentError) -> Self {
        LoadError::Parse(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Failed(LoadError),
}

/// Accumulated listing state for one page view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingState {
    pub posts: Vec<Post>,
    pub next_page: Option<String>,
    pub status: LoadStatus,
}

impl ListingState {
    pub fn new(initial: PostPagination) -> Self {
        Self {
            posts: initial.results,
            next_page: initial.next_page.filter(|next| !next.is_empty()),
            status: LoadStatus::Idle,
        }
    }

    /// Append a page in received order and move the cursor forward
    pub fn append(mut self, page: PostPagination) -> Self {
        self.posts.extend(page.results);
        self.next_page = page.next_page.filter(|next| !next.is_empty());
        self
    }

    pub fn has_next_page(&self) -> bool {
        self.next_page.is_some()
    }
}

/// Owns the listing state of a single page view
#[derive(Debug, Clone)]
pub struct ListingController {
    state: ListingState,
}

impl ListingController {
    /// Start from the server-provided first page
    pub fn new(initial: PostPagination) -> Self {
        Self {
            state: ListingState::new(initial),
        }
    }

    pub fn state(&self) -> &ListingState {
        &self.state
    }

    pub fn posts(&self) -> &[Post] {
        &self.state.posts
    }

    pub fn next_page(&self) -> Option<&str> {
        self.state.next_page.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.state.status == LoadStatus::Loading
    }

    pub fn last_error(&self) -> Option<&LoadError> {
        match &self.state.status {
            LoadStatus::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the "load more" control should be shown and enabled
    pub fn can_load_more(&self) -> bool {
        self.state.has_next_page() && !self.is_loading()
    }

    /// Mark a fetch as in flight and hand out the cursor to fetch
    ///
    /// Returns `None` when there is nothing to load or a fetch is already
    /// running.
    pub fn begin_load(&mut self) -> Option<String> {
        if !self.can_load_more() {
            return None;
        }
        self.state.status = LoadStatus::Loading;
        self.state.next_page.clone()
    }

    /// Apply the outcome of the fetch started by `begin_load`
    ///
    /// On failure the posts and cursor are left untouched and the error is
    /// kept in the status so the caller can offer a retry.
    pub fn finish_load(
        &mut self,
        result: Result<RawPagination, CmsError>,
    ) -> Result<usize, LoadError> {
        if !self.is_loading() {
            tracing::warn!("Ignoring page result with no load in flight");
            return Ok(0);
        }

        let page = result
            .map_err(LoadError::from)
            .and_then(|raw| PostPagination::from_listing(raw).map_err(LoadError::from));

        match page {
            Ok(page) => {
                let added = page.results.len();
                let state = std::mem::take(&mut self.state);
                self.state = state.append(page);
                self.state.status = LoadStatus::Idle;
                tracing::debug!(
                    "Loaded {} more posts ({} total, more: {})",
                    added,
                    self.state.posts.len(),
                    self.state.has_next_page()
                );
                Ok(added)
            }
            Err(err) => {
                tracing::warn!("{}", err);
                self.state.status = LoadStatus::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Abandon the fetch started by `begin_load`, keeping posts and cursor
    pub fn cancel_load(&mut self) {
        if self.is_loading() {
            tracing::debug!("Load of {:?} cancelled", self.state.next_page);
            self.state.status = LoadStatus::Idle;
        }
    }

    /// Fetch the next page and append it; a no-op returning `Ok(0)` when
    /// there is no next page
    ///
    /// Dropping the returned future mid-fetch cancels the load.
    pub async fn load_more<S: PageSource>(&mut self, source: &S) -> Result<usize, LoadError> {
        let Some(cursor) = self.begin_load() else {
            return Ok(0);
        };
        let guard = InFlight(self);
        let result = source.fetch_page(&cursor).await;
        guard.0.finish_load(result)
    }
}

/// Cancels a load still in flight when dropped
struct InFlight<'a>(&'a mut ListingController);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.cancel_load();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::mock::MockCms;
    use crate::cms::{Predicate, QueryOptions, RawDocument, RawPostData};
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Outcome {
        Page(RawPagination),
        Unavailable,
        Malformed,
        /// Never answers
        Hang,
    }

    /// Serves canned pages keyed by cursor
    struct FakeSource {
        pages: HashMap<String, Outcome>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(pages: Vec<(&str, Outcome)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PageSource for FakeSource {
        fn fetch_page(
            &self,
            url: &str,
        ) -> impl Future<Output = Result<RawPagination, CmsError>> + Send {
            self.calls.lock().unwrap().push(url.to_string());
            let result = match self.pages.get(url) {
                Some(Outcome::Page(page)) => Some(Ok(page.clone())),
                Some(Outcome::Malformed) => Some(Err(CmsError::Parse {
                    url: url.to_string(),
                    source: serde_json::from_str::<RawPagination>("{").unwrap_err(),
                })),
                Some(Outcome::Hang) => None,
                Some(Outcome::Unavailable) | None => Some(Err(CmsError::Status {
                    url: url.to_string(),
                    status: reqwest::StatusCode::BAD_GATEWAY,
                })),
            };
            async move {
                match result {
                    Some(result) => result,
                    None => futures::future::pending().await,
                }
            }
        }
    }

    fn raw(uid: &str) -> RawDocument {
        RawDocument {
            uid: Some(uid.to_string()),
            first_publication_date: Some("2021-03-15T00:00:00Z".to_string()),
            data: RawPostData {
                title: Some(format!("Title {}", uid)),
                subtitle: Some("Sub".to_string()),
                author: Some("Author".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn raw_page(uids: &[&str], next: Option<&str>) -> RawPagination {
        RawPagination {
            page: 1,
            total_pages: 1,
            total_results_size: uids.len() as u32,
            next_page: next.map(str::to_string),
            results: uids.iter().map(|u| raw(u)).collect(),
        }
    }

    fn initial(uids: &[&str], next: Option<&str>) -> PostPagination {
        PostPagination::from_listing(raw_page(uids, next)).unwrap()
    }

    fn uids(controller: &ListingController) -> Vec<String> {
        controller
            .posts()
            .iter()
            .filter_map(|p| p.uid.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_load_more_appends_in_order() {
        let source = FakeSource::new(vec![
            ("p2", Outcome::Page(raw_page(&["c", "d"], Some("p3")))),
            ("p3", Outcome::Page(raw_page(&["e"], None))),
        ]);
        let mut controller = ListingController::new(initial(&["a", "b"], Some("p2")));

        assert_eq!(controller.load_more(&source).await, Ok(2));
        assert_eq!(controller.next_page(), Some("p3"));
        assert_eq!(controller.load_more(&source).await, Ok(1));

        assert_eq!(uids(&controller), vec!["a", "b", "c", "d", "e"]);
        assert!(!controller.can_load_more());
        assert_eq!(source.calls(), vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn test_load_more_without_cursor_is_noop() {
        let source = FakeSource::new(vec![]);
        let mut controller = ListingController::new(initial(&["a"], None));

        assert!(!controller.can_load_more());
        assert_eq!(controller.load_more(&source).await, Ok(0));
        assert_eq!(uids(&controller), vec!["a"]);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_string_cursor_is_no_cursor() {
        let source = FakeSource::new(vec![]);
        let mut controller = ListingController::new(PostPagination {
            results: Vec::new(),
            next_page: Some(String::new()),
        });
        assert!(!controller.can_load_more());
        assert_eq!(controller.load_more(&source).await, Ok(0));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_state_and_allows_retry() {
        let source = FakeSource::new(vec![("p2", Outcome::Unavailable)]);
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));

        let err = controller.load_more(&source).await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch(_)));
        assert_eq!(controller.last_error(), Some(&err));
        assert_eq!(uids(&controller), vec!["a"]);
        assert_eq!(controller.next_page(), Some("p2"));

        // Still retryable
        assert!(controller.can_load_more());
        assert!(controller.load_more(&source).await.is_err());
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_page_is_parse_error() {
        let source = FakeSource::new(vec![("p2", Outcome::Malformed)]);
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));

        let err = controller.load_more(&source).await.unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
        assert_eq!(controller.next_page(), Some("p2"));
    }

    #[tokio::test]
    async fn test_missing_field_is_parse_error() {
        let mut bad = raw_page(&["b"], None);
        bad.results[0].data.title = None;
        let source = FakeSource::new(vec![("p2", Outcome::Page(bad))]);
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));

        let err = controller.load_more(&source).await.unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
        assert_eq!(uids(&controller), vec!["a"]);
    }

    #[test]
    fn test_second_trigger_while_loading_is_ignored() {
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));

        assert_eq!(controller.begin_load().as_deref(), Some("p2"));
        assert!(controller.is_loading());
        assert!(!controller.can_load_more());
        assert_eq!(controller.begin_load(), None);

        let added = controller
            .finish_load(Ok(raw_page(&["b"], None)))
            .unwrap();
        assert_eq!(added, 1);
        assert!(!controller.is_loading());
        assert_eq!(uids(&controller), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_dropped_load_can_be_retried() {
        let source = FakeSource::new(vec![("p2", Outcome::Hang)]);
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), controller.load_more(&source)).await;
        assert!(abandoned.is_err());

        assert!(!controller.is_loading());
        assert!(controller.can_load_more());
        assert_eq!(controller.next_page(), Some("p2"));
        assert_eq!(uids(&controller), vec!["a"]);
    }

    #[test]
    fn test_cancel_load() {
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));
        assert!(controller.begin_load().is_some());
        controller.cancel_load();
        assert!(controller.can_load_more());
        assert_eq!(controller.begin_load().as_deref(), Some("p2"));
    }

    #[test]
    fn test_finish_without_begin_is_ignored() {
        let mut controller = ListingController::new(initial(&["a"], Some("p2")));
        assert_eq!(controller.finish_load(Ok(raw_page(&["b"], None))), Ok(0));
        assert_eq!(uids(&controller), vec!["a"]);
        assert_eq!(controller.next_page(), Some("p2"));
    }

    #[test]
    fn test_append_is_pure() {
        let state = ListingState::new(initial(&["a"], Some("p2")));
        let before = state.clone();
        let after = state.append(initial(&["b"], None));

        assert_eq!(before.posts.len(), 1);
        assert_eq!(after.posts.len(), 2);
        assert!(!after.has_next_page());
    }

    #[tokio::test]
    async fn test_accumulates_every_page_from_cms() {
        let cms = MockCms::with_posts(12).await;
        let client = cms.client();

        let options = QueryOptions::with_page_size(5);
        let first = client
            .query_posts(&[Predicate::document_type("post")], &options)
            .await
            .unwrap();
        let mut controller =
            ListingController::new(PostPagination::from_listing(first).unwrap());

        let mut loads = 0;
        while controller.can_load_more() {
            controller.load_more(&client).await.unwrap();
            loads += 1;
        }

        assert_eq!(loads, 2);
        assert_eq!(controller.posts().len(), 12);
        let unique: HashSet<_> = uids(&controller).into_iter().collect();
        assert_eq!(unique.len(), 12);
        assert_eq!(uids(&controller)[0], "post-1");
        assert_eq!(uids(&controller)[11], "post-12");
    }
}
