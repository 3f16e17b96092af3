//! In-process stand-in for the CMS REST API, used by tests

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::ContentClient;
use crate::config::CmsConfig;

/// How long `/slow` waits before answering
pub(crate) const SLOW_RESPONSE: Duration = Duration::from_secs(3);

struct MockState {
    base: String,
    posts: Vec<Value>,
    api_hits: AtomicUsize,
    flaky_hits: AtomicUsize,
}

/// A running mock CMS bound to a local port
pub(crate) struct MockCms {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockCms {
    /// Serve `count` posts named `post-1`..`post-<count>`, in that order
    pub(crate) async fn with_posts(count: usize) -> Self {
        let posts = (1..=count).map(sample_post).collect();
        Self::serve(posts).await
    }

    pub(crate) async fn serve(posts: Vec<Value>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            base: format!("http://{}", addr),
            posts,
            api_hits: AtomicUsize::new(0),
            flaky_hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/v2", get(api_root))
            .route("/api/v2/documents/search", get(search))
            .route("/broken", get(|| async { "{\"results\": [" }))
            .route(
                "/unavailable",
                get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
            )
            .route("/flaky", get(flaky))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(SLOW_RESPONSE).await;
                    Json(empty_page())
                }),
            )
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Requests made to the API root (master ref lookups)
    pub(crate) fn api_hits(&self) -> usize {
        self.state.api_hits.load(Ordering::SeqCst)
    }

    /// Requests made to `/flaky`
    pub(crate) fn flaky_hits(&self) -> usize {
        self.state.flaky_hits.load(Ordering::SeqCst)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub(crate) fn config(&self) -> CmsConfig {
        CmsConfig {
            endpoint: self.url("/api/v2"),
            timeout_secs: 5,
            max_retries: 0,
            ..Default::default()
        }
    }

    pub(crate) fn client(&self) -> ContentClient {
        ContentClient::new(&self.config()).unwrap()
    }
}

/// A full `post` document in CMS shape
pub(crate) fn sample_post(n: usize) -> Value {
    json!({
        "id": format!("id{}", n),
        "uid": format!("post-{}", n),
        "type": "post",
        "first_publication_date": format!("2021-03-{:02}T19:25:28+0000", (n % 28) + 1),
        "data": {
            "title": format!("Post {}", n),
            "subtitle": format!("Subtitle {}", n),
            "author": "Joseph Oliveira",
            "banner": {"url": format!("https://images.example/{}.png", n)},
            "content": [{
                "heading": "Introduction",
                "body": [{"type": "paragraph", "text": "Lorem ipsum dolor sit amet", "spans": []}]
            }]
        }
    })
}

fn empty_page() -> Value {
    json!({"page": 1, "total_pages": 1, "next_page": null, "results": []})
}

/// Unavailable on the first request, fine afterwards
async fn flaky(State(state): State<Arc<MockState>>) -> Response {
    if state.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    } else {
        Json(empty_page()).into_response()
    }
}

async fn api_root(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.api_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "refs": [{"id": "master", "ref": "master-ref", "label": "Master", "isMasterRef": true}]
    }))
}

async fn search(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("ref").map(String::as_str) != Some("master-ref") {
        return (StatusCode::BAD_REQUEST, "missing ref").into_response();
    }

    let q = params.get("q").cloned().unwrap_or_default();
    let matching: Vec<&Value> = state
        .posts
        .iter()
        .filter(|post| match uid_filter(&q) {
            Some(uid) => post["uid"] == uid,
            None => true,
        })
        .collect();

    let page_size: usize = params
        .get("pageSize")
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);
    let page: usize = params
        .get("page")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let total_pages = matching.len().div_ceil(page_size).max(1);
    let results: Vec<Value> = matching
        .iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|post| restrict_fields(post, params.get("fetch")))
        .collect();

    let next_page = if page < total_pages {
        let mut next = Url::parse(&format!("{}/api/v2/documents/search", state.base)).unwrap();
        {
            let mut query = next.query_pairs_mut();
            for (key, value) in &params {
                if key != "page" {
                    query.append_pair(key, value);
                }
            }
            query.append_pair("page", &(page + 1).to_string());
        }
        Value::String(next.to_string())
    } else {
        Value::Null
    };

    Json(json!({
        "page": page,
        "total_pages": total_pages,
        "total_results_size": matching.len(),
        "next_page": next_page,
        "results": results,
    }))
    .into_response()
}

/// Extract the uid from an `at(my.<type>.uid, "...")` predicate
fn uid_filter(q: &str) -> Option<String> {
    let start = q.find(".uid, \"")? + ".uid, \"".len();
    let end = q[start..].find('"')? + start;
    Some(q[start..end].to_string())
}

fn restrict_fields(post: &Value, fetch: Option<&String>) -> Value {
    let Some(fetch) = fetch else {
        return post.clone();
    };
    let mut post = post.clone();
    let fields: Vec<&str> = fetch
        .split(',')
        .filter_map(|f| f.strip_prefix("post."))
        .collect();
    if let Some(data) = post["data"].as_object_mut() {
        data.retain(|key, _| fields.contains(&key.as_str()));
    }
    post
}
