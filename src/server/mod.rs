//! Server with incremental static regeneration
//!
//! Serves the generated site. A page past its revalidation window is
//! served as-is while a background task regenerates it; a detail page that
//! was never generated answers with the loading placeholder until its
//! first generation finishes, or 404 if the post does not exist. Listing
//! pages missing from disk are rendered by replaying "load more" steps.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cache::{Freshness, RevalidationCache};
use crate::detail::DetailView;
use crate::generator::{
    home_route, is_safe_segment, listing_route, output_path_for, post_route_key, Generator,
    HomeProps, RenderedPage,
};
use crate::Spacetraveling;

/// Upper bound on "load more" steps replayed for one request
const MAX_LOADS: usize = 50;

/// How long an unknown slug keeps answering 404 before the CMS is asked again
const NOT_FOUND_TTL_SECS: i64 = 60;

/// Shared server state
pub struct ServerState {
    generator: Generator,
    cache: Mutex<RevalidationCache>,
    home_props: RwLock<Option<HomeProps>>,
    /// Routes with a regeneration in progress
    in_flight: Mutex<HashSet<String>>,
    /// Slugs the CMS reported missing, with the time of the lookup
    not_found: Mutex<HashMap<String, i64>>,
}

impl ServerState {
    pub fn new(generator: Generator) -> Self {
        let cache = RevalidationCache::load(&generator.site().base_dir);
        Self {
            generator,
            cache: Mutex::new(cache),
            home_props: RwLock::new(None),
            in_flight: Mutex::new(HashSet::new()),
            not_found: Mutex::new(HashMap::new()),
        }
    }

    async fn freshness(&self, route: &str) -> Freshness {
        let revalidate = self.generator.site().config.revalidate;
        self.cache.lock().await.freshness(route, now(), revalidate)
    }

    /// Claim a route for regeneration; false if someone else holds it
    async fn claim(&self, route: &str) -> bool {
        self.in_flight.lock().await.insert(route.to_string())
    }

    async fn release(&self, route: &str) {
        self.in_flight.lock().await.remove(route);
    }

    async fn commit(&self, page: &RenderedPage) -> Result<()> {
        let mut cache = self.cache.lock().await;
        self.generator.commit(&mut cache, page, now())?;
        cache.save(&self.generator.site().base_dir)
    }

    async fn rebuild_listing(&self) -> Result<HomeProps> {
        let (props, pages) = self.generator.build_listing().await?;
        {
            let mut cache = self.cache.lock().await;
            self.generator.commit_listing(&mut cache, &pages, now())?;
            cache.save(&self.generator.site().base_dir)?;
        }
        *self.home_props.write().await = Some(props.clone());
        tracing::info!("Regenerated {} listing page(s)", pages.len());
        Ok(props)
    }

    async fn is_known_missing(&self, uid: &str) -> bool {
        let mut not_found = self.not_found.lock().await;
        match not_found.get(uid) {
            Some(&at) if now() - at < NOT_FOUND_TTL_SECS => true,
            Some(_) => {
                not_found.remove(uid);
                false
            }
            None => false,
        }
    }

    async fn regenerate_post(&self, uid: &str) {
        let route = post_route_key(uid);
        if !self.claim(&route).await {
            return;
        }

        match self.generator.build_post(uid).await {
            Ok(Some(page)) => match self.commit(&page).await {
                Ok(()) => tracing::info!("Regenerated {}", route),
                Err(e) => tracing::error!("Failed to write {}: {:#}", route, e),
            },
            Ok(None) => {
                tracing::info!("Post {:?} not found", uid);
                self.not_found.lock().await.insert(uid.to_string(), now());
                let mut cache = self.cache.lock().await;
                if let Err(e) = self.generator.remove_route(&mut cache, &route) {
                    tracing::warn!("Failed to remove {}: {:#}", route, e);
                }
            }
            Err(e) => tracing::warn!("Failed to regenerate {}: {:#}", route, e),
        }

        self.release(&route).await;
    }

    async fn regenerate_listing(&self) {
        let route = home_route();
        if !self.claim(&route).await {
            return;
        }
        if let Err(e) = self.rebuild_listing().await {
            tracing::warn!("Failed to regenerate listing pages: {:#}", e);
        }
        self.release(&route).await;
    }

    async fn read_page(&self, route: &str) -> Option<String> {
        let path = self
            .generator
            .site()
            .public_dir
            .join(output_path_for(route));
        tokio::fs::read_to_string(&path).await.ok()
    }
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    let public_dir = state.generator.site().public_dir.clone();

    Router::new()
        .route("/", get(home_handler))
        .route("/page/:loads", get(listing_handler))
        .route("/page/:loads/", get(listing_handler))
        .route("/post/:slug", get(post_handler))
        .route("/post/:slug/", get(post_handler))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server
pub async fn start(site: &Spacetraveling, ip: &str, port: u16, open: bool) -> Result<()> {
    let generator = Generator::new(site)?;
    generator.copy_source_assets()?;
    let state = Arc::new(ServerState::new(generator));
    let app = router(state);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let url = format!("http://{}:{}", ip, port);
    println!("Server running at {}", url);
    println!("Press Ctrl+C to stop.");

    if open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn home_handler(State(state): State<Arc<ServerState>>) -> Response {
    listing_response(&state, 0).await
}

async fn listing_handler(
    State(state): State<Arc<ServerState>>,
    Path(loads): Path<usize>,
) -> Response {
    if loads == 0 {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }
    listing_response(&state, loads).await
}

async fn listing_response(state: &Arc<ServerState>, loads: usize) -> Response {
    match listing_page(state, loads).await {
        Ok(Some(html)) => Html(html).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("Failed to render listing page: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// The listing after `loads` steps; `None` when the posts run out sooner
async fn listing_page(state: &Arc<ServerState>, loads: usize) -> Result<Option<String>> {
    let mut props = match state.freshness(&home_route()).await {
        Freshness::Missing => Some(state.rebuild_listing().await?),
        Freshness::Stale => {
            let state = Arc::clone(state);
            tokio::spawn(async move { state.regenerate_listing().await });
            None
        }
        Freshness::Fresh => None,
    };

    if let Some(html) = state.read_page(&listing_route(loads)).await {
        return Ok(Some(html));
    }
    if loads > MAX_LOADS {
        return Ok(None);
    }

    if props.is_none() {
        props = state.home_props.read().await.clone();
    }
    let props = match props {
        Some(props) => props,
        None => state.rebuild_listing().await?,
    };

    let replay = state.generator.render_listing_after(&props, loads).await?;
    if replay.loads < loads && !replay.failed {
        return Ok(None);
    }
    Ok(Some(replay.html))
}

async fn post_handler(
    State(state): State<Arc<ServerState>>,
    Path(slug): Path<String>,
) -> Response {
    if !is_safe_segment(&slug) || state.is_known_missing(&slug).await {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    let route = post_route_key(&slug);
    let freshness = state.freshness(&route).await;

    if freshness != Freshness::Fresh {
        let state = Arc::clone(&state);
        let uid = slug.clone();
        tokio::spawn(async move { state.regenerate_post(&uid).await });
    }

    if freshness != Freshness::Missing {
        if let Some(html) = state.read_page(&route).await {
            return Html(html).into_response();
        }
    }

    match state.generator.render_post(&DetailView::Fallback) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render fallback page: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;
    }

    Ok(())
}
