//! Generator module - static generation of the listing and detail pages
//!
//! The `static_*` functions are the build-time glue between the content
//! client and the pages: initial listing props, the set of detail paths,
//! and per-post props. `generate` renders them through the embedded
//! templates, writing only routes that are missing or past their
//! revalidation window.
//!
//! The listing is written once per "load more" step: `/` shows the first
//! page, `/page/<n>/` the posts accumulated after `n` loads, and each links
//! to the next.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::cache::{self, Freshness, RevalidationCache};
use crate::cms::{ContentClient, Predicate, QueryOptions};
use crate::content::{Post, PostPagination};
use crate::detail::DetailView;
use crate::helpers::url_for;
use crate::listing::{ListingController, ListingState};
use crate::templates::{ListingData, TemplateRenderer, DEFAULT_STYLESHEET};
use crate::Spacetraveling;

/// Ordering of the listing query, newest first
const LISTING_ORDER: &str = "[document.first_publication_date desc]";

/// Route prefix of the listing pages after the first
const LISTING_PAGE_PREFIX: &str = "/page/";

/// Initial props of the listing page
#[derive(Debug, Clone)]
pub struct HomeProps {
    pub posts_pagination: PostPagination,
}

/// Props of a detail page
#[derive(Debug, Clone)]
pub struct PostProps {
    pub post: Post,
}

/// A rendered page ready to be written
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Site route: `/`, `/page/<n>/` or `/post/<uid>/`
    pub route: String,
    /// Output path relative to the public dir
    pub output_path: String,
    pub html: String,
}

/// The listing rendered after replaying "load more" steps
#[derive(Debug, Clone)]
pub struct ListingReplay {
    pub html: String,
    /// Steps that actually ran
    pub loads: usize,
    /// Whether the replay stopped on a failed load
    pub failed: bool,
}

/// Options for a generation run
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Regenerate every route regardless of freshness
    pub force: bool,
}

/// What a generation run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    pub home_generated: bool,
    /// Listing pages written, `/` included
    pub listing_pages: usize,
    pub posts_generated: usize,
    pub posts_fresh: usize,
    pub posts_failed: usize,
    pub posts_removed: usize,
}

/// Static site generator backed by the CMS
pub struct Generator {
    site: Spacetraveling,
    client: ContentClient,
    renderer: TemplateRenderer,
}

impl Generator {
    /// Create a generator with a client built from the site config
    pub fn new(site: &Spacetraveling) -> Result<Self> {
        let client = ContentClient::new(&site.config.cms).context("Invalid CMS configuration")?;
        Self::with_client(site, client)
    }

    /// Create a generator around an existing client
    pub fn with_client(site: &Spacetraveling, client: ContentClient) -> Result<Self> {
        Ok(Self {
            site: site.clone(),
            client,
            renderer: TemplateRenderer::new()?,
        })
    }

    pub fn site(&self) -> &Spacetraveling {
        &self.site
    }

    pub fn client(&self) -> &ContentClient {
        &self.client
    }

    /// First page of posts for the listing page
    pub async fn static_home_props(&self) -> Result<HomeProps> {
        let cms = &self.site.config.cms;
        let options = QueryOptions {
            fetch: ["title", "subtitle", "author"]
                .iter()
                .map(|field| format!("{}.{}", cms.document_type, field))
                .collect(),
            page_size: Some(cms.page_size),
            page: None,
            orderings: Some(LISTING_ORDER.to_string()),
        };

        let raw = self
            .client
            .query_posts(&[Predicate::document_type(&cms.document_type)], &options)
            .await
            .context("Failed to query posts")?;

        Ok(HomeProps {
            posts_pagination: PostPagination::from_listing(raw)?,
        })
    }

    /// Every post uid that gets a pre-rendered detail page
    pub async fn static_paths(&self) -> Result<Vec<String>> {
        let doc_type = &self.site.config.cms.document_type;
        let uids = self
            .client
            .query_all_post_uids(&[Predicate::document_type(doc_type)])
            .await
            .context("Failed to enumerate post paths")?;

        Ok(uids
            .into_iter()
            .filter(|uid| {
                let safe = is_safe_segment(uid);
                if !safe {
                    tracing::warn!("Skipping post with unusable uid {:?}", uid);
                }
                safe
            })
            .collect())
    }

    /// Full post for a detail page; `None` when no such document exists
    pub async fn static_post_props(&self, slug: &str) -> Result<Option<PostProps>> {
        let doc_type = &self.site.config.cms.document_type;
        let doc = self
            .client
            .get_by_uid(doc_type, slug)
            .await
            .with_context(|| format!("Failed to fetch post {:?}", slug))?;

        match doc {
            Some(doc) => Ok(Some(PostProps {
                post: Post::from_document(doc)?,
            })),
            None => Ok(None),
        }
    }

    /// Render the listing page for a given state
    ///
    /// `loads` is the number of "load more" steps already applied; the
    /// control links to the next step.
    pub fn render_listing(&self, state: &ListingState, loads: usize) -> Result<String> {
        let config = &self.site.config;
        let href = url_for(config, &listing_route(loads + 1));
        let data = ListingData::new(config, state, Some(href));
        self.renderer.render_home(config, &data)
    }

    /// Render the listing page after replaying `loads` "load more" steps
    ///
    /// Stops early when the posts run out or a load fails; a failed load
    /// shows the error and a retry control.
    pub async fn render_listing_after(&self, props: &HomeProps, loads: usize) -> Result<ListingReplay> {
        let mut controller = ListingController::new(props.posts_pagination.clone());
        let mut done = 0;
        let mut failed = false;

        while done < loads && controller.can_load_more() {
            if controller.load_more(&self.client).await.is_err() {
                failed = true;
                break;
            }
            done += 1;
        }

        Ok(ListingReplay {
            html: self.render_listing(controller.state(), done)?,
            loads: done,
            failed,
        })
    }

    /// Render a detail page (or its loading placeholder)
    pub fn render_post(&self, view: &DetailView) -> Result<String> {
        self.renderer.render_post(&self.site.config, view)
    }

    /// Fetch the listing and render one page per "load more" step
    pub async fn build_listing(&self) -> Result<(HomeProps, Vec<RenderedPage>)> {
        let props = self.static_home_props().await?;
        let mut controller = ListingController::new(props.posts_pagination.clone());
        let mut pages = vec![self.listing_page(controller.state(), 0)?];

        while controller.can_load_more() {
            let loads = pages.len();
            controller
                .load_more(&self.client)
                .await
                .with_context(|| format!("Failed to load listing page {}", loads + 1))?;
            pages.push(self.listing_page(controller.state(), loads)?);
        }

        Ok((props, pages))
    }

    fn listing_page(&self, state: &ListingState, loads: usize) -> Result<RenderedPage> {
        let route = listing_route(loads);
        Ok(RenderedPage {
            output_path: output_path_for(&route),
            html: self.render_listing(state, loads)?,
            route,
        })
    }

    /// Fetch and render one detail page; `None` when the post does not exist
    pub async fn build_post(&self, uid: &str) -> Result<Option<RenderedPage>> {
        let Some(props) = self.static_post_props(uid).await? else {
            return Ok(None);
        };
        let html = self.render_post(&DetailView::Ready(props.post))?;
        let route = post_route_key(uid);
        Ok(Some(RenderedPage {
            output_path: output_path_for(&route),
            route,
            html,
        }))
    }

    /// Write a rendered page and record it in the cache
    pub fn commit(&self, cache: &mut RevalidationCache, page: &RenderedPage, now: i64) -> Result<()> {
        let dest = self.site.public_dir.join(&page.output_path);
        let changed = cache.record(&page.route, now, &page.html, &page.output_path);

        if changed || !dest.exists() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create dir {:?}", parent))?;
            }
            fs::write(&dest, &page.html).with_context(|| format!("Failed to write {:?}", dest))?;
            tracing::debug!("Generated: {:?}", dest);
        } else {
            tracing::debug!("Unchanged: {:?}", dest);
        }
        Ok(())
    }

    /// Write every listing page and drop `/page/<n>/` routes past the new end
    pub fn commit_listing(
        &self,
        cache: &mut RevalidationCache,
        pages: &[RenderedPage],
        now: i64,
    ) -> Result<()> {
        for page in pages {
            self.commit(cache, page, now)?;
        }

        let current: HashSet<&str> = pages.iter().map(|page| page.route.as_str()).collect();
        let gone: Vec<String> = cache
            .routes_with_prefix(LISTING_PAGE_PREFIX)
            .filter(|route| !current.contains(route))
            .map(str::to_string)
            .collect();
        for route in gone {
            self.remove_route(cache, &route)?;
        }
        Ok(())
    }

    /// Remove a generated route from disk and cache
    pub fn remove_route(&self, cache: &mut RevalidationCache, route: &str) -> Result<()> {
        if let Some(entry) = cache.remove(route) {
            let dest = self.site.public_dir.join(&entry.output_path);
            if dest.exists() {
                fs::remove_file(&dest)?;
            }
            if let Some(parent) = dest.parent() {
                // Only succeeds when the directory is empty
                let _ = fs::remove_dir(parent);
            }
            tracing::info!("Removed stale route {}", route);
        }
        Ok(())
    }

    /// Generate the whole site
    pub async fn generate(&self, options: GenerateOptions) -> Result<GenerateReport> {
        fs::create_dir_all(&self.site.public_dir)?;
        self.copy_source_assets()?;

        let mut cache = RevalidationCache::load(&self.site.base_dir);
        cache.sync_config_hash(cache::hash_file(&self.site.config_path)?);

        let revalidate = self.site.config.revalidate;
        let now = chrono::Utc::now().timestamp();
        let needs_build = |cache: &RevalidationCache, route: &str| {
            options.force || cache.freshness(route, now, revalidate) != Freshness::Fresh
        };

        let mut report = GenerateReport::default();

        // Listing pages
        if needs_build(&cache, &home_route()) {
            let (props, pages) = self.build_listing().await?;
            self.commit_listing(&mut cache, &pages, now)?;
            report.home_generated = true;
            report.listing_pages = pages.len();
            tracing::info!(
                "Generated {} listing page(s), {} posts per load",
                pages.len(),
                props.posts_pagination.results.len()
            );
        }

        // Detail pages
        let uids = self.static_paths().await?;
        let known: HashSet<String> = uids.iter().map(|uid| post_route_key(uid)).collect();
        let gone: Vec<String> = cache
            .routes_with_prefix("/post/")
            .filter(|route| !known.contains(*route))
            .map(str::to_string)
            .collect();
        for route in gone {
            self.remove_route(&mut cache, &route)?;
            report.posts_removed += 1;
        }

        let stale: Vec<&String> = uids
            .iter()
            .filter(|uid| needs_build(&cache, &post_route_key(uid)))
            .collect();
        report.posts_fresh = uids.len() - stale.len();

        let results: Vec<(String, Result<Option<RenderedPage>>)> = stream::iter(stale)
            .map(|uid| async move { (uid.clone(), self.build_post(uid).await) })
            .buffer_unordered(self.site.config.concurrency.max(1))
            .collect()
            .await;

        for (uid, result) in results {
            match result {
                Ok(Some(page)) => {
                    self.commit(&mut cache, &page, now)?;
                    report.posts_generated += 1;
                }
                Ok(None) => {
                    tracing::warn!("Post {:?} disappeared while generating, skipped", uid);
                }
                Err(e) => {
                    tracing::warn!("Failed to generate post {:?}: {:#}", uid, e);
                    report.posts_failed += 1;
                }
            }
        }

        cache.save(&self.site.base_dir)?;
        Ok(report)
    }

    /// Copy source assets (stylesheets, images) to the public directory
    pub fn copy_source_assets(&self) -> Result<()> {
        let source_dir = &self.site.source_dir;

        if source_dir.exists() {
            for entry in WalkDir::new(source_dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }

                // Skip hidden files
                if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
                {
                    continue;
                }

                let relative = path.strip_prefix(source_dir)?;
                let dest = self.site.public_dir.join(relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(path, &dest)?;
            }
        }

        let stylesheet = self.stylesheet_path();
        if !stylesheet.exists() {
            if let Some(parent) = stylesheet.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&stylesheet, DEFAULT_STYLESHEET)?;
        }

        Ok(())
    }

    fn stylesheet_path(&self) -> PathBuf {
        self.site.public_dir.join("css").join("common.css")
    }
}

/// Cache key of the listing page
pub fn home_route() -> String {
    "/".to_string()
}

/// Cache key of the listing after `loads` "load more" steps
pub fn listing_route(loads: usize) -> String {
    if loads == 0 {
        home_route()
    } else {
        format!("{}{}/", LISTING_PAGE_PREFIX, loads)
    }
}

/// Cache key of a detail page
pub fn post_route_key(uid: &str) -> String {
    format!("/post/{}/", uid)
}

/// Output file of a route, relative to the public dir
pub fn output_path_for(route: &str) -> String {
    format!("{}index.html", route.trim_start_matches('/'))
}

/// Whether a uid can be used as a single directory name
pub fn is_safe_segment(uid: &str) -> bool {
    !uid.is_empty()
        && uid != "."
        && uid != ".."
        && !uid.contains(['/', '\\'])
        && !uid.chars().any(char::is_control)
}
