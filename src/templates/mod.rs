//! Built-in spacetraveling templates using the Tera template engine
//!
//! All templates are embedded in the binary.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::Post;
use crate::detail::DetailView;
use crate::helpers::{
    date_xml, format_publication_date, full_url_for, meta_generator, post_route, stylesheet_link,
    url_for,
};
use crate::listing::{ListingState, LoadStatus};

/// Stylesheet written to `css/common.css` unless the source folder has one
pub const DEFAULT_STYLESHEET: &str = include_str!("spacetraveling/common.css");

/// Seconds between reloads of the fallback page
const FALLBACK_REFRESH_SECS: u32 = 2;

/// Template renderer with the embedded theme
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates loaded
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        // Markup is pre-rendered where needed; user text is escaped in templates
        tera.autoescape_on(vec![]);

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("spacetraveling/layout.html")),
            ("index.html", include_str!("spacetraveling/index.html")),
            ("post.html", include_str!("spacetraveling/post.html")),
            ("fallback.html", include_str!("spacetraveling/fallback.html")),
            // Partials
            (
                "partials/header.html",
                include_str!("spacetraveling/partials/header.html"),
            ),
            (
                "partials/post_entry.html",
                include_str!("spacetraveling/partials/post_entry.html"),
            ),
        ])?;

        tera.register_filter("publication_date", publication_date_filter);

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }

    /// Render the listing page
    pub fn render_home(&self, config: &SiteConfig, listing: &ListingData) -> Result<String> {
        let mut context = base_context(config);
        context.insert("listing", listing);
        self.render("index.html", &context)
    }

    /// Render a detail page, or the loading placeholder in fallback
    pub fn render_post(&self, config: &SiteConfig, view: &DetailView) -> Result<String> {
        let mut context = base_context(config);
        match view.render_data(config.words_per_minute) {
            Some(post) => {
                context.insert("canonical", &full_url_for(config, &post_route(&post.uid)));
                context.insert("post", &post);
                self.render("post.html", &context)
            }
            None => {
                context.insert("refresh_secs", &FALLBACK_REFRESH_SECS);
                self.render("fallback.html", &context)
            }
        }
    }
}

fn base_context(config: &SiteConfig) -> Context {
    let mut context = Context::new();
    context.insert("config", &ConfigData::new(config));
    context
}

/// Tera filter: format an ISO-8601 publication date as `d MMM yyyy`
fn publication_date_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    Ok(tera::Value::String(format_publication_date(value.as_str())))
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct ConfigData {
    pub title: String,
    pub description: String,
    pub language: String,
    pub url: String,
    pub root: String,
    pub generator: String,
    pub stylesheet: String,
}

impl ConfigData {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            title: config.title.clone(),
            description: config.description.clone(),
            language: config.language.clone(),
            url: config.url.clone(),
            root: url_for(config, ""),
            generator: meta_generator(),
            stylesheet: stylesheet_link(config, "common"),
        }
    }
}

/// One entry of the listing page
#[derive(Debug, Clone, Serialize)]
pub struct PostSummaryData {
    pub uid: String,
    pub href: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    /// Raw ISO-8601 date, formatted by the `publication_date` filter
    pub published_at: Option<String>,
    pub date_xml: Option<String>,
}

impl PostSummaryData {
    pub fn new(config: &SiteConfig, post: &Post) -> Self {
        let uid = post.slug().unwrap_or_default().to_string();
        Self {
            href: url_for(config, &post_route(&uid)),
            uid,
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            author: post.author.clone(),
            published_at: post.first_publication_date.clone(),
            date_xml: date_xml(post.first_publication_date.as_deref()),
        }
    }
}

/// The listing page as rendered
#[derive(Debug, Clone, Serialize)]
pub struct ListingData {
    pub posts: Vec<PostSummaryData>,
    /// Target of the "load more" control; `None` hides it
    pub load_more_href: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ListingData {
    /// Build from listing state; `load_more_href` is only used when a next page exists
    pub fn new(config: &SiteConfig, state: &ListingState, load_more_href: Option<String>) -> Self {
        let error = match &state.status {
            LoadStatus::Failed(err) => Some(err.to_string()),
            _ => None,
        };

        Self {
            posts: state
                .posts
                .iter()
                .map(|post| PostSummaryData::new(config, post))
                .collect(),
            load_more_href: load_more_href.filter(|_| state.has_next_page()),
            loading: state.status == LoadStatus::Loading,
            error,
        }
    }
}
