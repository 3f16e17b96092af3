//! spacetraveling: a blog statically generated from a headless CMS
//!
//! Posts live in the CMS; this crate fetches them, renders the listing and
//! detail pages with embedded Tera templates, and regenerates pages once
//! their revalidation window has passed.

pub mod cache;
pub mod cms;
pub mod commands;
pub mod config;
pub mod content;
pub mod detail;
pub mod generator;
pub mod helpers;
pub mod listing;
pub mod server;
pub mod templates;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Name of the site configuration file
pub const CONFIG_FILE: &str = "_config.yml";

/// The main application: a site directory plus its configuration
#[derive(Debug, Clone)]
pub struct Spacetraveling {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Configuration file path
    pub config_path: PathBuf,
    /// Source directory (static assets)
    pub source_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
}

impl Spacetraveling {
    /// Create a new instance from a directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let config_path = base_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            tracing::debug!("No {} found, using defaults", CONFIG_FILE);
            config::SiteConfig::default()
        };
        config.apply_env();

        Ok(Self::with_config(base_dir, config))
    }

    /// Create an instance with an explicit configuration
    pub fn with_config<P: AsRef<Path>>(base_dir: P, config: config::SiteConfig) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        Self {
            config_path: base_dir.join(CONFIG_FILE),
            source_dir: base_dir.join(&config.source_dir),
            public_dir: base_dir.join(&config.public_dir),
            config,
            base_dir,
        }
    }

    /// Generate the static site
    pub async fn generate(&self, force: bool) -> Result<generator::GenerateReport> {
        commands::generate::run(self, force).await
    }

    /// Clean the public directory and revalidation cache
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }
}
