//! Revalidation cache for incremental static regeneration
//!
//! Tracks, per generated route, when it was generated and a hash of the
//! rendered HTML. A route older than the revalidation interval is stale and
//! gets regenerated; a changed `_config.yml` makes every route stale.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Cache directory name, relative to the site base directory
pub const CACHE_DIR: &str = ".spacetraveling-cache";

/// Cache file name inside `CACHE_DIR`
const CACHE_FILE: &str = "db.json";

/// A generated route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Unix timestamp of the last generation
    pub generated_at: i64,
    /// Hash of the rendered HTML
    pub content_hash: u64,
    /// Output path relative to the public dir
    pub output_path: String,
}

/// Freshness of a route at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Never generated
    Missing,
    Fresh,
    Stale,
}

/// Cache database of generated routes
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RevalidationCache {
    /// Version of the cache format
    pub version: u32,
    /// Hash of the site config (changes invalidate every route)
    pub config_hash: u64,
    /// Generated routes, keyed by route (`/`, `/post/<uid>/`)
    pub routes: BTreeMap<String, RouteEntry>,
}

impl RevalidationCache {
    /// Current cache format version
    const VERSION: u32 = 1;

    /// Create a new cache with version set
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            ..Default::default()
        }
    }

    /// Load cache from disk, or create a new empty cache
    pub fn load(base_dir: &Path) -> Self {
        let cache_path = base_dir.join(CACHE_DIR).join(CACHE_FILE);
        if let Ok(content) = fs::read_to_string(&cache_path) {
            match serde_json::from_str::<RevalidationCache>(&content) {
                Ok(cache) if cache.version == Self::VERSION => return cache,
                Ok(_) => tracing::info!("Cache version mismatch, rebuilding cache"),
                Err(e) => tracing::warn!("Ignoring unreadable cache {:?}: {}", cache_path, e),
            }
        }
        Self::new()
    }

    /// Save cache to disk
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let cache_dir = base_dir.join(CACHE_DIR);
        fs::create_dir_all(&cache_dir)?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(cache_dir.join(CACHE_FILE), content)?;
        Ok(())
    }

    /// Drop every route when the config hash differs from the recorded one
    pub fn sync_config_hash(&mut self, config_hash: u64) {
        if self.config_hash != 0 && self.config_hash != config_hash {
            tracing::info!("Config changed, all pages will be regenerated");
            self.routes.clear();
        }
        self.config_hash = config_hash;
    }

    /// Freshness of `route` at `now` given the revalidation interval
    pub fn freshness(&self, route: &str, now: i64, revalidate: u64) -> Freshness {
        match self.routes.get(route) {
            None => Freshness::Missing,
            Some(entry) => {
                let age = now.saturating_sub(entry.generated_at);
                if age < 0 || (age as u64) < revalidate {
                    Freshness::Fresh
                } else {
                    Freshness::Stale
                }
            }
        }
    }

    /// Record a generation; returns whether the HTML differs from last time
    pub fn record(&mut self, route: &str, now: i64, html: &str, output_path: &str) -> bool {
        let content_hash = hash_content(html);
        let changed = self
            .routes
            .get(route)
            .map_or(true, |entry| entry.content_hash != content_hash);

        self.routes.insert(
            route.to_string(),
            RouteEntry {
                generated_at: now,
                content_hash,
                output_path: output_path.to_string(),
            },
        );
        changed
    }

    /// Forget a route, e.g. when its document no longer exists
    pub fn remove(&mut self, route: &str) -> Option<RouteEntry> {
        self.routes.remove(route)
    }

    /// Routes currently recorded under `prefix`
    pub fn routes_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.routes
            .keys()
            .filter(move |route| route.starts_with(prefix))
            .map(String::as_str)
    }
}

/// Calculate a hash for content
pub fn hash_content(content: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Calculate a hash for a file on disk; 0 when it does not exist
pub fn hash_file(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let content = fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Remove the cache directory
pub fn clear(base_dir: &Path) -> Result<()> {
    let cache_dir = base_dir.join(CACHE_DIR);
    if cache_dir.exists() {
        fs::remove_dir_all(&cache_dir)?;
        tracing::info!("Deleted: {:?}", cache_dir);
    }
    Ok(())
}
