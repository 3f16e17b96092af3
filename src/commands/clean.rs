//! Clean the public directory

use anyhow::Result;
use std::fs;

use crate::cache;
use crate::Spacetraveling;

/// Clean the public directory and revalidation cache
pub fn run(site: &Spacetraveling) -> Result<()> {
    if site.public_dir.exists() {
        fs::remove_dir_all(&site.public_dir)?;
        tracing::info!("Deleted: {:?}", site.public_dir);
    }

    cache::clear(&site.base_dir)?;

    Ok(())
}
