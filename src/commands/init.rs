//! Initialize a new site

use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::templates::DEFAULT_STYLESHEET;
use crate::CONFIG_FILE;

const DEFAULT_CONFIG: &str = r#"# spacetraveling configuration

# Site
title: spacetraveling
description: ''
language: pt-BR

# URL
url: http://localhost:4000
root: /

# Directory
source_dir: source
public_dir: public

# Seconds a generated page stays fresh
revalidate: 86400

# Read time estimate
words_per_minute: 200

# Detail pages fetched at once
concurrency: 4

# Content source. PRISMIC_API_ENDPOINT and PRISMIC_ACCESS_TOKEN
# override endpoint and access_token.
cms:
  endpoint: https://spacetraveling.cdn.prismic.io/api/v2
  document_type: post
  page_size: 5
  timeout_secs: 10
  max_retries: 1
"#;

/// Initialize a new site in the given directory
pub fn init_site(target_dir: &Path) -> Result<()> {
    fs::create_dir_all(target_dir.join("source/css"))?;

    let config_path = target_dir.join(CONFIG_FILE);
    if config_path.exists() {
        anyhow::bail!("{:?} already exists", config_path);
    }
    fs::write(&config_path, DEFAULT_CONFIG)?;

    let stylesheet = target_dir.join("source/css/common.css");
    if !stylesheet.exists() {
        fs::write(&stylesheet, DEFAULT_STYLESHEET)?;
    }

    tracing::info!("Created {:?}", config_path);
    Ok(())
}
