//! HTML helper functions

use super::url::url_for;
use crate::config::SiteConfig;

/// `<link>` tag for a stylesheet in the site's `css/` folder
pub fn stylesheet_link(config: &SiteConfig, name: &str) -> String {
    let href = url_for(config, &format!("css/{}.css", name.trim_end_matches(".css")));
    format!(r#"<link rel="stylesheet" href="{}">"#, html_escape(&href))
}

/// Generate meta generator tag
pub fn meta_generator() -> String {
    format!(
        r#"<meta name="generator" content="spacetraveling {}">"#,
        env!("CARGO_PKG_VERSION")
    )
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
