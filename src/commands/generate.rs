//! Generate static files

use anyhow::Result;
use std::time::Duration;

use crate::generator::{GenerateOptions, GenerateReport, Generator};
use crate::Spacetraveling;

/// Generate the static site, regenerating only stale pages unless `force`
pub async fn run(site: &Spacetraveling, force: bool) -> Result<GenerateReport> {
    let start = std::time::Instant::now();

    let generator = Generator::new(site)?;
    let report = generator.generate(GenerateOptions { force }).await?;

    tracing::info!(
        "Listing: {}; posts: {} generated, {} fresh, {} failed, {} removed",
        if report.home_generated {
            format!("{} page(s) generated", report.listing_pages)
        } else {
            "fresh".to_string()
        },
        report.posts_generated,
        report.posts_fresh,
        report.posts_failed,
        report.posts_removed
    );

    let duration = start.elapsed();
    tracing::info!("Generated in {:.2}s", duration.as_secs_f64());

    Ok(report)
}

/// Regenerate stale pages every revalidation interval until interrupted
pub async fn watch(site: &Spacetraveling) -> Result<()> {
    let period = Duration::from_secs(site.config.revalidate.max(1));
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately; the initial build already ran
    ticker.tick().await;

    tracing::info!(
        "Revalidating every {}s. Press Ctrl+C to stop.",
        period.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!("Revalidation window passed, regenerating...");
                if let Err(e) = run(site, false).await {
                    tracing::error!("Generation failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
