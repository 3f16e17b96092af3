//! CLI entry point for spacetraveling

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spacetraveling")]
#[command(version)]
#[command(about = "A static blog generator backed by a headless CMS", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new blog
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        folder: PathBuf,
    },

    /// Generate static files
    #[command(alias = "g")]
    Generate {
        /// Regenerate every page, even fresh ones
        #[arg(short, long)]
        force: bool,

        /// Keep regenerating stale pages every revalidation interval
        #[arg(short, long)]
        watch: bool,
    },

    /// Start a server that regenerates stale pages on request
    #[command(alias = "s")]
    Server {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// IP address to bind to
        #[arg(short, long, default_value = "localhost")]
        ip: String,

        /// Open browser automatically
        #[arg(short, long)]
        open: bool,
    },

    /// Clean the public folder and cache
    Clean,

    /// List posts from the CMS, newest first
    List {
        /// Stop after this many result pages
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "spacetraveling=debug,info"
    } else {
        "spacetraveling=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    match cli.command {
        Commands::Init { folder } => {
            let target_dir = if folder.is_absolute() {
                folder
            } else {
                base_dir.join(folder)
            };
            tracing::info!("Initializing blog in {:?}", target_dir);
            spacetraveling::commands::init::init_site(&target_dir)?;
            println!("Initialized empty blog in {:?}", target_dir);
        }

        Commands::Generate { force, watch } => {
            let site = spacetraveling::Spacetraveling::new(&base_dir)?;
            tracing::info!("Generating static files...");

            let report = site.generate(force).await?;
            if report.posts_failed > 0 {
                println!(
                    "Generated with {} failed post(s), see the log above",
                    report.posts_failed
                );
            } else {
                println!("Generated successfully!");
            }

            if watch {
                tracing::info!(
                    "Revalidating every {}s, press Ctrl+C to stop",
                    site.config.revalidate
                );
                spacetraveling::commands::generate::watch(&site).await?;
            }
        }

        Commands::Server { port, ip, open } => {
            let site = spacetraveling::Spacetraveling::new(&base_dir)?;

            // Generate first
            tracing::info!("Generating static files...");
            site.generate(false).await?;

            tracing::info!("Starting server at http://{}:{}", ip, port);
            spacetraveling::server::start(&site, &ip, port, open).await?;
        }

        Commands::Clean => {
            let site = spacetraveling::Spacetraveling::new(&base_dir)?;
            tracing::info!("Cleaning public folder...");
            site.clean()?;
            println!("Cleaned successfully!");
        }

        Commands::List { pages } => {
            let site = spacetraveling::Spacetraveling::new(&base_dir)?;
            spacetraveling::commands::list::run(&site, pages).await?;
        }

        Commands::Version => {
            println!("spacetraveling version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
