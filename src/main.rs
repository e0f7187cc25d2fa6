//! Kagami main entry point
//!
//! This is the command-line interface for the Kagami site mirror.

use clap::Parser;
use kagami::config::load_config_with_hash;
use kagami::crawler::run_crawl;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Kagami: a site mirroring crawler
///
/// Kagami renders a site page by page, saves each page and its resources
/// under a local directory tree, and alternates active crawl phases with
/// pause windows. Cross-origin resources are collected and downloaded in
/// a deferred batch, optionally through a proxy.
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version = "0.3.0")]
#[command(about = "A site mirroring crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be mirrored without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else {
        run_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kagami=info,warn"),
            1 => EnvFilter::new("kagami=debug,info"),
            2 => EnvFilter::new("kagami=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the mirror plan
fn handle_dry_run(config: &kagami::config::Config) {
    println!("=== Kagami Dry Run ===\n");

    println!("Site:");
    println!("  Seed URL: {}", config.site.seed_url);
    println!("  Save root: {}", config.site.save_root);

    println!("\nCrawler:");
    println!(
        "  Max concurrent downloads: {}",
        config.crawler.max_concurrent_downloads
    );
    println!("  Run period: {}s", config.crawler.run_period_secs);
    println!("  Pause period: {}s", config.crawler.pause_period_secs);
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    println!(
        "  Save same-origin resources: {}",
        config.crawler.save_same_origin
    );
    println!(
        "  Checkpoint every: {} pages",
        config.crawler.checkpoint_every
    );
    println!("  Deferred fetcher: {:?}", config.crawler.deferred_fetcher);

    println!("\nCAPTCHA gate:");
    println!("  Enabled: {}", config.captcha.enabled);
    if config.captcha.enabled {
        println!("  Marker: {}", config.captcha.marker);
    }

    println!("\nRenderer:");
    println!("  Headless: {}", config.renderer.headless);

    println!("\nProxy:");
    println!("  Enabled: {}", config.proxy.enabled);
    if config.proxy.enabled {
        println!("  Credentials: {}", config.proxy.credentials_path);
        println!("  Probe URL: {}", config.proxy.probe_url);
    }

    println!("\nState:");
    println!("  Crawl checkpoint: {}", config.state.crawl_path);
    println!("  Deferred map: {}", config.state.deferred_path);

    println!("\n✓ Configuration is valid");
    println!("✓ Would mirror {} into {}", config.site.seed_url, config.site.save_root);
}
