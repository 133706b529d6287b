//! CLI for the wbm site mirrorer.

mod progress;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use wbm_core::config::{self, MirrorOptions};
use wbm_core::normalize::normalize_base_url;
use wbm_core::scheduler;

/// Mirror a website from Wayback Machine captures.
#[derive(Debug, Parser)]
#[command(name = "wbm")]
#[command(about = "Mirror a website from Wayback Machine captures", long_about = None)]
pub struct Cli {
    /// Domain or URL to mirror (e.g. example.com).
    pub url: String,

    /// Target directory (default: websites/<host>).
    #[arg(long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Inclusive lower capture bound (YYYYMMDDhhmmss, 0 = unbounded).
    #[arg(long, default_value = "0", value_name = "TIMESTAMP")]
    pub from: u64,

    /// Inclusive upper capture bound (YYYYMMDDhhmmss, 0 = unbounded).
    #[arg(long, default_value = "0", value_name = "TIMESTAMP")]
    pub to: u64,

    /// Number of concurrent downloads (default from config).
    #[arg(long, short = 'c', value_name = "N")]
    pub concurrency: Option<usize>,

    /// Only the exact URL; skip the wildcard-subtree listing.
    #[arg(long)]
    pub exact_url: bool,

    /// Rewrite internal links to relative local paths.
    #[arg(long)]
    pub rewrite_links: bool,

    /// Strip <link rel="canonical"> elements (implies --rewrite-links).
    #[arg(long)]
    pub remove_canonical: bool,

    /// Also download assets hosted on other domains.
    #[arg(long)]
    pub external_assets: bool,

    /// Log at debug level for the wbm crates.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);

    let options = MirrorOptions {
        base_url: args.url,
        exact_url: args.exact_url,
        directory: args.directory,
        from_timestamp: args.from,
        to_timestamp: args.to,
        concurrency: args
            .concurrency
            .unwrap_or(cfg.default_concurrency)
            .max(1),
        rewrite_links: args.rewrite_links || args.remove_canonical,
        remove_canonical: args.remove_canonical,
        download_external_assets: args.external_assets,
    };

    // Normalization failures abort here, before any listing traffic.
    let base = normalize_base_url(&options.base_url)?;
    let backup_root = options.backup_root(&base);
    println!(
        "Downloading {} to {} from Wayback Machine archives.",
        base.canonical_url,
        backup_root.display()
    );

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let renderer = tokio::spawn(progress::render_loop(rx));

    let stats = scheduler::run_mirror(&options, &cfg, Some(tx)).await?;

    // Sender dropped inside run_mirror's scope; the renderer drains and exits.
    let _ = renderer.await;

    if stats.total == 0 {
        println!("No files to download.");
        return Ok(());
    }
    println!(
        "Download completed in {:.2}s, saved in {} ({} files: {} downloaded, {} already present, {} skipped, {} failed)",
        stats.elapsed.as_secs_f64(),
        backup_root.display(),
        stats.total,
        stats.downloaded,
        stats.skipped_existing,
        stats.skipped_invalid,
        stats.failed
    );
    Ok(())
}
