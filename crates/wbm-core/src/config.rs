use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::NormalizedBase;

/// Default number of concurrently in-flight downloads.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Per-run options for one mirror job, independent of how they were
/// collected (CLI flags here; any front end can fill this in).
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Raw domain or URL supplied by the user.
    pub base_url: String,
    /// Query only the exact URL, skipping the wildcard-subtree listing.
    pub exact_url: bool,
    /// Explicit backup directory; `None` means `websites/<host>`.
    pub directory: Option<PathBuf>,
    /// Inclusive lower capture bound (`YYYYMMDDhhmmss` as a number; 0 = unbounded).
    pub from_timestamp: u64,
    /// Inclusive upper capture bound (0 = unbounded).
    pub to_timestamp: u64,
    /// Worker pool size, at least 1.
    pub concurrency: usize,
    /// Rewrite internal references to relative local paths.
    pub rewrite_links: bool,
    /// Strip `<link rel="canonical">` elements while rewriting.
    pub remove_canonical: bool,
    /// Also download (and rewrite to) assets hosted on other domains.
    pub download_external_assets: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            exact_url: false,
            directory: None,
            from_timestamp: 0,
            to_timestamp: 0,
            concurrency: DEFAULT_CONCURRENCY,
            rewrite_links: false,
            remove_canonical: false,
            download_external_assets: false,
        }
    }
}

impl MirrorOptions {
    /// Root directory the mirror is written into: the explicit override, or
    /// `websites/<unicode host>`.
    pub fn backup_root(&self, base: &NormalizedBase) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.clone(),
            None => Path::new("websites").join(&base.unicode_host),
        }
    }
}

/// Global configuration loaded from `~/.config/wbm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WbmConfig {
    /// Base endpoint snapshots are fetched from (`{endpoint}/web/{ts}id_/{url}`).
    pub archive_endpoint: String,
    /// Full endpoint of the capture listing (CDX) API.
    pub cdx_endpoint: String,
    /// Worker pool size used when the CLI does not override it.
    pub default_concurrency: usize,
}

impl Default for WbmConfig {
    fn default() -> Self {
        Self {
            archive_endpoint: "https://web.archive.org".to_string(),
            cdx_endpoint: "https://web.archive.org/cdx/search/xd".to_string(),
            default_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("wbm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<WbmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = WbmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: WbmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
