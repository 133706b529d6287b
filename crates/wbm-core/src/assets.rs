//! Discovered-asset pipeline.
//!
//! Drives one document's rewrite pass: transform, fetch every discovered
//! reference to completion through a bounded queue, then persist the
//! rewritten text. The join barrier guarantees no persisted document points
//! at a fetch that is still outstanding or was silently dropped.
//!
//! Fetched CSS assets are themselves CSS-passed; references they discover
//! join the same queue, so `@import` chains drain without recursion.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::archive::ArchiveClient;
use crate::classify;
use crate::config::MirrorOptions;
use crate::error::MirrorError;
use crate::index::CaptureIndex;
use crate::rewrite::{css, html, DiscoveredRef, RewriteContext};
use crate::storage;

#[derive(Clone)]
pub struct AssetManager {
    client: ArchiveClient,
    index: Arc<CaptureIndex>,
    backup_root: PathBuf,
    site_host: String,
    concurrency: usize,
    rewrite_links: bool,
    remove_canonical: bool,
    download_external_assets: bool,
}

impl AssetManager {
    pub fn new(
        client: ArchiveClient,
        index: Arc<CaptureIndex>,
        backup_root: PathBuf,
        site_host: String,
        options: &MirrorOptions,
    ) -> Self {
        Self {
            client,
            index,
            backup_root,
            site_host,
            concurrency: options.concurrency.max(1),
            rewrite_links: options.rewrite_links,
            remove_canonical: options.remove_canonical,
            download_external_assets: options.download_external_assets,
        }
    }

    fn context<'a>(
        &'a self,
        source_url: &'a Url,
        base_dir: &'a Path,
        exclude_path: Option<&'a Path>,
    ) -> RewriteContext<'a> {
        RewriteContext {
            source_url,
            base_dir,
            backup_root: &self.backup_root,
            site_host: &self.site_host,
            rewrite_links: self.rewrite_links,
            remove_canonical: self.remove_canonical,
            download_external_assets: self.download_external_assets,
            exclude_path,
        }
    }

    /// HTML pass over a downloaded page: rewrite, fetch all discovered
    /// assets, then write the document back (atomically) if it changed.
    pub async fn process_html_file(
        &self,
        file_path: &Path,
        page_url: &Url,
        page_timestamp: &str,
    ) -> Result<(), MirrorError> {
        let bytes = fs::read(file_path).map_err(|e| MirrorError::fs(file_path, e))?;
        let html_text = String::from_utf8_lossy(&bytes).into_owned();
        let base_dir = parent_dir(file_path);

        let ctx = self.context(page_url, &base_dir, None);
        let out = html::rewrite_html_content(&html_text, &ctx).map_err(|e| {
            MirrorError::Rewrite {
                path: file_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        self.fetch_discovered(out.refs, page_timestamp).await;

        if out.html != html_text {
            storage::write_atomic(file_path, &out.html)?;
        }
        Ok(())
    }

    /// CSS pass over a downloaded stylesheet, excluding its own path from
    /// re-enqueueing. Persists only when a substitution changed the text.
    pub async fn rewrite_css_file(
        &self,
        file_path: &Path,
        source_url: &Url,
        timestamp: &str,
    ) -> Result<(), MirrorError> {
        let bytes = fs::read(file_path).map_err(|e| MirrorError::fs(file_path, e))?;
        let css_text = String::from_utf8_lossy(&bytes).into_owned();
        let base_dir = parent_dir(file_path);

        let ctx = self.context(source_url, &base_dir, Some(file_path));
        let out = css::rewrite_css_content(&css_text, &ctx);

        self.fetch_discovered(out.refs, timestamp).await;

        if out.changed {
            storage::write_atomic(file_path, &out.css)?;
        }
        Ok(())
    }

    /// Fetches a document's discovered assets through a bounded pool,
    /// feeding CSS-discovered references back into the queue until it
    /// drains. Never fails: individual asset failures are logged and
    /// skipped.
    async fn fetch_discovered(&self, initial: Vec<DiscoveredRef>, page_timestamp: &str) {
        let mut seen: HashSet<PathBuf> = initial
            .iter()
            .map(|r| r.mapping.file_path.clone())
            .collect();
        let mut queue: VecDeque<DiscoveredRef> = initial.into();
        let mut pool = tokio::task::JoinSet::new();

        loop {
            while pool.len() < self.concurrency {
                let Some(next) = queue.pop_front() else {
                    break;
                };
                let manager = self.clone();
                let timestamp = page_timestamp.to_string();
                pool.spawn(async move { manager.fetch_asset(next, &timestamp).await });
            }

            if pool.is_empty() {
                break;
            }
            let Some(joined) = pool.join_next().await else {
                break;
            };
            match joined {
                Ok(discovered) => {
                    for r in discovered {
                        if seen.insert(r.mapping.file_path.clone()) {
                            queue.push_back(r);
                        }
                    }
                }
                Err(e) => tracing::warn!("asset task join: {}", e),
            }
        }
    }

    /// Fetches one asset if its mapped file is missing. Returns the
    /// references a fetched CSS asset discovered, for the caller's queue.
    async fn fetch_asset(&self, asset: DiscoveredRef, page_timestamp: &str) -> Vec<DiscoveredRef> {
        let file_path = asset.mapping.file_path.clone();
        if file_path.exists() {
            return Vec::new();
        }
        if let Err(e) = storage::ensure_dir(&asset.mapping.dir_path) {
            tracing::warn!("skipping asset {}: {}", asset.url, e);
            return Vec::new();
        }

        let timestamp = self.index.resolve(asset.url.as_str(), page_timestamp);
        if timestamp.is_empty() {
            tracing::debug!("skipping asset {}, no timestamp available in range", asset.url);
            return Vec::new();
        }

        let meta = {
            let client = self.client.clone();
            let url = asset.url.to_string();
            let ts = timestamp.clone();
            let dest = file_path.clone();
            match tokio::task::spawn_blocking(move || client.download_snapshot(&ts, &url, &dest))
                .await
            {
                Ok(Ok(meta)) => meta,
                Ok(Err(e)) => {
                    tracing::debug!("skipping asset {}: {}", asset.url, e);
                    return Vec::new();
                }
                Err(e) => {
                    tracing::warn!("asset fetch task panicked: {}", e);
                    return Vec::new();
                }
            }
        };

        if self.rewrite_links
            && classify::is_css_resource(&file_path, asset.url.as_str(), meta.content_type.as_deref())
        {
            return self.collect_css_refs(&file_path, &asset.url);
        }
        Vec::new()
    }

    /// CSS-passes a freshly fetched asset in place and hands its discovered
    /// references back instead of fetching them here.
    fn collect_css_refs(&self, file_path: &Path, source_url: &Url) -> Vec<DiscoveredRef> {
        let bytes = match fs::read(file_path) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("cannot read fetched css {}: {}", file_path.display(), e);
                return Vec::new();
            }
        };
        let css_text = String::from_utf8_lossy(&bytes).into_owned();
        let base_dir = parent_dir(file_path);

        let ctx = self.context(source_url, &base_dir, Some(file_path));
        let out = css::rewrite_css_content(&css_text, &ctx);

        if out.changed {
            if let Err(e) = storage::write_atomic(file_path, &out.css) {
                tracing::warn!("failed to persist rewritten css: {}", e);
            }
        }
        out.refs
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new("")).to_path_buf()
}
