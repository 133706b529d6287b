//! Download orchestrator.
//!
//! Runs the manifest through a bounded pool of workers: path mapping,
//! skip-if-exists resumability, snapshot fetch with atomic publish, then
//! the rewrite passes. A single item's failure is never fatal to the batch;
//! only base-URL normalization aborts the run.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use url::Url;

use crate::archive::{ArchiveClient, SnapshotMeta};
use crate::assets::AssetManager;
use crate::classify;
use crate::config::{MirrorOptions, WbmConfig};
use crate::error::MirrorError;
use crate::index::CaptureRecord;
use crate::listing;
use crate::normalize::normalize_base_url;
use crate::paths::{self, PathMapping};
use crate::storage;

/// Aggregate result of a mirror run. Always produced, regardless of
/// individual item failures.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub total: usize,
    pub downloaded: usize,
    pub skipped_existing: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn processed(&self) -> usize {
        self.downloaded + self.skipped_existing + self.skipped_invalid + self.failed
    }
}

/// Per-item progress snapshot sent to the front end.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Downloaded,
    SkippedExisting,
    SkippedInvalid,
    Failed,
}

/// Mirrors `options.base_url` into its backup directory: normalize, build
/// the capture index from the listing, then drain the manifest through a
/// pool of at most `options.concurrency` in-flight items.
///
/// Re-running against a partially completed mirror performs no redundant
/// fetches: every already-mapped file on disk is skipped without network
/// access.
pub async fn run_mirror(
    options: &MirrorOptions,
    config: &WbmConfig,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
) -> Result<RunStats, MirrorError> {
    let base = normalize_base_url(&options.base_url)?;
    let client = ArchiveClient::from_config(config);
    let backup_root = options.backup_root(&base);
    let started = Instant::now();

    tracing::info!(
        "mirroring {} into {}",
        base.canonical_url,
        backup_root.display()
    );

    let index = Arc::new(listing::build_capture_index(&client, &base, options).await);
    let manifest: Vec<CaptureRecord> = index.manifest().to_vec();
    let total = manifest.len();
    if total == 0 {
        tracing::info!("nothing to download");
        return Ok(RunStats {
            elapsed: started.elapsed(),
            ..RunStats::default()
        });
    }

    let assets = AssetManager::new(
        client.clone(),
        Arc::clone(&index),
        backup_root.clone(),
        base.unicode_host.clone(),
        options,
    );
    let worker = Worker {
        client,
        assets,
        backup_root,
        rewrite_links: options.rewrite_links,
    };

    let concurrency = options.concurrency.max(1);
    let mut items = manifest.into_iter();
    let mut pool = tokio::task::JoinSet::new();
    let mut stats = RunStats {
        total,
        ..RunStats::default()
    };
    let mut processed = 0usize;

    loop {
        while pool.len() < concurrency {
            let Some(record) = items.next() else {
                break;
            };
            let worker = worker.clone();
            pool.spawn(async move { worker.download_item(record).await });
        }

        if pool.is_empty() {
            break;
        }
        let Some(joined) = pool.join_next().await else {
            break;
        };
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("download task join: {}", e);
                ItemOutcome::Failed
            }
        };
        match outcome {
            ItemOutcome::Downloaded => stats.downloaded += 1,
            ItemOutcome::SkippedExisting => stats.skipped_existing += 1,
            ItemOutcome::SkippedInvalid => stats.skipped_invalid += 1,
            ItemOutcome::Failed => stats.failed += 1,
        }
        processed += 1;
        if let Some(tx) = &progress {
            let _ = tx.send(ProgressUpdate { processed, total }).await;
        }
    }

    stats.elapsed = started.elapsed();
    tracing::info!(
        "run complete: {} items in {:.2}s ({} downloaded, {} existing, {} invalid, {} failed)",
        stats.processed(),
        stats.elapsed.as_secs_f64(),
        stats.downloaded,
        stats.skipped_existing,
        stats.skipped_invalid,
        stats.failed
    );
    Ok(stats)
}

#[derive(Clone)]
struct Worker {
    client: ArchiveClient,
    assets: AssetManager,
    backup_root: PathBuf,
    rewrite_links: bool,
}

impl Worker {
    /// One manifest item: map → skip-if-exists → fetch (atomic publish) →
    /// rewrite pass. Every early return is a terminal per-item state.
    async fn download_item(&self, record: CaptureRecord) -> ItemOutcome {
        let Some(mapping) = paths::determine_paths(&record.url, &record.file_id, &self.backup_root)
        else {
            tracing::info!("skipping invalid resource {}", record.url);
            return ItemOutcome::SkippedInvalid;
        };

        if mapping.file_path.exists() {
            return ItemOutcome::SkippedExisting;
        }

        if let Err(e) = storage::ensure_dir(&mapping.dir_path) {
            tracing::warn!("cannot create directory for {}: {}", record.url, e);
            return ItemOutcome::Failed;
        }

        let meta = {
            let client = self.client.clone();
            let url = record.url.clone();
            let timestamp = record.timestamp.clone();
            let dest = mapping.file_path.clone();
            match tokio::task::spawn_blocking(move || {
                client.download_snapshot(&timestamp, &url, &dest)
            })
            .await
            {
                Ok(Ok(meta)) => meta,
                Ok(Err(e)) => {
                    tracing::debug!("skipping {}: {}", record.url, e);
                    return ItemOutcome::Failed;
                }
                Err(e) => {
                    tracing::warn!("download task panicked for {}: {}", record.url, e);
                    return ItemOutcome::Failed;
                }
            }
        };

        if self.rewrite_links {
            self.run_rewrite_passes(&record, &mapping, &meta).await;
        }
        ItemOutcome::Downloaded
    }

    /// CSS or HTML pass for a saved document. Rewrite failures leave the
    /// document as downloaded and never fail the item.
    async fn run_rewrite_passes(
        &self,
        record: &CaptureRecord,
        mapping: &PathMapping,
        meta: &SnapshotMeta,
    ) {
        let Ok(page_url) = Url::parse(&record.url) else {
            tracing::debug!("unparsable resource URL {}, skipping rewrite", record.url);
            return;
        };
        let content_type = meta.content_type.as_deref();

        if classify::is_css_resource(&mapping.file_path, &record.url, content_type) {
            if let Err(e) = self
                .assets
                .rewrite_css_file(&mapping.file_path, &page_url, &record.timestamp)
                .await
            {
                tracing::warn!("css rewrite skipped: {}", e);
            }
            return;
        }

        let head = read_head(&mapping.file_path);
        if classify::is_html_file(&mapping.file_path, content_type, &head) {
            if let Err(e) = self
                .assets
                .process_html_file(&mapping.file_path, &page_url, &record.timestamp)
                .await
            {
                tracing::warn!("html rewrite skipped: {}", e);
            }
        }
    }
}

/// First bytes of a saved file, for content sniffing. Errors read as empty.
fn read_head(path: &std::path::Path) -> Vec<u8> {
    let mut head = vec![0u8; classify::SNIFF_LEN];
    match fs::File::open(path).and_then(|mut f| f.read(&mut head)) {
        Ok(n) => {
            head.truncate(n);
            head
        }
        Err(_) => Vec::new(),
    }
}
