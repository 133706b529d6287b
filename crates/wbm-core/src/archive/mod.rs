//! Archive transport: capture listing (CDX) queries and snapshot fetches.
//!
//! Uses the curl crate (libcurl) like the rest of our HTTP plumbing. All
//! methods run in the current thread; call from `spawn_blocking` when used
//! from async code. Endpoints are configurable so tests can point the
//! client at a local server.

mod cdx;

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::config::WbmConfig;
use crate::error::MirrorError;
use crate::storage;

/// One capture listing request. `from`/`to` of 0 mean unbounded; `page` of
/// `None` asks for the unpaginated (single-page) listing.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    /// Exact URL or wildcard-subtree pattern (`.../*`).
    pub url_pattern: String,
    pub page: Option<u32>,
    pub from: u64,
    pub to: u64,
    /// Include captures with non-200 status codes.
    pub include_all: bool,
}

/// Response metadata from a snapshot fetch.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    /// `Content-Type` as captured by the archive, if present.
    pub content_type: Option<String>,
}

/// Client for the web archive's listing and snapshot endpoints.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    archive_endpoint: String,
    cdx_endpoint: String,
}

impl ArchiveClient {
    pub fn from_config(cfg: &WbmConfig) -> Self {
        Self {
            archive_endpoint: cfg.archive_endpoint.trim_end_matches('/').to_string(),
            cdx_endpoint: cfg.cdx_endpoint.to_string(),
        }
    }

    /// Snapshot URL for a capture: `{endpoint}/web/{timestamp}id_/{url}`.
    /// The `id_` flag asks the archive for the original bytes without its
    /// replay chrome.
    pub fn snapshot_url(&self, timestamp: &str, resource_url: &str) -> String {
        format!(
            "{}/web/{}id_/{}",
            self.archive_endpoint, timestamp, resource_url
        )
    }

    fn listing_url(&self, query: &ListingQuery) -> Result<String> {
        let mut url = url::Url::parse(&self.cdx_endpoint)
            .with_context(|| format!("invalid CDX endpoint: {}", self.cdx_endpoint))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            pairs.append_pair("output", "json");
            pairs.append_pair("url", &query.url_pattern);
            pairs.append_pair("fl", "timestamp,original");
            pairs.append_pair("collapse", "digest");
            pairs.append_pair("gzip", "false");
            if !query.include_all {
                pairs.append_pair("filter", "statuscode:200");
            }
            if query.from != 0 {
                pairs.append_pair("from", &query.from.to_string());
            }
            if query.to != 0 {
                pairs.append_pair("to", &query.to.to_string());
            }
            if let Some(page) = query.page {
                pairs.append_pair("page", &page.to_string());
            }
        }
        Ok(url.into())
    }

    /// Fetches one listing page and parses it into (timestamp, url) pairs.
    /// A syntactically malformed body parses to an empty page; transport
    /// failures are returned to the caller, which also treats them as an
    /// empty page (end-of-pagination). Blocking.
    pub fn fetch_listing_page(&self, query: &ListingQuery) -> Result<Vec<(String, String)>> {
        let url = self.listing_url(query)?;
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&url).context("invalid listing URL")?;
        easy.follow_location(true)?;
        easy.connect_timeout(Duration::from_secs(15))?;
        easy.timeout(Duration::from_secs(120))?;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform().context("listing request failed")?;
        }

        let code = easy.response_code().context("no response code")?;
        if !(200..300).contains(&code) {
            anyhow::bail!("listing {} returned HTTP {}", url, code);
        }

        Ok(cdx::parse_rows(&String::from_utf8_lossy(&body)))
    }

    /// Downloads a capture's bytes to `final_path`, streaming through a
    /// `.part` temp file renamed into place on success (atomic publish). On
    /// any failure the partial file is removed. Blocking.
    pub fn download_snapshot(
        &self,
        timestamp: &str,
        resource_url: &str,
        final_path: &Path,
    ) -> Result<SnapshotMeta, MirrorError> {
        let snapshot_url = self.snapshot_url(timestamp, resource_url);
        let tmp = storage::temp_path(final_path);

        match self.stream_to_file(&snapshot_url, resource_url, &tmp) {
            Ok(meta) => {
                fs::rename(&tmp, final_path).map_err(|e| {
                    storage::discard_temp(&tmp);
                    MirrorError::fs(final_path, e)
                })?;
                Ok(meta)
            }
            Err(e) => {
                storage::discard_temp(&tmp);
                Err(e)
            }
        }
    }

    fn stream_to_file(
        &self,
        fetch_url: &str,
        resource_url: &str,
        dest: &Path,
    ) -> Result<SnapshotMeta, MirrorError> {
        let file = fs::File::create(dest).map_err(|e| MirrorError::fs(dest, e))?;
        let mut writer = io::BufWriter::new(file);
        let mut write_error: Option<io::Error> = None;

        let mut easy = curl::easy::Easy::new();
        easy.url(fetch_url)
            .map_err(|e| fetch_error(resource_url, e))?;
        easy.follow_location(true)
            .map_err(|e| fetch_error(resource_url, e))?;
        easy.max_redirections(10)
            .map_err(|e| fetch_error(resource_url, e))?;
        easy.connect_timeout(Duration::from_secs(30))
            .map_err(|e| fetch_error(resource_url, e))?;
        easy.low_speed_limit(1024)
            .map_err(|e| fetch_error(resource_url, e))?;
        easy.low_speed_time(Duration::from_secs(60))
            .map_err(|e| fetch_error(resource_url, e))?;

        let perform_result = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match writer.write_all(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        write_error = Some(e);
                        Ok(0) // abort the transfer
                    }
                })
                .map_err(|e| fetch_error(resource_url, e))?;
            transfer.perform()
        };

        if let Some(io_err) = write_error {
            return Err(MirrorError::fs(dest, io_err));
        }
        perform_result.map_err(|e| fetch_error(resource_url, e))?;

        let code = easy
            .response_code()
            .map_err(|e| fetch_error(resource_url, e))?;
        if !(200..300).contains(&code) {
            return Err(MirrorError::BadResponse {
                url: resource_url.to_string(),
                status: code,
            });
        }

        let content_type = easy
            .content_type()
            .ok()
            .flatten()
            .map(|ct| ct.to_string());

        writer.flush().map_err(|e| MirrorError::fs(dest, e))?;
        Ok(SnapshotMeta { content_type })
    }
}

fn fetch_error(url: &str, reason: impl std::fmt::Display) -> MirrorError {
    MirrorError::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
