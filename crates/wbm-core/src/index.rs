//! Capture index: deduplicating map from resource identity to its
//! best-known capture.
//!
//! Built once during the listing phase, then frozen and read-only for the
//! download phase (`resolve` takes `&self` and needs no locking).

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use url::Url;

/// Resource identity: decoded URL path plus raw query string, with defined
/// equality and ordering (no string-concatenation keys).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub path: String,
    pub query: String,
}

/// One archived capture of a resource. `timestamp` is the archive's
/// fixed-width `YYYYMMDDhhmmss` digit string, so lexicographic comparison is
/// chronological comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    /// Original absolute URL of the captured resource.
    pub url: String,
    pub timestamp: String,
    /// Decoded URL path; the resource's canonical identity key.
    pub file_id: String,
}

/// Percent-decodes a URL path, tolerating decode failure by falling back to
/// the raw path (archive listings contain malformed historical entries).
pub fn decode_url_path(raw: &str) -> String {
    match percent_encoding::percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Deduplicating capture index keyed by decoded path (primary, drives the
/// manifest) and by path+query (secondary, for asset timestamp resolution).
#[derive(Debug, Default)]
pub struct CaptureIndex {
    by_path: BTreeMap<String, CaptureRecord>,
    by_path_and_query: BTreeMap<ResourceKey, CaptureRecord>,
    manifest: OnceCell<Vec<CaptureRecord>>,
}

impl CaptureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one (url, timestamp) listing pair. No-op on empty arguments
    /// or an unparsable URL. For each key the stored record is replaced when
    /// the incoming timestamp is `>=` the stored one, so among true timestamp
    /// ties the last registration (listing order) wins; listing order is not
    /// guaranteed to favor any particular capture among such ties.
    pub fn register(&mut self, url: &str, timestamp: &str) {
        if url.is_empty() || timestamp.is_empty() {
            return;
        }
        let Ok(parsed) = Url::parse(url) else {
            return;
        };

        let path = decode_url_path(parsed.path());
        let key = ResourceKey {
            path: path.clone(),
            query: parsed.query().unwrap_or("").to_string(),
        };
        let record = CaptureRecord {
            url: url.to_string(),
            timestamp: timestamp.to_string(),
            file_id: path.clone(),
        };

        let replace_by_path = match self.by_path.get(&path) {
            None => true,
            Some(current) => current.timestamp.as_str() <= timestamp,
        };
        if replace_by_path {
            self.by_path.insert(path, record.clone());
        }

        let replace_by_query = match self.by_path_and_query.get(&key) {
            None => true,
            Some(current) => current.timestamp.as_str() <= timestamp,
        };
        if replace_by_query {
            self.by_path_and_query.insert(key, record);
        }

        self.manifest.take();
    }

    /// The distinct top-level resources to download: path-keyed records
    /// sorted by timestamp descending (ties in path order). No two entries
    /// share a `file_id`. Lazily built and cached until the next `register`.
    pub fn manifest(&self) -> &[CaptureRecord] {
        self.manifest.get_or_init(|| {
            let mut entries: Vec<CaptureRecord> = self.by_path.values().cloned().collect();
            entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            entries
        })
    }

    /// Number of distinct resources indexed.
    pub fn resource_count(&self) -> usize {
        self.by_path.len()
    }

    /// Best-known capture timestamp for an asset URL: the exact path+query
    /// capture if one was observed (cache-busting query strings resolve to
    /// their own capture), else the best capture of the path alone, else
    /// `fallback` (typically the referencing page's timestamp).
    pub fn resolve(&self, asset_url: &str, fallback: &str) -> String {
        let Ok(parsed) = Url::parse(asset_url) else {
            return fallback.to_string();
        };
        let path = decode_url_path(parsed.path());
        let key = ResourceKey {
            path: path.clone(),
            query: parsed.query().unwrap_or("").to_string(),
        };
        if let Some(record) = self.by_path_and_query.get(&key) {
            return record.timestamp.clone();
        }
        if let Some(record) = self.by_path.get(&path) {
            return record.timestamp.clone();
        }
        fallback.to_string()
    }
}
