//! Error taxonomy for a mirror run.
//!
//! Only `InvalidUrl` is fatal (it fires before the listing phase starts).
//! Everything else is per-item and recovered by skipping the item or leaving
//! the document unrewritten.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// Base URL failed normalization. Aborts the run before listing begins.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Network-level failure fetching a single capture.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Non-success HTTP status for a single capture.
    #[error("bad response for {url}: HTTP {status}")]
    BadResponse { url: String, status: u32 },

    /// Filesystem failure other than "already exists".
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be parsed or rewritten; the original download is kept.
    #[error("rewrite failed for {path}: {reason}")]
    Rewrite { path: PathBuf, reason: String },
}

impl MirrorError {
    pub(crate) fn fs(path: &std::path::Path, source: std::io::Error) -> Self {
        MirrorError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}
