//! Listing phase: walk the archive's paginated capture listing for every
//! base variant and build the capture index.

use crate::archive::{ArchiveClient, ListingQuery};
use crate::config::MirrorOptions;
use crate::index::CaptureIndex;
use crate::normalize::NormalizedBase;

/// Upper bound on wildcard listing pages fetched per base variant.
pub const MAX_LISTING_PAGES: u32 = 100;

/// Wildcard-subtree pattern for a base URL (`https://x.com` → `https://x.com/*`).
pub fn wildcard_pattern(base: &str) -> String {
    if base.ends_with("/*") {
        base.to_string()
    } else {
        format!("{}/*", base.trim_end_matches('/'))
    }
}

/// Builds the capture index from the archive listing: one exact query per
/// base variant, then (unless `exact_url`) wildcard-subtree pages until an
/// empty page. Registration order is the order pages arrive, which decides
/// equal-timestamp ties.
pub async fn build_capture_index(
    client: &ArchiveClient,
    base: &NormalizedBase,
    options: &MirrorOptions,
) -> CaptureIndex {
    let mut index = CaptureIndex::new();

    for variant in &base.variants {
        let query = ListingQuery {
            url_pattern: variant.clone(),
            page: None,
            from: options.from_timestamp,
            to: options.to_timestamp,
            include_all: true,
        };
        register_rows(&mut index, fetch_page(client, query).await);

        if options.exact_url {
            continue;
        }

        let pattern = wildcard_pattern(variant);
        for page in 0..MAX_LISTING_PAGES {
            let query = ListingQuery {
                url_pattern: pattern.clone(),
                page: Some(page),
                from: options.from_timestamp,
                to: options.to_timestamp,
                include_all: true,
            };
            let rows = fetch_page(client, query).await;
            if rows.is_empty() {
                break;
            }
            register_rows(&mut index, rows);
        }
    }

    tracing::info!(
        "listing complete: {} distinct resources",
        index.resource_count()
    );
    index
}

/// One listing page; failures degrade to an empty page (end-of-pagination).
/// A transient failure is indistinguishable from real end-of-data here, so
/// this can truncate pagination early; no retry, per the listing API's
/// documented tolerance policy.
async fn fetch_page(client: &ArchiveClient, query: ListingQuery) -> Vec<(String, String)> {
    let client = client.clone();
    let pattern = query.url_pattern.clone();
    let joined = tokio::task::spawn_blocking(move || client.fetch_listing_page(&query)).await;
    match joined {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            tracing::warn!("listing page for {} failed, treating as empty: {:#}", pattern, e);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("listing task for {} panicked: {}", pattern, e);
            Vec::new()
        }
    }
}

fn register_rows(index: &mut CaptureIndex, rows: Vec<(String, String)>) {
    for (timestamp, url) in rows {
        index.register(&url, &timestamp);
    }
}
