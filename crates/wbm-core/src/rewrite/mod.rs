//! Link rewrite engine.
//!
//! Both passes are pure transforms: `(document text, context) → (new text,
//! discovered references)`. Nothing here touches the network or the disk;
//! the asset pipeline decides what to fetch and when to persist.

pub mod css;
pub mod html;

use std::path::Path;

use url::Url;

use crate::index::decode_url_path;
use crate::normalize::to_unicode_host;
use crate::paths::{self, PathMapping};

/// Context for one document's rewrite pass.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    /// URL the document's references resolve against (the page URL, or a CSS
    /// file's own source URL; they differ when the CSS is itself an asset).
    pub source_url: &'a Url,
    /// Directory of the document on disk; relative links are computed from here.
    pub base_dir: &'a Path,
    pub backup_root: &'a Path,
    /// Unicode form of the mirrored site's host.
    pub site_host: &'a str,
    pub rewrite_links: bool,
    pub remove_canonical: bool,
    pub download_external_assets: bool,
    /// Mapped file that must not be re-enqueued (a CSS file rewriting itself).
    pub exclude_path: Option<&'a Path>,
}

/// Asset reference discovered during a pass, to be fetched if its mapped
/// file is missing. Deduplicated by `mapping.file_path` within the pass.
#[derive(Debug, Clone)]
pub struct DiscoveredRef {
    pub url: Url,
    pub mapping: PathMapping,
}

#[derive(Debug)]
pub struct HtmlRewrite {
    pub html: String,
    pub refs: Vec<DiscoveredRef>,
}

#[derive(Debug)]
pub struct CssRewrite {
    pub css: String,
    /// True only when some substitution actually altered the text.
    pub changed: bool,
    pub refs: Vec<DiscoveredRef>,
}

/// True when `url`'s hostname (www-stripped, IDNA-normalized) equals the
/// mirrored site's host.
pub(crate) fn is_internal(url: &Url, site_host: &str) -> bool {
    match url.host_str() {
        Some(host) => {
            let bare = host.strip_prefix("www.").unwrap_or(host);
            to_unicode_host(bare) == site_host
        }
        None => false,
    }
}

pub(crate) struct ResolvedAsset {
    pub url: Url,
    pub mapping: PathMapping,
}

/// Resolves a raw asset reference against the document's source URL,
/// applying the internal/external download policy and the path mapping.
/// `None` means the reference is left untouched.
pub(crate) fn resolve_asset(raw: &str, ctx: &RewriteContext) -> Option<ResolvedAsset> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("data:") || lower.starts_with("javascript:") {
        return None;
    }

    let abs = ctx.source_url.join(trimmed).ok()?;
    if !matches!(abs.scheme(), "http" | "https") {
        return None;
    }
    if !is_internal(&abs, ctx.site_host) && !ctx.download_external_assets {
        return None;
    }

    let file_id = decode_url_path(abs.path());
    let mapping = paths::determine_paths(abs.as_str(), &file_id, ctx.backup_root)?;
    Some(ResolvedAsset { url: abs, mapping })
}

/// Relative link from the document's directory to an asset's mapped file,
/// with the reference's fragment re-appended.
pub(crate) fn relative_target(mapping: &PathMapping, url: &Url, base_dir: &Path) -> String {
    let mut target = paths::relative_link(base_dir, &mapping.file_path);
    if let Some(fragment) = url.fragment() {
        target.push('#');
        target.push_str(fragment);
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_hosts_match_across_www_and_idna_forms() {
        let site = "example.com";
        for u in [
            "https://example.com/a",
            "http://www.example.com/a",
            "https://EXAMPLE.com/a",
        ] {
            assert!(is_internal(&Url::parse(u).unwrap(), site), "{u}");
        }
        assert!(!is_internal(
            &Url::parse("https://cdn.example.com/a").unwrap(),
            site
        ));
        assert!(!is_internal(&Url::parse("https://other.org/a").unwrap(), site));
    }
}
