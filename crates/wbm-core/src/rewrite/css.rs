//! CSS reference rewriting: `url(...)` tokens and quoted `@import`s.

use std::collections::HashSet;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{relative_target, resolve_asset, CssRewrite, DiscoveredRef, RewriteContext};

static URL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^'"\)\s][^\)]*?))\s*\)"#)
        .expect("url() pattern")
});

// Quoted form only; `@import url(...)` is already covered by URL_REF.
static IMPORT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+(?:"([^"]+)"|'([^']+)')"#).expect("@import pattern")
});

/// Rewrites internal references in `css` to relative local paths and
/// collects the assets they point at. References are rewritten only when
/// the computed relative path differs from the original token; `changed`
/// reports whether any substitution altered the text.
pub fn rewrite_css_content(css: &str, ctx: &RewriteContext) -> CssRewrite {
    if !ctx.rewrite_links || css.trim().is_empty() {
        return CssRewrite {
            css: css.to_string(),
            changed: false,
            refs: Vec::new(),
        };
    }

    let mut refs: Vec<DiscoveredRef> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut changed = false;

    let after_urls = URL_REF.replace_all(css, |caps: &Captures| {
        let (quote, value) = quoted_value(caps);
        match process_reference(value, ctx, &mut refs, &mut seen) {
            Some(replacement) if replacement != value => {
                changed = true;
                format!("url({quote}{replacement}{quote})")
            }
            _ => caps[0].to_string(),
        }
    });

    let after_imports = IMPORT_REF.replace_all(&after_urls, |caps: &Captures| {
        let (quote, value) = quoted_value(caps);
        match process_reference(value, ctx, &mut refs, &mut seen) {
            Some(replacement) if replacement != value => {
                changed = true;
                format!("@import {quote}{replacement}{quote}")
            }
            _ => caps[0].to_string(),
        }
    });

    CssRewrite {
        css: after_imports.into_owned(),
        changed,
        refs,
    }
}

fn quoted_value<'c>(caps: &'c Captures) -> (&'static str, &'c str) {
    if let Some(m) = caps.get(1) {
        ("\"", m.as_str())
    } else if let Some(m) = caps.get(2) {
        ("'", m.as_str())
    } else {
        ("", caps.get(3).map(|m| m.as_str()).unwrap_or(""))
    }
}

/// Classifies and maps one reference; returns its relative replacement.
/// Skips `data:`/`javascript:`/fragment-only tokens and (per policy)
/// external hosts. Enqueues the mapped file unless it is the document's own
/// path or already seen in this pass.
fn process_reference(
    raw: &str,
    ctx: &RewriteContext,
    refs: &mut Vec<DiscoveredRef>,
    seen: &mut HashSet<PathBuf>,
) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let resolved = resolve_asset(trimmed, ctx)?;

    let excluded = ctx
        .exclude_path
        .map_or(false, |own| own == resolved.mapping.file_path);
    if !excluded && seen.insert(resolved.mapping.file_path.clone()) {
        refs.push(DiscoveredRef {
            url: resolved.url.clone(),
            mapping: resolved.mapping.clone(),
        });
    }

    Some(relative_target(&resolved.mapping, &resolved.url, ctx.base_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use url::Url;

    fn ctx<'a>(source: &'a Url, base_dir: &'a Path, exclude: Option<&'a Path>) -> RewriteContext<'a> {
        RewriteContext {
            source_url: source,
            base_dir,
            backup_root: Path::new("backup"),
            site_host: "x.com",
            rewrite_links: true,
            remove_canonical: false,
            download_external_assets: false,
            exclude_path: exclude,
        }
    }

    #[test]
    fn discovers_imports_and_urls_and_rewrites_only_what_differs() {
        let source = Url::parse("https://x.com/css/main.css").unwrap();
        let base = Path::new("backup/css");
        let css = "@import \"fonts.css\";\nbody { background: url(../img/bg.png); }\nh1 { background: url(/img/logo.png); }";

        let out = rewrite_css_content(css, &ctx(&source, base, None));

        // Three internal references discovered...
        assert_eq!(out.refs.len(), 3);
        // ...but only the root-absolute one needed rewriting.
        assert!(out.changed);
        assert!(out.css.contains("@import \"fonts.css\";"));
        assert!(out.css.contains("url(../img/bg.png)"));
        assert!(out.css.contains("url(../img/logo.png)"));
    }

    #[test]
    fn unchanged_tokens_leave_text_unchanged() {
        let source = Url::parse("https://x.com/css/main.css").unwrap();
        let base = Path::new("backup/css");
        let css = "@import \"fonts.css\";";

        let out = rewrite_css_content(css, &ctx(&source, base, None));
        assert!(!out.changed);
        assert_eq!(out.css, css);
        assert_eq!(out.refs.len(), 1);
    }

    #[test]
    fn import_plus_url_enqueue_exactly_two() {
        let source = Url::parse("https://x.com/main.css").unwrap();
        let base = Path::new("backup");
        let css = "@import \"fonts.css\";\nbody { background: url(../img/bg.png); }";

        let out = rewrite_css_content(css, &ctx(&source, base, None));
        assert_eq!(out.refs.len(), 2);
        // `../img/bg.png` resolves above the site root and maps to img/bg.png.
        assert!(out.css.contains("url(img/bg.png)"));
        assert!(out.css.contains("@import \"fonts.css\";"));
    }

    #[test]
    fn skips_data_javascript_and_fragment_refs() {
        let source = Url::parse("https://x.com/style.css").unwrap();
        let base = Path::new("backup");
        let css = "a { background: url(data:image/png;base64,xyz); b: url(#frag); c: url(javascript:void(0)); }";

        let out = rewrite_css_content(css, &ctx(&source, base, None));
        assert!(!out.changed);
        assert!(out.refs.is_empty());
    }

    #[test]
    fn external_hosts_skipped_unless_enabled() {
        let source = Url::parse("https://x.com/style.css").unwrap();
        let base = Path::new("backup");
        let css = "a { background: url(https://cdn.other.com/bg.png); }";

        let out = rewrite_css_content(css, &ctx(&source, base, None));
        assert!(out.refs.is_empty());
        assert!(!out.changed);

        let mut with_external = ctx(&source, base, None);
        with_external.download_external_assets = true;
        let out = rewrite_css_content(css, &with_external);
        assert_eq!(out.refs.len(), 1);
        assert!(out.changed);
    }

    #[test]
    fn own_path_is_rewritten_but_never_enqueued() {
        let source = Url::parse("https://x.com/css/main.css").unwrap();
        let base = Path::new("backup/css");
        let own = Path::new("backup/css/main.css");
        let css = "@import \"/css/main.css\";";

        let out = rewrite_css_content(css, &ctx(&source, base, Some(own)));
        assert!(out.refs.is_empty());
        assert!(out.changed);
        assert!(out.css.contains("@import \"main.css\";"));
    }

    #[test]
    fn duplicate_references_enqueue_once() {
        let source = Url::parse("https://x.com/style.css").unwrap();
        let base = Path::new("backup");
        let css = "a { background: url(/bg.png); } b { background: url('/bg.png'); }";

        let out = rewrite_css_content(css, &ctx(&source, base, None));
        assert_eq!(out.refs.len(), 1);
    }

    #[test]
    fn quote_style_is_preserved() {
        let source = Url::parse("https://x.com/style.css").unwrap();
        let base = Path::new("backup");
        let css = "a { x: url('/a.png'); y: url(\"/b.png\"); z: url(/c.png); }";

        let out = rewrite_css_content(css, &ctx(&source, base, None));
        assert!(out.css.contains("url('a.png')"));
        assert!(out.css.contains("url(\"b.png\")"));
        assert!(out.css.contains("url(c.png)"));
    }

    #[test]
    fn disabled_rewriting_is_a_passthrough() {
        let source = Url::parse("https://x.com/style.css").unwrap();
        let base = Path::new("backup");
        let mut disabled = ctx(&source, base, None);
        disabled.rewrite_links = false;

        let out = rewrite_css_content("a { b: url(/c.png); }", &disabled);
        assert!(!out.changed);
        assert!(out.refs.is_empty());
        assert_eq!(out.css, "a { b: url(/c.png); }");
    }
}
