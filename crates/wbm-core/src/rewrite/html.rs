//! HTML reference rewriting, built on the `lol_html` streaming rewriter.
//!
//! Asset-carrying attributes are rewritten to relative local paths and
//! collected for download; navigational references (`a`, `form`) are
//! rewritten but never enqueued; the top-level manifest covers them.
//! `<style>` blocks and inline `style` attributes go through the CSS pass
//! so assets referenced only from CSS are still discovered.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, rewrite_str, text, RewriteStrSettings};

use super::{
    css, is_internal, relative_target, resolve_asset, DiscoveredRef, HtmlRewrite, RewriteContext,
};
use crate::index::decode_url_path;
use crate::paths;

/// Element/attribute pairs that carry asset references.
const ASSET_SELECTORS: [(&str, &str); 7] = [
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("link[href]", "href"),
    ("source[src]", "src"),
    ("video[src]", "src"),
    ("audio[src]", "src"),
    ("iframe[src]", "src"),
];

/// Navigational references: rewritten when internal, never enqueued.
const NAV_SELECTORS: [(&str, &str); 2] = [("a[href]", "href"), ("form[action]", "action")];

/// Rewrites one HTML document. Pure: returns the new text plus the assets
/// discovered (deduplicated by mapped file path across the whole pass,
/// CSS fragments included).
pub fn rewrite_html_content(
    html: &str,
    ctx: &RewriteContext,
) -> Result<HtmlRewrite, RewritingError> {
    let refs: Rc<RefCell<Vec<DiscoveredRef>>> = Rc::new(RefCell::new(Vec::new()));
    let seen: Rc<RefCell<HashSet<PathBuf>>> = Rc::new(RefCell::new(HashSet::new()));

    let mut handlers = Vec::new();

    for (selector, attr) in ASSET_SELECTORS {
        let refs = Rc::clone(&refs);
        let seen = Rc::clone(&seen);
        handlers.push(element!(selector, move |el| {
            handle_asset(el, attr, ctx, &refs, &seen);
            Ok(())
        }));
    }

    if ctx.rewrite_links {
        for (selector, attr) in NAV_SELECTORS {
            handlers.push(element!(selector, move |el| {
                handle_nav(el, attr, ctx);
                Ok(())
            }));
        }
    }

    // <style> text arrives chunked; buffer to the last chunk, then run the
    // CSS pass over the whole block.
    let style_buf: Rc<RefCell<String>> = Rc::new(RefCell::new(String::new()));
    {
        let refs = Rc::clone(&refs);
        let seen = Rc::clone(&seen);
        let buf = Rc::clone(&style_buf);
        handlers.push(text!("style", move |chunk| {
            buf.borrow_mut().push_str(chunk.as_str());
            if chunk.last_in_text_node() {
                let css_text = std::mem::take(&mut *buf.borrow_mut());
                let rewritten = rewrite_css_fragment(&css_text, ctx, &refs, &seen);
                // Raw insertion: entity-escaping would corrupt CSS selectors.
                chunk.replace(&rewritten, ContentType::Html);
            } else {
                chunk.remove();
            }
            Ok(())
        }));
    }

    {
        let refs = Rc::clone(&refs);
        let seen = Rc::clone(&seen);
        handlers.push(element!("*[style]", move |el| {
            if let Some(style) = el.get_attribute("style") {
                let rewritten = rewrite_css_fragment(&style, ctx, &refs, &seen);
                if rewritten != style {
                    el.set_attribute("style", &rewritten)?;
                }
            }
            Ok(())
        }));
    }

    if ctx.remove_canonical {
        handlers.push(element!("link[rel]", |el| {
            let canonical = el
                .get_attribute("rel")
                .map_or(false, |rel| rel.trim().eq_ignore_ascii_case("canonical"));
            if canonical {
                el.remove();
            }
            Ok(())
        }));
    }

    let out = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )?;

    let refs = Rc::try_unwrap(refs)
        .map(RefCell::into_inner)
        .unwrap_or_else(|rc| rc.borrow().clone());

    Ok(HtmlRewrite { html: out, refs })
}

fn handle_asset(
    el: &mut Element,
    attr: &str,
    ctx: &RewriteContext,
    refs: &RefCell<Vec<DiscoveredRef>>,
    seen: &RefCell<HashSet<PathBuf>>,
) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    let Some(resolved) = resolve_asset(&value, ctx) else {
        return;
    };

    if ctx.rewrite_links {
        let target = relative_target(&resolved.mapping, &resolved.url, ctx.base_dir);
        if el.set_attribute(attr, &target).is_err() {
            tracing::debug!("could not rewrite {} attribute for {}", attr, resolved.url);
        }
    }

    if seen
        .borrow_mut()
        .insert(resolved.mapping.file_path.clone())
    {
        refs.borrow_mut().push(DiscoveredRef {
            url: resolved.url,
            mapping: resolved.mapping,
        });
    }
}

fn handle_nav(el: &mut Element, attr: &str, ctx: &RewriteContext) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }
    let Ok(abs) = ctx.source_url.join(trimmed) else {
        return;
    };
    if !matches!(abs.scheme(), "http" | "https") {
        return;
    }
    if !is_internal(&abs, ctx.site_host) {
        return;
    }

    let file_id = decode_url_path(abs.path());
    let local_abs = ctx.backup_root.join(paths::local_target_for_path(&file_id));
    let mut target = paths::relative_link(ctx.base_dir, &local_abs);
    if let Some(fragment) = abs.fragment() {
        target.push('#');
        target.push_str(fragment);
    }
    if el.set_attribute(attr, &target).is_err() {
        tracing::debug!("could not rewrite {} attribute for {}", attr, abs);
    }
}

/// CSS sub-pass for `<style>` blocks and inline `style` attributes; merges
/// its discoveries into the page-wide deduplicated set.
fn rewrite_css_fragment(
    css_text: &str,
    ctx: &RewriteContext,
    refs: &RefCell<Vec<DiscoveredRef>>,
    seen: &RefCell<HashSet<PathBuf>>,
) -> String {
    let out = css::rewrite_css_content(css_text, ctx);
    for r in out.refs {
        if seen.borrow_mut().insert(r.mapping.file_path.clone()) {
            refs.borrow_mut().push(r);
        }
    }
    out.css
}
