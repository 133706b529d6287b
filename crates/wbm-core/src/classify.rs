//! Classify downloaded content as HTML or CSS for the rewrite passes.

use std::path::Path;

use url::Url;

const HTML_EXTENSIONS: [&str; 5] = ["html", "htm", "php", "asp", "aspx"];

/// How many leading bytes are worth sniffing for an HTML signature.
pub const SNIFF_LEN: usize = 512;

/// True when the saved file should go through the HTML pass: content type
/// says `text/html`, the extension is HTML-ish, or the first bytes carry a
/// doctype/`<html` signature.
pub fn is_html_file(file_path: &Path, content_type: Option<&str>, head: &[u8]) -> bool {
    if content_type_contains(content_type, "text/html") {
        return true;
    }
    if let Some(ext) = extension_lowercase(file_path) {
        if HTML_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }
    sniff_html(head)
}

/// True when the saved file should go through the CSS pass: `.css`
/// extension, `text/css` content type, or a URL path ending in `.css`.
pub fn is_css_resource(
    file_path: &Path,
    resource_url: &str,
    content_type: Option<&str>,
) -> bool {
    if extension_lowercase(file_path).as_deref() == Some("css") {
        return true;
    }
    if content_type_contains(content_type, "text/css") {
        return true;
    }
    if let Ok(parsed) = Url::parse(resource_url) {
        if parsed.path().to_ascii_lowercase().ends_with(".css") {
            return true;
        }
    }
    false
}

fn content_type_contains(content_type: Option<&str>, needle: &str) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn sniff_html(head: &[u8]) -> bool {
    let head = &head[..head.len().min(SNIFF_LEN)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    if text.contains("<!doctype html") {
        return true;
    }
    match text.find("<html") {
        Some(pos) => matches!(
            text.as_bytes().get(pos + "<html".len()).copied(),
            Some(b' ' | b'\t' | b'\n' | b'\r' | b'>')
        ),
        None => false,
    }
}
