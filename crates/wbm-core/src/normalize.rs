//! Base URL normalization.
//!
//! Turns user input (bare domain or full URL) into the canonical site
//! identity plus the scheme/`www` query variants the archive may have
//! indexed the site under.

use url::Url;

use crate::error::MirrorError;

/// Canonical identity of the site being mirrored, computed once at startup.
#[derive(Debug, Clone)]
pub struct NormalizedBase {
    /// `https://{bare_host}{port}{path}` with no trailing slash.
    pub canonical_url: String,
    /// Equivalent absolute URL forms ({https,http} x {host, www-toggled host}),
    /// in deterministic order. Sites get archived under inconsistent
    /// scheme/`www` forms over their history; the listing phase queries all.
    pub variants: Vec<String>,
    /// ASCII hostname with one leading `www.` stripped.
    pub bare_host: String,
    /// Internationalized (IDNA) form of `bare_host`, used for display and
    /// hostname-equality checks during reference classification.
    pub unicode_host: String,
}

/// Normalizes a raw domain/URL string into a [`NormalizedBase`].
///
/// Assumes `https` when no scheme prefix is present. Fails with
/// [`MirrorError::InvalidUrl`] on parse failure, a non-http(s) scheme, or an
/// empty hostname. Pure; no I/O.
pub fn normalize_base_url(input: &str) -> Result<NormalizedBase, MirrorError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(MirrorError::InvalidUrl(
            "base URL must not be empty".into(),
        ));
    }

    let with_scheme = if has_scheme_prefix(raw) {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| MirrorError::InvalidUrl(format!("{raw}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MirrorError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {raw}"
            )))
        }
    }

    let ascii_host = match parsed.host_str() {
        Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
        _ => {
            return Err(MirrorError::InvalidUrl(format!(
                "{raw}: URL must contain a hostname"
            )))
        }
    };

    let bare_host = ascii_host
        .strip_prefix("www.")
        .unwrap_or(&ascii_host)
        .to_string();
    let unicode_host = to_unicode_host(&bare_host);

    let port = match parsed.port() {
        Some(p) => format!(":{p}"),
        None => String::new(),
    };

    let base_path = match parsed.path() {
        "/" => "",
        p => p.trim_end_matches('/'),
    }
    .to_string();

    let canonical_url = format!("https://{bare_host}{port}{base_path}");

    // Bare form first, then the www-toggled counterpart (only meaningful for
    // dotted hosts; `www.localhost` was never archived as anything).
    let mut host_forms = vec![format!("{bare_host}{port}")];
    if ascii_host != bare_host {
        host_forms.push(format!("{ascii_host}{port}"));
    } else if bare_host.contains('.') {
        host_forms.push(format!("www.{bare_host}{port}"));
    }

    let mut variants = Vec::with_capacity(host_forms.len() * 2);
    for scheme in ["https", "http"] {
        for host in &host_forms {
            variants.push(format!("{scheme}://{host}{base_path}"));
        }
    }

    Ok(NormalizedBase {
        canonical_url,
        variants,
        bare_host,
        unicode_host,
    })
}

/// Internationalized form of an ASCII hostname, lowercased. Falls back to the
/// input when IDNA conversion reports errors.
pub fn to_unicode_host(host: &str) -> String {
    let (unicode, result) = idna::domain_to_unicode(host);
    if result.is_err() || unicode.is_empty() {
        host.to_ascii_lowercase()
    } else {
        unicode.to_lowercase()
    }
}

/// True when the input already carries a `scheme:` prefix (RFC 3986 shape).
fn has_scheme_prefix(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for c in chars {
        match c {
            ':' => return true,
            c if c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-') => {}
            _ => return false,
        }
    }
    false
}
