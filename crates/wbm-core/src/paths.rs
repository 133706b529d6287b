//! URL → filesystem path mapping.
//!
//! Pure and deterministic across runs and process restarts; this is what
//! makes "skip if file exists" a correct resumability check.

use std::path::{Component, Path, PathBuf};

/// Longest `file_id` we are willing to map; longer identities are
/// filesystem-hostile and rejected.
const MAX_FILE_ID_CHARS: usize = 200;

/// Local directory and file a resource maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub dir_path: PathBuf,
    pub file_path: PathBuf,
}

/// Maps a resource to its local location under `backup_root`.
///
/// Returns `None` for `data:`/`javascript:` URLs and for `file_id`s longer
/// than 200 characters. An empty `file_id` is the site root
/// (`backup_root/index.html`); a URL path ending in `/` or an extensionless
/// last segment is directory-like and materializes as `.../index.html`.
pub fn determine_paths(
    resource_url: &str,
    file_id: &str,
    backup_root: &Path,
) -> Option<PathMapping> {
    if resource_url.starts_with("data:") || resource_url.starts_with("javascript:") {
        return None;
    }
    if file_id.chars().count() > MAX_FILE_ID_CHARS {
        return None;
    }

    let segments = path_segments(file_id);
    let (dir_path, file_path) = if segments.is_empty() {
        (backup_root.to_path_buf(), backup_root.join("index.html"))
    } else {
        let last = segments[segments.len() - 1];
        if resource_url.ends_with('/') || !last.contains('.') {
            let dir = join_segments(backup_root, &segments);
            let file = dir.join("index.html");
            (dir, file)
        } else {
            let dir = join_segments(backup_root, &segments[..segments.len() - 1]);
            let file = join_segments(backup_root, &segments);
            (dir, file)
        }
    };

    Some(PathMapping {
        dir_path: sanitize_for_platform(dir_path),
        file_path: sanitize_for_platform(file_path),
    })
}

/// Archive-filesystem convention for a URL path: directory-like targets
/// resolve to their `index.html`. Returns a path relative to the backup root
/// with `/` separators and no leading slash.
pub fn local_target_for_path(path: &str) -> String {
    let segments = path_segments(path);
    let dir_like = path.ends_with('/')
        || segments.last().map_or(true, |last| !last.contains('.'));
    let mut target = segments.join("/");
    if dir_like {
        if !target.is_empty() {
            target.push('/');
        }
        target.push_str("index.html");
    }
    target
}

/// Relative link from `from_dir` to `to_file`, `/`-separated. Resolving the
/// result against `from_dir` yields exactly `to_file`.
pub fn relative_link(from_dir: &Path, to_file: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = to_file.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for component in &to[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }

    if parts.is_empty() {
        return to_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    parts.join("/")
}

/// Non-empty path segments, with `.`/`..` dropped so a hostile decoded path
/// cannot escape the backup root.
fn path_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect()
}

fn join_segments(root: &Path, segments: &[&str]) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in segments {
        out.push(segment);
    }
    out
}

/// Percent-encodes characters Windows reserves in path components.
/// Compiled everywhere for testability, applied only on Windows.
#[cfg_attr(not(windows), allow(dead_code))]
fn encode_reserved_chars(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            ':' | '*' | '?' | '&' | '=' | '<' | '>' | '\\' | '|' => {
                out.push('%');
                out.push_str(&format!("{:x}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(windows)]
fn sanitize_for_platform(path: PathBuf) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                out.push(encode_reserved_chars(&part.to_string_lossy()))
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(not(windows))]
fn sanitize_for_platform(path: PathBuf) -> PathBuf {
    path
}
