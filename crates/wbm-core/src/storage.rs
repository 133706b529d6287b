//! Disk I/O helpers: directory creation and atomic publishes.
//!
//! Every file lands via a `.part` temp path renamed into place, so a reader
//! racing a concurrent writer never observes a truncated file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path
/// (e.g. `logo.png` → `logo.png.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Creates `dir` and all parents. Concurrent creators racing on the same
/// directory are fine; any other error is propagated.
pub fn ensure_dir(dir: &Path) -> Result<(), MirrorError> {
    fs::create_dir_all(dir).map_err(|e| MirrorError::fs(dir, e))
}

/// Replaces `final_path` with `contents` via temp-write + rename.
pub fn write_atomic(final_path: &Path, contents: &str) -> Result<(), MirrorError> {
    let tmp = temp_path(final_path);
    let mut file = fs::File::create(&tmp).map_err(|e| MirrorError::fs(&tmp, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| {
            let _ = fs::remove_file(&tmp);
            MirrorError::fs(&tmp, e)
        })?;
    drop(file);
    fs::rename(&tmp, final_path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        MirrorError::fs(final_path, e)
    })
}

/// Removes a partial temp file, ignoring "not found".
pub fn discard_temp(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("failed to remove partial file {}: {}", tmp.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_part() {
        assert_eq!(
            temp_path(Path::new("logo.png")).to_string_lossy(),
            "logo.png.part"
        );
        assert_eq!(
            temp_path(Path::new("/tmp/a/index.html")).to_string_lossy(),
            "/tmp/a/index.html.part"
        );
    }

    #[test]
    fn write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("doc.html");
        fs::write(&target, "old").unwrap();

        write_atomic(&target, "new contents").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new contents");
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn ensure_dir_tolerates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
