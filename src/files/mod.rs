mod rotate;

pub use rotate::{rotate_if_stale, RotateError, DEFAULT_MAX_FILES};

use std::fs;
use std::path::{Path, PathBuf};

/// Creates `path` and any missing parents. Failures are logged, not returned,
/// so callers must cope with the directory still being absent.
pub fn ensure_exists<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if !path.is_dir() {
        if let Err(e) = fs::create_dir_all(path) {
            tracing::error!("Unable to ensure folder exists: {}: {}", path.display(), e);
        }
    }
    path.to_path_buf()
}

/// Replaces every character that is not alphanumeric, `_`, `.` or `-` with `_`.
pub fn to_valid_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_exists_creates_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("Recordings").join("today");

        let returned = ensure_exists(&nested);

        assert_eq!(returned, nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn test_ensure_exists_swallows_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let target = blocker.join("sub");

        let returned = ensure_exists(&target);

        assert_eq!(returned, target);
        assert!(!target.exists());
    }

    #[test]
    fn test_to_valid_filename() {
        assert_eq!(to_valid_filename("2024-05-01T13:45:10"), "2024-05-01T13_45_10");
        assert_eq!(to_valid_filename("a b/c\\d.mp4"), "a_b_c_d.mp4");
        assert_eq!(to_valid_filename("ok_name-1.log"), "ok_name-1.log");
    }
}
