use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_MAX_FILES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum RotateError {
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read metadata of {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One step of a rotation: copy `from` over `to`, then delete `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Path of backup generation `index` for `path`: `dir/stem.{index}.ext`.
pub fn generation_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}.{}", stem, index),
    };
    path.with_file_name(name)
}

/// Computes the moves a rotation of `path` would perform, in execution order.
///
/// The chain is walked from newest to oldest and stops at the first slot that
/// is free, since every generation past a free slot is assumed empty. Higher
/// generations are not re-checked. A window of zero keeps no backups, so
/// nothing moves.
pub fn plan(path: &Path, max_files: usize) -> Vec<Move> {
    if !path.is_file() {
        return Vec::new();
    }

    let chain: Vec<PathBuf> = std::iter::once(path.to_path_buf())
        .chain((0..max_files).map(|i| generation_path(path, i)))
        .collect();

    let mut moves = Vec::with_capacity(max_files);
    for pair in chain.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        moves.push(Move {
            from: from.clone(),
            to: to.clone(),
        });
        if from.exists() && !to.exists() {
            break;
        }
    }

    moves.reverse();
    moves
}

/// Shifts `path` into generation 0 and every existing generation up by one,
/// keeping at most `max_files` backups. A missing `path` is a no-op.
pub fn rotate(path: &Path, max_files: usize) -> Result<(), RotateError> {
    let moves = plan(path, max_files);
    if moves.is_empty() {
        return Ok(());
    }

    tracing::debug!("Rotating {} ({} moves)", path.display(), moves.len());
    for mv in &moves {
        fs::copy(&mv.from, &mv.to).map_err(|source| RotateError::Copy {
            from: mv.from.clone(),
            to: mv.to.clone(),
            source,
        })?;
        fs::remove_file(&mv.from).map_err(|source| RotateError::Remove {
            path: mv.from.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Rotates `path` only when it was created before `today`. Returns whether a
/// rotation happened.
pub fn rotate_if_stale(path: &Path, max_files: usize, today: NaiveDate) -> Result<bool, RotateError> {
    if !path.is_file() {
        return Ok(false);
    }

    let meta = fs::metadata(path).map_err(|source| RotateError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    // Not every filesystem records a birth time.
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .map_err(|source| RotateError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

    if !created_before(created, today) {
        return Ok(false);
    }

    rotate(path, max_files)?;
    Ok(true)
}

fn created_before(created: SystemTime, today: NaiveDate) -> bool {
    let created: DateTime<Local> = created.into();
    let midnight = today
        .and_hms_opt(0, 0, 0)
        .and_then(|t| Local.from_local_datetime(&t).earliest());
    match midnight {
        Some(midnight) => created < midnight,
        None => created.date_naive() < today,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn read(dir: &TempDir, name: &str) -> Option<String> {
        fs::read_to_string(dir.path().join(name)).ok()
    }

    #[test]
    fn test_generation_path_inserts_index_before_extension() {
        let path = Path::new("/var/log/ScreenRecorder.log");
        assert_eq!(
            generation_path(path, 0),
            PathBuf::from("/var/log/ScreenRecorder.0.log")
        );
        assert_eq!(generation_path(Path::new("notes"), 3), PathBuf::from("notes.3"));
    }

    #[test]
    fn test_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.log");

        assert!(plan(&path, 10).is_empty());
        rotate(&path, 10).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_single_rotation() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");

        rotate(&dir.path().join("a.log"), 10).unwrap();

        assert_eq!(read(&dir, "a.log"), None);
        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("X"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_chain_rotation() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        write(&dir, "a.0.log", "Y");
        write(&dir, "a.1.log", "Z");

        rotate(&dir.path().join("a.log"), 10).unwrap();

        assert_eq!(read(&dir, "a.log"), None);
        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("X"));
        assert_eq!(read(&dir, "a.1.log").as_deref(), Some("Y"));
        assert_eq!(read(&dir, "a.2.log").as_deref(), Some("Z"));
        assert_eq!(read(&dir, "a.3.log"), None);
    }

    #[test]
    fn test_eviction_at_window_bound() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "NEW");
        for i in 0..10 {
            write(&dir, &format!("a.{}.log", i), &format!("G{}", i));
        }

        rotate(&dir.path().join("a.log"), 10).unwrap();

        assert_eq!(read(&dir, "a.log"), None);
        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("NEW"));
        assert_eq!(read(&dir, "a.1.log").as_deref(), Some("G0"));
        assert_eq!(read(&dir, "a.9.log").as_deref(), Some("G8"));
        assert_eq!(read(&dir, "a.10.log"), None);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 10);
    }

    #[test]
    fn test_gap_short_circuit_leaves_higher_generations() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        write(&dir, "a.0.log", "Y");
        write(&dir, "a.2.log", "STALE");

        let path = dir.path().join("a.log");
        let moves = plan(&path, 10);
        assert_eq!(
            moves,
            vec![
                Move {
                    from: dir.path().join("a.0.log"),
                    to: dir.path().join("a.1.log"),
                },
                Move {
                    from: path.clone(),
                    to: dir.path().join("a.0.log"),
                },
            ]
        );

        rotate(&path, 10).unwrap();

        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("X"));
        assert_eq!(read(&dir, "a.1.log").as_deref(), Some("Y"));
        assert_eq!(read(&dir, "a.2.log").as_deref(), Some("STALE"));
        assert_eq!(read(&dir, "a.3.log"), None);
    }

    #[test]
    fn test_second_rotation_is_noop() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        let path = dir.path().join("a.log");

        rotate(&path, 10).unwrap();
        rotate(&path, 10).unwrap();

        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("X"));
        assert_eq!(read(&dir, "a.1.log"), None);
    }

    #[test]
    fn test_zero_window_leaves_file_in_place() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        write(&dir, "a.0.log", "OLD");
        let path = dir.path().join("a.log");

        assert!(plan(&path, 0).is_empty());
        rotate(&path, 0).unwrap();

        assert_eq!(read(&dir, "a.log").as_deref(), Some("X"));
        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("OLD"));
    }

    #[test]
    fn test_failed_copy_propagates_and_keeps_sources() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        write(&dir, "a.0.log", "Y");
        // The oldest move copies a directory, which fails before anything moves.
        fs::create_dir(dir.path().join("a.1.log")).unwrap();
        let path = dir.path().join("a.log");

        let err = rotate(&path, 10).unwrap_err();

        match err {
            RotateError::Copy { from, to, .. } => {
                assert_eq!(from, dir.path().join("a.1.log"));
                assert_eq!(to, dir.path().join("a.2.log"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(read(&dir, "a.log").as_deref(), Some("X"));
        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("Y"));
        assert!(dir.path().join("a.1.log").is_dir());
        assert!(!dir.path().join("a.2.log").exists());
    }

    #[test]
    fn test_rotate_if_stale_skips_todays_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        let path = dir.path().join("a.log");
        let today = Local::now().date_naive();

        assert!(!rotate_if_stale(&path, 10, today).unwrap());
        assert_eq!(read(&dir, "a.log").as_deref(), Some("X"));
    }

    #[test]
    fn test_rotate_if_stale_rotates_older_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.log", "X");
        let path = dir.path().join("a.log");
        let tomorrow = Local::now().date_naive().succ_opt().unwrap();

        assert!(rotate_if_stale(&path, 10, tomorrow).unwrap());
        assert_eq!(read(&dir, "a.log"), None);
        assert_eq!(read(&dir, "a.0.log").as_deref(), Some("X"));
    }

    #[test]
    fn test_rotate_if_stale_missing_file() {
        let dir = TempDir::new().unwrap();
        let today = Local::now().date_naive();
        assert!(!rotate_if_stale(&dir.path().join("none.log"), 10, today).unwrap());
    }
}
