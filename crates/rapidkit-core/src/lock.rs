//! Project-scoped advisory lock
//!
//! Every mutating operation holds `.rapidkit/lock` for its whole duration.
//! The file is created with `create_new` and additionally locked through
//! `fs2`; a second process fails fast instead of waiting. A lock file left
//! behind by a process that exited without dropping its guard carries no
//! `fs2` lock and is reclaimed.

use crate::error::{LockError, Result};
use crate::state::STATE_DIR;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "lock";

/// Guard that releases the lock when dropped
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Acquire the lock for `project_root`, failing if another process holds it
    pub fn acquire(project_root: &Path) -> Result<Self> {
        let dir = project_root.join(STATE_DIR);
        std::fs::create_dir_all(&dir).map_err(|source| LockError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(LOCK_FILE);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                if file.try_lock_exclusive().is_err() {
                    return Err(LockError::Held {
                        pid: read_holder(&path),
                        path,
                    }
                    .into());
                }
                Self::claim(file, path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Self::reclaim(path),
            Err(source) => Err(LockError::Io { path, source }.into()),
        }
    }

    /// Take over an existing lock file whose owner no longer holds it
    fn reclaim(path: PathBuf) -> Result<Self> {
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            // released between our two opens
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockError::Held {
                    pid: "unknown".to_string(),
                    path,
                }
                .into())
            }
            Err(source) => return Err(LockError::Io { path, source }.into()),
        };
        if file.try_lock_exclusive().is_err() {
            return Err(LockError::Held {
                pid: read_holder(&path),
                path,
            }
            .into());
        }
        tracing::warn!(
            path = %path.display(),
            pid = %read_holder(&path),
            "removing stale lock from terminated process"
        );
        Self::claim(file, path)
    }

    fn claim(mut file: File, path: PathBuf) -> Result<Self> {
        let pid = std::process::id().to_string();
        file.set_len(0)
            .and_then(|()| file.write_all(pid.as_bytes()))
            .and_then(|()| file.sync_all())
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "acquired project lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
        tracing::debug!(path = %self.path.display(), "released project lock");
    }
}

fn read_holder(path: &Path) -> String {
    let mut contents = String::new();
    match File::open(path).and_then(|mut f| f.read_to_string(&mut contents)) {
        Ok(_) if !contents.trim().is_empty() => contents.trim().to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let first = ProjectLock::acquire(tmp.path()).unwrap();
        let second = ProjectLock::acquire(tmp.path());
        assert!(matches!(second, Err(Error::Lock(LockError::Held { .. }))));
        drop(first);
        assert!(ProjectLock::acquire(tmp.path()).is_ok());
    }

    #[test]
    fn test_stale_lock_file_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(LOCK_FILE), "4194303").unwrap();

        let lock = ProjectLock::acquire(tmp.path()).unwrap();
        let holder = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(holder, std::process::id().to_string());

        let second = ProjectLock::acquire(tmp.path());
        assert!(matches!(second, Err(Error::Lock(LockError::Held { .. }))));
    }

    #[test]
    fn test_lock_file_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let lock = ProjectLock::acquire(tmp.path()).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
