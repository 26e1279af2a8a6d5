//! Host-wide run lock.
//!
//! Account tools do not serialize concurrent writers to the account database,
//! so only one reconciliation pass may run per host.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_LOCK_PATH: &str = "/run/account-sync.lock";

/// Held for the duration of a pass; released on drop.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting; fails if another process holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Lock {
                path: path.to_path_buf(),
                source,
            })?;
        }

        // Never unlink the lock file: a second process could then lock a
        // fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| Error::Lock {
                path: path.to_path_buf(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::Locked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
