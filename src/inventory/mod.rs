//! Local account database access.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default account database.
pub const DEFAULT_PASSWD_PATH: &str = "/etc/passwd";

/// A resolved OS account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAccount {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Read access to the system account database.
pub trait AccountDatabase {
    /// All local usernames, in database order.
    fn usernames(&self) -> Result<Vec<String>>;

    /// Resolve `username` to an account.
    ///
    /// Returns Ok(None) when no such account exists.
    fn lookup(&self, username: &str) -> Result<Option<LocalAccount>>;
}

/// [`AccountDatabase`] over a passwd(5) formatted file.
///
/// The file is re-read on every call; accounts created by external commands
/// become visible immediately.
#[derive(Debug, Clone)]
pub struct PasswdFile {
    path: PathBuf,
}

impl PasswdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn system() -> Self {
        Self::new(DEFAULT_PASSWD_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|source| Error::Inventory {
            path: self.path.clone(),
            source,
        })
    }

    fn corrupt(&self, line: usize, reason: String) -> Error {
        Error::CorruptAccountDatabase {
            path: self.path.clone(),
            line,
            reason,
        }
    }
}

impl AccountDatabase for PasswdFile {
    fn usernames(&self) -> Result<Vec<String>> {
        let content = self.read()?;
        let mut users = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let name = line.split(':').next().unwrap_or_default();
            if name.is_empty() {
                return Err(self.corrupt(idx + 1, "missing username field".to_string()));
            }
            users.push(name.to_string());
        }
        tracing::debug!(count = users.len(), path = %self.path.display(), "read local users");
        Ok(users)
    }

    fn lookup(&self, username: &str) -> Result<Option<LocalAccount>> {
        let content = self.read()?;

        for (idx, line) in content.lines().enumerate() {
            let parts: Vec<&str> = line.split(':').collect();
            if parts[0] != username {
                continue;
            }
            if parts.len() < 6 {
                return Err(self.corrupt(
                    idx + 1,
                    format!("truncated record for user '{}'", username),
                ));
            }
            let uid: u32 = parts[2].parse().map_err(|_| {
                self.corrupt(
                    idx + 1,
                    format!("invalid UID '{}' for user '{}'", parts[2], username),
                )
            })?;
            let gid: u32 = parts[3].parse().map_err(|_| {
                self.corrupt(
                    idx + 1,
                    format!("invalid GID '{}' for user '{}'", parts[3], username),
                )
            })?;
            if parts[5].is_empty() {
                return Err(self.corrupt(
                    idx + 1,
                    format!("empty home directory for user '{}'", username),
                ));
            }
            return Ok(Some(LocalAccount {
                username: username.to_string(),
                uid,
                gid,
                home: PathBuf::from(parts[5]),
            }));
        }
        Ok(None)
    }
}
