//! Error types for account reconciliation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not determine platform from '{path}': {source}")]
    Detection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read account database '{path}': {source}")]
    Inventory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupted account database '{path}' at line {line}: {reason}")]
    CorruptAccountDatabase {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to spawn '{program}' for user '{username}': {source}")]
    CommandSpawn {
        program: String,
        username: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program} {args}' failed for user '{username}' ({status}): {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        username: String,
        status: String,
        stderr: String,
    },

    #[error("user '{username}' still missing after '{program}' reported success")]
    AccountMissingAfterCreate { username: String, program: String },

    #[error("user '{username}' selected for deletion but no local account exists")]
    AccountMissingForDelete { username: String },

    #[error("failed to {operation} '{path}' for user '{username}': {source}")]
    KeyStore {
        operation: &'static str,
        username: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid roster: {0}")]
    Roster(String),

    #[error("run lock '{path}' is held by another process")]
    Locked { path: PathBuf },

    #[error("failed to open run lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing required account tools:\n{0}")]
    MissingTools(String),
}

impl Error {
    /// Username the error is attributed to, when there is one.
    pub fn username(&self) -> Option<&str> {
        match self {
            Error::CommandSpawn { username, .. }
            | Error::CommandFailed { username, .. }
            | Error::AccountMissingAfterCreate { username, .. }
            | Error::AccountMissingForDelete { username }
            | Error::KeyStore { username, .. } => Some(username),
            _ => None,
        }
    }
}
