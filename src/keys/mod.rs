//! SSH authorized-keys reconciliation.
//!
//! The on-disk file is compared against the desired key set as an unordered
//! set of lines. When they differ in any way the desired keys replace the file
//! wholesale; when they match nothing is written.

pub mod store;

use sha2::{Digest, Sha256};

use crate::diff::symmetric_difference;
use crate::error::Result;
use crate::inventory::LocalAccount;

pub use store::{FsKeyStore, AUTHORIZED_KEYS_FILE, SSH_DIR};

/// Read/write access to a user's authorized keys.
pub trait KeyStore {
    /// Current keys, or Ok(None) if the user has no authorized-keys file.
    fn read_keys(&self, account: &LocalAccount) -> Result<Option<Vec<String>>>;

    /// Replace the authorized-keys file with `keys`, one per line, owned by
    /// the account.
    fn write_keys(&self, account: &LocalAccount, keys: &[String]) -> Result<()>;
}

/// What reconciliation decided to do with a key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// No file on disk; write the desired keys.
    Create,
    /// File differs from the desired keys; replace it.
    Replace,
    /// File already holds exactly the desired keys.
    Unchanged,
}

/// Decide whether `current` must be rewritten to hold `desired`.
pub fn plan_key_update(current: Option<&[String]>, desired: &[String]) -> KeyAction {
    let Some(current) = current else {
        return KeyAction::Create;
    };
    if current.len() == desired.len() && symmetric_difference(current, desired).is_empty() {
        KeyAction::Unchanged
    } else {
        KeyAction::Replace
    }
}

/// Bring `account`'s authorized keys in line with `desired`.
pub fn reconcile_keys<S: KeyStore + ?Sized>(
    store: &S,
    account: &LocalAccount,
    desired: &[String],
) -> Result<KeyAction> {
    let current = store.read_keys(account)?;
    let action = plan_key_update(current.as_deref(), desired);

    match action {
        KeyAction::Unchanged => {
            tracing::debug!(user = %account.username, "authorized keys up to date");
        }
        KeyAction::Create | KeyAction::Replace => {
            store.write_keys(account, desired)?;
            for key in desired {
                tracing::info!(
                    user = %account.username,
                    key = %key_fingerprint(key),
                    "installed authorized key"
                );
            }
        }
    }
    Ok(action)
}

/// Short SHA-256 fingerprint of a key line, safe to put in logs.
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.trim().as_bytes());
    let hex = format!("{:x}", digest);
    format!("SHA256:{}", &hex[..16])
}
