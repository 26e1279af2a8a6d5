//! Converge local Linux accounts and SSH authorized keys onto a roster.
//!
//! Given the desired identities (username, groups, public keys) and a list of
//! usernames that must never be removed, a pass:
//!
//! - deletes local accounts that are neither desired nor protected,
//! - creates missing accounts and adds them to their privileged group,
//! - rewrites `~/.ssh/authorized_keys` wherever it differs from the roster.
//!
//! Every decision is re-derived from live system state, so a failed pass is
//! fixed by simply running again.
//!
//! # Architecture
//!
//! ```text
//! sync::Synchronizer
//!     │
//!     ├── cleanup::RosterComparison ── diff::only_in
//!     │
//!     └── account::AccountLifecycle
//!             ├── platform::PlatformCommands  (adduser/useradd family)
//!             ├── exec::CommandRunner         (runs them)
//!             ├── inventory::AccountDatabase  (/etc/passwd)
//!             └── keys::KeyStore              (authorized_keys)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use account_sync::{FsKeyStore, PasswdFile, PlatformCommands, Synchronizer, SystemRunner};
//!
//! let commands = PlatformCommands::detect("/proc/1/cgroup".as_ref())?;
//! let accounts = PasswdFile::system();
//! let report = Synchronizer::new(&commands, &SystemRunner, &accounts, &FsKeyStore).run(&roster)?;
//! ```

pub mod account;
pub mod cleanup;
pub mod config;
pub mod diff;
pub mod error;
pub mod exec;
pub mod inventory;
pub mod keys;
pub mod lock;
pub mod platform;
pub mod preflight;
pub mod roster;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use account::{AccountLifecycle, Identity, IdentityOutcome};
pub use error::{Error, Result};
pub use exec::{CommandRunner, Invocation, SystemRunner};
pub use inventory::{AccountDatabase, LocalAccount, PasswdFile};
pub use keys::{FsKeyStore, KeyAction, KeyStore};
pub use platform::{Flavor, PlatformChoice, PlatformCommands};
pub use roster::Roster;
pub use sync::{SyncPlan, SyncReport, Synchronizer};
