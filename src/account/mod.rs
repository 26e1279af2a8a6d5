//! Per-identity account lifecycle.
//!
//! An existing account goes straight to key reconciliation. A missing one is
//! created, re-read and added to its privileged group first. Each step is
//! fallible and a failure stops that identity where it is; nothing is retried
//! within a run.

use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::inventory::{AccountDatabase, LocalAccount};
use crate::keys::{reconcile_keys, KeyAction, KeyStore};
use crate::platform::PlatformCommands;

/// A desired roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    /// Primary group name. The create commands derive the primary group
    /// themselves, so this is informational.
    pub group: String,
    /// Group granting elevated privileges, assigned on creation.
    pub sudo_group: String,
    /// Authorized keys in the order they are written.
    pub keys: Vec<String>,
    local: Option<LocalAccount>,
}

impl Identity {
    pub fn new(
        username: impl Into<String>,
        group: impl Into<String>,
        sudo_group: impl Into<String>,
        keys: Vec<String>,
    ) -> Self {
        Self {
            username: username.into(),
            group: group.into(),
            sudo_group: sudo_group.into(),
            keys,
            local: None,
        }
    }

    /// The local account, once resolved by [`AccountLifecycle::sync`].
    pub fn local_account(&self) -> Option<&LocalAccount> {
        self.local.as_ref()
    }
}

/// Result of converging one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityOutcome {
    /// True when the account was created this run.
    pub created: bool,
    pub keys: KeyAction,
}

/// Host capabilities needed to converge identities.
pub struct AccountLifecycle<'a> {
    commands: &'a PlatformCommands,
    runner: &'a dyn CommandRunner,
    accounts: &'a dyn AccountDatabase,
    keys: &'a dyn KeyStore,
}

impl<'a> AccountLifecycle<'a> {
    pub fn new(
        commands: &'a PlatformCommands,
        runner: &'a dyn CommandRunner,
        accounts: &'a dyn AccountDatabase,
        keys: &'a dyn KeyStore,
    ) -> Self {
        Self {
            commands,
            runner,
            accounts,
            keys,
        }
    }

    /// Converge one identity: ensure the account exists, assign the privileged
    /// group to new accounts, then reconcile authorized keys.
    pub fn sync(&self, identity: &mut Identity) -> Result<IdentityOutcome> {
        let (account, created) = match self.accounts.lookup(&identity.username)? {
            Some(account) => {
                tracing::trace!(user = %identity.username, "account exists");
                (account, false)
            }
            None => {
                let account = self.create(identity)?;
                self.assign_group(&account, &identity.sudo_group)?;
                (account, true)
            }
        };

        let local = identity.local.insert(account);
        let keys = reconcile_keys(self.keys, local, &identity.keys)?;
        tracing::trace!(user = %identity.username, created, ?keys, "identity converged");

        Ok(IdentityOutcome { created, keys })
    }

    fn create(&self, identity: &Identity) -> Result<LocalAccount> {
        let invocation = self.commands.create_user(&identity.username);
        tracing::info!(user = %identity.username, group = %identity.group, "creating user");
        self.runner.run(&invocation, &identity.username)?;

        // Re-read for the uid/gid/home the tool actually assigned
        self.accounts
            .lookup(&identity.username)?
            .ok_or_else(|| Error::AccountMissingAfterCreate {
                username: identity.username.clone(),
                program: invocation.program,
            })
    }

    fn assign_group(&self, account: &LocalAccount, group: &str) -> Result<()> {
        tracing::info!(user = %account.username, %group, "adding user to group");
        let invocation = self.commands.assign_group(&account.username, group);
        self.runner.run(&invocation, &account.username)?;
        Ok(())
    }
}
