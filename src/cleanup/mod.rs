//! Removal of local accounts that are no longer in the roster.

use crate::diff::only_in;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::inventory::AccountDatabase;
use crate::platform::PlatformCommands;

/// Snapshot of ignored, desired and local usernames for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterComparison {
    ignored: Vec<String>,
    desired: Vec<String>,
    local: Vec<String>,
}

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub ignored: Vec<String>,
}

impl RosterComparison {
    pub fn new(ignored: Vec<String>, desired: Vec<String>, local: Vec<String>) -> Self {
        Self {
            ignored,
            desired,
            local,
        }
    }

    /// Build the snapshot with the current local usernames from `accounts`.
    pub fn from_database(
        ignored: Vec<String>,
        desired: Vec<String>,
        accounts: &dyn AccountDatabase,
    ) -> Result<Self> {
        Ok(Self::new(ignored, desired, accounts.usernames()?))
    }

    pub fn is_ignored(&self, username: &str) -> bool {
        self.ignored.iter().any(|u| u == username)
    }

    /// Local usernames absent from the roster, ignored ones included.
    pub fn deletion_candidates(&self) -> Vec<String> {
        only_in(&self.local, &self.desired)
    }

    /// Roster usernames with no local account yet.
    pub fn missing_locally(&self) -> Vec<String> {
        only_in(&self.desired, &self.local)
    }

    /// Delete every unprotected candidate. The first failure aborts the rest.
    pub fn cleanup(
        &self,
        commands: &PlatformCommands,
        runner: &dyn CommandRunner,
        accounts: &dyn AccountDatabase,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for username in self.deletion_candidates() {
            if self.is_ignored(&username) {
                tracing::debug!(user = %username, "user is ignored, not deleting");
                report.ignored.push(username);
                continue;
            }

            tracing::info!(user = %username, "deleting user from host");
            remove_user(commands, runner, accounts, &username)?;
            tracing::info!(user = %username, "deleted user");
            report.deleted.push(username);
        }

        Ok(report)
    }
}

/// Delete `username` and its home directory.
pub fn remove_user(
    commands: &PlatformCommands,
    runner: &dyn CommandRunner,
    accounts: &dyn AccountDatabase,
    username: &str,
) -> Result<()> {
    let account = accounts
        .lookup(username)?
        .ok_or_else(|| Error::AccountMissingForDelete {
            username: username.to_string(),
        })?;
    let invocation = commands.delete_user(&account.username);
    runner.run(&invocation, &account.username).inspect_err(|e| {
        tracing::error!(user = %account.username, error = %e, "error deleting user");
    })?;
    Ok(())
}
