//! One full reconciliation pass over a roster.

use crate::account::{AccountLifecycle, IdentityOutcome};
use crate::cleanup::{CleanupReport, RosterComparison};
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::inventory::AccountDatabase;
use crate::keys::KeyStore;
use crate::platform::PlatformCommands;
use crate::roster::Roster;

/// Per-identity failure, kept so the remaining identities still get processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFailure {
    pub username: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub cleanup: CleanupReport,
    pub synced: Vec<(String, IdentityOutcome)>,
    pub failures: Vec<IdentityFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Dry-run view of what a pass would create and delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub create: Vec<String>,
    pub delete: Vec<String>,
    pub ignored: Vec<String>,
}

/// Runs reconciliation against a set of host capabilities.
pub struct Synchronizer<'a> {
    commands: &'a PlatformCommands,
    runner: &'a dyn CommandRunner,
    accounts: &'a dyn AccountDatabase,
    keys: &'a dyn KeyStore,
}

impl<'a> Synchronizer<'a> {
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

    fn compare(&self, roster: &Roster) -> Result<RosterComparison> {
        RosterComparison::from_database(
            roster.ignored_users.clone(),
            roster.usernames(),
            self.accounts,
        )
    }

    /// Remove stale accounts, then converge every identity in roster order.
    ///
    /// Inventory and cleanup errors abort the pass. Identity errors are
    /// recorded in the report and the pass moves on to the next identity.
    pub fn run(&self, roster: &Roster) -> Result<SyncReport> {
        let comparison = self.compare(roster)?;
        let cleanup = comparison.cleanup(self.commands, self.runner, self.accounts)?;

        let lifecycle = AccountLifecycle::new(self.commands, self.runner, self.accounts, self.keys);
        let mut report = SyncReport {
            cleanup,
            ..SyncReport::default()
        };

        for identity in &roster.identities {
            let mut identity = identity.clone();
            match lifecycle.sync(&mut identity) {
                Ok(outcome) => report.synced.push((identity.username, outcome)),
                Err(e) => {
                    tracing::error!(user = %identity.username, error = %e, "failed to sync user");
                    report.failures.push(IdentityFailure {
                        username: identity.username,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            deleted = report.cleanup.deleted.len(),
            synced = report.synced.len(),
            failed = report.failures.len(),
            "reconciliation pass finished"
        );
        Ok(report)
    }

    /// Compute creations and deletions without running anything.
    pub fn plan(&self, roster: &Roster) -> Result<SyncPlan> {
        let comparison = self.compare(roster)?;
        let (ignored, delete): (Vec<String>, Vec<String>) = comparison
            .deletion_candidates()
            .into_iter()
            .partition(|name| comparison.is_ignored(name));
        Ok(SyncPlan {
            create: comparison.missing_locally(),
            delete,
            ignored,
        })
    }
}
