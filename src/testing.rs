//! In-memory fakes for the host capabilities.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, Invocation};
use crate::inventory::{AccountDatabase, LocalAccount};
use crate::keys::KeyStore;

pub(crate) fn account(name: &str, uid: u32) -> LocalAccount {
    LocalAccount {
        username: name.to_string(),
        uid,
        gid: uid,
        home: PathBuf::from("/home").join(name),
    }
}

/// Key files kept in a map keyed by username.
#[derive(Default)]
pub(crate) struct MemoryKeyStore {
    files: RefCell<BTreeMap<String, (Vec<String>, u32, u32)>>,
    writes: Cell<usize>,
    fail_writes: Cell<bool>,
}

impl MemoryKeyStore {
    pub(crate) fn seed(&self, account: &LocalAccount, keys: &[&str]) {
        self.files.borrow_mut().insert(
            account.username.clone(),
            (
                keys.iter().map(|k| k.to_string()).collect(),
                account.uid,
                account.gid,
            ),
        );
    }

    pub(crate) fn keys_of(&self, username: &str) -> Option<Vec<String>> {
        self.files.borrow().get(username).map(|(k, _, _)| k.clone())
    }

    pub(crate) fn owner_of(&self, username: &str) -> Option<(u32, u32)> {
        self.files
            .borrow()
            .get(username)
            .map(|(_, uid, gid)| (*uid, *gid))
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.set(true);
    }
}

impl KeyStore for MemoryKeyStore {
    fn read_keys(&self, account: &LocalAccount) -> Result<Option<Vec<String>>> {
        Ok(self.keys_of(&account.username))
    }

    fn write_keys(&self, account: &LocalAccount, keys: &[String]) -> Result<()> {
        if self.fail_writes.get() {
            return Err(Error::KeyStore {
                operation: "write",
                username: account.username.clone(),
                path: account.home.join(".ssh/authorized_keys"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.writes.set(self.writes.get() + 1);
        self.files.borrow_mut().insert(
            account.username.clone(),
            (keys.to_vec(), account.uid, account.gid),
        );
        Ok(())
    }
}

/// Fake host: an account table mutated by recorded account commands, plus a
/// key store. Every command and key write lands in one ordered event log.
pub(crate) struct FakeHost {
    accounts: RefCell<Vec<LocalAccount>>,
    failing_programs: RefCell<HashSet<String>>,
    events: RefCell<Vec<String>>,
    next_uid: Cell<u32>,
    /// When set, create commands succeed without adding an account.
    swallow_creates: Cell<bool>,
    pub(crate) keys: MemoryKeyStore,
}

impl FakeHost {
    pub(crate) fn with_users(names: &[&str]) -> Self {
        let accounts = names
            .iter()
            .enumerate()
            .map(|(i, name)| account(name, 1000 + i as u32))
            .collect();
        Self {
            accounts: RefCell::new(accounts),
            failing_programs: RefCell::new(HashSet::new()),
            events: RefCell::new(Vec::new()),
            next_uid: Cell::new(2000),
            swallow_creates: Cell::new(false),
            keys: MemoryKeyStore::default(),
        }
    }

    pub(crate) fn fail_program(&self, program: &str) {
        self.failing_programs.borrow_mut().insert(program.to_string());
    }

    pub(crate) fn swallow_creates(&self) {
        self.swallow_creates.set(true);
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// Only the command events, as `program arg...` lines.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| e.strip_prefix("run: ").map(str::to_string))
            .collect()
    }

    pub(crate) fn has_user(&self, name: &str) -> bool {
        self.accounts.borrow().iter().any(|a| a.username == name)
    }

    pub(crate) fn account_of(&self, name: &str) -> Option<LocalAccount> {
        self.accounts
            .borrow()
            .iter()
            .find(|a| a.username == name)
            .cloned()
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, invocation: &Invocation, subject: &str) -> Result<String> {
        self.events
            .borrow_mut()
            .push(format!("run: {}", invocation.display_line()));

        if self.failing_programs.borrow().contains(&invocation.program) {
            return Err(Error::CommandFailed {
                program: invocation.program.clone(),
                args: invocation.args.join(" "),
                username: subject.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "simulated failure".to_string(),
            });
        }

        let target = invocation.args.last().cloned().unwrap_or_default();
        match invocation.program.as_str() {
            "useradd" | "adduser" if !self.swallow_creates.get() => {
                let uid = self.next_uid.get();
                self.next_uid.set(uid + 1);
                self.accounts.borrow_mut().push(account(&target, uid));
            }
            "userdel" | "deluser" => {
                self.accounts.borrow_mut().retain(|a| a.username != target);
            }
            _ => {}
        }
        Ok(String::new())
    }
}

impl AccountDatabase for FakeHost {
    fn usernames(&self) -> Result<Vec<String>> {
        Ok(self
            .accounts
            .borrow()
            .iter()
            .map(|a| a.username.clone())
            .collect())
    }

    fn lookup(&self, username: &str) -> Result<Option<LocalAccount>> {
        Ok(self.account_of(username))
    }
}

impl KeyStore for FakeHost {
    fn read_keys(&self, account: &LocalAccount) -> Result<Option<Vec<String>>> {
        self.keys.read_keys(account)
    }

    fn write_keys(&self, account: &LocalAccount, keys: &[String]) -> Result<()> {
        self.events
            .borrow_mut()
            .push(format!("write_keys: {}", account.username));
        self.keys.write_keys(account, keys)
    }
}
