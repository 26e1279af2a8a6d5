//! Filesystem-backed authorized-keys storage.
//!
//! The service runs as root and writes into directories the account owns, so
//! nothing under the home directory is trusted: `.ssh` and `authorized_keys`
//! are never followed through symlinks, and the temp file and rename are
//! resolved relative to an open `.ssh` handle rather than by path.

use std::ffi::CString;
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{fchown, DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};

use super::KeyStore;
use crate::error::{Error, Result};
use crate::inventory::LocalAccount;

pub const SSH_DIR: &str = ".ssh";
pub const AUTHORIZED_KEYS_FILE: &str = "authorized_keys";
const TEMP_KEYS_FILE: &str = ".authorized_keys.tmp";

const SSH_DIR_MODE: u32 = 0o700;
const KEY_FILE_MODE: u32 = 0o600;

/// Keys stored at `<home>/.ssh/authorized_keys`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsKeyStore;

impl FsKeyStore {
    pub fn ssh_dir(account: &LocalAccount) -> PathBuf {
        account.home.join(SSH_DIR)
    }

    pub fn authorized_keys_path(account: &LocalAccount) -> PathBuf {
        Self::ssh_dir(account).join(AUTHORIZED_KEYS_FILE)
    }

    /// Open an existing `.ssh` without following a symlink. `Ok(None)` when
    /// there is no `.ssh` yet.
    fn open_ssh_dir(&self, account: &LocalAccount) -> Result<Option<File>> {
        let ssh_dir = Self::ssh_dir(account);
        match fs::symlink_metadata(&ssh_dir) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(refuse(account, &ssh_dir, "is a symlink"));
            }
            Ok(meta) if !meta.is_dir() => {
                return Err(refuse(account, &ssh_dir, "is not a directory"));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(key_error("inspect", account, &ssh_dir, e)),
        }

        // O_NOFOLLOW catches a swap between the lstat above and the open.
        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOFOLLOW | libc::O_DIRECTORY | libc::O_CLOEXEC)
            .open(&ssh_dir)
            .map_err(|e| key_error("open", account, &ssh_dir, e))?;
        let meta = dir
            .metadata()
            .map_err(|e| key_error("inspect", account, &ssh_dir, e))?;
        check_owner(account, &ssh_dir, &meta)?;
        Ok(Some(dir))
    }

    /// Open `.ssh`, creating it inside an existing home when missing, and
    /// reassert its owner and 0700 mode through the handle.
    fn prepare_ssh_dir(&self, account: &LocalAccount) -> Result<File> {
        let ssh_dir = Self::ssh_dir(account);
        match fs::metadata(&account.home) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(refuse(account, &account.home, "home is not a directory")),
            Err(e) => return Err(key_error("inspect home", account, &account.home, e)),
        }

        let dir = match self.open_ssh_dir(account)? {
            Some(dir) => dir,
            None => {
                match DirBuilder::new().mode(SSH_DIR_MODE).create(&ssh_dir) {
                    Ok(()) => {
                        tracing::debug!(user = %account.username, path = %ssh_dir.display(), "created ssh directory");
                    }
                    // Raced with another creator; the checks below decide.
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(key_error("create", account, &ssh_dir, e)),
                }
                self.open_ssh_dir(account)?.ok_or_else(|| {
                    key_error(
                        "open",
                        account,
                        &ssh_dir,
                        io::Error::new(io::ErrorKind::NotFound, "vanished after creation"),
                    )
                })?
            }
        };

        let meta = dir
            .metadata()
            .map_err(|e| key_error("inspect", account, &ssh_dir, e))?;
        if meta.uid() != account.uid || meta.gid() != account.gid {
            fchown(&dir, Some(account.uid), Some(account.gid))
                .map_err(|e| key_error("chown", account, &ssh_dir, e))?;
            tracing::debug!(user = %account.username, path = %ssh_dir.display(), "reset ssh directory owner");
        }
        if meta.mode() & 0o777 != SSH_DIR_MODE {
            dir.set_permissions(Permissions::from_mode(SSH_DIR_MODE))
                .map_err(|e| key_error("chmod", account, &ssh_dir, e))?;
            tracing::debug!(user = %account.username, path = %ssh_dir.display(), "reset ssh directory mode");
        }
        Ok(dir)
    }
}

impl KeyStore for FsKeyStore {
    fn read_keys(&self, account: &LocalAccount) -> Result<Option<Vec<String>>> {
        let path = Self::authorized_keys_path(account);
        let Some(dir) = self.open_ssh_dir(account)? else {
            return Ok(None);
        };

        let mut file = match open_at(&dir, AUTHORIZED_KEYS_FILE, libc::O_RDONLY | libc::O_NOFOLLOW, 0) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ELOOP) => {
                return Err(refuse(account, &path, "is a symlink"));
            }
            Err(e) => return Err(key_error("open", account, &path, e)),
        };
        let meta = file
            .metadata()
            .map_err(|e| key_error("inspect", account, &path, e))?;
        if !meta.is_file() {
            return Err(refuse(account, &path, "is not a regular file"));
        }
        check_owner(account, &path, &meta)?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| key_error("read", account, &path, e))?;

        let keys = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        tracing::debug!(user = %account.username, count = keys.len(), "read current keys");
        Ok(Some(keys))
    }

    fn write_keys(&self, account: &LocalAccount, keys: &[String]) -> Result<()> {
        let dir = self.prepare_ssh_dir(account)?;
        let ssh_dir = Self::ssh_dir(account);
        let path = ssh_dir.join(AUTHORIZED_KEYS_FILE);
        let tmp = ssh_dir.join(TEMP_KEYS_FILE);

        let mut content = String::new();
        for key in keys {
            content.push_str(key);
            content.push('\n');
        }

        // Stale temp file from an interrupted run. unlinkat removes a symlink
        // itself, never its target.
        match unlink_at(&dir, TEMP_KEYS_FILE) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(key_error("remove", account, &tmp, e)),
        }

        let mut file = open_at(
            &dir,
            TEMP_KEYS_FILE,
            libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL | libc::O_NOFOLLOW,
            KEY_FILE_MODE,
        )
        .map_err(|e| key_error("create", account, &tmp, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| key_error("write", account, &tmp, e))?;
        fchown(&file, Some(account.uid), Some(account.gid))
            .map_err(|e| key_error("chown", account, &tmp, e))?;
        file.set_permissions(Permissions::from_mode(KEY_FILE_MODE))
            .and_then(|_| file.sync_all())
            .map_err(|e| key_error("write", account, &tmp, e))?;
        drop(file);

        rename_at(&dir, TEMP_KEYS_FILE, AUTHORIZED_KEYS_FILE)
            .map_err(|e| key_error("replace", account, &path, e))?;

        tracing::debug!(user = %account.username, path = %path.display(), count = keys.len(), "wrote authorized keys");
        Ok(())
    }
}

/// Entries under the home must belong to the account or to root.
fn check_owner(account: &LocalAccount, path: &Path, meta: &Metadata) -> Result<()> {
    let owner = meta.uid();
    if owner == account.uid || owner == 0 {
        return Ok(());
    }
    Err(refuse(account, path, &format!("is owned by uid {owner}")))
}

fn refuse(account: &LocalAccount, path: &Path, reason: &str) -> Error {
    key_error(
        "verify",
        account,
        path,
        io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("refusing to use '{}': {}", path.display(), reason),
        ),
    )
}

fn key_error(
    operation: &'static str,
    account: &LocalAccount,
    path: &Path,
    source: io::Error,
) -> Error {
    Error::KeyStore {
        operation,
        username: account.username.clone(),
        path: path.to_path_buf(),
        source,
    }
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// `openat(2)` relative to `dir`.
fn open_at(dir: &File, name: &str, flags: libc::c_int, mode: u32) -> io::Result<File> {
    let name = c_name(name)?;
    // SAFETY: `dir` is an open descriptor and `name` is NUL-terminated.
    let fd = cvt(unsafe {
        libc::openat(
            dir.as_raw_fd(),
            name.as_ptr(),
            flags | libc::O_CLOEXEC,
            mode as libc::c_uint,
        )
    })?;
    // SAFETY: `fd` was just returned by openat and has no other owner.
    Ok(unsafe { File::from_raw_fd(fd) })
}

fn unlink_at(dir: &File, name: &str) -> io::Result<()> {
    let name = c_name(name)?;
    // SAFETY: `dir` is an open descriptor and `name` is NUL-terminated.
    cvt(unsafe { libc::unlinkat(dir.as_raw_fd(), name.as_ptr(), 0) }).map(drop)
}

fn rename_at(dir: &File, from: &str, to: &str) -> io::Result<()> {
    let from = c_name(from)?;
    let to = c_name(to)?;
    // SAFETY: both names are NUL-terminated and resolve against the same open
    // descriptor.
    cvt(unsafe { libc::renameat(dir.as_raw_fd(), from.as_ptr(), dir.as_raw_fd(), to.as_ptr()) })
        .map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use tempfile::TempDir;

    /// Account whose home is a temp dir owned by the test process, so chown
    /// succeeds without privileges.
    fn temp_account(name: &str) -> (TempDir, LocalAccount) {
        let temp = TempDir::new().unwrap();
        let meta = fs::metadata(temp.path()).unwrap();
        let account = LocalAccount {
            username: name.to_string(),
            uid: meta.uid(),
            gid: meta.gid(),
            home: temp.path().join("home").join(name),
        };
        fs::create_dir_all(&account.home).unwrap();
        (temp, account)
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let (_temp, bob) = temp_account("bob");
        assert_eq!(FsKeyStore.read_keys(&bob).unwrap(), None);
    }

    #[test]
    fn test_write_creates_dir_and_file() {
        let (_temp, bob) = temp_account("bob");
        let keys = vec!["ssh-ed25519 AAAA1 bob@a".to_string(), "ssh-rsa BBBB2 bob@b".to_string()];

        FsKeyStore.write_keys(&bob, &keys).unwrap();

        let ssh_dir = FsKeyStore::ssh_dir(&bob);
        let dir_meta = fs::metadata(&ssh_dir).unwrap();
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);

        let path = FsKeyStore::authorized_keys_path(&bob);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ssh-ed25519 AAAA1 bob@a\nssh-rsa BBBB2 bob@b\n"
        );
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(meta.uid(), bob.uid);
        assert_eq!(meta.gid(), bob.gid);
        assert!(!ssh_dir.join(".authorized_keys.tmp").exists());
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let (_temp, bob) = temp_account("bob");
        FsKeyStore
            .write_keys(&bob, &["k1".to_string(), "k2".to_string(), "k3".to_string()])
            .unwrap();
        FsKeyStore.write_keys(&bob, &["k1".to_string()]).unwrap();

        assert_eq!(
            FsKeyStore.read_keys(&bob).unwrap(),
            Some(vec!["k1".to_string()])
        );
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let (_temp, bob) = temp_account("bob");
        let ssh_dir = FsKeyStore::ssh_dir(&bob);
        fs::create_dir_all(&ssh_dir).unwrap();
        fs::write(ssh_dir.join(AUTHORIZED_KEYS_FILE), "k1\n\n  k2  \n").unwrap();

        assert_eq!(
            FsKeyStore.read_keys(&bob).unwrap(),
            Some(vec!["k1".to_string(), "k2".to_string()])
        );
    }

    #[test]
    fn test_write_recovers_from_stale_temp_file() {
        let (_temp, bob) = temp_account("bob");
        let ssh_dir = FsKeyStore::ssh_dir(&bob);
        fs::create_dir_all(&ssh_dir).unwrap();
        fs::write(ssh_dir.join(".authorized_keys.tmp"), "garbage\n").unwrap();

        FsKeyStore.write_keys(&bob, &["k1".to_string()]).unwrap();
        assert_eq!(
            fs::read_to_string(FsKeyStore::authorized_keys_path(&bob)).unwrap(),
            "k1\n"
        );
    }

    fn assert_refused(result: Result<impl std::fmt::Debug>) {
        match result {
            Err(Error::KeyStore { operation, source, .. }) => {
                assert_eq!(operation, "verify");
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected refusal, got {:?}", other),
        }
    }

    #[test]
    fn test_symlinked_ssh_dir_is_refused() {
        let (temp, bob) = temp_account("bob");
        let victim = temp.path().join("root-ssh");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join(AUTHORIZED_KEYS_FILE), "ROOTKEY\n").unwrap();
        std::os::unix::fs::symlink(&victim, FsKeyStore::ssh_dir(&bob)).unwrap();

        assert_refused(FsKeyStore.write_keys(&bob, &["BOBKEY".to_string()]));
        assert_refused(FsKeyStore.read_keys(&bob));

        assert_eq!(
            fs::read_to_string(victim.join(AUTHORIZED_KEYS_FILE)).unwrap(),
            "ROOTKEY\n"
        );
        assert!(!victim.join(TEMP_KEYS_FILE).exists());
    }

    #[test]
    fn test_symlinked_key_file_is_refused() {
        let (temp, bob) = temp_account("bob");
        let victim = temp.path().join("shadow");
        fs::write(&victim, "root:secret\n").unwrap();
        let ssh_dir = FsKeyStore::ssh_dir(&bob);
        fs::create_dir_all(&ssh_dir).unwrap();
        std::os::unix::fs::symlink(&victim, ssh_dir.join(AUTHORIZED_KEYS_FILE)).unwrap();

        assert_refused(FsKeyStore.read_keys(&bob));
    }

    #[test]
    fn test_symlinked_temp_file_is_not_followed() {
        let (temp, bob) = temp_account("bob");
        let victim = temp.path().join("shadow");
        fs::write(&victim, "root:secret\n").unwrap();
        let ssh_dir = FsKeyStore::ssh_dir(&bob);
        fs::create_dir_all(&ssh_dir).unwrap();
        std::os::unix::fs::symlink(&victim, ssh_dir.join(TEMP_KEYS_FILE)).unwrap();

        FsKeyStore.write_keys(&bob, &["k1".to_string()]).unwrap();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "root:secret\n");
        let meta = fs::symlink_metadata(FsKeyStore::authorized_keys_path(&bob)).unwrap();
        assert!(meta.is_file());
        assert_eq!(
            fs::read_to_string(FsKeyStore::authorized_keys_path(&bob)).unwrap(),
            "k1\n"
        );
    }

    #[test]
    fn test_write_requires_existing_home() {
        let (_temp, mut bob) = temp_account("bob");
        bob.home = bob.home.with_file_name("nohome");

        let err = FsKeyStore
            .write_keys(&bob, &["k1".to_string()])
            .unwrap_err();

        assert!(matches!(err, Error::KeyStore { .. }), "{err:?}");
        assert!(!bob.home.exists());
    }

    #[test]
    fn test_write_tightens_existing_ssh_dir() {
        let (_temp, bob) = temp_account("bob");
        let ssh_dir = FsKeyStore::ssh_dir(&bob);
        fs::create_dir_all(&ssh_dir).unwrap();
        fs::set_permissions(&ssh_dir, fs::Permissions::from_mode(0o755)).unwrap();

        FsKeyStore.write_keys(&bob, &["k1".to_string()]).unwrap();

        let meta = fs::metadata(&ssh_dir).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
        assert_eq!((meta.uid(), meta.gid()), (bob.uid, bob.gid));
    }
}
