//! Account-management command selection.
//!
//! Minimal container images (Alpine/BusyBox) ship `adduser`/`addgroup`/`deluser`
//! with their own flags, while conventional hosts use the shadow-utils
//! `useradd`/`usermod`/`userdel` family. The flavor is detected once, from the
//! control groups of PID 1, and the resulting [`PlatformCommands`] is immutable
//! for the rest of the process.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec::Invocation;

/// Control-group file of PID 1.
pub const DEFAULT_CGROUP_PATH: &str = "/proc/1/cgroup";

/// Marker that identifies a container runtime in the cgroup file.
const CONTAINER_MARKER: &str = "docker";

/// Which family of account tools the host provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// BusyBox-style tools found in container images.
    Container,
    /// shadow-utils tools found on full distributions.
    Host,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::Container => "container",
            Flavor::Host => "host",
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the flavor from a cgroup file.
///
/// Returns:
/// - Ok(Container) if the file mentions the container marker
/// - Ok(Host) if it doesn't, or if the file doesn't exist
/// - Err if the file exists but can't be read
pub fn detect_flavor(cgroup_path: &Path) -> Result<Flavor> {
    let content = match fs::read_to_string(cgroup_path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %cgroup_path.display(), "no cgroup file, assuming host");
            return Ok(Flavor::Host);
        }
        Err(source) => {
            return Err(Error::Detection {
                path: cgroup_path.to_path_buf(),
                source,
            })
        }
    };

    if content.lines().any(|line| line.contains(CONTAINER_MARKER)) {
        Ok(Flavor::Container)
    } else {
        Ok(Flavor::Host)
    }
}

/// Program names and fixed leading arguments for the three account operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCommands {
    flavor: Flavor,
    create_program: &'static str,
    create_args: &'static [&'static str],
    group_program: &'static str,
    group_args: &'static [&'static str],
    delete_program: &'static str,
    delete_args: &'static [&'static str],
}

impl PlatformCommands {
    /// Command set for a known flavor.
    pub fn for_flavor(flavor: Flavor) -> Self {
        match flavor {
            Flavor::Container => Self {
                flavor,
                create_program: "adduser",
                // no password, bash login shell
                create_args: &["-D", "-s", "/bin/bash"],
                group_program: "addgroup",
                group_args: &[],
                delete_program: "deluser",
                delete_args: &["--remove-home"],
            },
            Flavor::Host => Self {
                flavor,
                create_program: "useradd",
                // placeholder password hash locks password login; -U user group, -m home
                create_args: &["-p", "123", "-U", "-m"],
                group_program: "usermod",
                group_args: &["-a", "-G"],
                delete_program: "userdel",
                delete_args: &["-r"],
            },
        }
    }

    /// Detect the flavor from `cgroup_path` and build the matching command set.
    pub fn detect(cgroup_path: &Path) -> Result<Self> {
        let flavor = detect_flavor(cgroup_path)?;
        tracing::debug!(%flavor, "selected account command set");
        Ok(Self::for_flavor(flavor))
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Programs this command set will invoke.
    pub fn programs(&self) -> [&'static str; 3] {
        [self.create_program, self.group_program, self.delete_program]
    }

    pub fn create_user(&self, username: &str) -> Invocation {
        let mut args = to_owned(self.create_args);
        args.push(username.to_string());
        Invocation::new(self.create_program, args)
    }

    /// Add `username` to `group` as a supplementary group.
    pub fn assign_group(&self, username: &str, group: &str) -> Invocation {
        let mut args = to_owned(self.group_args);
        match self.flavor {
            // addgroup USER GROUP
            Flavor::Container => {
                args.push(username.to_string());
                args.push(group.to_string());
            }
            // usermod -a -G GROUP USER
            Flavor::Host => {
                args.push(group.to_string());
                args.push(username.to_string());
            }
        }
        Invocation::new(self.group_program, args)
    }

    /// Delete `username` along with its home directory.
    pub fn delete_user(&self, username: &str) -> Invocation {
        let mut args = to_owned(self.delete_args);
        args.push(username.to_string());
        Invocation::new(self.delete_program, args)
    }
}

fn to_owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// How the command set should be chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformChoice {
    /// Inspect the cgroup file at the given path.
    Detect(PathBuf),
    Forced(Flavor),
}

impl PlatformChoice {
    pub fn resolve(&self) -> Result<PlatformCommands> {
        match self {
            PlatformChoice::Detect(path) => PlatformCommands::detect(path),
            PlatformChoice::Forced(flavor) => Ok(PlatformCommands::for_flavor(*flavor)),
        }
    }
}
