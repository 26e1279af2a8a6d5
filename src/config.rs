//! Run configuration (`account-sync.toml`).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::inventory::DEFAULT_PASSWD_PATH;
use crate::lock::DEFAULT_LOCK_PATH;
use crate::platform::{Flavor, PlatformChoice, DEFAULT_CGROUP_PATH};

const DEFAULT_SUDO_GROUP: &str = "wheel";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub roster: PathBuf,
    pub ignored_users: Vec<String>,
    pub sudo_group: String,
    pub passwd_path: PathBuf,
    pub lock_path: PathBuf,
    pub platform: PlatformChoice,
    pub interval: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    sync: SyncToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncToml {
    roster: String,
    ignored_users: Option<Vec<String>>,
    sudo_group: Option<String>,
    passwd_path: Option<String>,
    cgroup_path: Option<String>,
    lock_path: Option<String>,
    platform: Option<String>,
    interval_secs: Option<u64>,
}

pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    let raw = fs::read_to_string(config_path)
        .with_context(|| format!("reading config '{}'", config_path.display()))?;
    parse_config(&raw, config_path)
}

/// Parse config text; relative paths resolve against the config's directory.
pub fn parse_config(raw: &str, config_path: &Path) -> Result<SyncConfig> {
    let parsed: ConfigToml = toml::from_str(raw)
        .with_context(|| format!("parsing config '{}'", config_path.display()))?;
    let sync = parsed.sync;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));

    let cgroup_path = sync
        .cgroup_path
        .map(|p| resolve_path(base, &p))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CGROUP_PATH));
    let platform = match sync
        .platform
        .as_deref()
        .map(|p| p.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("auto") => PlatformChoice::Detect(cgroup_path),
        Some("container") => PlatformChoice::Forced(Flavor::Container),
        Some("host") => PlatformChoice::Forced(Flavor::Host),
        Some(other) => bail!(
            "invalid config '{}': unsupported platform '{}' (expected 'auto', 'container' or 'host')",
            config_path.display(),
            other
        ),
    };

    let sudo_group = sync
        .sudo_group
        .map(|g| g.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SUDO_GROUP.to_string());
    if sudo_group.is_empty() {
        bail!(
            "invalid config '{}': sudo_group must not be empty",
            config_path.display()
        );
    }

    let interval = match sync.interval_secs {
        Some(0) => bail!(
            "invalid config '{}': interval_secs must be positive",
            config_path.display()
        ),
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    Ok(SyncConfig {
        roster: resolve_path(base, &sync.roster),
        ignored_users: sync
            .ignored_users
            .unwrap_or_else(|| vec!["root".to_string()]),
        sudo_group,
        passwd_path: sync
            .passwd_path
            .map(|p| resolve_path(base, &p))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PASSWD_PATH)),
        lock_path: sync
            .lock_path
            .map(|p| resolve_path(base, &p))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_PATH)),
        platform,
        interval,
    })
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
