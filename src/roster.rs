//! Desired identities as handed over by the identity provider.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::account::Identity;
use crate::error::{Error, Result};

/// Desired identities plus usernames that must never be deleted.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub identities: Vec<Identity>,
    pub ignored_users: Vec<String>,
}

impl Roster {
    pub fn usernames(&self) -> Vec<String> {
        self.identities.iter().map(|i| i.username.clone()).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RosterJson {
    #[serde(default)]
    ignored_users: Vec<String>,
    #[serde(default)]
    users: Vec<RosterUserJson>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RosterUserJson {
    name: String,
    group: Option<String>,
    sudo_group: Option<String>,
    #[serde(default)]
    keys: Vec<String>,
}

/// Load a roster JSON document from `path`.
///
/// `default_sudo_group` applies to users without their own `sudo_group`;
/// `extra_ignored` is merged into the document's ignored users.
pub fn load_roster(
    path: &Path,
    default_sudo_group: &str,
    extra_ignored: &[String],
) -> anyhow::Result<Roster> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading roster '{}'", path.display()))?;
    let roster = parse_roster(&raw, default_sudo_group, extra_ignored)
        .with_context(|| format!("parsing roster '{}'", path.display()))?;
    tracing::debug!(
        users = roster.identities.len(),
        ignored = roster.ignored_users.len(),
        path = %path.display(),
        "loaded roster"
    );
    Ok(roster)
}

/// Parse and validate a roster JSON document.
pub fn parse_roster(
    raw: &str,
    default_sudo_group: &str,
    extra_ignored: &[String],
) -> Result<Roster> {
    let parsed: RosterJson =
        serde_json::from_str(raw).map_err(|e| Error::Roster(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut identities = Vec::with_capacity(parsed.users.len());
    for user in parsed.users {
        let name = user.name.trim().to_string();
        validate_name(&name, "username")?;
        if !seen.insert(name.clone()) {
            return Err(Error::Roster(format!("duplicate user '{}'", name)));
        }

        let group = user
            .group
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| name.clone());
        let sudo_group = user
            .sudo_group
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| default_sudo_group.to_string());
        validate_name(&group, "group")?;
        validate_name(&sudo_group, "sudo_group")?;

        let keys = normalize_keys(&name, user.keys)?;
        identities.push(Identity::new(name, group, sudo_group, keys));
    }

    let mut ignored_users: Vec<String> = Vec::new();
    for name in extra_ignored.iter().chain(parsed.ignored_users.iter()) {
        let name = name.trim();
        if !name.is_empty() && !ignored_users.iter().any(|u| u == name) {
            ignored_users.push(name.to_string());
        }
    }

    Ok(Roster {
        identities,
        ignored_users,
    })
}

fn validate_name(name: &str, field: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Roster(format!("{field} must not be empty")));
    }
    if name
        .chars()
        .any(|c| c == ':' || c == '/' || c.is_whitespace() || c.is_control())
    {
        return Err(Error::Roster(format!(
            "{field} '{}' contains invalid characters",
            name
        )));
    }
    if name.starts_with('-') {
        return Err(Error::Roster(format!(
            "{field} '{}' must not start with '-'",
            name
        )));
    }
    Ok(())
}

/// Trim keys and drop blanks; a key spanning lines would corrupt the file.
fn normalize_keys(username: &str, keys: Vec<String>) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        if key.contains('\n') || key.contains('\r') {
            return Err(Error::Roster(format!(
                "key for user '{}' spans multiple lines",
                username
            )));
        }
        out.push(key.to_string());
    }
    Ok(out)
}
