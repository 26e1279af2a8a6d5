//! Preflight checks before touching accounts.
//!
//! Validates that the selected account-management programs are installed, so
//! a pass fails up front instead of after half the roster was processed.
//!
//! # Example
//!
//! ```rust
//! use account_sync::platform::{Flavor, PlatformCommands};
//! use account_sync::preflight::check_account_tools;
//!
//! let commands = PlatformCommands::for_flavor(Flavor::Host);
//! if let Err(e) = check_account_tools(&commands) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::error::{Error, Result};
use crate::platform::{Flavor, PlatformCommands};

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Package that provides the account tools for a flavor.
fn providing_package(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Container => "busybox or shadow",
        Flavor::Host => "shadow-utils / passwd",
    }
}

/// Check that specific tools are available.
///
/// Each tuple is (command, package).
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(t, p)| format!("  {} (install: {})", t, p))
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        return Err(Error::MissingTools(missing.join("\n")));
    }
    Ok(())
}

/// Check that the create, group and delete programs of `commands` exist.
pub fn check_account_tools(commands: &PlatformCommands) -> Result<()> {
    let package = providing_package(commands.flavor());
    let tools = commands
        .programs()
        .into_iter()
        .map(|program| (program, package))
        .collect::<Vec<_>>();
    check_required_tools(&tools)
}
