use std::path::Path;

use account_sync::config::{load_config, SyncConfig};
use account_sync::lock::RunLock;
use account_sync::platform::DEFAULT_CGROUP_PATH;
use account_sync::preflight::check_account_tools;
use account_sync::roster::load_roster;
use account_sync::{FsKeyStore, PasswdFile, PlatformCommands, Synchronizer, SystemRunner};
use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  account-sync sync <config.toml>\n  account-sync plan <config.toml>\n  account-sync detect [cgroup_path]"
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("account_sync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, config] if cmd == "sync" => sync(Path::new(config)),
        [cmd, config] if cmd == "plan" => plan(Path::new(config)),
        [cmd] if cmd == "detect" => detect(Path::new(DEFAULT_CGROUP_PATH)),
        [cmd, cgroup] if cmd == "detect" => detect(Path::new(cgroup)),
        _ => bail!(usage()),
    }
}

fn detect(cgroup: &Path) -> Result<()> {
    let commands = PlatformCommands::detect(cgroup)
        .with_context(|| format!("detecting platform from '{}'", cgroup.display()))?;
    let [create, group, delete] = commands.programs();
    println!(
        "{} (create: {}, group: {}, delete: {})",
        commands.flavor(),
        create,
        group,
        delete
    );
    Ok(())
}

fn plan(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let commands = config
        .platform
        .resolve()
        .context("selecting account commands")?;
    let accounts = PasswdFile::new(&config.passwd_path);
    let roster = load_roster(&config.roster, &config.sudo_group, &config.ignored_users)?;

    let plan = Synchronizer::new(&commands, &SystemRunner, &accounts, &FsKeyStore)
        .plan(&roster)
        .context("computing plan")?;

    println!("platform: {}", commands.flavor());
    for name in &plan.create {
        println!("create  {name}");
    }
    for name in &plan.delete {
        println!("delete  {name}");
    }
    for name in &plan.ignored {
        println!("keep    {name} (ignored)");
    }
    Ok(())
}

fn sync(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let commands = config
        .platform
        .resolve()
        .context("selecting account commands")?;
    tracing::info!(platform = %commands.flavor(), "selected account commands");
    check_account_tools(&commands).context("preflight")?;

    let Some(interval) = config.interval else {
        return sync_once(&config, &commands);
    };

    loop {
        // A failed pass is retried on the next tick; the next pass re-derives
        // everything from the host.
        if let Err(e) = sync_once(&config, &commands) {
            tracing::error!(error = %format!("{e:#}"), "reconciliation pass failed");
        }
        std::thread::sleep(interval);
    }
}

fn sync_once(config: &SyncConfig, commands: &PlatformCommands) -> Result<()> {
    let _lock = RunLock::acquire(&config.lock_path)?;
    let roster = load_roster(&config.roster, &config.sudo_group, &config.ignored_users)?;
    let accounts = PasswdFile::new(&config.passwd_path);

    let report = Synchronizer::new(commands, &SystemRunner, &accounts, &FsKeyStore)
        .run(&roster)
        .with_context(|| format!("syncing roster '{}'", config.roster.display()))?;

    if !report.is_success() {
        let failed = report
            .failures
            .iter()
            .map(|f| format!("  {}: {}", f.username, f.error))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("{} user(s) failed to sync:\n{}", report.failures.len(), failed);
    }
    Ok(())
}
