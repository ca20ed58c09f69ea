use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

pub const WHITELIST_FILE: &str = "jar-whitelist.txt";

pub fn resolve_whitelist_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.whitelist.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var("CLASS_HARVEST_WHITELIST") {
        return Ok(PathBuf::from(p));
    }

    Ok(class_harvest_home()?.join(WHITELIST_FILE))
}

pub fn resolve_cfr_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.cfr.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var("CFR_JAR") {
        return Ok(PathBuf::from(p));
    }

    let default_path = class_harvest_home()?.join("tools").join("cfr.jar");
    if default_path.exists() {
        return Ok(default_path);
    }

    install_cfr_if_missing(&default_path)?;
    Ok(default_path)
}

fn class_harvest_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("class-harvest"))
}

fn install_cfr_if_missing(target_path: &Path) -> Result<()> {
    if target_path.exists() {
        return Ok(());
    }

    let url = "https://github.com/leibnitz27/cfr/releases/download/0.152/cfr-0.152.jar";
    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    tracing::info!(target = %target_path.display(), "CFR not found, downloading");
    let status = std::process::Command::new("curl")
        .args([
            "-L",
            "--fail",
            "--silent",
            "--show-error",
            "-o",
            target_path
                .to_str()
                .context("cfr.jar target path is not valid UTF-8")?,
            url,
        ])
        .status()
        .context(
            "Failed to execute curl (ensure curl is installed, or use --cfr to specify cfr.jar)",
        )?;

    if !status.success() {
        if cfg!(windows) {
            let ps_status = std::process::Command::new("powershell")
                .args([
                    "-NoProfile",
                    "-ExecutionPolicy",
                    "Bypass",
                    "-Command",
                    &format!(
                        "Invoke-WebRequest -Uri '{url}' -OutFile '{}'",
                        target_path.display()
                    ),
                ])
                .status();

            if let Ok(s) = ps_status
                && s.success()
            {
                return Ok(());
            }
        }

        anyhow::bail!("Failed to download CFR. You can use --cfr to specify local cfr.jar");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use clap::Parser;

    #[test]
    fn explicit_flags_win_over_defaults() -> Result<()> {
        let cli = Cli::parse_from([
            "class-harvest",
            "--cfr",
            "/opt/cfr.jar",
            "--whitelist",
            "/tmp/wl.txt",
            "convert",
            "classes",
        ]);
        assert_eq!(resolve_cfr_path(&cli)?, PathBuf::from("/opt/cfr.jar"));
        assert_eq!(resolve_whitelist_path(&cli)?, PathBuf::from("/tmp/wl.txt"));
        assert!(matches!(cli.command, Commands::Convert { sequential: false, .. }));
        Ok(())
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let cli = Cli::parse_from(["class-harvest", "unpack", "dir", "--whitelist", "w.txt", "-v"]);
        assert_eq!(cli.whitelist, Some(PathBuf::from("w.txt")));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Unpack { max_depth: 10, .. }));
    }
}
