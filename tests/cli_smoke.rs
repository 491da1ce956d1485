use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;

const PACKAGES: &str = "\
com.example.browser 10005 0 /data/data/com.example.browser default 3003,1028
com.example.offline 10006 0 /data/data/com.example.offline default none
";

/// Writes a config whose state, cache and package list live in `dir`.
fn write_config(dir: &TempDir) -> Result<PathBuf> {
    let root = dir.path();
    let packages = root.join("packages.list");
    fs::write(&packages, PACKAGES)?;

    let config_path = root.join("droidwall.toml");
    fs::write(
        &config_path,
        format!(
            "[paths]\n\
             cache_dir = '{}'\n\
             state_file = '{}'\n\
             packages_list = '{}'\n\
             \n\
             [logging]\n\
             level = \"warn\"\n",
            root.join("cache").display(),
            root.join("prefs.json").display(),
            packages.display(),
        ),
    )?;
    Ok(config_path)
}

fn droidwall(config: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("droidwall")?;
    cmd.arg("--config").arg(config).env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn help_lists_subcommands() -> Result<()> {
    let mut cmd = Command::cargo_bin("droidwall")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("compile"))
        .stdout(predicate::str::contains("apply-saved"));
    Ok(())
}

#[test]
fn compile_prints_script_for_default_selection() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir)?;

    droidwall(&config)?
        .arg("compile")
        .assert()
        .success()
        .stdout(predicate::str::contains("$IPTABLES -F droidwall || exit 7"))
        .stdout(predicate::str::contains(
            "$IPTABLES -A droidwall-wifi -j droidwall-reject || exit",
        ));
    Ok(())
}

#[test]
fn selections_and_mode_persist_between_runs() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir)?;

    droidwall(&config)?.args(["mode", "blacklist"]).assert().success();
    droidwall(&config)?
        .args(["allow", "--wifi", "10005"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected 10005 on wifi"));

    droidwall(&config)?
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("mode: blacklist"))
        .stdout(predicate::str::contains("firewall: disabled"));

    droidwall(&config)?
        .arg("compile")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "$IPTABLES -A droidwall-wifi -m owner --uid-owner 10005 -j droidwall-reject || exit",
        ))
        .stdout(predicate::str::contains("--uid-owner 10005 -j droidwall-reject").count(1));
    Ok(())
}

#[test]
fn apps_lists_network_capable_packages() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir)?;

    droidwall(&config)?
        .args(["apps", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("com.example.browser"))
        .stdout(predicate::str::contains("com.example.offline").not());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[logging]\nlevel = \"loud\"\n")?;

    Command::cargo_bin("droidwall")?
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("logging.level"));
    Ok(())
}
