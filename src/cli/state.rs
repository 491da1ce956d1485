use anyhow::{Context, Result};
use droidwall_config::DroidwallConfig;
use droidwall_core::{Firewall, FirewallError};

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

pub fn handle_status_command(firewall: &Firewall, config: &DroidwallConfig) -> Result<()> {
    println!(
        "firewall: {}",
        if firewall.is_enabled() { "enabled" } else { "disabled" }
    );
    println!("mode: {}", firewall.mode());
    println!("logging: {}", on_off(firewall.logging_enabled()));
    println!("password: {}", on_off(firewall.is_password_protected()));
    println!("state file: {}", config.paths.state_file.display());
    Ok(())
}

pub async fn handle_enable_command(firewall: &Firewall) -> Result<()> {
    if firewall.is_enabled() {
        firewall
            .apply_saved_rules()
            .await
            .context("failed to reapply saved rules")?;
        println!("Firewall already enabled; rules reapplied.");
        return Ok(());
    }
    firewall
        .handle_toggle_request()
        .await
        .context("failed to enable firewall")?;
    println!("Firewall enabled.");
    Ok(())
}

pub async fn handle_disable_command(firewall: &Firewall) -> Result<()> {
    if !firewall.is_enabled() {
        println!("Firewall already disabled.");
        return Ok(());
    }
    firewall
        .handle_toggle_request()
        .await
        .map_err(password_hint)
        .context("failed to disable firewall")?;
    println!("Firewall disabled.");
    Ok(())
}

pub async fn handle_toggle_command(firewall: &Firewall) -> Result<()> {
    let enabled = firewall
        .handle_toggle_request()
        .await
        .map_err(password_hint)
        .context("failed to toggle firewall")?;
    println!("Firewall {}.", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn handle_apply_command(firewall: &Firewall, saved_only: bool) -> Result<()> {
    let applied = if saved_only {
        firewall.apply_saved_rules().await
    } else {
        firewall.apply_rules().await
    };
    applied.context("failed to apply rules")?;
    println!("Rules applied ({} mode).", firewall.mode());
    Ok(())
}

pub async fn handle_purge_command(firewall: &Firewall) -> Result<()> {
    firewall.purge().await.context("failed to purge rules")?;
    println!("Rules purged.");
    Ok(())
}

pub async fn handle_removed_command(firewall: &Firewall, uid: i64) -> Result<()> {
    firewall
        .application_removed(uid)
        .await
        .with_context(|| format!("failed to forget owner id {uid}"))?;
    println!("Owner id {uid} removed from selections.");
    Ok(())
}

fn password_hint(err: FirewallError) -> anyhow::Error {
    match err {
        FirewallError::PasswordProtected => anyhow::Error::new(err)
            .context("clear the password with `droidwall password \"\"` first"),
        other => other.into(),
    }
}
