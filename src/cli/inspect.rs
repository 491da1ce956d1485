use anyhow::{Context, Result};
use droidwall_core::{Firewall, TrafficClass};

pub async fn handle_rules_command(firewall: &Firewall) -> Result<()> {
    let listing = firewall
        .show_rules()
        .await
        .context("failed to list filter rules")?;
    print!("{listing}");
    Ok(())
}

pub async fn handle_log_command(firewall: &Firewall, json: bool) -> Result<()> {
    if json {
        let report = firewall
            .block_report()
            .await
            .context("failed to read the kernel log")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let rendered = firewall
            .show_log()
            .await
            .context("failed to read the kernel log")?;
        println!("{}", rendered.trim_end());
    }
    Ok(())
}

pub async fn handle_clear_log_command(firewall: &Firewall) -> Result<()> {
    firewall
        .clear_log()
        .await
        .context("failed to clear the kernel log")?;
    println!("Log cleared.");
    Ok(())
}

pub fn handle_apps_command(firewall: &Firewall, json: bool) -> Result<()> {
    let snapshot = firewall
        .snapshot()
        .context("failed to enumerate applications")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        return Ok(());
    }

    let flag = |allowed: bool, mark: &'static str| if allowed { mark } else { "-" };
    for identity in snapshot.iter() {
        println!(
            "{:>7}  {}{}  {}",
            identity.id,
            flag(identity.allowed_on(TrafficClass::Wifi), "W"),
            flag(identity.allowed_on(TrafficClass::Mobile), "M"),
            identity.display_names.join(", "),
        );
    }
    Ok(())
}

/// Dry run: the script `apply-saved` would execute.
pub fn handle_compile_command(firewall: &Firewall) -> Result<()> {
    let rules = firewall.saved_rules();
    print!("{}", firewall.compiler().compile(&rules));
    Ok(())
}

pub async fn handle_check_root_command(firewall: &Firewall) -> Result<()> {
    if firewall.has_root_access().await {
        println!("Elevated execution available.");
        Ok(())
    } else {
        anyhow::bail!("elevated execution is not available")
    }
}
