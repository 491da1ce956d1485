use anyhow::{Context, Result};
use droidwall_core::{FilterMode, Firewall};

use super::SelectionArgs;

pub fn handle_selection_command(
    firewall: &Firewall,
    args: &SelectionArgs,
    allowed: bool,
) -> Result<()> {
    for class in args.classes() {
        firewall
            .set_selection(args.id, class, allowed)
            .with_context(|| format!("failed to update {} selection", class.label()))?;
        println!(
            "{} {} on {}.",
            if allowed { "Selected" } else { "Unselected" },
            args.id,
            class.label()
        );
    }
    if firewall.is_enabled() {
        println!("Run `droidwall apply-saved` to activate the change.");
    }
    Ok(())
}

pub fn handle_mode_command(firewall: &Firewall, mode: FilterMode) -> Result<()> {
    firewall.set_mode(mode).context("failed to save filter mode")?;
    println!("Mode set to {mode}.");
    Ok(())
}

pub fn handle_logging_command(firewall: &Firewall, enabled: bool) -> Result<()> {
    firewall
        .set_logging(enabled)
        .context("failed to save logging flag")?;
    println!("Logging {}.", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub fn handle_password_command(firewall: &Firewall, password: &str) -> Result<()> {
    firewall
        .set_password(password)
        .context("failed to save password")?;
    if password.is_empty() {
        println!("Password cleared.");
    } else {
        println!("Password set.");
    }
    Ok(())
}
