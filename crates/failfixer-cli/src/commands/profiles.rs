//! Profiles command - lists printer profiles

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

use failfixer_core::{ProfileLoader, AUTO_PROFILE_NAME, BUILTIN_PROFILES};

/// Execute the profiles command
pub fn execute(profiles_dir: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    let loader = ProfileLoader::resolve(profiles_dir.as_deref());
    let files = loader.list_profiles();

    // JSON output mode - always output even in silent mode (it's machine-readable)
    if json {
        let value = serde_json::json!({
            "directory": loader.profiles_dir(),
            "profiles": files,
            "builtin": BUILTIN_PROFILES,
        });
        let output =
            serde_json::to_string_pretty(&value).context("Failed to serialize profiles")?;
        println!("{}", output);
        return Ok(());
    }

    if silent {
        return Ok(());
    }

    let dir = loader.profiles_dir();
    println!("{} {}", style("Profile directory:").bold(), dir.display());
    if !dir.is_dir() {
        println!("  {}", style("(not found)").yellow());
    }
    println!();

    if files.is_empty() {
        println!("No profile files found.");
    } else {
        println!(
            "{} {} profile file(s):",
            style("Found").green().bold(),
            files.len()
        );
        for name in &files {
            let detail = loader
                .load_path(&dir.join(name))
                .map(|p| {
                    format!(
                        "{} | lift {} mm | park {},{} | mesh {}",
                        p.firmware,
                        p.safe_lift_mm,
                        p.park_x,
                        p.park_y,
                        if p.bed_mesh_cmd.is_empty() {
                            "none"
                        } else {
                            p.bed_mesh_cmd.as_str()
                        }
                    )
                })
                .unwrap_or_else(|e| style(e.to_string()).red().to_string());
            println!("  {} {}", style(name).cyan(), style(detail).dim());
        }
    }

    println!();
    println!(
        "{} {}",
        style("Built-in:").bold(),
        BUILTIN_PROFILES.join(", ")
    );
    println!(
        "{}",
        style(format!(
            "Use --profile <name> to pick one, or --profile {} to detect the firmware.",
            AUTO_PROFILE_NAME
        ))
        .dim()
    );

    Ok(())
}
