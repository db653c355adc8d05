//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use failfixer_core::Settings;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output (for scripting)
    pub silent: bool,
    /// Custom configuration file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    // Determine the effective config path
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    // Handle --path flag
    if args.path {
        if let Some(path) = &config_path {
            if !args.silent {
                println!("{}", path.display());
            }
        } else if !args.silent {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    // Handle --init flag
    if args.init {
        return init_config(config_path, args.silent);
    }

    // Default: show current configuration
    show_config(config_path, args.json, args.silent)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, silent: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !silent {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let settings = Settings::default();
    let saved_path = settings
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    if !silent {
        println!(
            "{} Created configuration file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("You can edit this file to customize default settings:");
        println!();
        for line in Settings::default_config_string().lines() {
            println!("  {}", line);
        }
        println!();
        println!(
            "{}",
            style("Set [profiles] dir = \"/path/to/profiles\" to use your own profiles.").dim()
        );
    }

    Ok(())
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    if silent {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        // Output as JSON for scripting
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
    } else {
        // Human-readable output
        println!("{}", style("FailFixer Configuration").bold());
        println!();

        if let Some(path) = &config_path {
            if config_exists {
                println!("  {} {}", style("Config file:").dim(), path.display());
            } else {
                println!(
                    "  {} {} {}",
                    style("Config file:").dim(),
                    path.display(),
                    style("(not found, using defaults)").yellow()
                );
            }
        }
        println!();

        println!("{}", style("[resume]").cyan());
        println!("  mode = \"{}\"", settings.resume.mode);
        println!("  z_offset = {}", settings.resume.z_offset);
        println!("  profile = \"{}\"", settings.resume.profile);
        println!();

        println!("{}", style("[profiles]").cyan());
        match &settings.profiles.dir {
            Some(dir) => println!("  dir = \"{}\"", dir.display()),
            None => println!("  {}", style("# dir not set, using the default search").dim()),
        }
        println!();

        println!("{}", style("[behavior]").cyan());
        println!(
            "  skip_confirmation = {}",
            settings.behavior.skip_confirmation
        );
        println!("  quiet = {}", settings.behavior.quiet);

        if !config_exists {
            println!();
            println!(
                "{}",
                style("Run 'failfixer config --init' to create a configuration file.").dim()
            );
        }
    }

    Ok(())
}
