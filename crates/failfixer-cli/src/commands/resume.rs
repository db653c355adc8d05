//! Resume command - generates a resume file from a failed print
//!
//! Steps:
//! - Parse the source and pick the resume layer
//! - Generate and validate the resume file
//! - Confirm before replacing an existing output file
//! - Write the file atomically

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use std::path::PathBuf;

use failfixer_core::{Controller, ResumeMode, ResumeOutcome, ResumeRequest, ResumeSelector};

use crate::progress::{file_size, spinner};

/// Arguments for the resume command
pub struct ResumeArgs {
    pub file: PathBuf,
    pub layer: Option<i64>,
    pub z: Option<f64>,
    pub z_offset: f64,
    pub mode: ResumeMode,
    pub output_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub profile: String,
    pub profiles_dir: Option<PathBuf>,
    pub park: Option<(f64, f64)>,
    pub dry_run: bool,
    pub skip_confirm: bool,
    pub json: bool,
    pub silent: bool,
}

/// Conditionally println based on silent mode
macro_rules! println_if {
    ($silent:expr) => {
        if !$silent {
            println!();
        }
    };
    ($silent:expr, $($arg:tt)*) => {
        if !$silent {
            println!($($arg)*);
        }
    };
}

/// Execute the resume command
pub fn execute(args: ResumeArgs) -> Result<()> {
    let selector = selector(args.layer, args.z)?;
    // Human-readable output goes away in silent and JSON modes
    let quiet = args.silent || args.json;

    println_if!(
        quiet,
        "{} {}",
        style("Source:").bold(),
        style(args.file.display()).cyan()
    );
    if let Some(size) = file_size(&args.file) {
        println_if!(quiet, "  {} ({})", style("✓").green(), size);
    }

    let request = build_request(&args, selector);
    let controller = Controller::new(args.profiles_dir.as_deref());

    let pb = spinner(format!("Preparing resume at {}", selector), quiet);
    let plan = controller.plan(&request);
    pb.finish_and_clear();
    let plan =
        plan.with_context(|| format!("Failed to prepare resume for {}", args.file.display()))?;

    if !quiet {
        print_summary(&plan.outcome);
    }

    if args.dry_run {
        println_if!(
            quiet,
            "\n{} would write {} lines to {}",
            style("Dry run:").bold(),
            plan.lines.len(),
            style(plan.outcome.output_path.display()).cyan()
        );
        if args.json {
            print_json(&plan.outcome)?;
        }
        return Ok(());
    }

    if plan.outcome.output_path.exists() && !args.skip_confirm {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "{} already exists. Overwrite?",
                plan.outcome.output_path.display()
            ))
            .default(false)
            .interact()?;

        if !proceed {
            println!("{}", style("Aborted.").yellow());
            return Ok(());
        }
    }

    let outcome = plan.write().context("Failed to write resume file")?;

    println_if!(
        quiet,
        "\n{} Wrote {} ({} lines{})",
        style("✓").green().bold(),
        style(outcome.output_path.display()).cyan(),
        outcome.line_count,
        file_size(&outcome.output_path)
            .map(|s| format!(", {}", s))
            .unwrap_or_default()
    );

    if args.json {
        print_json(&outcome)?;
    }

    Ok(())
}

/// Turn the mutually exclusive `--layer` / `--z` flags into a selector
fn selector(layer: Option<i64>, z: Option<f64>) -> Result<ResumeSelector> {
    match (layer, z) {
        (Some(n), None) => Ok(ResumeSelector::Layer(n)),
        (None, Some(z)) if z.is_finite() && z >= 0.0 => Ok(ResumeSelector::Z(z)),
        (None, Some(z)) => anyhow::bail!("Invalid Z height: {}", z),
        _ => anyhow::bail!("Specify exactly one of --layer or --z"),
    }
}

fn build_request(args: &ResumeArgs, selector: ResumeSelector) -> ResumeRequest {
    let mut request = ResumeRequest::new(&args.file, selector)
        .z_offset(args.z_offset)
        .mode(args.mode)
        .profile(args.profile.clone());
    if let Some(dir) = &args.output_dir {
        request = request.output_dir(dir);
    }
    if let Some(path) = &args.output {
        request = request.output_path(path);
    }
    if let Some((x, y)) = args.park {
        request = request.park(x, y);
    }
    request
}

fn print_summary(outcome: &ResumeOutcome) {
    let layer = &outcome.layer_match.layer;
    println!();
    println!(
        "{} layer {} at Z {:.3} mm ({} of {} layers, {})",
        style("Resume:").bold(),
        style(layer.number).green().bold(),
        layer.z_height,
        outcome.resume_mode,
        outcome.total_layers,
        outcome.detection_method
    );
    println!(
        "  Profile: {} | Bed: {}°C | Nozzle: {}°C",
        style(&outcome.profile_name).cyan(),
        outcome.bed_temp,
        outcome.nozzle_temp
    );

    for warning in &outcome.warnings {
        println!("  {} {}", style("⚠").yellow().bold(), warning);
    }

    println!("  {} {}", style("✓").green(), outcome.validation.summary());
}

fn print_json(outcome: &ResumeOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}
