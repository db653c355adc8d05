//! Validate command - runs the safety checks on a G-code file
//!
//! Generated resume files carry their resume height, mode and safe lift in
//! the header comments; those are used unless overridden on the command line.

use anyhow::{bail, Context, Result};
use console::style;
use std::path::{Path, PathBuf};

use failfixer_core::{
    ResumeMode, Severity, ValidationResult, Validator, DEFAULT_SAFE_LIFT_MM, HEADER_END_MARKER,
};

/// Arguments for the validate command
pub struct ValidateArgs {
    pub file: PathBuf,
    pub resume_z: Option<f64>,
    pub safe_lift: Option<f64>,
    pub mode: Option<ResumeMode>,
    pub json: bool,
    pub silent: bool,
}

/// Resume settings recorded in a generated header
#[derive(Debug, Default, PartialEq)]
struct HeaderInfo {
    mode: Option<ResumeMode>,
    resume_z: Option<f64>,
    z_offset: Option<f64>,
    safe_lift: Option<f64>,
}

impl HeaderInfo {
    /// Read the `; Key: value` comments above the header end marker
    fn scan(lines: &[String]) -> Self {
        let mut info = Self::default();
        for line in lines {
            let line = line.trim();
            if line == HEADER_END_MARKER {
                break;
            }
            let Some((key, value)) = line
                .strip_prefix(';')
                .and_then(|rest| rest.split_once(':'))
            else {
                continue;
            };
            let value = value.trim();
            let number = || {
                value
                    .split_whitespace()
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
            };
            match key.trim() {
                "Resume Mode" => info.mode = value.parse().ok(),
                "Resume Z" => info.resume_z = number(),
                "Z Offset" => info.z_offset = number(),
                "Safe Lift" => info.safe_lift = number(),
                _ => {}
            }
        }
        info
    }

    /// Height the resume layer prints at in the file's own coordinates
    fn output_resume_z(&self, mode: ResumeMode) -> Option<f64> {
        let offset = self.z_offset.unwrap_or(0.0);
        match mode {
            ResumeMode::InAir => self.resume_z.map(|z| z + offset),
            ResumeMode::FromPlate => Some(offset),
        }
    }
}

/// Execute the validate command
pub fn execute(args: ValidateArgs) -> Result<()> {
    let lines = read_lines(&args.file)?;
    let header = HeaderInfo::scan(&lines);

    let mode = args.mode.or(header.mode).unwrap_or_default();
    let resume_z = args
        .resume_z
        .or_else(|| header.output_resume_z(mode))
        .unwrap_or(0.0);
    let safe_lift = args
        .safe_lift
        .or(header.safe_lift)
        .unwrap_or(DEFAULT_SAFE_LIFT_MM);

    tracing::debug!(
        "Validating {:?} as {} (resume Z {:.3})",
        args.file,
        mode,
        resume_z
    );
    let result = Validator::new().validate(&lines, resume_z, safe_lift, mode);

    if args.json {
        let output = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", output);
    } else if !args.silent {
        print_report(&args.file, mode, resume_z, &result);
    }

    if !result.ok() {
        bail!("Validation failed with {} error(s)", result.errors().len());
    }
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

fn print_report(file: &Path, mode: ResumeMode, resume_z: f64, result: &ValidationResult) {
    println!(
        "{} {} ({}, resume Z {:.3} mm)",
        style("Validating:").bold(),
        style(file.display()).cyan(),
        mode,
        resume_z
    );

    for issue in &result.issues {
        let marker = match issue.severity {
            Severity::Error => style("✗").red().bold(),
            Severity::Warning => style("⚠").yellow().bold(),
        };
        println!("  {} {}", marker, issue);
    }

    let summary = result.summary();
    if result.ok() {
        println!("{} {}", style("✓").green().bold(), summary);
    } else {
        println!("{} {}", style("✗").red().bold(), summary);
    }
}
