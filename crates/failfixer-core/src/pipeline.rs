//! Resume pipeline
//!
//! [`Controller`] runs parse → profile → layer lookup → generate → validate →
//! write. [`Controller::plan`] stops before writing so callers can inspect the
//! result, confirm an overwrite, or do a dry run; [`ResumePlan::write`]
//! finishes the job.

use crate::error::{Error, Result};
use crate::generator::{ResumeConfig, ResumeGenerator, ResumeMode};
use crate::mapper::{LayerMapper, LayerMatch};
use crate::parser::{DetectionMethod, GcodeParser, ParsedDocument};
use crate::profile::{detect_firmware, PrinterProfile, ProfileLoader, AUTO_PROFILE_NAME};
use crate::validator::{ValidationResult, Validator};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bed temperature used when the source has none
pub const FALLBACK_BED_TEMP: f64 = 60.0;

/// Nozzle temperature used when the source has none
pub const FALLBACK_NOZZLE_TEMP: f64 = 200.0;

/// Where to resume
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeSelector {
    /// Layer number from the slicer
    Layer(i64),
    /// Z height in mm measured on the failed print
    Z(f64),
}

impl std::fmt::Display for ResumeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResumeSelector::Layer(n) => write!(f, "layer {}", n),
            ResumeSelector::Z(z) => write!(f, "Z {:.3} mm", z),
        }
    }
}

/// Everything needed to produce a resume file
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    /// Source G-code file
    pub input_path: PathBuf,
    /// Resume point
    pub selector: ResumeSelector,
    /// Z offset in mm
    pub z_offset_mm: f64,
    /// Directory for the generated file (defaults to the input's directory)
    pub output_dir: Option<PathBuf>,
    /// Exact output file, overriding the generated name
    pub output_path: Option<PathBuf>,
    /// Profile name; `None` or `auto` detects the firmware
    pub profile_name: Option<String>,
    /// Resume mode
    pub resume_mode: ResumeMode,
    /// Park X override
    pub park_x: Option<f64>,
    /// Park Y override
    pub park_y: Option<f64>,
}

impl ResumeRequest {
    /// Request with default offset, mode and profile
    pub fn new(input_path: impl Into<PathBuf>, selector: ResumeSelector) -> Self {
        Self {
            input_path: input_path.into(),
            selector,
            z_offset_mm: 0.0,
            output_dir: None,
            output_path: None,
            profile_name: None,
            resume_mode: ResumeMode::InAir,
            park_x: None,
            park_y: None,
        }
    }

    /// Set the Z offset
    pub fn z_offset(mut self, mm: f64) -> Self {
        self.z_offset_mm = mm;
        self
    }

    /// Set the output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set the exact output file
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set the profile name
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    /// Set the resume mode
    pub fn mode(mut self, mode: ResumeMode) -> Self {
        self.resume_mode = mode;
        self
    }

    /// Override the profile park position
    pub fn park(mut self, x: f64, y: f64) -> Self {
        self.park_x = Some(x);
        self.park_y = Some(y);
        self
    }
}

/// Summary of a generated resume file
#[derive(Debug, Clone, Serialize)]
pub struct ResumeOutcome {
    /// Where the file is (or would be) written
    pub output_path: PathBuf,
    /// Layer the file resumes at
    pub layer_match: LayerMatch,
    /// Resume mode
    pub resume_mode: ResumeMode,
    /// Profile that was applied
    pub profile_name: String,
    /// Layer detection strategy used on the source
    pub detection_method: DetectionMethod,
    /// Validation findings
    pub validation: ValidationResult,
    /// Number of generated lines
    pub line_count: usize,
    /// Warnings, in the order they were raised
    pub warnings: Vec<String>,
    /// Layers in the source
    pub total_layers: usize,
    /// Bed temperature written to the header
    pub bed_temp: f64,
    /// Nozzle temperature written to the header
    pub nozzle_temp: f64,
}

/// A validated resume file that has not been written yet
#[derive(Debug, Clone)]
pub struct ResumePlan {
    /// Generated lines
    pub lines: Vec<String>,
    /// Summary
    pub outcome: ResumeOutcome,
}

impl ResumePlan {
    /// Write the file atomically and return the summary
    pub fn write(self) -> Result<ResumeOutcome> {
        write_lines_atomic(&self.outcome.output_path, &self.lines)?;
        tracing::info!(
            "Wrote {} lines to {:?}",
            self.lines.len(),
            self.outcome.output_path
        );
        Ok(self.outcome)
    }
}

/// Orchestrates the resume pipeline
#[derive(Debug, Clone)]
pub struct Controller {
    parser: GcodeParser,
    generator: ResumeGenerator,
    validator: Validator,
    profiles: ProfileLoader,
}

impl Controller {
    /// Controller using the standard profile directory search
    pub fn new(profiles_dir: Option<&Path>) -> Self {
        Self::with_profiles(ProfileLoader::resolve(profiles_dir))
    }

    /// Controller using a specific profile loader
    pub fn with_profiles(profiles: ProfileLoader) -> Self {
        Self {
            parser: GcodeParser::new(),
            generator: ResumeGenerator::new(),
            validator: Validator::new(),
            profiles,
        }
    }

    /// The profile loader in use
    pub fn profiles(&self) -> &ProfileLoader {
        &self.profiles
    }

    /// Run the whole pipeline and write the file
    pub fn run(&self, request: &ResumeRequest) -> Result<ResumeOutcome> {
        self.plan(request)?.write()
    }

    /// Run everything except the final write
    pub fn plan(&self, request: &ResumeRequest) -> Result<ResumePlan> {
        let mut warnings = Vec::new();

        let doc = self.parser.parse_file(&request.input_path)?;

        let (profile_name, profile) = self.select_profile(request, &doc, &mut warnings)?;

        let mapper = LayerMapper::new(&doc.layers, profile.tolerance_mm)?;
        let mut layer_match = match request.selector {
            ResumeSelector::Layer(n) => mapper.by_layer_number(n)?,
            ResumeSelector::Z(z) => mapper.by_z_height(z)?,
        };
        if let Some(warning) = &layer_match.warning {
            warnings.push(warning.clone());
        }

        // The failed layer is usually partly printed; start on the one above it.
        if let (ResumeMode::InAir, ResumeSelector::Layer(_)) =
            (request.resume_mode, request.selector)
        {
            if let Some(next) = mapper.next_layer(layer_match.layer.number) {
                tracing::debug!(
                    "In-air resume: layer {} -> {}",
                    layer_match.layer.number,
                    next.number
                );
                layer_match = LayerMatch::exact(next.clone());
                warnings.push(
                    "In-air safety adjustment: starting from next layer to avoid nozzle \
                     collision on failed layer."
                        .to_string(),
                );
            }
        }

        let bed_temp =
            resolve_temperature(doc.state.bed_temp, FALLBACK_BED_TEMP, "Bed", &mut warnings);
        let nozzle_temp = resolve_temperature(
            doc.state.nozzle_temp,
            FALLBACK_NOZZLE_TEMP,
            "Nozzle",
            &mut warnings,
        );

        let config = ResumeConfig::new(
            layer_match.layer.number,
            layer_match.layer.z_height,
            bed_temp,
            nozzle_temp,
        )
        .safe_lift(profile.safe_lift_mm)
        .z_offset(request.z_offset_mm)
        .bed_mesh_cmd(profile.bed_mesh_cmd.clone())
        .mode(request.resume_mode)
        .park(
            request.park_x.unwrap_or(profile.park_x),
            request.park_y.unwrap_or(profile.park_y),
        );

        let lines = self.generator.generate(&doc, &layer_match, &config);

        let validation = self.validator.validate(
            &lines,
            config.output_resume_z(),
            config.safe_lift_mm,
            config.resume_mode,
        );
        warnings.extend(validation.warnings().iter().map(|issue| issue.to_string()));
        if !validation.ok() {
            let errors: Vec<String> = validation.errors().iter().map(|e| e.to_string()).collect();
            return Err(Error::ValidationFailed(errors.join("; ")));
        }

        let output_path = match &request.output_path {
            Some(path) => path.clone(),
            None => build_output_path(
                &request.input_path,
                layer_match.layer.number,
                request.output_dir.as_deref(),
                request.resume_mode,
            ),
        };
        if same_file(&output_path, &request.input_path) {
            return Err(Error::InvalidConfig(format!(
                "Refusing to overwrite the source file {:?}",
                request.input_path
            )));
        }

        let outcome = ResumeOutcome {
            output_path,
            layer_match,
            resume_mode: request.resume_mode,
            profile_name,
            detection_method: doc.detection_method,
            validation,
            line_count: lines.len(),
            warnings,
            total_layers: doc.layers.len(),
            bed_temp,
            nozzle_temp,
        };
        Ok(ResumePlan { lines, outcome })
    }

    fn select_profile(
        &self,
        request: &ResumeRequest,
        doc: &ParsedDocument,
        warnings: &mut Vec<String>,
    ) -> Result<(String, PrinterProfile)> {
        let requested = request
            .profile_name
            .as_deref()
            .map(|n| n.strip_suffix(".json").unwrap_or(n))
            .filter(|n| !n.eq_ignore_ascii_case(AUTO_PROFILE_NAME));

        let name = match requested {
            Some(name) => name.to_string(),
            None => {
                let detected = detect_firmware(doc);
                warnings.push(format!("Auto profile selected: {}", detected));
                detected.to_string()
            }
        };
        let profile = self.profiles.load(Some(&name))?;
        tracing::debug!("Using profile {} ({:?})", name, profile);
        Ok((name, profile))
    }
}

fn resolve_temperature(
    detected: f64,
    fallback: f64,
    label: &str,
    warnings: &mut Vec<String>,
) -> f64 {
    if detected > 0.0 {
        return detected;
    }
    let message = format!(
        "{} temperature not detected in original file, using fallback {:.0}C.",
        label, fallback
    );
    tracing::warn!("{}", message);
    warnings.push(message);
    fallback
}

/// `{In-Place|On-Plate}_{stem}_resume_layer{NNNN}{suffix}` next to the input or in `output_dir`
pub fn build_output_path(
    input_path: &Path,
    layer_number: i64,
    output_dir: Option<&Path>,
    mode: ResumeMode,
) -> PathBuf {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let suffix = input_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".gcode".to_string());
    let name = format!(
        "{}_{}_resume_layer{:04}{}",
        mode.file_prefix(),
        stem,
        layer_number,
        suffix
    );
    match output_dir {
        Some(dir) => dir.join(name),
        None => input_path
            .parent()
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(&name)),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Write `lines` newline-terminated to a temporary sibling, then rename over `path`
pub fn write_lines_atomic<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidConfig(format!("Output path {:?} has no file name", path)))?;
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| -> Result<()> {
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_ref().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
