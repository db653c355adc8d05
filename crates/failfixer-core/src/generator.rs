//! Resume file generation
//!
//! The generated file has three parts:
//! 1. preserved slicer metadata from the preamble (slicer id, filament and
//!    material comments, thumbnail blocks)
//! 2. a safety header between [`HEADER_START_MARKER`] and [`HEADER_END_MARKER`]
//!    that re-homes, heats, lifts and travels to the resume point
//! 3. the original body from the resume layer to the end of the file
//!
//! Absolute Z values in the body are rebased onto the resume height: in
//! [`ResumeMode::FromPlate`] the resume layer prints at the plate plus the Z
//! offset, in [`ResumeMode::InAir`] every layer is raised by the Z offset.

use crate::error::{Error, Result};
use crate::gcode;
use crate::mapper::LayerMatch;
use crate::parser::{ExtruderMode, ParsedDocument, Positioning, Units};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// First line of the generated safety header
pub const HEADER_START_MARKER: &str = "; --- FailFixer Resume Header ---";

/// Last line of the generated safety header
pub const HEADER_END_MARKER: &str = "; --- End Resume Header ---";

/// Default safe lift above the resume height in mm
pub const DEFAULT_SAFE_LIFT_MM: f64 = 10.0;

/// Default bed mesh command (Marlin)
pub const DEFAULT_BED_MESH_CMD: &str = "M420 S1";

/// Default park position in mm
pub const DEFAULT_PARK_X: f64 = 0.0;
/// Default park position in mm
pub const DEFAULT_PARK_Y: f64 = 200.0;

const Z_FEEDRATE: u32 = 600;
const TRAVEL_FEEDRATE: u32 = 6000;
const MM_PER_INCH: f64 = 25.4;

/// Comment column for generated commands
const COMMENT_COLUMN: usize = 27;

// ============================================================================
// Resume Mode
// ============================================================================

/// How the print is resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// The failed part is still on the bed; continue on top of it without homing Z
    #[default]
    InAir,
    /// The part was removed; print the remaining layers starting at the plate
    FromPlate,
}

impl ResumeMode {
    /// Machine-readable name (`in_air` / `from_plate`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeMode::InAir => "in_air",
            ResumeMode::FromPlate => "from_plate",
        }
    }

    /// Prefix used in generated file names
    pub fn file_prefix(&self) -> &'static str {
        match self {
            ResumeMode::InAir => "In-Place",
            ResumeMode::FromPlate => "On-Plate",
        }
    }
}

impl std::fmt::Display for ResumeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResumeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "in_air" | "in-air" | "inair" | "in-place" => Ok(ResumeMode::InAir),
            "from_plate" | "from-plate" | "plate" | "on-plate" => Ok(ResumeMode::FromPlate),
            other => Err(Error::InvalidConfig(format!("Unknown resume mode: {}", other))),
        }
    }
}

// ============================================================================
// Resume Config
// ============================================================================

/// Parameters for a resume file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeConfig {
    /// Layer number printed first
    pub resume_layer: i64,
    /// Z height of that layer in the source file
    pub resume_z: f64,
    /// Bed temperature in °C
    pub bed_temp: f64,
    /// Nozzle temperature in °C
    pub nozzle_temp: f64,
    /// Extra height above the resume point for travel moves
    pub safe_lift_mm: f64,
    /// Added to the resume height (positive prints higher)
    pub z_offset_mm: f64,
    /// Bed mesh command, empty to skip
    pub bed_mesh_cmd: String,
    /// Resume mode
    pub resume_mode: ResumeMode,
    /// Park position while heating
    pub park_x: f64,
    /// Park position while heating
    pub park_y: f64,
}

impl ResumeConfig {
    /// Create a config with default lift, mesh command and park position
    pub fn new(resume_layer: i64, resume_z: f64, bed_temp: f64, nozzle_temp: f64) -> Self {
        Self {
            resume_layer,
            resume_z,
            bed_temp,
            nozzle_temp,
            safe_lift_mm: DEFAULT_SAFE_LIFT_MM,
            z_offset_mm: 0.0,
            bed_mesh_cmd: DEFAULT_BED_MESH_CMD.to_string(),
            resume_mode: ResumeMode::InAir,
            park_x: DEFAULT_PARK_X,
            park_y: DEFAULT_PARK_Y,
        }
    }

    /// Set the safe lift height
    pub fn safe_lift(mut self, mm: f64) -> Self {
        self.safe_lift_mm = mm;
        self
    }

    /// Set the Z offset
    pub fn z_offset(mut self, mm: f64) -> Self {
        self.z_offset_mm = mm;
        self
    }

    /// Set the bed mesh command
    pub fn bed_mesh_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.bed_mesh_cmd = cmd.into();
        self
    }

    /// Set the resume mode
    pub fn mode(mut self, mode: ResumeMode) -> Self {
        self.resume_mode = mode;
        self
    }

    /// Set the park position
    pub fn park(mut self, x: f64, y: f64) -> Self {
        self.park_x = x;
        self.park_y = y;
        self
    }

    /// Height the resume layer prints at in the generated file
    ///
    /// In-air keeps the source coordinates; from-plate rebases the resume
    /// layer to the plate.
    pub fn output_resume_z(&self) -> f64 {
        match self.resume_mode {
            ResumeMode::InAir => self.resume_z + self.z_offset_mm,
            ResumeMode::FromPlate => self.z_offset_mm,
        }
    }
}

// ============================================================================
// Motion State
// ============================================================================

/// Modal state and tool position while replaying source lines
#[derive(Debug, Clone, Default)]
struct MotionState {
    units: Units,
    positioning: Positioning,
    extruder_mode: ExtruderMode,
    x: Option<f64>,
    y: Option<f64>,
    e: f64,
}

impl MotionState {
    fn replay(lines: &[String]) -> Self {
        let mut state = Self::default();
        for line in lines {
            state.apply(gcode::code_part(line));
        }
        state
    }

    /// Update the state with one command. Returns true for motions that move X or Y.
    fn apply(&mut self, code: &str) -> bool {
        let Some(cmd) = gcode::command_code(code) else {
            return false;
        };
        match (cmd.letter, cmd.number) {
            ('G', 20) => self.units = Units::Inches,
            ('G', 21) => self.units = Units::Millimeters,
            ('G', 90) => self.positioning = Positioning::Absolute,
            ('G', 91) => self.positioning = Positioning::Relative,
            ('M', 82) => self.extruder_mode = ExtruderMode::Absolute,
            ('M', 83) => self.extruder_mode = ExtruderMode::Relative,
            ('G', 92) => {
                if let Some(e) = gcode::param(code, 'E') {
                    self.e = e;
                }
                if let Some(x) = gcode::param(code, 'X') {
                    self.x = Some(x);
                }
                if let Some(y) = gcode::param(code, 'Y') {
                    self.y = Some(y);
                }
            }
            _ if cmd.is_motion() => {
                let mut moved_xy = false;
                for word in gcode::params(code) {
                    let Some(value) = word.value else { continue };
                    match word.letter {
                        'X' => {
                            self.x = Some(self.axis(self.x, value));
                            moved_xy = true;
                        }
                        'Y' => {
                            self.y = Some(self.axis(self.y, value));
                            moved_xy = true;
                        }
                        'E' => match self.extruder_mode {
                            ExtruderMode::Absolute => self.e = value,
                            ExtruderMode::Relative => self.e += value,
                        },
                        _ => {}
                    }
                }
                return moved_xy;
            }
            _ => {}
        }
        false
    }

    fn axis(&self, current: Option<f64>, value: f64) -> f64 {
        match self.positioning {
            Positioning::Absolute => value,
            Positioning::Relative => current.unwrap_or(0.0) + value,
        }
    }

    fn unit_scale(&self) -> f64 {
        match self.units {
            Units::Millimeters => 1.0,
            Units::Inches => MM_PER_INCH,
        }
    }
}

// ============================================================================
// Preserved Metadata
// ============================================================================

fn thumbnail_begin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^;\s*thumbnail(?:_\w+)?\s+begin\b").expect("invalid regex pattern")
    })
}

fn thumbnail_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^;\s*thumbnail(?:_\w+)?\s+end\b").expect("invalid regex pattern")
    })
}

fn metadata_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)generated\s+(?:by|with)|filament|material").expect("invalid regex pattern")
    })
}

/// Slicer id, filament/material comments and complete thumbnail blocks
fn preserved_metadata(preamble: &[String]) -> Vec<String> {
    let mut kept = Vec::new();
    let mut idx = 0;
    while idx < preamble.len() {
        let line = preamble[idx].trim();
        if thumbnail_begin_regex().is_match(line) {
            let end = preamble[idx + 1..]
                .iter()
                .position(|l| thumbnail_end_regex().is_match(l.trim()))
                .map(|p| p + idx + 1);
            match end {
                Some(end) => {
                    kept.extend_from_slice(&preamble[idx..=end]);
                    idx = end + 1;
                }
                None => {
                    tracing::debug!("Dropping unterminated thumbnail block at line {}", idx + 1);
                    idx += 1;
                }
            }
            continue;
        }
        if line.starts_with(';') && metadata_regex().is_match(line) {
            kept.push(preamble[idx].clone());
        }
        idx += 1;
    }
    kept
}

// ============================================================================
// Formatting Helpers
// ============================================================================

/// A command with a trailing comment aligned to [`COMMENT_COLUMN`]
fn annotated(code: &str, comment: &str) -> String {
    if code.len() >= COMMENT_COLUMN {
        format!("{} ; {}", code, comment)
    } else {
        format!("{:<width$}; {}", code, comment, width = COMMENT_COLUMN)
    }
}

/// Shortest decimal form with at most `decimals` places
fn trim_number(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        &text
    };
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Rebase the absolute Z words of one body line
fn rebase_line(line: &str, shift: f64) -> Option<String> {
    let code = gcode::code_part(line);
    let cmd = gcode::command_code(code)?;
    if !cmd.is_motion() {
        return None;
    }

    let mut rebased = String::with_capacity(line.len() + 4);
    let mut last = 0;
    for word in gcode::params(code) {
        let (Some(z), 'Z') = (word.value, word.letter) else {
            continue;
        };
        let new_z = z + shift;
        let new_z = if new_z <= 0.0 { 0.0 } else { new_z };
        rebased.push_str(&line[last..word.span.start]);
        rebased.push_str(&format!("Z{:.3}", new_z));
        last = word.span.end;
    }
    if last == 0 {
        return None;
    }
    rebased.push_str(&line[last..]);
    Some(rebased)
}

// ============================================================================
// Generator
// ============================================================================

/// Builds resume files from a parsed document
#[derive(Debug, Clone, Default)]
pub struct ResumeGenerator;

impl ResumeGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self
    }

    /// Generate the resume file as lines without terminators
    pub fn generate(
        &self,
        doc: &ParsedDocument,
        layer_match: &LayerMatch,
        config: &ResumeConfig,
    ) -> Vec<String> {
        let start = layer_match.layer.start_line.min(doc.lines.len());
        let before = &doc.lines[..start];
        let body = &doc.lines[start..];

        let state = MotionState::replay(before);
        let first_xy = first_xy_position(&state, body);

        let mut out = preserved_metadata(&doc.preamble_lines);
        self.push_header(&mut out, doc, config, &state, first_xy);

        let shift = body_z_shift(config, &state);
        if shift == 0.0 {
            out.extend(body.iter().cloned());
        } else {
            self.push_rebased_body(&mut out, body, shift, &state);
        }

        tracing::debug!(
            "Generated {} lines ({} body lines) resuming at layer {} in {} mode",
            out.len(),
            body.len(),
            config.resume_layer,
            config.resume_mode
        );
        out
    }

    /// Generate the resume file as newline-terminated text
    pub fn generate_text(
        &self,
        doc: &ParsedDocument,
        layer_match: &LayerMatch,
        config: &ResumeConfig,
    ) -> String {
        let lines = self.generate(doc, layer_match, config);
        let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in &lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    fn push_header(
        &self,
        out: &mut Vec<String>,
        doc: &ParsedDocument,
        config: &ResumeConfig,
        state: &MotionState,
        first_xy: Option<(Option<f64>, Option<f64>)>,
    ) {
        let scale = state.unit_scale();
        let resume_z_mm = config.resume_z * scale;
        let lift_z = resume_z_mm + config.z_offset_mm + config.safe_lift_mm;
        let descend_z = match config.resume_mode {
            ResumeMode::InAir => resume_z_mm + config.z_offset_mm,
            ResumeMode::FromPlate => config.z_offset_mm,
        };
        let bed = trim_number(config.bed_temp, 1);
        let nozzle = trim_number(config.nozzle_temp, 1);

        out.push(HEADER_START_MARKER.to_string());
        out.push(format!("; Resume Mode: {}", config.resume_mode));
        out.push(format!("; Resume Layer: {}", config.resume_layer));
        out.push(format!("; Resume Z: {:.3}", config.resume_z));
        if config.z_offset_mm != 0.0 {
            out.push(format!("; Z Offset: {:.3}", config.z_offset_mm));
        }
        out.push(format!("; Source: {}", doc.source_name));
        out.push(format!("; Bed Temp: {} C", bed));
        out.push(format!("; Nozzle Temp: {} C", nozzle));
        out.push(format!("; Safe Lift: {:.3} mm", config.safe_lift_mm));

        out.push(annotated("G21", "Millimeters for header moves"));
        out.push(annotated("G90", "Absolute positioning"));
        out.push(annotated(&format!("M140 S{}", bed), "Start heating bed"));
        out.push(annotated(&format!("M104 S{}", nozzle), "Start heating nozzle"));

        match config.resume_mode {
            ResumeMode::InAir => {
                out.push(annotated(
                    &format!("G92 Z{:.3}", resume_z_mm),
                    "Declare current Z as the resume height",
                ));
                out.push(annotated(
                    &format!("G1 Z{:.3} F{}", lift_z, Z_FEEDRATE),
                    "Safe lift above the part",
                ));
                out.push(annotated("G28 X Y", "Home X and Y only"));
            }
            ResumeMode::FromPlate => {
                out.push(annotated("G28", "Home all axes"));
                out.push(annotated(
                    &format!("G1 Z{:.3} F{}", lift_z, Z_FEEDRATE),
                    "Safe lift",
                ));
            }
        }

        out.push(annotated(
            &format!(
                "G0 X{:.3} Y{:.3} F{}",
                config.park_x, config.park_y, TRAVEL_FEEDRATE
            ),
            "Park while heating",
        ));
        out.push(annotated(&format!("M190 S{}", bed), "Wait for bed"));
        out.push(annotated(&format!("M109 S{}", nozzle), "Wait for nozzle"));

        let mesh = config.bed_mesh_cmd.trim();
        if !mesh.is_empty() {
            out.push(annotated(mesh, "Load bed mesh"));
        }

        out.push(annotated(state.extruder_mode.as_gcode(), "Restore extruder mode"));
        let e = match state.extruder_mode {
            ExtruderMode::Absolute => state.e,
            ExtruderMode::Relative => 0.0,
        };
        out.push(annotated(
            &format!("G92 E{}", trim_number(e, 5)),
            "Restore extruder position",
        ));

        if let Some((x, y)) = first_xy {
            let mut travel = "G0".to_string();
            if let Some(x) = x {
                travel.push_str(&format!(" X{:.3}", x * scale));
            }
            if let Some(y) = y {
                travel.push_str(&format!(" Y{:.3}", y * scale));
            }
            travel.push_str(&format!(" F{}", TRAVEL_FEEDRATE));
            out.push(annotated(&travel, "Travel to resume start"));
        }
        out.push(annotated(
            &format!("G1 Z{:.3} F{}", descend_z, Z_FEEDRATE),
            "Descend to resume height",
        ));
        out.push(annotated(state.units.as_gcode(), "Restore units"));
        out.push(annotated(state.positioning.as_gcode(), "Restore positioning"));
        out.push(HEADER_END_MARKER.to_string());
    }

    fn push_rebased_body(
        &self,
        out: &mut Vec<String>,
        body: &[String],
        shift: f64,
        state: &MotionState,
    ) {
        let mut positioning = state.positioning;
        let mut rebased = 0usize;
        for line in body {
            let code = gcode::code_part(line);
            match gcode::command_code(code) {
                Some(cmd) if cmd.is('G', 90) => positioning = Positioning::Absolute,
                Some(cmd) if cmd.is('G', 91) => positioning = Positioning::Relative,
                _ => {}
            }
            let new_line = match positioning {
                Positioning::Absolute => rebase_line(line, shift),
                Positioning::Relative => None,
            };
            match new_line {
                Some(new_line) => {
                    rebased += 1;
                    out.push(new_line);
                }
                None => out.push(line.clone()),
            }
        }
        tracing::debug!("Rebased Z on {} body lines (shift {:+.3})", rebased, shift);
    }
}

/// Amount added to absolute body Z words, in source units
fn body_z_shift(config: &ResumeConfig, state: &MotionState) -> f64 {
    let offset = config.z_offset_mm / state.unit_scale();
    match config.resume_mode {
        ResumeMode::InAir => offset,
        ResumeMode::FromPlate => offset - config.resume_z,
    }
}

/// Absolute XY after the first XY-moving command of `body`
fn first_xy_position(
    state: &MotionState,
    body: &[String],
) -> Option<(Option<f64>, Option<f64>)> {
    let mut probe = state.clone();
    body.iter()
        .find(|line| probe.apply(gcode::code_part(line)))
        .map(|_| (probe.x, probe.y))
}
