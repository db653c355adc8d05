//! Safety validation of generated resume files
//!
//! [`Validator::validate`] scans output lines once and reports:
//! - unusual G/M codes (warning)
//! - missing bed or nozzle heating commands (error)
//! - Z homing in an in-air resume (error)
//! - XY travel before the first Z move (error)
//! - a lift below resume height plus safe lift before that travel (warning)
//! - absolute Z moves well below the resume height after the header (warning)

use crate::gcode;
use crate::generator::{ResumeMode, HEADER_END_MARKER};
use crate::parser::Positioning;
use serde::Serialize;

/// How far below the resume height a body move may go before warning, in mm
pub const Z_COLLISION_MARGIN_MM: f64 = 0.5;

/// Slack for lift heights printed with three decimals
const LIFT_TOLERANCE_MM: f64 = 1e-3;

/// G-codes considered normal in a resume file
const VALID_G: &[u32] = &[0, 1, 2, 3, 4, 10, 11, 20, 21, 28, 29, 80, 90, 91, 92];

/// M-codes considered normal in a resume file
const VALID_M: &[u32] = &[
    0, 1, 17, 18, 19, 20, 21, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 42, 73, 75, 76, 77, 78,
    80, 81, 82, 83, 84, 85, 92, 104, 105, 106, 107, 108, 109, 110, 111, 112, 114, 115, 116,
    117, 118, 119, 120, 121, 122, 140, 141, 143, 149, 150, 155, 163, 164, 190, 191, 200, 201,
    202, 203, 204, 205, 206, 207, 208, 209, 210, 211, 212, 218, 220, 221, 226, 240, 250, 251,
    260, 261, 280, 281, 290, 291, 300, 301, 302, 303, 304, 305, 400, 401, 402, 403, 404, 405,
    406, 407, 408, 420, 421, 422, 423, 425, 500, 501, 502, 503, 504, 505, 510, 511, 512, 524,
    540, 552, 569, 575, 593, 600, 601, 602, 603, 605, 665, 701, 702, 703, 704, 710, 851, 852,
    860, 861, 862, 900, 906, 907, 908, 910, 911, 912, 913, 914, 915, 997, 998, 999,
];

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious but printable
    Warning,
    /// Unsafe; the file must not be written
    Error,
}

/// Machine-readable issue code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// G-code outside the known set
    UnusualG,
    /// M-code outside the known set
    UnusualM,
    /// No bed heating command
    MissingBedTemp,
    /// No nozzle heating command
    MissingNozzleTemp,
    /// Homing that includes Z
    ZHome,
    /// XY travel before any Z move
    XyBeforeZ,
    /// First XY travel below the safe lift height
    LowLift,
    /// Body move below the resume height
    ZCollision,
}

impl IssueCode {
    /// Code as printed in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::UnusualG => "UNUSUAL_G",
            IssueCode::UnusualM => "UNUSUAL_M",
            IssueCode::MissingBedTemp => "MISSING_BED_TEMP",
            IssueCode::MissingNozzleTemp => "MISSING_NOZZLE_TEMP",
            IssueCode::ZHome => "Z_HOME",
            IssueCode::XyBeforeZ => "XY_BEFORE_Z",
            IssueCode::LowLift => "LOW_LIFT",
            IssueCode::ZCollision => "Z_COLLISION",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Severity
    pub severity: Severity,
    /// 1-based line number, 0 for document-level issues
    pub line_number: usize,
    /// Machine-readable code
    pub code: IssueCode,
    /// Human-readable message
    pub message: String,
}

impl ValidationIssue {
    fn warning(line_number: usize, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line_number,
            code,
            message: message.into(),
        }
    }

    fn error(line_number: usize, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line_number,
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] line {}: {}", self.code, self.line_number, self.message)
    }
}

/// All findings of one validation run, in line order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Findings
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// True when there are no errors
    pub fn ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Warning findings
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.by_severity(Severity::Warning)
    }

    /// Error findings
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.by_severity(Severity::Error)
    }

    fn by_severity(&self, severity: Severity) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let errors = self.errors().len();
        let warnings = self.warnings().len();
        if errors == 0 && warnings == 0 {
            return "Validation passed with no issues.".to_string();
        }
        let mut parts = Vec::new();
        if errors > 0 {
            parts.push(format!("{} error(s)", errors));
        }
        if warnings > 0 {
            parts.push(format!("{} warning(s)", warnings));
        }
        format!("Validation: {}.", parts.join(", "))
    }
}

/// Resume file validator
#[derive(Debug, Clone, Default)]
pub struct Validator;

impl Validator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate output lines
    ///
    /// `resume_z` is the height the resume layer prints at in the output
    /// file's own coordinates. The first XY travel must happen at least
    /// `safe_lift_mm` above it.
    pub fn validate<S: AsRef<str>>(
        &self,
        lines: &[S],
        resume_z: f64,
        safe_lift_mm: f64,
        mode: ResumeMode,
    ) -> ValidationResult {
        tracing::debug!(
            "Validating {} lines (resume Z {:.3}, safe lift {:.3}, mode {})",
            lines.len(),
            resume_z,
            safe_lift_mm,
            mode
        );

        let mut result = ValidationResult::default();
        let mut has_bed = false;
        let mut has_nozzle = false;
        let mut first_z: Option<usize> = None;
        let mut first_xy: Option<usize> = None;
        let mut travel_z: Option<f64> = None;
        let mut in_header = true;
        let mut positioning = Positioning::Absolute;

        for (idx, raw) in lines.iter().enumerate() {
            let line_number = idx + 1;
            let stripped = raw.as_ref().trim();
            if stripped.is_empty() {
                continue;
            }
            if stripped.starts_with(';') {
                if stripped == HEADER_END_MARKER {
                    in_header = false;
                }
                continue;
            }

            let code = gcode::code_part(stripped);
            let Some(cmd) = gcode::command_code(code) else {
                continue;
            };

            match cmd.letter {
                'G' if !VALID_G.contains(&cmd.number) => result.issues.push(
                    ValidationIssue::warning(
                        line_number,
                        IssueCode::UnusualG,
                        format!("Unusual G-code: G{}", cmd.number),
                    ),
                ),
                'M' if !VALID_M.contains(&cmd.number) => result.issues.push(
                    ValidationIssue::warning(
                        line_number,
                        IssueCode::UnusualM,
                        format!("Unusual M-code: M{}", cmd.number),
                    ),
                ),
                _ => {}
            }

            match (cmd.letter, cmd.number) {
                ('M', 140) | ('M', 190) => has_bed |= has_positive_target(code),
                ('M', 104) | ('M', 109) => has_nozzle |= has_positive_target(code),
                ('G', 90) => positioning = Positioning::Absolute,
                ('G', 91) => positioning = Positioning::Relative,
                ('G', 28) if mode == ResumeMode::InAir && homes_z(code) => {
                    result.issues.push(ValidationIssue::error(
                        line_number,
                        IssueCode::ZHome,
                        "G28 homes Z. Auto-homing Z is forbidden in in-air resume files.",
                    ));
                }
                _ => {}
            }

            if !cmd.is_motion() {
                continue;
            }

            let z = gcode::param(code, 'Z');
            if z.is_some() && first_z.is_none() {
                first_z = Some(line_number);
            }
            if let (None, Positioning::Absolute, Some(z)) = (first_xy, positioning, z) {
                travel_z = Some(travel_z.map_or(z, |t| t.max(z)));
            }
            if first_xy.is_none() && (gcode::has_param(code, 'X') || gcode::has_param(code, 'Y')) {
                first_xy = Some(line_number);
            }

            if let (false, Positioning::Absolute, Some(z)) = (in_header, positioning, z) {
                if z < resume_z - Z_COLLISION_MARGIN_MM {
                    result.issues.push(ValidationIssue::warning(
                        line_number,
                        IssueCode::ZCollision,
                        format!(
                            "Z moves to {:.3} mm, which is below resume Z {:.3} mm. \
                             Possible collision.",
                            z, resume_z
                        ),
                    ));
                }
            }
        }

        if !has_bed {
            result.issues.push(ValidationIssue::error(
                0,
                IssueCode::MissingBedTemp,
                "No bed temperature command found.",
            ));
        }
        if !has_nozzle {
            result.issues.push(ValidationIssue::error(
                0,
                IssueCode::MissingNozzleTemp,
                "No nozzle temperature command found.",
            ));
        }
        if let Some(xy) = first_xy {
            if first_z.map_or(true, |z| z > xy) {
                result.issues.push(ValidationIssue::error(
                    xy,
                    IssueCode::XyBeforeZ,
                    "XY movement before Z lift. Risk of collision.",
                ));
            }
        }
        if let (Some(xy), Some(lift)) = (first_xy, travel_z) {
            let required = resume_z + safe_lift_mm;
            if lift < required - LIFT_TOLERANCE_MM {
                result.issues.push(ValidationIssue::warning(
                    xy,
                    IssueCode::LowLift,
                    format!(
                        "XY travel at Z {:.3} mm, below resume Z plus safe lift ({:.3} mm).",
                        lift, required
                    ),
                ));
            }
        }

        tracing::debug!("{}", result.summary());
        result
    }
}

/// `S` or `R` heater target above zero
fn has_positive_target(code: &str) -> bool {
    gcode::params(code)
        .filter(|w| w.letter == 'S' || w.letter == 'R')
        .any(|w| w.value.is_some_and(|v| v > 0.0))
}

/// `G28` with a Z word, or with no axis words at all (homes every axis)
fn homes_z(code: &str) -> bool {
    let axes: Vec<char> = gcode::params(code)
        .map(|w| w.letter)
        .filter(|l| matches!(l, 'X' | 'Y' | 'Z'))
        .collect();
    axes.is_empty() || axes.contains(&'Z')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::HEADER_START_MARKER;

    fn validate(lines: &[&str]) -> ValidationResult {
        Validator::new().validate(lines, 0.0, 10.0, ResumeMode::InAir)
    }

    fn error_codes(result: &ValidationResult) -> Vec<IssueCode> {
        result.errors().iter().map(|i| i.code).collect()
    }

    const HEATED: [&str; 4] = ["M140 S60", "M190 S60", "M104 S200", "M109 S200"];

    fn with_header(body: &[&'static str]) -> Vec<&'static str> {
        let mut lines = vec![HEADER_START_MARKER];
        lines.extend_from_slice(&HEATED);
        lines.extend_from_slice(body);
        lines.push(HEADER_END_MARKER);
        lines
    }

    #[test]
    fn test_missing_bed_temp() {
        let lines = [
            HEADER_START_MARKER,
            "M104 S200",
            "M109 S200",
            "G1 Z10 F3000",
            "G1 X10 Y10 E1.0",
            HEADER_END_MARKER,
        ];
        let result = validate(&lines);
        assert!(error_codes(&result).contains(&IssueCode::MissingBedTemp));
        assert!(!result.ok());
    }

    #[test]
    fn test_missing_nozzle_temp() {
        let lines = ["M140 S60", "M190 S60", "G1 Z10 F3000", "G1 X10 Y10 E1.0"];
        let result = validate(&lines);
        let missing = result
            .errors()
            .into_iter()
            .find(|i| i.code == IssueCode::MissingNozzleTemp)
            .unwrap();
        assert_eq!(missing.line_number, 0);
    }

    #[test]
    fn test_temp_detection_with_r_parameter() {
        let lines = ["M140 R60", "M190 R60", "M104 R205", "M109 R205", "G1 Z10"];
        let codes = error_codes(&validate(&lines));
        assert!(!codes.contains(&IssueCode::MissingBedTemp));
        assert!(!codes.contains(&IssueCode::MissingNozzleTemp));
    }

    #[test]
    fn test_zero_target_does_not_count() {
        let lines = ["M140 S0", "M104 S0", "G1 Z10"];
        let codes = error_codes(&validate(&lines));
        assert!(codes.contains(&IssueCode::MissingBedTemp));
        assert!(codes.contains(&IssueCode::MissingNozzleTemp));
    }

    #[test]
    fn test_missing_both_temps() {
        let lines = [HEADER_START_MARKER, "G1 Z10 F3000", "G1 X10 Y10 E1.0", HEADER_END_MARKER];
        let codes = error_codes(&validate(&lines));
        assert!(codes.contains(&IssueCode::MissingBedTemp));
        assert!(codes.contains(&IssueCode::MissingNozzleTemp));
    }

    #[test]
    fn test_g28_z_detected() {
        let result = validate(&with_header(&["G28 Z", "G1 Z10 F3000", "G1 X10 Y10 E1.0"]));
        assert!(error_codes(&result).contains(&IssueCode::ZHome));
        assert!(!result.ok());
    }

    #[test]
    fn test_bare_g28_homes_z() {
        let result = validate(&with_header(&["G28", "G1 Z10"]));
        assert!(error_codes(&result).contains(&IssueCode::ZHome));
    }

    #[test]
    fn test_g28_xy_is_fine() {
        let result = validate(&with_header(&["G28 X Y", "G1 Z10 F3000", "G1 X10 Y10 E1.0"]));
        assert!(!error_codes(&result).contains(&IssueCode::ZHome));
        assert!(result.ok());
    }

    #[test]
    fn test_g28_z_allowed_in_from_plate_mode() {
        let lines = [
            "M140 S60",
            "M190 S60",
            "M104 S200",
            "M109 S200",
            "G28 Z",
            "G1 Z0.3",
            "G1 X10 Y10 E1.0",
        ];
        let result = Validator::new().validate(&lines, 0.0, 10.0, ResumeMode::FromPlate);
        assert!(!error_codes(&result).contains(&IssueCode::ZHome));
    }

    #[test]
    fn test_xy_before_z_error() {
        let lines = with_header(&["G1 X10 Y10 F3000", "G1 Z10 F3000"]);
        let result = validate(&lines);
        let issue = result
            .errors()
            .into_iter()
            .find(|i| i.code == IssueCode::XyBeforeZ)
            .unwrap();
        assert_eq!(issue.line_number, 6);
    }

    #[test]
    fn test_xy_without_any_z_is_error() {
        let lines = with_header(&["G0 X10 Y10"]);
        assert!(error_codes(&validate(&lines)).contains(&IssueCode::XyBeforeZ));
    }

    #[test]
    fn test_z_before_xy_ok() {
        let lines = with_header(&["G1 Z10 F3000", "G1 X10 Y10 F3000"]);
        assert!(!error_codes(&validate(&lines)).contains(&IssueCode::XyBeforeZ));
    }

    #[test]
    fn test_z_and_xy_on_same_line_ok() {
        let lines = with_header(&["G1 X10 Y10 Z10 F3000"]);
        assert!(!error_codes(&validate(&lines)).contains(&IssueCode::XyBeforeZ));
    }

    #[test]
    fn test_low_lift_warning() {
        let lines = with_header(&["G1 Z3 F600", "G0 X10 Y10"]);
        let result = Validator::new().validate(&lines, 1.0, 5.0, ResumeMode::InAir);
        let warning = result
            .warnings()
            .into_iter()
            .find(|i| i.code == IssueCode::LowLift)
            .unwrap();
        assert_eq!(warning.line_number, 7);
        assert!(warning.message.contains("3.000"));
        assert!(warning.message.contains("6.000"));
        assert!(result.ok());
    }

    #[test]
    fn test_lift_uses_highest_z_before_travel() {
        let lines = with_header(&["G1 Z6.000", "G1 Z2", "G0 X10 Y10", "G1 Z1"]);
        let result = Validator::new().validate(&lines, 1.0, 5.0, ResumeMode::InAir);
        assert!(result.issues.is_empty(), "{:?}", result.issues);

        let result = Validator::new().validate(&lines, 1.0, 8.0, ResumeMode::InAir);
        let codes: Vec<IssueCode> = result.warnings().iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![IssueCode::LowLift]);
    }

    #[test]
    fn test_relative_lift_is_not_counted() {
        let lines = with_header(&["G1 Z1", "G91", "G1 Z20", "G90", "G0 X10 Y10"]);
        let result = Validator::new().validate(&lines, 1.0, 5.0, ResumeMode::InAir);
        let codes: Vec<IssueCode> = result.warnings().iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![IssueCode::LowLift]);
    }

    #[test]
    fn test_z_collision_warning() {
        let mut lines = with_header(&["G1 Z10 F3000", "G1 X10 Y10 F3000"]);
        lines.push("G1 Z0.1 F3000");
        let result = Validator::new().validate(&lines, 5.0, 10.0, ResumeMode::InAir);
        let warning = result
            .warnings()
            .into_iter()
            .find(|i| i.code == IssueCode::ZCollision)
            .unwrap();
        assert_eq!(warning.line_number, lines.len());
        assert!(warning.message.contains("0.100"));
        assert!(result.ok());
    }

    #[test]
    fn test_z_collision_ignored_inside_header() {
        let lines = [HEADER_START_MARKER, "M140 S60", "M104 S200", "G1 Z0.1", HEADER_END_MARKER];
        let result = Validator::new().validate(&lines, 5.0, 10.0, ResumeMode::InAir);
        assert!(result.warnings().is_empty());
    }

    #[test]
    fn test_z_collision_ignored_for_relative_moves() {
        let mut lines = with_header(&["G1 Z10"]);
        lines.extend_from_slice(&["G91", "G1 Z-0.2", "G90"]);
        let result = Validator::new().validate(&lines, 5.0, 10.0, ResumeMode::InAir);
        assert!(result.warnings().is_empty());
    }

    #[test]
    fn test_unusual_codes_warn() {
        let lines = with_header(&["G1 Z10", "G999", "M9999"]);
        let result = validate(&lines);
        let codes: Vec<IssueCode> = result.warnings().iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![IssueCode::UnusualG, IssueCode::UnusualM]);
        assert!(result.ok());
    }

    #[test]
    fn test_extended_commands_not_flagged() {
        let lines = with_header(&["G1 Z10", "BED_MESH_PROFILE LOAD=default", "G2 X1 Y1 I1 J0"]);
        assert!(validate(&lines).issues.is_empty());
    }

    #[test]
    fn test_summary() {
        let clean = validate(&with_header(&["G1 Z10", "G1 X1 Y1"]));
        assert_eq!(clean.summary(), "Validation passed with no issues.");

        let broken = validate(&["G999", "G1 X1"]);
        assert_eq!(broken.summary(), "Validation: 3 error(s), 1 warning(s).");
    }

    #[test]
    fn test_issue_display_and_code_names() {
        let issue = ValidationIssue::error(7, IssueCode::XyBeforeZ, "boom");
        assert_eq!(issue.to_string(), "[XY_BEFORE_Z] line 7: boom");
        assert_eq!(IssueCode::MissingNozzleTemp.as_str(), "MISSING_NOZZLE_TEMP");
    }

    #[test]
    fn test_serializes_codes() {
        let issue = ValidationIssue::warning(3, IssueCode::ZCollision, "low");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"Z_COLLISION\""));
        assert!(json.contains("\"warning\""));
    }
}
