//! # FailFixer Core
//!
//! Core library for FailFixer: turns a G-code file whose print failed part
//! way through into a new file that resumes at a chosen layer or Z height.
//!
//! ## Modules
//!
//! - `parser`: Single-pass G-code parser with layer detection and printer state
//! - `mapper`: Layer number and measured-Z lookup with tolerance matching
//! - `generator`: Resume file synthesis (safety header, body, Z rebasing)
//! - `validator`: Safety checks on generated output
//! - `profile`: Printer profiles and firmware detection
//! - `pipeline`: End-to-end orchestration and atomic output writes
//! - `settings`: Persistent user settings from configuration file
//! - `error`: Error types and result aliases
//!
//! ## Example
//!
//! ```
//! use failfixer_core::{
//!     GcodeParser, LayerMapper, ResumeConfig, ResumeGenerator, ResumeMode, Validator,
//! };
//!
//! let gcode = "M140 S60\nM104 S200\n;LAYER:0\nG1 Z0.2\nG1 X1 Y1 E1\n;LAYER:1\nG1 Z0.4\nG1 X2 Y2 E2\n";
//! let doc = GcodeParser::new().parse_str(gcode);
//! let mapper = LayerMapper::new(&doc.layers, 0.15)?;
//! let layer = mapper.by_z_height(0.42)?;
//!
//! let config = ResumeConfig::new(layer.layer.number, layer.layer.z_height, 60.0, 200.0);
//! let lines = ResumeGenerator::new().generate(&doc, &layer, &config);
//!
//! let report = Validator::new().validate(&lines, config.output_resume_z(), 10.0, ResumeMode::InAir);
//! assert!(report.ok());
//! # Ok::<(), failfixer_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gcode;
pub mod generator;
pub mod mapper;
pub mod parser;
pub mod pipeline;
pub mod profile;
pub mod settings;
pub mod validator;

pub use error::{Error, Result};
pub use generator::{
    ResumeConfig, ResumeGenerator, ResumeMode, DEFAULT_BED_MESH_CMD, DEFAULT_SAFE_LIFT_MM,
    HEADER_END_MARKER, HEADER_START_MARKER,
};
pub use mapper::{LayerMapper, LayerMatch, DEFAULT_TOLERANCE_MM};
pub use parser::{
    DetectionMethod, ExtruderMode, GcodeParser, Layer, ParsedDocument, Positioning, PrinterState,
    Units,
};
pub use pipeline::{
    build_output_path, write_lines_atomic, Controller, ResumeOutcome, ResumePlan, ResumeRequest,
    ResumeSelector, FALLBACK_BED_TEMP, FALLBACK_NOZZLE_TEMP,
};
pub use profile::{
    detect_firmware, PrinterProfile, ProfileLoader, AUTO_PROFILE_NAME, BUILTIN_PROFILES,
    DEFAULT_PROFILE_NAME, PROFILES_DIR_ENV,
};
pub use settings::{BehaviorSettings, ProfileSettings, ResumeSettings, Settings, SettingsError};
pub use validator::{IssueCode, Severity, ValidationIssue, ValidationResult, Validator};
