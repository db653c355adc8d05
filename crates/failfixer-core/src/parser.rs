//! Streaming G-code parser
//!
//! Reads a G-code file once, keeping every raw line, and produces a
//! [`ParsedDocument`] with:
//! - the layers found by the best available detection strategy
//! - the printer state (units, positioning, extruder mode, temperatures)
//! - the preamble (lines before the first layer) and header-end heuristic
//!
//! Layer detection strategies, highest priority first:
//! 1. `;LAYER:<n>` comment markers
//! 2. `;LAYER_CHANGE` comment markers
//! 3. Z increases on motion commands
//!
//! ## Example
//!
//! ```
//! use failfixer_core::parser::{GcodeParser, DetectionMethod};
//!
//! let doc = GcodeParser::new().parse_str(";LAYER:0\nG1 Z0.2\n;LAYER:1\nG1 Z0.4\n");
//! assert_eq!(doc.layers.len(), 2);
//! assert_eq!(doc.detection_method, DetectionMethod::CommentLayer);
//! ```

use crate::error::Result;
use crate::gcode::{self, CommandCode};
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Patterns
// ============================================================================

fn layer_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i);\s*LAYER\s*:\s*(-?\d+)").expect("invalid regex pattern")
    })
}

fn layer_change_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i);\s*LAYER_CHANGE").expect("invalid regex pattern"))
}

fn comment_nozzle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i);\s*(?:nozzle_temperature|temperature_extruder|extruder_temperature|hotend_temp|nozzle_temp|first_layer_temperature)\s*=\s*(\d+\.?\d*)",
        )
        .expect("invalid regex pattern")
    })
}

fn comment_bed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i);\s*(?:bed_temperature|first_layer_bed_temperature|heated_bed_temperature)\s*=\s*(\d+\.?\d*)",
        )
        .expect("invalid regex pattern")
    })
}

/// Macro parameter names that carry a nozzle temperature
const MACRO_NOZZLE_KEYS: &[&str] = &[
    "EXTRUDER_TEMP",
    "EXTRUDER",
    "HOTEND",
    "NOZZLE",
    "NOZZLE_TEMP",
    "HOTEND_TEMP",
];

/// Macro parameter names that carry a bed temperature
const MACRO_BED_KEYS: &[&str] = &["BED_TEMP", "BED", "BED_TEMPERATURE"];

// ============================================================================
// Printer State
// ============================================================================

/// Distance units selected by `G20`/`G21`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// `G21`
    #[default]
    Millimeters,
    /// `G20`
    Inches,
}

impl Units {
    /// The G-code that selects these units
    pub fn as_gcode(&self) -> &'static str {
        match self {
            Units::Millimeters => "G21",
            Units::Inches => "G20",
        }
    }
}

/// Axis positioning mode selected by `G90`/`G91`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Positioning {
    /// `G90`
    #[default]
    Absolute,
    /// `G91`
    Relative,
}

impl Positioning {
    /// The G-code that selects this mode
    pub fn as_gcode(&self) -> &'static str {
        match self {
            Positioning::Absolute => "G90",
            Positioning::Relative => "G91",
        }
    }
}

/// Extruder mode selected by `M82`/`M83`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtruderMode {
    /// `M82`
    #[default]
    Absolute,
    /// `M83`
    Relative,
}

impl ExtruderMode {
    /// The G-code that selects this mode
    pub fn as_gcode(&self) -> &'static str {
        match self {
            ExtruderMode::Absolute => "M82",
            ExtruderMode::Relative => "M83",
        }
    }
}

/// Printer state detected while scanning a file
///
/// Temperatures of `0.0` mean "not detected".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PrinterState {
    /// Distance units
    pub units: Units,
    /// Axis positioning mode
    pub positioning: Positioning,
    /// Extruder mode
    pub extruder_mode: ExtruderMode,
    /// Bed target temperature in °C
    pub bed_temp: f64,
    /// Nozzle target temperature in °C
    pub nozzle_temp: f64,
}

impl PrinterState {
    fn set_bed(&mut self, temp: f64) {
        if temp > 0.0 {
            self.bed_temp = temp;
        }
    }

    fn set_nozzle(&mut self, temp: f64) {
        if temp > 0.0 {
            self.nozzle_temp = temp;
        }
    }

    /// Apply a single command line (code part only, comment stripped)
    fn apply_command(&mut self, code: &str) {
        if let Some(cmd) = gcode::command_code(code) {
            self.apply_code(cmd, code);
        } else if gcode::is_extended_command(code) {
            self.apply_extended(code);
        }
    }

    fn apply_code(&mut self, cmd: CommandCode, code: &str) {
        match (cmd.letter, cmd.number) {
            ('G', 20) => self.units = Units::Inches,
            ('G', 21) => self.units = Units::Millimeters,
            ('G', 90) => self.positioning = Positioning::Absolute,
            ('G', 91) => self.positioning = Positioning::Relative,
            ('M', 82) => self.extruder_mode = ExtruderMode::Absolute,
            ('M', 83) => self.extruder_mode = ExtruderMode::Relative,
            ('M', 140) | ('M', 190) => {
                if let Some(t) = target_temperature(code) {
                    self.set_bed(t);
                }
            }
            ('M', 104) | ('M', 109) => {
                if let Some(t) = target_temperature(code) {
                    self.set_nozzle(t);
                }
            }
            _ => {}
        }
    }

    /// Klipper-style extended commands and start macros
    fn apply_extended(&mut self, code: &str) {
        let code = code.trim();
        let name = code.split_whitespace().next().unwrap_or_default();
        let args = macro_args(code);

        if name.eq_ignore_ascii_case("SET_HEATER_TEMPERATURE") {
            if let (Some(heater), Some(t)) =
                (lookup(&args, &["HEATER"]), lookup_f64(&args, &["TARGET"]))
            {
                self.apply_named_heater(heater, t);
            }
        } else if name.eq_ignore_ascii_case("TEMPERATURE_WAIT") {
            if let (Some(sensor), Some(t)) = (
                lookup(&args, &["SENSOR"]),
                lookup_f64(&args, &["MINIMUM", "MAXIMUM", "TARGET"]),
            ) {
                self.apply_named_heater(sensor, t);
            }
        } else {
            if let Some(t) = lookup_f64(&args, MACRO_NOZZLE_KEYS) {
                self.set_nozzle(t);
            }
            if let Some(t) = lookup_f64(&args, MACRO_BED_KEYS) {
                self.set_bed(t);
            }
        }
    }

    fn apply_named_heater(&mut self, heater: &str, temp: f64) {
        let heater = heater.to_ascii_uppercase();
        if heater.contains("BED") {
            self.set_bed(temp);
        } else if heater.contains("EXTRUDER") {
            self.set_nozzle(temp);
        }
    }

    /// Slicer metadata comments only fill values that are still unset
    fn apply_comment(&mut self, comment: &str) {
        if self.nozzle_temp == 0.0 {
            if let Some(t) = capture_f64(comment_nozzle_regex(), comment) {
                self.set_nozzle(t);
            }
        }
        if self.bed_temp == 0.0 {
            if let Some(t) = capture_f64(comment_bed_regex(), comment) {
                self.set_bed(t);
            }
        }
    }
}

/// Heater target from an `S` or `R` word
fn target_temperature(code: &str) -> Option<f64> {
    gcode::params(code)
        .find(|w| (w.letter == 'S' || w.letter == 'R') && w.value.is_some())
        .and_then(|w| w.value)
}

fn capture_f64(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// `KEY=VALUE` arguments of an extended command
fn macro_args(code: &str) -> Vec<(&str, &str)> {
    code.split_whitespace()
        .skip(1)
        .filter_map(|arg| arg.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

fn lookup<'a>(args: &[(&str, &'a str)], keys: &[&str]) -> Option<&'a str> {
    args.iter()
        .find(|(k, _)| keys.iter().any(|key| k.eq_ignore_ascii_case(key)))
        .map(|(_, v)| *v)
}

fn lookup_f64(args: &[(&str, &str)], keys: &[&str]) -> Option<f64> {
    args.iter()
        .filter(|(k, _)| keys.iter().any(|key| k.eq_ignore_ascii_case(key)))
        .find_map(|(_, v)| v.parse().ok())
}

// ============================================================================
// Layers and Documents
// ============================================================================

/// Which strategy produced the layer list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// `;LAYER:<n>` markers
    CommentLayer,
    /// `;LAYER_CHANGE` markers
    LayerChange,
    /// Z increases on motion commands
    ZMove,
    /// Nothing detected
    #[default]
    None,
}

impl DetectionMethod {
    /// Short machine-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::CommentLayer => "comment_layer",
            DetectionMethod::LayerChange => "layer_change",
            DetectionMethod::ZMove => "z_move",
            DetectionMethod::None => "none",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detected layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    /// Layer number (may be negative or have gaps)
    pub number: i64,
    /// Z height in mm
    pub z_height: f64,
    /// First line index (0-based, inclusive)
    pub start_line: usize,
    /// Last line index (inclusive); `-1` until finalized
    pub end_line: i64,
}

impl Layer {
    fn new(number: i64, z_height: f64, start_line: usize) -> Self {
        Self {
            number,
            z_height,
            start_line,
            end_line: -1,
        }
    }
}

/// Result of parsing a G-code file
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Raw lines without line terminators
    pub lines: Vec<String>,
    /// Detected layers ordered by start line
    pub layers: Vec<Layer>,
    /// Final printer state
    pub state: PrinterState,
    /// Index of the first extruding move
    pub header_end_line: usize,
    /// Strategy that produced `layers`
    pub detection_method: DetectionMethod,
    /// Source file name, or `unknown`
    pub source_name: String,
    /// Lines strictly before the first layer
    pub preamble_lines: Vec<String>,
}

impl ParsedDocument {
    /// True when no layers were detected
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

// ============================================================================
// Scan Results and Detectors
// ============================================================================

/// Candidates collected during the single forward scan
#[derive(Debug, Default)]
struct ScanRecord {
    /// `(line, layer number)` for `;LAYER:<n>`
    layer_markers: Vec<(usize, i64)>,
    /// Lines with `;LAYER_CHANGE`
    change_markers: Vec<usize>,
    /// `(line, z)` for every absolute-mode motion command that sets Z
    z_moves: Vec<(usize, f64)>,
}

type Detector = fn(&ScanRecord) -> Option<Vec<Layer>>;

/// Detection strategies in priority order
const DETECTORS: [(DetectionMethod, Detector); 3] = [
    (DetectionMethod::CommentLayer, layers_from_markers),
    (DetectionMethod::LayerChange, layers_from_change_markers),
    (DetectionMethod::ZMove, layers_from_z_moves),
];

/// Z of the first Z move at or after `line` (else the last one), advancing `cursor`
fn z_at_or_after(z_moves: &[(usize, f64)], cursor: &mut usize, line: usize) -> Option<f64> {
    while *cursor < z_moves.len() && z_moves[*cursor].0 < line {
        *cursor += 1;
    }
    match z_moves.get(*cursor) {
        Some(&(_, z)) => Some(z),
        None => z_moves.last().map(|&(_, z)| z),
    }
}

fn layers_from_markers(scan: &ScanRecord) -> Option<Vec<Layer>> {
    if scan.layer_markers.is_empty() {
        return None;
    }
    let mut cursor = 0;
    let layers = scan
        .layer_markers
        .iter()
        .map(|&(line, number)| {
            let z = z_at_or_after(&scan.z_moves, &mut cursor, line).unwrap_or(0.0);
            Layer::new(number, z, line)
        })
        .collect();
    Some(layers)
}

fn layers_from_change_markers(scan: &ScanRecord) -> Option<Vec<Layer>> {
    if scan.change_markers.is_empty() {
        return None;
    }
    let mut cursor = 0;
    let layers = scan
        .change_markers
        .iter()
        .enumerate()
        .map(|(i, &line)| {
            let z = z_at_or_after(&scan.z_moves, &mut cursor, line).unwrap_or(0.0);
            Layer::new(i as i64, z, line)
        })
        .collect();
    Some(layers)
}

fn layers_from_z_moves(scan: &ScanRecord) -> Option<Vec<Layer>> {
    let mut layers: Vec<Layer> = Vec::new();
    let mut prev_z = f64::NEG_INFINITY;
    for &(line, z) in &scan.z_moves {
        if z > prev_z {
            layers.push(Layer::new(layers.len() as i64, z, line));
            prev_z = z;
        }
    }
    (!layers.is_empty()).then_some(layers)
}

/// Set each layer's end line from its successor, the last from `total_lines`
fn finalize_layers(layers: &mut [Layer], total_lines: usize) {
    let starts: Vec<usize> = layers.iter().skip(1).map(|l| l.start_line).collect();
    for (layer, next_start) in layers.iter_mut().zip(starts) {
        layer.end_line = next_start as i64 - 1;
    }
    if let Some(last) = layers.last_mut() {
        last.end_line = total_lines as i64 - 1;
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Single-pass G-code parser
#[derive(Debug, Clone, Default)]
pub struct GcodeParser;

impl GcodeParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a file on disk
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<ParsedDocument> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut doc = self.parse_reader(BufReader::new(file))?;
        doc.source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::debug!(
            "Parsed {:?}: {} lines, {} layers via {}",
            path,
            doc.lines.len(),
            doc.layers.len(),
            doc.detection_method
        );
        Ok(doc)
    }

    /// Parse in-memory G-code text
    pub fn parse_str(&self, text: &str) -> ParsedDocument {
        let lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        self.parse_lines(lines)
    }

    /// Parse from any buffered reader, decoding invalid UTF-8 lossily
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> Result<ParsedDocument> {
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            lines.push(String::from_utf8_lossy(&buf).into_owned());
        }
        Ok(self.parse_lines(lines))
    }

    fn parse_lines(&self, lines: Vec<String>) -> ParsedDocument {
        let mut state = PrinterState::default();
        let mut scan = ScanRecord::default();
        let mut header_end = None;

        for (idx, line) in lines.iter().enumerate() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }

            if stripped.starts_with(';') {
                scan_comment(stripped, idx, &mut scan);
                state.apply_comment(stripped);
                continue;
            }

            let code = gcode::code_part(stripped);
            if code.is_empty() {
                continue;
            }

            match gcode::command_code(code) {
                Some(cmd) if cmd.is_motion() => {
                    if let (Positioning::Absolute, Some(z)) =
                        (state.positioning, gcode::param(code, 'Z'))
                    {
                        scan.z_moves.push((idx, z));
                    }
                    if header_end.is_none() && gcode::has_param(code, 'E') {
                        header_end = Some(idx);
                    }
                }
                _ => state.apply_command(code),
            }
        }

        let (detection_method, mut layers) = DETECTORS
            .iter()
            .find_map(|(method, detect)| detect(&scan).map(|layers| (*method, layers)))
            .unwrap_or((DetectionMethod::None, Vec::new()));
        finalize_layers(&mut layers, lines.len());

        let preamble_lines = layers
            .first()
            .map(|first| lines[..first.start_line].to_vec())
            .unwrap_or_default();

        ParsedDocument {
            lines,
            layers,
            state,
            header_end_line: header_end.unwrap_or(0),
            detection_method,
            source_name: "unknown".to_string(),
            preamble_lines,
        }
    }
}

fn scan_comment(comment: &str, idx: usize, scan: &mut ScanRecord) {
    let text = comment.trim_start_matches(';').trim_start();
    let is_layer_key = text
        .get(..5)
        .is_some_and(|key| key.eq_ignore_ascii_case("LAYER"));
    if !is_layer_key {
        return;
    }
    if let Some(number) = layer_number_regex()
        .captures(comment)
        .and_then(|c| c.get(1)?.as_str().parse::<i64>().ok())
    {
        scan.layer_markers.push((idx, number));
    } else if layer_change_regex().is_match(comment) {
        scan.change_markers.push(idx);
    }
}
