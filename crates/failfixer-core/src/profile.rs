//! Printer profiles
//!
//! A profile is a small JSON file describing printer-specific resume
//! parameters:
//!
//! ```json
//! {
//!   "firmware": "marlin",
//!   "safe_lift_mm": 10.0,
//!   "park_x": 0.0,
//!   "park_y": 200.0,
//!   "tolerance_mm": 0.15,
//!   "bed_mesh_cmd": "M420 S1"
//! }
//! ```
//!
//! Missing fields take the defaults above. Profiles live in a directory
//! resolved by [`ProfileLoader::resolve`]; names that have no file fall back
//! to a built-in profile.

use crate::error::{Error, Result};
use crate::generator::{DEFAULT_BED_MESH_CMD, DEFAULT_PARK_X, DEFAULT_PARK_Y, DEFAULT_SAFE_LIFT_MM};
use crate::mapper::DEFAULT_TOLERANCE_MM;
use crate::parser::ParsedDocument;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the profile directory
pub const PROFILES_DIR_ENV: &str = "FAILFIXER_PROFILES_DIR";

/// Profile used when none is named
pub const DEFAULT_PROFILE_NAME: &str = "default_marlin";

/// Profile name that triggers firmware detection
pub const AUTO_PROFILE_NAME: &str = "auto";

/// Profiles available without a file
pub const BUILTIN_PROFILES: &[&str] = &[DEFAULT_PROFILE_NAME, "klipper", "reprapfirmware"];

/// Number of leading lines inspected by [`detect_firmware`]
const DETECTION_LINES: usize = 1200;

const KLIPPER_SIGNATURES: &[&str] = &["G9111", "SET_VELOCITY_LIMIT", "PRINT_START"];
const REPRAP_SIGNATURES: &[&str] = &["M572", "M671", "M669"];

/// Printer-specific resume parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterProfile {
    /// Firmware family (informational)
    pub firmware: String,
    /// Lift above the resume height for travel moves
    pub safe_lift_mm: f64,
    /// Park X while heating
    pub park_x: f64,
    /// Park Y while heating
    pub park_y: f64,
    /// Z matching tolerance
    pub tolerance_mm: f64,
    /// Command that loads the bed mesh, empty to skip
    pub bed_mesh_cmd: String,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            firmware: "marlin".to_string(),
            safe_lift_mm: DEFAULT_SAFE_LIFT_MM,
            park_x: DEFAULT_PARK_X,
            park_y: DEFAULT_PARK_Y,
            tolerance_mm: DEFAULT_TOLERANCE_MM,
            bed_mesh_cmd: DEFAULT_BED_MESH_CMD.to_string(),
        }
    }
}

impl PrinterProfile {
    /// Built-in profile for `name` (with or without `.json`)
    ///
    /// Unknown names get the Marlin defaults.
    pub fn builtin(name: &str) -> Self {
        match profile_stem(name).to_ascii_lowercase().as_str() {
            "klipper" => Self {
                firmware: "klipper".to_string(),
                bed_mesh_cmd: "BED_MESH_PROFILE LOAD=default".to_string(),
                ..Self::default()
            },
            "reprapfirmware" => Self {
                firmware: "reprapfirmware".to_string(),
                bed_mesh_cmd: "G29 S1".to_string(),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Parse a profile from JSON text
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn profile_stem(name: &str) -> &str {
    name.strip_suffix(".json").unwrap_or(name)
}

/// Loads printer profiles from a directory
#[derive(Debug, Clone)]
pub struct ProfileLoader {
    dir: PathBuf,
}

impl ProfileLoader {
    /// Loader over an explicit directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Pick the profile directory
    ///
    /// Candidates in order: `explicit`, `$FAILFIXER_PROFILES_DIR`,
    /// `<config dir>/failfixer/profiles`, `./profiles`. The first existing
    /// directory wins; otherwise the config-dir candidate is used.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let config_candidate =
            dirs_next::config_dir().map(|p| p.join("failfixer").join("profiles"));

        let candidates: Vec<PathBuf> = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::env::var_os(PROFILES_DIR_ENV).map(PathBuf::from))
            .chain(config_candidate.clone())
            .chain(std::iter::once(PathBuf::from("profiles")))
            .collect();

        let dir = candidates
            .iter()
            .find(|p| p.is_dir())
            .cloned()
            .or(config_candidate)
            .unwrap_or_else(|| PathBuf::from("profiles"));

        tracing::debug!("Using profile directory {:?}", dir);
        Self { dir }
    }

    /// The profile directory
    pub fn profiles_dir(&self) -> &Path {
        &self.dir
    }

    /// Sorted `*.json` file names in the profile directory
    pub fn list_profiles(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    /// Load a profile by name
    ///
    /// `None` loads [`DEFAULT_PROFILE_NAME`]. `.json` is appended when
    /// missing. A name without a file yields the built-in profile of that name.
    pub fn load(&self, name: Option<&str>) -> Result<PrinterProfile> {
        let name = name.unwrap_or(DEFAULT_PROFILE_NAME);
        let file_name = format!("{}.json", profile_stem(name));
        let path = self.dir.join(&file_name);

        if !path.is_file() {
            tracing::debug!("Profile {:?} not found, using built-in {}", path, name);
            return Ok(PrinterProfile::builtin(name));
        }
        self.load_path(&path)
    }

    /// Load a profile file, failing on any I/O or parse error
    pub fn load_path(&self, path: &Path) -> Result<PrinterProfile> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Profile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let profile = PrinterProfile::from_json(&text).map_err(|e| Error::Profile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!("Loaded profile {:?} ({})", path, profile.firmware);
        Ok(profile)
    }
}

/// Guess the firmware profile from the first lines of a document
pub fn detect_firmware(doc: &ParsedDocument) -> &'static str {
    let head: Vec<String> = doc
        .lines
        .iter()
        .take(DETECTION_LINES)
        .map(|l| l.to_ascii_uppercase())
        .collect();
    let seen = |signatures: &[&str]| {
        head.iter()
            .any(|line| signatures.iter().any(|sig| line.contains(sig)))
    };

    if seen(KLIPPER_SIGNATURES) {
        "klipper"
    } else if seen(REPRAP_SIGNATURES) {
        "reprapfirmware"
    } else {
        DEFAULT_PROFILE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::GcodeParser;
    use tempfile::TempDir;

    #[test]
    fn test_default_profile() {
        let profile = PrinterProfile::default();
        assert_eq!(profile.firmware, "marlin");
        assert_eq!(profile.safe_lift_mm, 10.0);
        assert_eq!(profile.park_x, 0.0);
        assert_eq!(profile.park_y, 200.0);
        assert_eq!(profile.tolerance_mm, 0.15);
        assert_eq!(profile.bed_mesh_cmd, "M420 S1");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let profile = PrinterProfile::from_json(r#"{"safe_lift_mm": 5.0}"#).unwrap();
        assert_eq!(profile.safe_lift_mm, 5.0);
        assert_eq!(profile.park_y, 200.0);
        assert_eq!(profile.bed_mesh_cmd, "M420 S1");
    }

    #[test]
    fn test_builtin_profiles() {
        assert_eq!(
            PrinterProfile::builtin("klipper.json").bed_mesh_cmd,
            "BED_MESH_PROFILE LOAD=default"
        );
        assert_eq!(PrinterProfile::builtin("reprapfirmware").bed_mesh_cmd, "G29 S1");
        assert_eq!(PrinterProfile::builtin("mystery"), PrinterProfile::default());
    }

    #[test]
    fn test_load_missing_file_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ProfileLoader::new(temp_dir.path().join("missing"));
        assert_eq!(loader.load(None).unwrap(), PrinterProfile::default());
        assert_eq!(loader.load(Some("klipper")).unwrap().firmware, "klipper");
        assert!(loader.list_profiles().is_empty());
    }

    #[test]
    fn test_load_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("ender3.json"),
            r#"{"firmware": "marlin", "park_x": 5.0, "park_y": 220.0}"#,
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(temp_dir.path().join("a_first.json"), "{}").unwrap();

        let loader = ProfileLoader::new(temp_dir.path());
        assert_eq!(loader.list_profiles(), vec!["a_first.json", "ender3.json"]);

        let with_ext = loader.load(Some("ender3.json")).unwrap();
        let without_ext = loader.load(Some("ender3")).unwrap();
        assert_eq!(with_ext, without_ext);
        assert_eq!(with_ext.park_x, 5.0);
        assert_eq!(with_ext.park_y, 220.0);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loader = ProfileLoader::new(temp_dir.path());
        assert!(matches!(loader.load(Some("broken")), Err(Error::Profile { .. })));
        assert!(matches!(loader.load_path(&path), Err(Error::Profile { .. })));
    }

    #[test]
    fn test_load_path_missing_is_an_error() {
        let loader = ProfileLoader::new("/nonexistent");
        let err = loader
            .load_path(Path::new("/nonexistent/profile.json"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/profile.json"));
    }

    #[test]
    fn test_resolve_prefers_explicit_directory() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ProfileLoader::resolve(Some(temp_dir.path()));
        assert_eq!(loader.profiles_dir(), temp_dir.path());
    }

    #[test]
    fn test_resolve_skips_missing_explicit_directory() {
        let loader = ProfileLoader::resolve(Some(Path::new("/nonexistent/profiles")));
        assert_ne!(loader.profiles_dir(), Path::new("/nonexistent/profiles"));
    }

    #[test]
    fn test_detect_firmware() {
        let parser = GcodeParser::new();
        let doc = parser.parse_str("G9111 bedTemp=60 extruderTemp=200\n;LAYER:0\nG1 Z0.2\n");
        assert_eq!(detect_firmware(&doc), "klipper");

        let doc = parser.parse_str("print_start BED=60\n");
        assert_eq!(detect_firmware(&doc), "klipper");

        let doc = parser.parse_str("M572 D0 S0.05\n");
        assert_eq!(detect_firmware(&doc), "reprapfirmware");

        let doc = parser.parse_str("M140 S60\nG28\n");
        assert_eq!(detect_firmware(&doc), "default_marlin");
    }

    #[test]
    fn test_detection_window() {
        let mut text = "G1 X1\n".repeat(DETECTION_LINES);
        text.push_str("PRINT_START\n");
        let doc = GcodeParser::new().parse_str(&text);
        assert_eq!(detect_firmware(&doc), "default_marlin");
    }
}
