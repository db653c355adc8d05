//! Integration tests for failfixer-core
//!
//! These tests run the complete resume pipeline on temporary files.

use failfixer_core::{
    Controller, DetectionMethod, Error, GcodeParser, IssueCode, LayerMapper, ProfileLoader,
    ResumeConfig, ResumeGenerator, ResumeMode, ResumeRequest, ResumeSelector, Validator,
    DEFAULT_TOLERANCE_MM, HEADER_END_MARKER,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GCODE_LAYER_COMMENT: &str = "\
; Start
G28
G21
G90
M82
M140 S60
M190 S60
M104 S200
M109 S200
G1 Z0.3 F3000 E0.5
;LAYER:0
G1 X10 Y10 Z0.3 E1.0
G1 X20 Y20 E2.0
;LAYER:1
G1 X10 Y10 Z0.6 E3.0
G1 X30 Y30 E4.0
;LAYER:2
G1 X10 Y10 Z0.9 E5.0
G1 X40 Y40 E6.0
";

const GCODE_LAYER_CHANGE: &str = "\
; header
G28
G21
G90
M140 S55
M104 S210
G1 Z0.2 F600 E0.1
;LAYER_CHANGE
G1 Z0.2 F600
G1 X5 Y5 E1.0
;LAYER_CHANGE
G1 Z0.4 F600
G1 X15 Y15 E2.0
;LAYER_CHANGE
G1 Z0.6 F600
G1 X25 Y25 E3.0
";

const GCODE_Z_FALLBACK: &str = "\
; basic file, no layer comments
G28
G21
G90
M140 S70
M104 S215
G1 Z0.3 F3000 E0.1
G1 X10 Y10 E1.0
G1 Z0.6 F3000
G1 X20 Y20 E2.0
G1 Z0.9 F3000
G1 X30 Y30 E3.0
";

const GCODE_NO_TEMPS: &str = "\
G28
;LAYER:0
G1 Z0.2
G1 X1 Y1 E1
;LAYER:1
G1 Z0.4
G1 X2 Y2 E2
;LAYER:2
G1 Z0.6
G1 X3 Y3 E3
";

// ============================================================================
// Helpers
// ============================================================================

fn write_gcode(dir: &Path, text: &str, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn controller(dir: &TempDir) -> Controller {
    Controller::with_profiles(ProfileLoader::new(dir.path().join("profiles")))
}

fn request(path: &Path, selector: ResumeSelector, dir: &TempDir) -> ResumeRequest {
    ResumeRequest::new(path, selector).output_dir(dir.path())
}

fn first_motion_index(lines: &[&str], pred: impl Fn(&str) -> bool) -> Option<usize> {
    lines.iter().position(|line| {
        let cmd = line.split(';').next().unwrap_or("").trim().to_uppercase();
        (cmd.starts_with("G0 ") || cmd.starts_with("G1 ")) && pred(&cmd)
    })
}

// ============================================================================
// Controller
// ============================================================================

#[test]
fn test_run_by_layer_number() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    assert!(outcome.output_path.exists());
    assert!(outcome.line_count > 0);
    assert_eq!(outcome.total_layers, 3);
    assert!(outcome.validation.ok());
    assert_eq!(outcome.detection_method, DetectionMethod::CommentLayer);
}

#[test]
fn test_in_air_layer_selection_moves_to_next_layer() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    assert_eq!(outcome.layer_match.layer.number, 2);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.starts_with("In-air safety adjustment")));
    assert!(outcome
        .output_path
        .to_string_lossy()
        .ends_with("In-Place_test_resume_layer0002.gcode"));
}

#[test]
fn test_last_layer_is_not_shifted() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(2), &dir))
        .unwrap();

    assert_eq!(outcome.layer_match.layer.number, 2);
    assert!(!outcome.warnings.iter().any(|w| w.contains("In-air")));
}

#[test]
fn test_run_by_z_height() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Z(0.6), &dir))
        .unwrap();

    assert!(outcome.output_path.exists());
    assert_eq!(outcome.layer_match.layer.number, 1);
    assert!(outcome.layer_match.exact);
}

#[test]
fn test_fuzzy_z_warning_is_reported() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Z(0.65), &dir))
        .unwrap();

    assert!(!outcome.layer_match.exact);
    assert!(outcome.warnings.iter().any(|w| w.starts_with("Measured Z 0.650")));
}

#[test]
fn test_z_out_of_tolerance_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let result = controller(&dir).run(&request(&input, ResumeSelector::Z(5.0), &dir));

    assert!(matches!(result, Err(Error::ZOutOfTolerance { .. })));
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn test_output_file_naming() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "benchy.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(2), &dir))
        .unwrap();

    let name = outcome
        .output_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert_eq!(name, "In-Place_benchy_resume_layer0002.gcode");
}

#[test]
fn test_output_defaults_to_input_directory() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("jobs");
    std::fs::create_dir(&sub).unwrap();
    let input = write_gcode(&sub, GCODE_LAYER_COMMENT, "part.gcode");

    let outcome = controller(&dir)
        .run(&ResumeRequest::new(&input, ResumeSelector::Layer(2)))
        .unwrap();

    assert_eq!(outcome.output_path.parent().unwrap(), sub);
}

#[test]
fn test_explicit_output_path() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");
    let out = dir.path().join("custom_output.gcode");

    let outcome = controller(&dir)
        .run(&ResumeRequest::new(&input, ResumeSelector::Layer(0)).output_path(&out))
        .unwrap();

    assert_eq!(outcome.output_path, out);
    assert!(out.exists());
}

#[test]
fn test_refuses_to_overwrite_input() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let result = controller(&dir)
        .run(&ResumeRequest::new(&input, ResumeSelector::Layer(1)).output_path(&input));

    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert_eq!(std::fs::read_to_string(&input).unwrap(), GCODE_LAYER_COMMENT);
}

#[test]
fn test_run_no_layers_fails() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), "; empty file\n", "empty.gcode");

    let result = controller(&dir).run(&request(&input, ResumeSelector::Layer(0), &dir));

    let err = result.unwrap_err();
    assert!(matches!(err, Error::NoLayers));
    assert!(err.to_string().contains("No layers detected"));
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = controller(&dir).run(&request(
        &dir.path().join("missing.gcode"),
        ResumeSelector::Layer(0),
        &dir,
    ));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_layer_not_found() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let err = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(99), &dir))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::LayerNotFound {
            number: 99,
            min: 0,
            max: 2
        }
    ));
}

#[test]
fn test_run_with_z_offset() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir).z_offset(0.5))
        .unwrap();

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.contains("Offset: 0.500"));
}

#[test]
fn test_output_has_no_z_homing() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    for line in content.lines() {
        let cmd = line.trim().to_uppercase();
        if cmd.starts_with("G28") {
            let code = cmd.split(';').next().unwrap();
            assert!(!code.contains('Z'), "G28 Z in output: {line}");
        }
    }
    assert!(content.ends_with('\n'));
}

#[test]
fn test_run_from_plate_mode_rebases_to_z_zero() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir).mode(ResumeMode::FromPlate))
        .unwrap();

    assert_eq!(outcome.layer_match.layer.number, 1);
    assert!(outcome
        .output_path
        .to_string_lossy()
        .ends_with("On-Plate_test_resume_layer0001.gcode"));
    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.contains("Resume Mode: from_plate"));
    assert!(content.contains("G1 X10 Y10 Z0.000 E3.0"));
    assert!(content.contains("G1 X10 Y10 Z0.300 E5.0"));
}

#[test]
fn test_temperatures_in_outcome() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    assert_eq!(outcome.bed_temp, 60.0);
    assert_eq!(outcome.nozzle_temp, 200.0);
}

#[test]
fn test_fallback_temperatures() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_NO_TEMPS, "cold.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.contains("M140 S60"));
    assert!(content.contains("M104 S200"));
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.starts_with("Bed temperature not detected")));
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.starts_with("Nozzle temperature not detected")));
}

#[test]
fn test_auto_profile_detection() {
    let dir = TempDir::new().unwrap();
    let text = format!("PRINT_START BED=60 EXTRUDER=210\n{}", GCODE_LAYER_COMMENT);
    let input = write_gcode(dir.path(), &text, "klipper.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    assert_eq!(outcome.profile_name, "klipper");
    assert_eq!(outcome.warnings[0], "Auto profile selected: klipper");
    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.contains("BED_MESH_PROFILE LOAD=default"));
}

#[test]
fn test_named_profile_from_directory() {
    let dir = TempDir::new().unwrap();
    let profiles = dir.path().join("profiles");
    std::fs::create_dir(&profiles).unwrap();
    std::fs::write(
        profiles.join("ender3.json"),
        r#"{"safe_lift_mm": 5.0, "park_x": 10.0, "park_y": 220.0, "bed_mesh_cmd": ""}"#,
    )
    .unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir).profile("ender3"))
        .unwrap();

    assert_eq!(outcome.profile_name, "ender3");
    assert!(!outcome.warnings.iter().any(|w| w.starts_with("Auto profile")));
    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.contains("G1 Z5.900 F600"));
    assert!(content.contains("G0 X10.000 Y220.000"));
    assert!(!content.contains("M420"));
}

#[test]
fn test_park_override() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let outcome = controller(&dir)
        .run(&request(&input, ResumeSelector::Layer(1), &dir).park(3.0, 4.0))
        .unwrap();

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.contains("G0 X3.000 Y4.000"));
}

#[test]
fn test_broken_profile_is_an_error() {
    let dir = TempDir::new().unwrap();
    let profiles = dir.path().join("profiles");
    std::fs::create_dir(&profiles).unwrap();
    std::fs::write(profiles.join("broken.json"), "{ nope").unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let request = request(&input, ResumeSelector::Layer(1), &dir).profile("broken");
    let result = controller(&dir).run(&request);

    assert!(matches!(result, Err(Error::Profile { .. })));
}

#[test]
fn test_plan_does_not_write() {
    let dir = TempDir::new().unwrap();
    let input = write_gcode(dir.path(), GCODE_LAYER_COMMENT, "test.gcode");

    let plan = controller(&dir)
        .plan(&request(&input, ResumeSelector::Layer(1), &dir))
        .unwrap();

    assert!(!plan.outcome.output_path.exists());
    assert_eq!(plan.lines.len(), plan.outcome.line_count);

    let outcome = plan.write().unwrap();
    assert!(outcome.output_path.exists());
}

#[test]
fn test_round_trip_all_detection_methods() {
    let dir = TempDir::new().unwrap();
    for (name, gcode) in [
        ("comment", GCODE_LAYER_COMMENT),
        ("change", GCODE_LAYER_CHANGE),
        ("zmove", GCODE_Z_FALLBACK),
    ] {
        let input = write_gcode(dir.path(), gcode, &format!("{name}.gcode"));
        let outcome = controller(&dir)
            .run(&request(&input, ResumeSelector::Layer(1), &dir))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(outcome.output_path.exists(), "{name}");
        assert!(outcome.validation.ok(), "{name}: {:?}", outcome.validation.errors());
    }
}

// ============================================================================
// Stage-level properties
// ============================================================================

#[test]
fn test_z_lift_precedes_xy_in_every_mode() {
    let doc = GcodeParser::new().parse_str(GCODE_LAYER_COMMENT);
    let mapper = LayerMapper::new(&doc.layers, DEFAULT_TOLERANCE_MM).unwrap();
    let layer = mapper.by_layer_number(1).unwrap();

    for mode in [ResumeMode::InAir, ResumeMode::FromPlate] {
        let config = ResumeConfig::new(1, 0.6, 60.0, 200.0).mode(mode);
        let lines = ResumeGenerator::new().generate(&doc, &layer, &config);
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

        let first_z = first_motion_index(&lines, |c| c.contains('Z')).unwrap();
        let first_xy = first_motion_index(&lines, |c| c.contains('X') || c.contains('Y')).unwrap();
        assert!(first_z <= first_xy, "{mode}");
    }
}

#[test]
fn test_generated_in_air_file_validates_clean() {
    let doc = GcodeParser::new().parse_str(GCODE_LAYER_COMMENT);
    let mapper = LayerMapper::new(&doc.layers, DEFAULT_TOLERANCE_MM).unwrap();
    let layer = mapper.by_layer_number(1).unwrap();
    let config = ResumeConfig::new(1, 0.6, 60.0, 200.0);

    let lines = ResumeGenerator::new().generate(&doc, &layer, &config);
    let result = Validator::new().validate(&lines, 0.6, 10.0, ResumeMode::InAir);

    assert!(result.ok(), "{:?}", result.errors());
    assert_eq!(result.summary(), "Validation passed with no issues.");
}

#[test]
fn test_validator_flags_original_start_gcode() {
    let lines: Vec<&str> = GCODE_LAYER_COMMENT.lines().collect();
    let result = Validator::new().validate(&lines, 0.0, 10.0, ResumeMode::InAir);
    let codes: Vec<IssueCode> = result.errors().iter().map(|i| i.code).collect();
    assert_eq!(codes, vec![IssueCode::ZHome]);

    let result = Validator::new().validate(&lines, 0.0, 10.0, ResumeMode::FromPlate);
    assert!(result.ok());
}

#[test]
fn test_body_follows_header_marker() {
    let doc = GcodeParser::new().parse_str(GCODE_LAYER_CHANGE);
    let mapper = LayerMapper::new(&doc.layers, DEFAULT_TOLERANCE_MM).unwrap();
    let layer = mapper.by_z_height(0.4).unwrap();
    let config = ResumeConfig::new(layer.layer.number, layer.layer.z_height, 55.0, 210.0);

    let lines = ResumeGenerator::new().generate(&doc, &layer, &config);
    let end = lines.iter().position(|l| l == HEADER_END_MARKER).unwrap();

    assert_eq!(&lines[end + 1..], &doc.lines[layer.layer.start_line..]);
}
