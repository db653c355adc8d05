//! Fuzz test for ResumeConfig
//!
//! Tests that header generation handles arbitrary numeric settings safely.

#![no_main]

use arbitrary::Arbitrary;
use failfixer_core::{
    GcodeParser, LayerMapper, ResumeConfig, ResumeGenerator, ResumeMode, HEADER_START_MARKER,
};
use libfuzzer_sys::fuzz_target;

const GCODE: &str = "M140 S60\nM104 S200\nG21\nG90\nM82\n;LAYER:0\nG1 Z0.2\nG1 X1 Y1 E1\n\
                     ;LAYER:1\nG1 Z0.4\nG1 X2 Y2 E2\n;LAYER:2\nG1 Z0.6\nG1 X3 Y3 E3\n";

#[derive(Arbitrary, Debug)]
struct ConfigInput {
    layer: u8,
    z_offset: f64,
    safe_lift: f64,
    bed: f64,
    nozzle: f64,
    park_x: f64,
    park_y: f64,
    from_plate: bool,
    mesh: String,
}

fuzz_target!(|input: ConfigInput| {
    let doc = GcodeParser::new().parse_str(GCODE);
    let mapper = LayerMapper::new(&doc.layers, 0.15).unwrap();
    let Ok(layer_match) = mapper.by_layer_number(i64::from(input.layer % 3)) else {
        return;
    };

    let mode = if input.from_plate {
        ResumeMode::FromPlate
    } else {
        ResumeMode::InAir
    };
    let config = ResumeConfig::new(
        layer_match.layer.number,
        layer_match.layer.z_height,
        input.bed,
        input.nozzle,
    )
    .z_offset(input.z_offset)
    .safe_lift(input.safe_lift)
    .park(input.park_x, input.park_y)
    .bed_mesh_cmd(input.mesh)
    .mode(mode);

    let lines = ResumeGenerator::new().generate(&doc, &layer_match, &config);
    assert_eq!(lines[0], HEADER_START_MARKER);

    let text = ResumeGenerator::new().generate_text(&doc, &layer_match, &config);
    assert!(text.ends_with('\n'));
});
