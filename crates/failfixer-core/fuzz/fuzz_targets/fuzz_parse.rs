//! Fuzz test for G-code parsing
//!
//! Feeds arbitrary text through parse, layer lookup, generation and
//! validation. None of these stages may panic.

#![no_main]

use failfixer_core::{
    GcodeParser, LayerMapper, ResumeConfig, ResumeGenerator, ResumeMode, Validator,
    HEADER_END_MARKER,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let doc = GcodeParser::new().parse_str(data);

    for layer in &doc.layers {
        assert!(layer.start_line <= doc.lines.len());
    }

    let Ok(mapper) = LayerMapper::new(&doc.layers, 0.15) else {
        assert!(doc.layers.is_empty());
        return;
    };

    let middle = mapper.layers()[mapper.layer_count() / 2].clone();
    let _ = mapper.by_z_height(middle.z_height);
    let _ = mapper.by_layer_number(middle.number);

    let Ok(layer_match) = mapper.by_layer_number(middle.number) else {
        return;
    };

    for mode in [ResumeMode::InAir, ResumeMode::FromPlate] {
        let config = ResumeConfig::new(middle.number, middle.z_height, 60.0, 200.0).mode(mode);
        let lines = ResumeGenerator::new().generate(&doc, &layer_match, &config);

        assert!(lines.iter().any(|l| l == HEADER_END_MARKER));

        let _ = Validator::new()
            .validate(&lines, config.output_resume_z(), config.safe_lift_mm, mode)
            .summary();
    }
});
