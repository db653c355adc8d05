//! Inspect command - shows what FailFixer detects in a G-code file

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use failfixer_core::{detect_firmware, GcodeParser, ParsedDocument};

use crate::progress::{file_size, spinner};

/// Execute the inspect command
pub fn execute(file: &Path, show_layers: bool, json: bool, silent: bool) -> Result<()> {
    let pb = spinner(format!("Parsing {}", file.display()), silent || json);
    let doc = GcodeParser::new().parse_file(file);
    pb.finish_and_clear();
    let doc = doc.with_context(|| format!("Failed to parse {}", file.display()))?;

    // JSON output mode - always output even in silent mode (it's machine-readable)
    if json {
        let output = serde_json::to_string_pretty(&inspect_json(&doc, show_layers))
            .context("Failed to serialize inspection result")?;
        println!("{}", output);
        return Ok(());
    }

    if silent {
        return Ok(());
    }

    println!(
        "{} {}{}",
        style("File:").bold(),
        style(file.display()).cyan(),
        file_size(file)
            .map(|s| format!(" ({})", s))
            .unwrap_or_default()
    );
    println!("  Lines: {}", doc.lines.len());
    println!("  Firmware guess: {}", detect_firmware(&doc));
    println!();

    if doc.is_empty() {
        println!("{}", style("No layers detected.").yellow());
        println!(
            "{}",
            style("Tip: the file needs ;LAYER: or ;LAYER_CHANGE comments, or rising Z moves")
                .dim()
        );
    } else {
        let (first, last) = (&doc.layers[0], &doc.layers[doc.layers.len() - 1]);
        let (min_z, max_z) = z_range(&doc);
        println!(
            "{} {} layer(s) via {}",
            style("Found").green().bold(),
            doc.layers.len(),
            style(doc.detection_method).cyan()
        );
        println!("  Layer numbers: {} .. {}", first.number, last.number);
        println!("  Z range: {:.3} .. {:.3} mm", min_z, max_z);
    }
    println!();

    let state = &doc.state;
    println!("{}", style("Printer state").bold());
    println!(
        "  Units: {} | Positioning: {} | Extruder: {}",
        state.units.as_gcode(),
        state.positioning.as_gcode(),
        state.extruder_mode.as_gcode()
    );
    println!(
        "  Bed: {} | Nozzle: {}",
        temperature(state.bed_temp),
        temperature(state.nozzle_temp)
    );
    println!(
        "  Preamble: {} line(s) | First extrusion at line {}",
        doc.preamble_lines.len(),
        doc.header_end_line + 1
    );

    if show_layers && !doc.is_empty() {
        println!();
        println!(
            "{}",
            style(format!("{:>8}  {:>10}  {:>10}  {:>10}", "LAYER", "Z (mm)", "START", "END"))
                .dim()
        );
        for layer in &doc.layers {
            println!(
                "{:>8}  {:>10.3}  {:>10}  {:>10}",
                layer.number,
                layer.z_height,
                layer.start_line + 1,
                layer.end_line + 1
            );
        }
    }

    Ok(())
}

fn temperature(value: f64) -> String {
    if value > 0.0 {
        format!("{}°C", value)
    } else {
        style("not set").yellow().to_string()
    }
}

fn z_range(doc: &ParsedDocument) -> (f64, f64) {
    doc.layers
        .iter()
        .map(|l| l.z_height)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), z| {
            (lo.min(z), hi.max(z))
        })
}

fn inspect_json(doc: &ParsedDocument, show_layers: bool) -> serde_json::Value {
    let mut value = serde_json::json!({
        "source": doc.source_name,
        "lines": doc.lines.len(),
        "detection_method": doc.detection_method,
        "layer_count": doc.layers.len(),
        "firmware": detect_firmware(doc),
        "state": doc.state,
        "preamble_lines": doc.preamble_lines.len(),
        "header_end_line": doc.header_end_line,
    });

    if let (Some(first), Some(last)) = (doc.layers.first(), doc.layers.last()) {
        let (min_z, max_z) = z_range(doc);
        value["first_layer"] = first.number.into();
        value["last_layer"] = last.number.into();
        value["min_z"] = min_z.into();
        value["max_z"] = max_z.into();
    }
    if show_layers {
        value["layers"] = serde_json::json!(doc.layers);
    }
    value
}
