//! Progress and size display helpers for the CLI

use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Spinner shown while a file is parsed or processed
///
/// Hidden in silent and JSON modes so stdout stays clean.
pub fn spinner(message: impl Into<String>, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("  {spinner:.green} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Human readable size in decimal units
pub fn format_file_size(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}

/// Size of the file at `path`, if it can be read
pub fn file_size(path: &Path) -> Option<String> {
    std::fs::metadata(path)
        .ok()
        .map(|m| format_file_size(m.len()))
}
