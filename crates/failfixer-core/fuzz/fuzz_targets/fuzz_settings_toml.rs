//! Fuzz test for settings TOML parsing
//!
//! Tests that the configuration file parser handles arbitrary input safely.

#![no_main]

use failfixer_core::{ResumeMode, Settings};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let result: Result<Settings, _> = toml::from_str(data);

    if let Ok(settings) = result {
        // Parsed settings must serialize back
        let _ = toml::to_string(&settings);
        let _ = toml::to_string_pretty(&settings);

        let _ = settings.resume.z_offset.is_finite();
        let _ = settings.resume.profile.len();
        let _ = settings.profiles.dir.as_ref().map(|d| d.components().count());
        let _ = settings.behavior.skip_confirmation;
    }

    // Resume mode names from the command line
    let _: Result<ResumeMode, _> = data.parse();
});
