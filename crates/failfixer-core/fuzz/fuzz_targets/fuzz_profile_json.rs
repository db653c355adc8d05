//! Fuzz test for printer profile JSON parsing
//!
//! Tests that profile deserialization handles arbitrary JSON safely.

#![no_main]

use failfixer_core::PrinterProfile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(profile) = PrinterProfile::from_json(data) {
        // Anything that parsed must serialize back
        let json = serde_json::to_string(&profile).unwrap();
        let _ = serde_json::to_string_pretty(&profile);

        // NaN never compares equal, so only check finite profiles
        let finite = [
            profile.safe_lift_mm,
            profile.park_x,
            profile.park_y,
            profile.tolerance_mm,
        ]
        .iter()
        .all(|v| v.is_finite());
        if finite {
            let reparsed = PrinterProfile::from_json(&json).unwrap();
            assert_eq!(profile, reparsed);
        }
    }

    // Byte input
    let _: Result<PrinterProfile, _> = serde_json::from_slice(data.as_bytes());

    // Built-in lookup takes any name
    let _ = PrinterProfile::builtin(data);
});
