#![no_main]
use std::path::Path;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Config parser must not panic on any input.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = covhtml::config::Config::parse_str(s, Path::new("fuzz.lcovrc"));
    }
});
