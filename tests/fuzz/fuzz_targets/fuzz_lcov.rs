#![no_main]
use std::path::Path;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parser must not panic on any input, and whatever parses must merge.
    if let Ok(fragments) = covhtml::parsers::lcov::parse(data, Path::new("fuzz.info")) {
        let traced = fragments
            .into_iter()
            .enumerate()
            .map(|(i, fragment)| covhtml::model::TracedFragment {
                origin: covhtml::model::TraceOrigin {
                    trace: "fuzz.info".into(),
                    record: i + 1,
                },
                fragment,
            });
        let _ = covhtml::aggregate::aggregate(traced, &covhtml::config::Config::default());
    }
});
