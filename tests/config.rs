mod common;

use covhtml::config::{Config, SortKey, Thresholds};
use covhtml::error::CovhtmlError;
use covhtml::model::Level;

#[test]
fn load_full_lcovrc() {
    let ws = common::Workspace::new();
    let path = ws.write(
        "lcovrc",
        "# project settings\n\
         genhtml_hi_limit = 95\n\
         genhtml_med_limit = 60\n\
         genhtml_function_hi_limit = 100\n\
         genhtml_function_med_limit = 0\n\
         lcov_branch_coverage = 1\n\
         genhtml_sort = coverage_desc\n\
         genhtml_num_spaces = 4\n\
         genhtml_html_extension = htm\n\
         genhtml_title = My Project\n\
         unrelated_lcov_key = whatever\n",
    );

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.line_limits, Thresholds { hi: 95, med: 60 });
    assert_eq!(config.function_limits, Thresholds { hi: 100, med: 0 });
    assert!(config.branch_coverage);
    assert_eq!(config.sort, SortKey::CoverageDesc);
    assert_eq!(config.num_spaces, 4);
    assert_eq!(config.html_extension, "htm");
    assert_eq!(config.title, "My Project");
}

#[test]
fn missing_explicit_file_is_config_error() {
    let ws = common::Workspace::new();
    let err = Config::load(Some(ws.path().join("nope").as_path())).unwrap_err();
    assert!(matches!(err, CovhtmlError::Config { .. }));
}

#[test]
fn missing_default_file_uses_defaults() {
    let ws = common::Workspace::new();
    let fallback = ws.path().join(".lcovrc");
    let config = Config::load_or_fallback(None, Some(fallback.as_path())).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn thresholds_classify_at_boundaries() {
    let limits = Thresholds { hi: 80, med: 50 };
    assert_eq!(limits.classify(1, 2, true), Some(Level::Medium));
    assert_eq!(limits.classify(1, 2, false), Some(Level::Low));
    assert_eq!(limits.classify(4, 5, true), Some(Level::High));
    assert_eq!(limits.classify(0, 0, true), None);
}
