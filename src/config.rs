//! lcovrc-style configuration.
//!
//! The file is a list of `key = value` lines; `#` starts a comment line and
//! blank lines are ignored. Keys this tool does not know are skipped so one
//! lcovrc can be shared with other LCOV tools.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::{CovhtmlError, Result};
use crate::model::{rate, Level};

/// File read when no configuration path is given.
pub const DEFAULT_FILE_NAME: &str = ".lcovrc";

/// A high/medium limit pair, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub hi: u8,
    pub med: u8,
}

impl Thresholds {
    /// Bucket a hit/found pair. Returns `None` when nothing was found.
    #[must_use]
    pub fn classify(&self, hit: u64, found: u64, inclusive: bool) -> Option<Level> {
        if found == 0 {
            return None;
        }
        let pct = rate(hit, found) * 100.0;
        let reaches = |limit: u8| {
            let limit = f64::from(limit);
            if inclusive {
                pct >= limit
            } else {
                pct > limit
            }
        };
        Some(if reaches(self.hi) {
            Level::High
        } else if reaches(self.med) {
            Level::Medium
        } else {
            Level::Low
        })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { hi: 90, med: 75 }
    }
}

/// Ordering of sibling entries on index pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    /// Worst coverage first.
    CoverageAsc,
    /// Best coverage first.
    CoverageDesc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" | "0" => Ok(SortKey::Name),
            "coverage_asc" | "coverage" | "1" => Ok(SortKey::CoverageAsc),
            "coverage_desc" => Ok(SortKey::CoverageDesc),
            _ => Err(format!(
                "unknown sort key '{s}' (expected name, coverage_asc or coverage_desc)"
            )),
        }
    }
}

/// Settings that shape the report. Built once, then passed by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub line_limits: Thresholds,
    pub function_limits: Thresholds,
    pub branch_limits: Thresholds,
    pub function_coverage: bool,
    pub branch_coverage: bool,
    pub sort: SortKey,
    pub charset: String,
    pub title: String,
    /// Tab width in source pages.
    pub num_spaces: usize,
    pub html_extension: String,
    pub no_source: bool,
    pub legend: bool,
    /// Fail instead of warn on checksum conflicts.
    pub strict_checksum: bool,
    /// Whether a percentage equal to a limit reaches that limit's bucket.
    pub threshold_inclusive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_limits: Thresholds::default(),
            function_limits: Thresholds::default(),
            branch_limits: Thresholds::default(),
            function_coverage: true,
            branch_coverage: false,
            sort: SortKey::Name,
            charset: "UTF-8".to_string(),
            title: "coverage report".to_string(),
            num_spaces: 8,
            html_extension: "html".to_string(),
            no_source: false,
            legend: false,
            strict_checksum: false,
            threshold_inclusive: true,
        }
    }
}

impl Config {
    /// Load from `path`, or read `$HOME/.lcovrc` when no path is given.
    /// A missing default file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        Self::load_or_fallback(path, Self::default_location().as_deref())
    }

    /// Like [`Config::load`] with an explicit fallback location.
    pub fn load_or_fallback(path: Option<&Path>, fallback: Option<&Path>) -> Result<Config> {
        match (path, fallback) {
            (Some(path), _) => Self::from_file(path),
            (None, Some(fallback)) if fallback.is_file() => {
                debug!(path = %fallback.display(), "using default configuration file");
                Self::from_file(fallback)
            }
            _ => Ok(Config::default()),
        }
    }

    pub fn default_location() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_FILE_NAME))
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| CovhtmlError::Config {
            path: path.to_path_buf(),
            message: format!("cannot read file: {e}"),
        })?;
        Self::parse_str(&text, path)
    }

    /// Parse configuration text. `origin` names the source in errors.
    pub fn parse_str(text: &str, origin: &Path) -> Result<Config> {
        static LINE: OnceLock<Regex> = OnceLock::new();
        let re = LINE.get_or_init(|| {
            Regex::new(r"^\s*([^=\s]+)\s*=\s*(.*?)\s*$").expect("config line pattern is valid")
        });

        let error = |message: String| CovhtmlError::Config {
            path: origin.to_path_buf(),
            message,
        };

        let mut config = Config::default();
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let caps = re
                .captures(line)
                .ok_or_else(|| error(format!("line {}: expected 'key = value'", idx + 1)))?;
            let key = &caps[1];
            let value = &caps[2];
            let known = config
                .set(key, value)
                .map_err(|msg| error(format!("line {}: {key}: {msg}", idx + 1)))?;
            if !known {
                debug!(key, "ignoring unrecognised configuration key");
            }
        }

        config.validate().map_err(error)?;
        Ok(config)
    }

    /// Apply one setting. Returns `Ok(false)` for keys this tool ignores.
    fn set(&mut self, key: &str, value: &str) -> std::result::Result<bool, String> {
        match key {
            "genhtml_hi_limit" => self.line_limits.hi = parse_limit(value)?,
            "genhtml_med_limit" | "genhtml_lo_limit" => self.line_limits.med = parse_limit(value)?,
            "genhtml_function_hi_limit" => self.function_limits.hi = parse_limit(value)?,
            "genhtml_function_med_limit" => self.function_limits.med = parse_limit(value)?,
            "genhtml_branch_hi_limit" => self.branch_limits.hi = parse_limit(value)?,
            "genhtml_branch_med_limit" => self.branch_limits.med = parse_limit(value)?,
            "genhtml_function_coverage" | "lcov_function_coverage" => {
                self.function_coverage = parse_bool(value)?
            }
            "genhtml_branch_coverage" | "lcov_branch_coverage" => {
                self.branch_coverage = parse_bool(value)?
            }
            "genhtml_sort" => self.sort = value.parse()?,
            "genhtml_charset" => self.charset = value.to_string(),
            "genhtml_title" => self.title = value.to_string(),
            "genhtml_num_spaces" => {
                self.num_spaces = value
                    .parse()
                    .map_err(|_| format!("expected a positive integer, got '{value}'"))?
            }
            "genhtml_html_extension" => self.html_extension = value.to_string(),
            "genhtml_no_source" => self.no_source = parse_bool(value)?,
            "genhtml_legend" => self.legend = parse_bool(value)?,
            "genhtml_strict_checksum" => self.strict_checksum = parse_bool(value)?,
            "genhtml_threshold_inclusive" => self.threshold_inclusive = parse_bool(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for (kind, limits) in [
            ("line", self.line_limits),
            ("function", self.function_limits),
            ("branch", self.branch_limits),
        ] {
            if limits.med > limits.hi {
                return Err(format!(
                    "{kind} coverage limits are inverted: low/medium limit {} exceeds high limit {}",
                    limits.med, limits.hi
                ));
            }
        }
        if self.num_spaces == 0 {
            return Err("genhtml_num_spaces must be at least 1".to_string());
        }
        if self.html_extension.is_empty() {
            return Err("genhtml_html_extension must not be empty".to_string());
        }
        Ok(())
    }
}

fn parse_limit(value: &str) -> std::result::Result<u8, String> {
    match value.parse::<u8>() {
        Ok(limit) if limit <= 100 => Ok(limit),
        _ => Err(format!("expected a percentage between 0 and 100, got '{value}'")),
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected a boolean (0 or 1), got '{value}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config> {
        Config::parse_str(text, Path::new("test.lcovrc"))
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.line_limits, Thresholds { hi: 90, med: 75 });
        assert!(config.function_coverage);
        assert!(!config.branch_coverage);
    }

    #[test]
    fn test_parse_values() {
        let text = "\
# thresholds
genhtml_hi_limit = 80
genhtml_med_limit=50

genhtml_branch_coverage = 1
genhtml_sort = coverage_desc
genhtml_title =  My Project
genhtml_num_spaces = 4
";
        let config = parse(text).unwrap();
        assert_eq!(config.line_limits, Thresholds { hi: 80, med: 50 });
        assert!(config.branch_coverage);
        assert_eq!(config.sort, SortKey::CoverageDesc);
        assert_eq!(config.title, "My Project");
        assert_eq!(config.num_spaces, 4);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = parse("geninfo_auto_base = 1\nlcov_excl_line = LCOV_EXCL\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_inverted_limits() {
        let err = parse("genhtml_lo_limit = 80\ngenhtml_hi_limit = 50\n").unwrap_err();
        assert!(matches!(err, CovhtmlError::Config { .. }));
        assert!(err.to_string().contains("inverted"), "{err}");

        assert!(parse("genhtml_function_med_limit = 95\n").is_err());
        // equal limits are fine
        assert!(parse("genhtml_med_limit = 90\n").is_ok());
    }

    #[test]
    fn test_malformed_line() {
        let err = parse("genhtml_hi_limit = 80\nthis is not a setting\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("test.lcovrc"), "{msg}");
        assert!(msg.contains("line 2"), "{msg}");
    }

    #[test]
    fn test_bad_types() {
        assert!(parse("genhtml_hi_limit = high\n").is_err());
        assert!(parse("genhtml_hi_limit = 101\n").is_err());
        assert!(parse("genhtml_branch_coverage = maybe\n").is_err());
        assert!(parse("genhtml_sort = random\n").is_err());
        assert!(parse("genhtml_num_spaces = 0\n").is_err());
    }

    #[test]
    fn test_classify_inclusive() {
        let limits = Thresholds { hi: 80, med: 50 };
        assert_eq!(limits.classify(1, 2, true), Some(Level::Medium));
        assert_eq!(limits.classify(4, 5, true), Some(Level::High));
        assert_eq!(limits.classify(1, 3, true), Some(Level::Low));
        assert_eq!(limits.classify(0, 0, true), None);
    }

    #[test]
    fn test_classify_exclusive() {
        let limits = Thresholds { hi: 80, med: 50 };
        assert_eq!(limits.classify(1, 2, false), Some(Level::Low));
        assert_eq!(limits.classify(4, 5, false), Some(Level::Medium));
        assert_eq!(limits.classify(5, 5, false), Some(Level::High));
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join(DEFAULT_FILE_NAME);
        let config = Config::load_or_fallback(None, Some(fallback.as_path())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_reads_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join(DEFAULT_FILE_NAME);
        std::fs::write(&fallback, "genhtml_legend = 1\n").unwrap();
        let config = Config::load_or_fallback(None, Some(fallback.as_path())).unwrap();
        assert!(config.legend);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.lcovrc");
        let err = Config::load_or_fallback(Some(missing.as_path()), None).unwrap_err();
        assert!(err.to_string().contains("nope.lcovrc"));
    }
}
