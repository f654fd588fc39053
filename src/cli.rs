//! Command handler functions for the covhtml CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::engine::{self, Invocation, Report};
use crate::model::format_percent;

/// Output style for the run summary.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Style {
    #[default]
    Text,
    Json,
}

pub fn cmd_generate(invocation: &Invocation, style: Style) -> Result<String> {
    let report = engine::run(invocation).context("Failed to generate coverage report")?;
    match style {
        Style::Text => Ok(format_summary(&report)),
        Style::Json => {
            let mut out =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            out.push('\n');
            Ok(out)
        }
    }
}

fn summary_line(out: &mut String, label: &str, hit: u64, found: u64, unit: &str) {
    if found == 0 {
        writeln!(out, "  {label:.<11}: no data found").unwrap();
    } else {
        writeln!(
            out,
            "  {label:.<11}: {}% ({hit} of {found} {unit})",
            format_percent(hit, found)
        )
        .unwrap();
    }
}

/// genhtml-style closing summary.
pub fn format_summary(report: &Report) -> String {
    let s = &report.summary;
    let mut out = String::new();
    writeln!(
        out,
        "Wrote {} pages for {} files to {}",
        report.pages_written,
        report.files,
        report.output_dir.display()
    )
    .unwrap();
    writeln!(out, "Overall coverage rate:").unwrap();
    summary_line(&mut out, "lines", s.lines_hit, s.lines_found, "lines");
    if report.config.function_coverage {
        summary_line(&mut out, "functions", s.functions_hit, s.functions_found, "functions");
    }
    if report.config.branch_coverage {
        summary_line(&mut out, "branches", s.branches_hit, s.branches_found, "branches");
    }
    if !report.warnings.is_empty() {
        writeln!(out, "{} warnings:", report.warnings.len()).unwrap();
        for warning in &report.warnings {
            writeln!(out, "  {warning}").unwrap();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::config::Config;
    use crate::model::CoverageSummary;
    use crate::render::Warning;

    fn report(summary: CoverageSummary, config: Config) -> Report {
        Report {
            output_dir: PathBuf::from("out"),
            summary,
            files: 1,
            pages_written: 3,
            warnings: Vec::new(),
            config,
        }
    }

    #[test]
    fn test_format_summary_lines_and_functions() {
        let summary = CoverageSummary {
            lines_found: 2,
            lines_hit: 1,
            ..Default::default()
        };
        let out = format_summary(&report(summary, Config::default()));
        assert!(out.contains("Wrote 3 pages for 1 files to out"));
        assert!(out.contains("  lines......: 50.0% (1 of 2 lines)"));
        assert!(out.contains("  functions..: no data found"));
        assert!(!out.contains("branches"));
    }

    #[test]
    fn test_format_summary_lists_warnings() {
        let mut r = report(CoverageSummary::default(), Config::default());
        r.warnings.push(Warning::MissingSource {
            path: PathBuf::from("/gone.c"),
            reason: "not found".into(),
        });
        let out = format_summary(&r);
        assert!(out.contains("1 warnings:"));
        assert!(out.contains("cannot read source /gone.c: not found"));
    }

    #[test]
    fn test_cmd_generate_json() {
        let dir = tempfile::tempdir().unwrap();
        let trace = dir.path().join("t.info");
        std::fs::write(&trace, "SF:/nonexistent/a.c\nDA:1,1\nDA:2,0\nend_of_record\n").unwrap();
        let config = dir.path().join("lcovrc");
        std::fs::write(&config, "genhtml_no_source = 1\n").unwrap();

        let invocation = Invocation {
            trace_files: vec![trace],
            output_dir: dir.path().join("out"),
            config_path: Some(config),
            timestamp: None,
        };
        let out = cmd_generate(&invocation, Style::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["summary"]["lines_found"], 2);
        assert_eq!(value["summary"]["lines_hit"], 1);
        assert_eq!(value["files"], 1);
        assert!(value.get("config").is_none());
    }
}
