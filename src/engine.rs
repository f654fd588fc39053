//! One report generation run: parse, merge, build the tree, write pages.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::aggregate::aggregate;
use crate::config::Config;
use crate::error::{CovhtmlError, Result};
use crate::ingest::read_trace_files;
use crate::model::CoverageSummary;
use crate::render::{self, Warning};
use crate::tree;

/// Everything a run needs, fixed before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub trace_files: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Explicit config file. `None` reads `$HOME/.lcovrc`.
    pub config_path: Option<PathBuf>,
    /// Rendered into every page header when present.
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub output_dir: PathBuf,
    pub summary: CoverageSummary,
    pub files: usize,
    pub pages_written: usize,
    pub warnings: Vec<Warning>,
    #[serde(skip)]
    pub config: Config,
}

/// Load the configuration named by the invocation and run.
pub fn run(invocation: &Invocation) -> Result<Report> {
    if invocation.trace_files.is_empty() {
        return Err(no_trace_files());
    }
    let config = Config::load(invocation.config_path.as_deref())?;
    run_with_config(invocation, config)
}

/// Run with an already loaded configuration.
pub fn run_with_config(invocation: &Invocation, config: Config) -> Result<Report> {
    if invocation.trace_files.is_empty() {
        return Err(no_trace_files());
    }
    prepare_output_dir(&invocation.output_dir)?;

    let fragments = read_trace_files(&invocation.trace_files)?;
    let aggregation = aggregate(fragments, &config)?;
    let files = aggregation.files.len();
    let report_tree = tree::build(aggregation.files, &config);
    info!(
        root = %report_tree.root_dir.display(),
        files,
        "built report tree"
    );

    let output = render::render(
        &report_tree,
        &invocation.output_dir,
        &config,
        invocation.timestamp.as_deref(),
    )?;

    let mut warnings: Vec<Warning> = aggregation
        .conflicts
        .into_iter()
        .map(Warning::ChecksumConflict)
        .collect();
    warnings.extend(output.warnings);

    Ok(Report {
        output_dir: invocation.output_dir.clone(),
        summary: report_tree.root.summary,
        files,
        pages_written: output.pages_written,
        warnings,
        config,
    })
}

fn no_trace_files() -> CovhtmlError {
    CovhtmlError::Usage("no trace files given".to_string())
}

/// Create the output directory, or check that an existing one is usable.
fn prepare_output_dir(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => Err(CovhtmlError::io(
            dir,
            io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
        )),
        Ok(meta) if meta.permissions().readonly() => Err(CovhtmlError::io(
            dir,
            io::Error::new(io::ErrorKind::PermissionDenied, "directory is read-only"),
        )),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(dir).map_err(|e| CovhtmlError::io(dir, e))
        }
        Err(e) => Err(CovhtmlError::io(dir, e)),
    }
}
