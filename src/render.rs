//! Writes the page set for a report tree.
//!
//! Layout under the output directory:
//!
//! ```text
//! gcov.css
//! index.html                  root directory
//! <dir>/index.html            one per directory node
//! <dir>/<file>.gcov.html      annotated source
//! <dir>/<file>.func.html      function list (when function coverage is on)
//! ```
//!
//! Pages are independent, so they are rendered and written in parallel.

use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::Conflict;
use crate::config::Config;
use crate::error::{CovhtmlError, Result};
use crate::html::{self, PageContext, SourceText};
use crate::model::MergedFileCoverage;
use crate::tree::{ReportNode, ReportTree};

pub const STYLESHEET_NAME: &str = "gcov.css";

/// Non-fatal problems collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    ChecksumConflict(Conflict),
    MissingSource { path: PathBuf, reason: String },
    /// The trace has records for lines the source file does not have.
    LinesPastEnd {
        path: PathBuf,
        source_lines: u32,
        last_line: u32,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ChecksumConflict(conflict) => write!(f, "{conflict}"),
            Warning::MissingSource { path, reason } => {
                write!(f, "cannot read source {}: {reason}", path.display())
            }
            Warning::LinesPastEnd {
                path,
                source_lines,
                last_line,
            } => write!(
                f,
                "{} has {source_lines} lines but coverage data reaches line {last_line}",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct RenderOutput {
    pub pages_written: usize,
    pub warnings: Vec<Warning>,
}

/// File-system safe name for one path segment.
#[must_use]
pub fn output_segment(name: &str) -> String {
    match name {
        ".." => "__parent__".to_string(),
        "." => "__current__".to_string(),
        "/" => "__root__".to_string(),
        other => other.replace(['/', '\\'], "_"),
    }
}

/// Percent-encode a relative link so names with `#`, `?`, `%` or spaces
/// resolve to the file on disk. `/` separates segments and is kept.
#[must_use]
pub fn href(link: &str) -> String {
    let mut out = String::with_capacity(link.len());
    for byte in link.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[must_use]
pub fn source_page_name(segment: &str, ext: &str) -> String {
    format!("{segment}.gcov.{ext}")
}

#[must_use]
pub fn function_page_name(segment: &str, ext: &str) -> String {
    format!("{segment}.func.{ext}")
}

/// Output directory for a directory node.
fn directory_path(output_dir: &Path, node: &ReportNode) -> PathBuf {
    let mut dir = output_dir.to_path_buf();
    dir.extend(node.segments.iter().map(|s| output_segment(s)));
    dir
}

/// Output directory holding a file node's pages.
fn parent_path(output_dir: &Path, node: &ReportNode) -> PathBuf {
    let mut dir = output_dir.to_path_buf();
    let parents = node.segments.len().saturating_sub(1);
    dir.extend(node.segments[..parents].iter().map(|s| output_segment(s)));
    dir
}

enum Page<'a> {
    Index(&'a ReportNode),
    Source(&'a ReportNode),
    Functions(&'a ReportNode),
}

fn write_page(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| CovhtmlError::io(path, e))
}

fn read_source(path: &Path) -> std::result::Result<String, String> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|e| e.to_string())
}

fn lines_past_end(cov: &MergedFileCoverage, text: &str) -> Option<Warning> {
    let source_lines = u32::try_from(text.lines().count()).unwrap_or(u32::MAX);
    let (&last_line, _) = cov.lines.last_key_value()?;
    if last_line <= source_lines {
        return None;
    }
    warn!(
        source = %cov.path.display(),
        source_lines,
        last_line,
        "coverage data past end of source"
    );
    Some(Warning::LinesPastEnd {
        path: cov.path.clone(),
        source_lines,
        last_line,
    })
}

impl Page<'_> {
    /// Render and write one page. A source page whose file cannot be read is
    /// still written and reported as a warning.
    fn write(&self, output_dir: &Path, ctx: &PageContext<'_>) -> Result<Option<Warning>> {
        let ext = &ctx.config.html_extension;
        match *self {
            Page::Index(node) => {
                let path = directory_path(output_dir, node).join(format!("index.{ext}"));
                write_page(&path, &html::index_page(node, ctx))?;
                Ok(None)
            }
            Page::Functions(node) => {
                let name = function_page_name(&output_segment(&node.name), ext);
                let path = parent_path(output_dir, node).join(name);
                write_page(&path, &html::function_page(node, ctx))?;
                Ok(None)
            }
            Page::Source(node) => {
                let name = source_page_name(&output_segment(&node.name), ext);
                let path = parent_path(output_dir, node).join(name);
                let (source, warning) = match node.coverage() {
                    Some(cov) => match read_source(&cov.path) {
                        Ok(text) => {
                            let warning = lines_past_end(cov, &text);
                            (SourceText::Available(text), warning)
                        }
                        Err(reason) => {
                            warn!(source = %cov.path.display(), %reason, "source unavailable");
                            let warning = Warning::MissingSource {
                                path: cov.path.clone(),
                                reason: reason.clone(),
                            };
                            (SourceText::Unavailable(reason), Some(warning))
                        }
                    },
                    None => (SourceText::Unavailable("not a file".to_string()), None),
                };
                write_page(&path, &html::source_page(node, &source, ctx))?;
                Ok(warning)
            }
        }
    }
}

/// Write every page for `tree` below `output_dir`, which must exist.
pub fn render(
    tree: &ReportTree,
    output_dir: &Path,
    config: &Config,
    timestamp: Option<&str>,
) -> Result<RenderOutput> {
    let nodes = tree.root.walk();

    // Directories first so page writes never race on creation.
    for node in nodes.iter().filter(|n| !n.is_file()) {
        let dir = directory_path(output_dir, node);
        std::fs::create_dir_all(&dir).map_err(|e| CovhtmlError::io(&dir, e))?;
    }
    write_page(&output_dir.join(STYLESHEET_NAME), html::stylesheet())?;

    let mut pages = Vec::new();
    for node in nodes {
        if !node.is_file() {
            pages.push(Page::Index(node));
            continue;
        }
        if !config.no_source {
            pages.push(Page::Source(node));
        }
        if config.function_coverage {
            pages.push(Page::Functions(node));
        }
    }

    let ctx = PageContext { config, timestamp };
    let warnings = pages
        .par_iter()
        .map(|page| page.write(output_dir, &ctx))
        .collect::<Result<Vec<_>>>()?;

    let output = RenderOutput {
        pages_written: pages.len(),
        warnings: warnings.into_iter().flatten().collect(),
    };
    info!(
        pages = output.pages_written,
        output = %output_dir.display(),
        "wrote report pages"
    );
    Ok(output)
}
