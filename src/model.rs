//! In-memory representation of LCOV trace data. The parser produces
//! `SourceFragment`s, the aggregator folds them into `MergedFileCoverage`,
//! and every report node carries a `CoverageSummary`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::AddAssign;
use std::path::PathBuf;

use serde::Serialize;

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// Format a hit/found pair as a percentage with one decimal, the way genhtml
/// does: a partially covered set never shows as 100.0 and a set with any hit
/// never shows as 0.0. Returns `"-"` when nothing was found.
#[must_use]
pub fn format_percent(hit: u64, found: u64) -> String {
    if found == 0 {
        return "-".to_string();
    }
    let pct = rate(hit, found) * 100.0;
    let text = format!("{pct:.1}");
    if hit > 0 && text == "0.0" {
        "0.1".to_string()
    } else if hit < found && text == "100.0" {
        "99.9".to_string()
    } else {
        text
    }
}

/// One instrumented line. A missing record means "not instrumented".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub line_number: u32,
    pub hit_count: u64,
    pub checksum: Option<String>,
}

/// Execution count of a branch arm. `NotTaken` is the `-` sentinel: the
/// block containing the branch was never evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchHits {
    NotTaken,
    Taken(u64),
}

impl BranchHits {
    #[must_use]
    pub fn count(self) -> u64 {
        match self {
            BranchHits::NotTaken => 0,
            BranchHits::Taken(n) => n,
        }
    }

    #[must_use]
    pub fn is_hit(self) -> bool {
        self.count() > 0
    }

    /// Sum two observations of the same branch arm. Saturates at `u64::MAX`.
    #[must_use]
    pub fn merge(self, other: BranchHits) -> BranchHits {
        match (self, other) {
            (BranchHits::NotTaken, BranchHits::NotTaken) => BranchHits::NotTaken,
            (a, b) => BranchHits::Taken(a.count().saturating_add(b.count())),
        }
    }
}

/// (line, block, branch)
pub type BranchKey = (u32, u32, u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub line_number: u32,
    pub block: u32,
    pub branch: u32,
    pub hits: BranchHits,
}

impl BranchRecord {
    #[must_use]
    pub fn key(&self) -> BranchKey {
        (self.line_number, self.block, self.branch)
    }
}

/// A function/method that was instrumentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub name: String,
    /// `None` for functions that only appeared in an `FNDA` line.
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub hit_count: u64,
}

/// Functions are identified by name and starting line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionKey {
    pub start_line: Option<u32>,
    pub name: String,
}

impl FunctionRecord {
    #[must_use]
    pub fn key(&self) -> FunctionKey {
        FunctionKey {
            start_line: self.start_line,
            name: self.name.clone(),
        }
    }
}

/// Coverage for one source file as described by one trace file record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFragment {
    pub path: PathBuf,
    pub test_name: Option<String>,
    /// File-level content checksum from a `VER:` line.
    pub checksum: Option<String>,
    pub lines: BTreeMap<u32, LineRecord>,
    pub functions: Vec<FunctionRecord>,
    pub branches: BTreeMap<BranchKey, BranchRecord>,
}

impl SourceFragment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Where a fragment came from: the trace file and the 1-based ordinal of the
/// record within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceOrigin {
    pub trace: PathBuf,
    pub record: usize,
}

impl fmt::Display for TraceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (record {})", self.trace.display(), self.record)
    }
}

#[derive(Debug, Clone)]
pub struct TracedFragment {
    pub origin: TraceOrigin,
    pub fragment: SourceFragment,
}

/// All fragments for one source path folded together.
#[derive(Debug, Clone, Default)]
pub struct MergedFileCoverage {
    pub path: PathBuf,
    pub lines: BTreeMap<u32, LineRecord>,
    pub functions: BTreeMap<FunctionKey, FunctionRecord>,
    pub branches: BTreeMap<BranchKey, BranchRecord>,
    /// Every fragment that contributed, in merge order.
    pub origins: Vec<TraceOrigin>,
    /// Names from the `TN:` lines of contributing fragments.
    pub test_names: BTreeSet<String>,
    /// Expected file checksum and the index into `origins` that set it.
    pub(crate) checksum: Option<(String, usize)>,
    /// Origin index of the fragment that established each line checksum.
    pub(crate) line_checksum_origins: BTreeMap<u32, usize>,
    /// Hits of functions seen without a declaration, by name. Folded into
    /// `functions` once all fragments are merged.
    pub(crate) implicit_hits: BTreeMap<String, u64>,
}

impl MergedFileCoverage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Branch records on a given line, in block/branch order.
    pub fn branches_on(&self, line: u32) -> impl Iterator<Item = &BranchRecord> {
        self.branches
            .range((line, 0, 0)..=(line, u32::MAX, u32::MAX))
            .map(|(_, b)| b)
    }
}

/// Found/hit counts for lines, functions and branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub lines_found: u64,
    pub lines_hit: u64,
    pub functions_found: u64,
    pub functions_hit: u64,
    pub branches_found: u64,
    pub branches_hit: u64,
}

impl CoverageSummary {
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.lines_hit, self.lines_found)
    }

    #[must_use]
    pub fn function_rate(&self) -> f64 {
        rate(self.functions_hit, self.functions_found)
    }

    #[must_use]
    pub fn branch_rate(&self) -> f64 {
        rate(self.branches_hit, self.branches_found)
    }
}

impl AddAssign for CoverageSummary {
    fn add_assign(&mut self, other: Self) {
        self.lines_found = self.lines_found.saturating_add(other.lines_found);
        self.lines_hit = self.lines_hit.saturating_add(other.lines_hit);
        self.functions_found = self.functions_found.saturating_add(other.functions_found);
        self.functions_hit = self.functions_hit.saturating_add(other.functions_hit);
        self.branches_found = self.branches_found.saturating_add(other.branches_found);
        self.branches_hit = self.branches_hit.saturating_add(other.branches_hit);
    }
}

impl std::iter::Sum for CoverageSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, s| {
            acc += s;
            acc
        })
    }
}

/// Coverage classification bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    /// CSS class suffix used by the rendered pages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::High => "Hi",
            Level::Medium => "Med",
            Level::Low => "Lo",
        }
    }
}
