//! Merging of trace fragments that describe the same source file.
//!
//! Counts are summed: every trace file is an independent run over the same
//! code, so execution counts accumulate. The set of found lines, functions
//! and branches is the union over all fragments.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{CovhtmlError, Result};
use crate::model::*;

/// A fragment whose checksum disagrees with the one already established for
/// its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub path: PathBuf,
    /// Fragment that established the expected checksum.
    pub expected: TraceOrigin,
    /// Fragment carrying the differing checksum.
    pub found: TraceOrigin,
    /// Line whose checksum differs, or `None` for the file checksum.
    pub line: Option<u32>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "checksum mismatch for {}", self.path.display())?;
        if let Some(line) = self.line {
            write!(f, " line {line}")?;
        }
        write!(f, ": {} disagrees with {}", self.found, self.expected)
    }
}

/// Result of merging all fragments.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub files: BTreeMap<PathBuf, MergedFileCoverage>,
    pub conflicts: Vec<Conflict>,
}

/// Group fragments by source path and fold each group.
///
/// The first fragment carrying a checksum for a path (or line) sets the
/// expected value. A later differing checksum is reported once per fragment;
/// the fragment is still merged unless `config.strict_checksum` is set, in
/// which case the run fails.
pub fn aggregate<I>(fragments: I, config: &Config) -> Result<Aggregation>
where
    I: IntoIterator<Item = TracedFragment>,
{
    let mut result = Aggregation::default();
    let mut fragment_count = 0usize;

    for traced in fragments {
        fragment_count += 1;
        let merged = result
            .files
            .entry(traced.fragment.path.clone())
            .or_insert_with(|| MergedFileCoverage::new(traced.fragment.path.clone()));

        if let Some(conflict) = merged.find_conflict(&traced) {
            if config.strict_checksum {
                return Err(CovhtmlError::Aggregation {
                    path: conflict.path,
                    expected: conflict.expected.to_string(),
                    found: conflict.found.to_string(),
                });
            }
            warn!("{conflict}; merging anyway");
            result.conflicts.push(conflict);
        }
        merged.absorb(traced);
    }
    for merged in result.files.values_mut() {
        merged.resolve_implicit_functions();
    }

    info!(
        fragments = fragment_count,
        files = result.files.len(),
        conflicts = result.conflicts.len(),
        "merged trace data"
    );
    Ok(result)
}

impl MergedFileCoverage {
    /// Check an incoming fragment against the checksums seen so far.
    fn find_conflict(&self, traced: &TracedFragment) -> Option<Conflict> {
        let fragment = &traced.fragment;
        let conflict = |origin_idx: usize, line: Option<u32>| Conflict {
            path: self.path.clone(),
            expected: self.origins[origin_idx].clone(),
            found: traced.origin.clone(),
            line,
        };

        if let (Some((expected, idx)), Some(found)) = (&self.checksum, &fragment.checksum) {
            if expected != found {
                return Some(conflict(*idx, None));
            }
        }

        fragment.lines.values().find_map(|rec| {
            let found = rec.checksum.as_ref()?;
            let expected = self.lines.get(&rec.line_number)?.checksum.as_ref()?;
            if expected == found {
                return None;
            }
            let idx = *self.line_checksum_origins.get(&rec.line_number)?;
            Some(conflict(idx, Some(rec.line_number)))
        })
    }

    /// Fold a fragment into this file's coverage.
    fn absorb(&mut self, traced: TracedFragment) {
        let TracedFragment { origin, fragment } = traced;
        let origin_idx = self.origins.len();
        self.origins.push(origin);
        if let Some(name) = fragment.test_name {
            self.test_names.insert(name);
        }

        if self.checksum.is_none() {
            self.checksum = fragment.checksum.map(|sum| (sum, origin_idx));
        }

        for (line_number, rec) in fragment.lines {
            match self.lines.get_mut(&line_number) {
                Some(existing) => {
                    existing.hit_count = existing.hit_count.saturating_add(rec.hit_count);
                    if existing.checksum.is_none() && rec.checksum.is_some() {
                        existing.checksum = rec.checksum;
                        self.line_checksum_origins.insert(line_number, origin_idx);
                    }
                }
                None => {
                    if rec.checksum.is_some() {
                        self.line_checksum_origins.insert(line_number, origin_idx);
                    }
                    self.lines.insert(line_number, rec);
                }
            }
        }

        for func in fragment.functions {
            self.merge_function(func);
        }

        for (key, rec) in fragment.branches {
            self.branches
                .entry(key)
                .and_modify(|existing| existing.hits = existing.hits.merge(rec.hits))
                .or_insert(rec);
        }
    }

    /// Declared functions are summed by name and start line. Implicit ones
    /// (no start line) wait in `implicit_hits` until every fragment is in.
    fn merge_function(&mut self, func: FunctionRecord) {
        if func.start_line.is_none() {
            let hits = self.implicit_hits.entry(func.name).or_insert(0);
            *hits = hits.saturating_add(func.hit_count);
            return;
        }
        self.functions
            .entry(func.key())
            .and_modify(|existing| {
                existing.hit_count = existing.hit_count.saturating_add(func.hit_count);
                existing.end_line = existing.end_line.max(func.end_line);
            })
            .or_insert(func);
    }

    /// Attach implicit hits to the declaration of the same name with the
    /// lowest start line, or keep them as an implicit function. Runs after
    /// the fold so the result does not depend on fragment order.
    fn resolve_implicit_functions(&mut self) {
        for (name, hits) in std::mem::take(&mut self.implicit_hits) {
            let declared = self
                .functions
                .values_mut()
                .filter(|f| f.name == name && f.start_line.is_some())
                .min_by_key(|f| f.start_line);
            match declared {
                Some(func) => func.hit_count = func.hit_count.saturating_add(hits),
                None => {
                    let func = FunctionRecord {
                        name,
                        start_line: None,
                        end_line: None,
                        hit_count: hits,
                    };
                    self.functions.insert(func.key(), func);
                }
            }
        }
    }
}
