use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use crate::error::{CovhtmlError, Result};
use crate::model::{TraceOrigin, TracedFragment};
use crate::parsers::TraceReader;

/// Read and parse one trace file, tagging every fragment with its origin.
pub fn read_trace_file(path: &Path) -> Result<Vec<TracedFragment>> {
    let file = File::open(path).map_err(|e| CovhtmlError::io(path, e))?;

    let fragments = TraceReader::new(BufReader::new(file), path)
        .enumerate()
        .map(|(idx, fragment)| {
            fragment.map(|fragment| TracedFragment {
                origin: TraceOrigin {
                    trace: path.to_path_buf(),
                    record: idx + 1,
                },
                fragment,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(trace = %path.display(), records = fragments.len(), "parsed trace file");
    Ok(fragments)
}

/// Parse all trace files in parallel. Fragments come back in input order
/// (by trace file, then by record) regardless of scheduling.
pub fn read_trace_files(paths: &[PathBuf]) -> Result<Vec<TracedFragment>> {
    let per_file = paths
        .par_iter()
        .map(|path| read_trace_file(path))
        .collect::<Result<Vec<_>>>()?;
    Ok(per_file.into_iter().flatten().collect())
}
