/// Parser for the LCOV trace file format.
///
/// Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
///
/// Key records:
///   TN:<test name>
///   SF:<absolute path to source file>
///   VER:<source checksum>
///   FN:<line>[,<end line>],<function name>
///   FNDA:<execution count>,<function name>
///   FNF:<number of functions found>
///   FNH:<number of functions hit>
///   DA:<line number>,<execution count>[,<checksum>]
///   BRDA:<line>,<block>,<branch>,<taken>   ("-" means never evaluated)
///   BRF:<branches found>
///   BRH:<branches hit>
///   LF:<lines found>
///   LH:<lines hit>
///   end_of_record
///
/// Parsing is strict about structure (every data line must sit between `SF:`
/// and `end_of_record`, numbers must be non-negative integers) and lenient
/// about content the way real trace producers need:
///
/// * `FNDA` for a function never declared with `FN` creates an implicit
///   function record without a start line. When one name is declared at
///   several lines, its `FNDA` hits go to the lowest one.
/// * Unknown tags are skipped.
/// * A record left open at end of input is still emitted.
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CovhtmlError, Result};
use crate::model::*;

/// Lazily yields one `SourceFragment` per `SF:` ... `end_of_record` section.
///
/// After the first error the iterator is exhausted.
pub struct TraceReader<R> {
    reader: R,
    trace: PathBuf,
    line_no: usize,
    raw_line: String,
    test_name: Option<String>,
    current: Option<OpenRecord>,
    done: bool,
}

struct OpenRecord {
    fragment: SourceFragment,
    /// (name, start line) -> index into `fragment.functions`
    declared: HashMap<(String, u32), usize>,
    /// `FNDA` hits by function name, attributed when the record closes.
    fnda_hits: BTreeMap<String, u64>,
}

impl<R: BufRead> TraceReader<R> {
    /// `trace` names the input in error messages.
    pub fn new(reader: R, trace: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            trace: trace.into(),
            line_no: 0,
            raw_line: String::new(),
            test_name: None,
            current: None,
            done: false,
        }
    }

    fn error(&self, message: impl Into<String>) -> CovhtmlError {
        self.location().error(message)
    }

    fn location(&self) -> Location<'_> {
        Location {
            trace: &self.trace,
            line: self.line_no,
        }
    }

    fn next_fragment(&mut self) -> Result<Option<SourceFragment>> {
        loop {
            self.raw_line.clear();
            let n = self
                .reader
                .read_line(&mut self.raw_line)
                .map_err(|e| CovhtmlError::io(&self.trace, e))?;
            if n == 0 {
                // EOF
                return Ok(self.current.take().map(|open| {
                    warn!(
                        trace = %self.trace.display(),
                        path = %open.fragment.path.display(),
                        "trace ends without end_of_record; keeping the open record"
                    );
                    open.finish()
                }));
            }
            self.line_no += 1;

            let line = self.raw_line.trim().to_string();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line == "end_of_record" {
                return match self.current.take() {
                    Some(open) => Ok(Some(open.finish())),
                    None => Err(self.error("end_of_record without a matching SF line")),
                };
            }

            let (tag, value) = line
                .split_once(':')
                .ok_or_else(|| self.error(format!("unrecognised line '{line}'")))?;

            match tag {
                "TN" => {
                    let name = (!value.is_empty()).then(|| value.to_string());
                    if let Some(open) = self.current.as_mut() {
                        open.fragment.test_name = name.clone();
                    }
                    self.test_name = name;
                }
                "SF" => {
                    if let Some(open) = &self.current {
                        return Err(self.error(format!(
                            "SF line while the record for '{}' is still open",
                            open.fragment.path.display()
                        )));
                    }
                    if value.is_empty() {
                        return Err(self.error("SF line with an empty path"));
                    }
                    let mut fragment = SourceFragment::new(value);
                    fragment.test_name = self.test_name.clone();
                    self.current = Some(OpenRecord::new(fragment));
                }
                "FN" | "FNDA" | "DA" | "BRDA" | "VER" | "LF" | "LH" | "FNF" | "FNH" | "BRF"
                | "BRH" => {
                    let loc = Location {
                        trace: &self.trace,
                        line: self.line_no,
                    };
                    match self.current.as_mut() {
                        Some(open) => open.apply(tag, value, &loc)?,
                        None => return Err(loc.error(format!("{tag} line outside of a record"))),
                    }
                }
                _ => {
                    debug!(
                        trace = %self.trace.display(),
                        line = self.line_no,
                        tag,
                        "skipping unknown tag"
                    );
                }
            }
        }
    }
}

/// Position of the line being parsed, for error messages.
struct Location<'a> {
    trace: &'a Path,
    line: usize,
}

impl Location<'_> {
    fn error(&self, message: impl Into<String>) -> CovhtmlError {
        CovhtmlError::Format {
            trace: self.trace.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }

    fn parse_number<T: std::str::FromStr>(&self, field: &str, what: &str) -> Result<T> {
        field
            .trim()
            .parse::<T>()
            .map_err(|_| self.error(format!("invalid {what} '{field}'")))
    }

    fn parse_count(&self, field: &str) -> Result<u64> {
        let field = field.trim();
        match field.parse::<u64>() {
            Ok(count) => Ok(count),
            Err(_) if field.parse::<i64>().is_ok() => {
                Err(self.error(format!("negative execution count '{field}'")))
            }
            Err(_) => Err(self.error(format!("invalid execution count '{field}'"))),
        }
    }
}

impl OpenRecord {
    fn new(fragment: SourceFragment) -> Self {
        Self {
            fragment,
            declared: HashMap::new(),
            fnda_hits: BTreeMap::new(),
        }
    }

    /// Close the record. `FNDA` hits go to the declaration of that name with
    /// the lowest start line, or to an implicit function when none exists.
    fn finish(mut self) -> SourceFragment {
        for (name, hits) in self.fnda_hits {
            let target = self
                .fragment
                .functions
                .iter_mut()
                .filter(|f| f.name == name)
                .min_by_key(|f| f.start_line);
            match target {
                Some(func) => func.hit_count = func.hit_count.saturating_add(hits),
                None => {
                    debug!(name = %name, "FNDA without FN; recording implicit function");
                    self.fragment.functions.push(FunctionRecord {
                        name,
                        start_line: None,
                        end_line: None,
                        hit_count: hits,
                    });
                }
            }
        }
        self.fragment
    }

    /// Fold one data line into the open record.
    fn apply(&mut self, tag: &str, value: &str, loc: &Location<'_>) -> Result<()> {
        match tag {
            "FN" => {
                // FN:<line>,<name> or FN:<line>,<end>,<name>
                let (start, rest) = value
                    .split_once(',')
                    .ok_or_else(|| loc.error("FN line needs <line>,<name>"))?;
                let start_line = loc.parse_number::<u32>(start, "function line")?;
                let (end_line, name) = match rest.split_once(',') {
                    Some((end, name))
                        if !end.is_empty() && end.bytes().all(|b| b.is_ascii_digit()) =>
                    {
                        (Some(loc.parse_number::<u32>(end, "function end line")?), name)
                    }
                    _ => (None, rest),
                };
                if name.is_empty() {
                    return Err(loc.error("FN line with an empty function name"));
                }
                let key = (name.to_string(), start_line);
                match self.declared.get(&key) {
                    Some(&idx) => {
                        let func = &mut self.fragment.functions[idx];
                        if func.end_line.is_none() {
                            func.end_line = end_line;
                        }
                        debug!(name, start_line, "ignoring repeated FN declaration");
                    }
                    None => {
                        self.declared.insert(key, self.fragment.functions.len());
                        self.fragment.functions.push(FunctionRecord {
                            name: name.to_string(),
                            start_line: Some(start_line),
                            end_line,
                            hit_count: 0,
                        });
                    }
                }
            }
            "FNDA" => {
                // FNDA:<execution_count>,<function_name>
                let (count, name) = value
                    .split_once(',')
                    .ok_or_else(|| loc.error("FNDA line needs <count>,<name>"))?;
                let hit_count = loc.parse_count(count)?;
                if name.is_empty() {
                    return Err(loc.error("FNDA line with an empty function name"));
                }
                let hits = self.fnda_hits.entry(name.to_string()).or_insert(0);
                *hits = hits.saturating_add(hit_count);
            }
            "DA" => {
                // DA:<line_number>,<execution_count>[,<checksum>]
                let parts: Vec<&str> = value.splitn(3, ',').collect();
                if parts.len() < 2 {
                    return Err(loc.error("DA line needs <line>,<count>"));
                }
                let line_number = loc.parse_number::<u32>(parts[0], "line number")?;
                let hit_count = loc.parse_count(parts[1])?;
                let checksum = parts
                    .get(2)
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_string());
                self.fragment
                    .lines
                    .entry(line_number)
                    .and_modify(|rec| {
                        rec.hit_count = rec.hit_count.saturating_add(hit_count);
                        if rec.checksum.is_none() {
                            rec.checksum = checksum.clone();
                        }
                    })
                    .or_insert(LineRecord {
                        line_number,
                        hit_count,
                        checksum,
                    });
            }
            "BRDA" => {
                // BRDA:<line>,<block>,<branch>,<taken>
                let parts: Vec<&str> = value.splitn(4, ',').collect();
                if parts.len() != 4 {
                    return Err(loc.error("BRDA line needs <line>,<block>,<branch>,<taken>"));
                }
                let line_number = loc.parse_number::<u32>(parts[0], "branch line")?;
                let block = loc.parse_number::<u32>(parts[1], "block id")?;
                let branch = loc.parse_number::<u32>(parts[2], "branch id")?;
                let hits = if parts[3].trim() == "-" {
                    BranchHits::NotTaken
                } else {
                    BranchHits::Taken(loc.parse_count(parts[3])?)
                };
                let record = BranchRecord {
                    line_number,
                    block,
                    branch,
                    hits,
                };
                self.fragment
                    .branches
                    .entry(record.key())
                    .and_modify(|rec| rec.hits = rec.hits.merge(hits))
                    .or_insert(record);
            }
            "VER" => {
                self.fragment.checksum = (!value.is_empty()).then(|| value.to_string());
            }
            // LF, LH, FNF, FNH, BRF, BRH: summary lines; derived from the data.
            _ => {
                loc.parse_count(value)?;
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<SourceFragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_fragment() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Parse LCOV data held in memory. `trace` names the input in errors.
pub fn parse(input: &[u8], trace: &Path) -> Result<Vec<SourceFragment>> {
    TraceReader::new(input, trace).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(input: &str) -> Result<Vec<SourceFragment>> {
        parse(input.as_bytes(), Path::new("test.info"))
    }

    fn format_error_line(err: CovhtmlError) -> usize {
        match err {
            CovhtmlError::Format { line, .. } => line,
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_lcov() {
        let input = include_bytes!("../../tests/fixtures/sample.info");
        let data = parse(input, Path::new("sample.info")).unwrap();

        assert_eq!(data.len(), 2);

        let lib = &data[0];
        assert_eq!(lib.path, PathBuf::from("/src/lib.c"));
        assert_eq!(lib.test_name.as_deref(), Some("unit"));
        assert_eq!(lib.lines.len(), 5);
        assert_eq!(lib.lines[&1].hit_count, 5);
        assert_eq!(lib.lines[&3].hit_count, 0);

        assert_eq!(lib.branches.len(), 2);
        assert_eq!(lib.branches[&(2, 0, 0)].hits, BranchHits::Taken(5));
        assert_eq!(lib.branches[&(2, 0, 1)].hits, BranchHits::Taken(0));

        assert_eq!(lib.functions.len(), 2);
        assert_eq!(lib.functions[0].name, "main");
        assert_eq!(lib.functions[0].hit_count, 5);
        assert_eq!(lib.functions[0].start_line, Some(1));
        assert_eq!(lib.functions[1].name, "helper");
        assert_eq!(lib.functions[1].hit_count, 0);

        let util = &data[1];
        assert_eq!(util.path, PathBuf::from("/src/util/util.c"));
        assert_eq!(util.lines.len(), 2);
        assert!(util.branches.is_empty());
        assert!(util.functions.is_empty());
    }

    #[test]
    fn test_parse_lcov_empty() {
        // Only a test name and no records.
        let data = parse_str("TN:test\n").unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_da_outside_record() {
        let err = parse_str("TN:x\nDA:1,5\n").unwrap_err();
        assert_eq!(format_error_line(err), 2);
    }

    #[test]
    fn test_nested_sf_is_error() {
        let err = parse_str("SF:/a.c\nDA:1,1\nSF:/b.c\nend_of_record\n").unwrap_err();
        assert_eq!(format_error_line(err), 3);
    }

    #[test]
    fn test_end_of_record_without_sf() {
        let err = parse_str("SF:/a.c\nend_of_record\n\nend_of_record\n").unwrap_err();
        assert_eq!(format_error_line(err), 4);
    }

    #[test]
    fn test_negative_count_is_error() {
        let err = parse_str("SF:/a.c\nDA:1,5\nDA:2,-1\nend_of_record\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("test.info:3"), "{msg}");
        assert!(msg.contains("negative"), "{msg}");
    }

    #[test]
    fn test_non_numeric_field_is_error() {
        let err = parse_str("SF:/a.c\nBRDA:x,0,0,1\nend_of_record\n").unwrap_err();
        assert_eq!(format_error_line(err), 2);
    }

    #[test]
    fn test_missing_end_of_record_still_emits() {
        let data = parse_str("SF:/a.c\nDA:1,1\nDA:2,0\n").unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].lines.len(), 2);
    }

    #[test]
    fn test_fnda_without_fn_is_implicit() {
        let data = parse_str("SF:/a.c\nFNDA:3,ghost\nFN:7,ghost\nFNDA:1,ghost\nend_of_record\n")
            .unwrap();
        let funcs = &data[0].functions;
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "ghost");
        assert_eq!(funcs[0].start_line, Some(7));
        assert_eq!(funcs[0].hit_count, 4);

        let data = parse_str("SF:/a.c\nFNDA:2,lonely\nend_of_record\n").unwrap();
        assert_eq!(data[0].functions[0].start_line, None);
        assert_eq!(data[0].functions[0].hit_count, 2);
    }

    #[test]
    fn test_same_name_declared_twice() {
        let data = parse_str("SF:/a.c\nFN:10,f\nFN:5,f\nFN:5,f\nFNDA:2,f\nend_of_record\n")
            .unwrap();
        let funcs: Vec<_> = data[0]
            .functions
            .iter()
            .map(|f| (f.start_line, f.hit_count))
            .collect();
        assert_eq!(funcs, vec![(Some(10), 0), (Some(5), 2)]);
    }

    #[test]
    fn test_counts_saturate() {
        let data = parse_str(
            "SF:/a.c\n\
             DA:1,18446744073709551615\nDA:1,1\n\
             FNDA:18446744073709551615,f\nFNDA:1,f\n\
             BRDA:1,0,0,18446744073709551615\nBRDA:1,0,0,1\n\
             end_of_record\n",
        )
        .unwrap();
        let frag = &data[0];
        assert_eq!(frag.lines[&1].hit_count, u64::MAX);
        assert_eq!(frag.functions[0].hit_count, u64::MAX);
        assert_eq!(frag.branches[&(1, 0, 0)].hits, BranchHits::Taken(u64::MAX));
    }

    #[test]
    fn test_fn_with_end_line() {
        let data = parse_str("SF:/a.cpp\nFN:3,9,foo\nFN:12,bar<int, char>\nend_of_record\n")
            .unwrap();
        let funcs = &data[0].functions;
        assert_eq!(funcs[0].start_line, Some(3));
        assert_eq!(funcs[0].end_line, Some(9));
        assert_eq!(funcs[1].name, "bar<int, char>");
        assert_eq!(funcs[1].end_line, None);
    }

    #[test]
    fn test_duplicate_da_sums_and_checksums() {
        let data = parse_str("SF:/a.c\nVER:abc\nDA:1,2,sum1\nDA:1,3\nDA:2,0,\nend_of_record\n")
            .unwrap();
        let frag = &data[0];
        assert_eq!(frag.checksum.as_deref(), Some("abc"));
        assert_eq!(frag.lines[&1].hit_count, 5);
        assert_eq!(frag.lines[&1].checksum.as_deref(), Some("sum1"));
        assert_eq!(frag.lines[&2].checksum, None);
    }

    #[test]
    fn test_branch_not_taken_sentinel() {
        let input = "SF:/a.c\nBRDA:4,0,0,-\nBRDA:4,0,1,2\nBRDA:4,0,0,-\nend_of_record\n";
        let data = parse_str(input).unwrap();
        let branches = &data[0].branches;
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[&(4, 0, 0)].hits, BranchHits::NotTaken);
        assert_eq!(branches[&(4, 0, 1)].hits, BranchHits::Taken(2));
    }

    #[test]
    fn test_comments_summaries_and_unknown_tags() {
        let input = "# generated\nTN:\nSF:/a.c\nFNL:0,1,2\nDA:1,1\nLF:1\nLH:1\nend_of_record\n";
        let data = parse_str(input).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].test_name, None);
        assert_eq!(data[0].lines.len(), 1);
    }

    #[test]
    fn test_reader_is_lazy_and_stops_after_error() {
        let input = "SF:/a.c\nDA:1,1\nend_of_record\nDA:9,9\nSF:/b.c\nend_of_record\n";
        let mut reader = TraceReader::new(input.as_bytes(), "lazy.info");
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.path, PathBuf::from("/a.c"));
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
