//! HTML page templates.
//!
//! Every function here is pure: it turns report nodes into page text. File
//! system work lives in [`crate::render`].

use std::fmt::Write;

use crate::config::Config;
use crate::model::{format_percent, BranchHits, Level, MergedFileCoverage};
use crate::render::{
    function_page_name, href, output_segment, source_page_name, STYLESHEET_NAME,
};
use crate::tree::ReportNode;

/// Per-page rendering inputs.
pub struct PageContext<'a> {
    pub config: &'a Config,
    /// Pre-formatted run timestamp; omitted from pages when `None`.
    pub timestamp: Option<&'a str>,
}

/// Source text for a file page.
pub enum SourceText {
    Available(String),
    /// Reason the source could not be read.
    Unavailable(String),
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Expand tabs to the next multiple of `width` columns.
#[must_use]
pub fn expand_tabs(line: &str, width: usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = width - (col % width);
            out.extend(std::iter::repeat(' ').take(pad));
            col += pad;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

fn level_class(level: Option<Level>) -> &'static str {
    level.map_or("None", |l| l.as_str())
}

fn up(depth: usize) -> String {
    "../".repeat(depth)
}

/// Breadcrumb from the root down to `node`. `depth` is how many directories
/// below the output root the page itself lives.
fn breadcrumb(node: &ReportNode, depth: usize, ext: &str) -> String {
    if node.segments.is_empty() {
        return "top level".to_string();
    }
    let mut crumbs = vec![format!("<a href=\"{}index.{ext}\">top level</a>", up(depth))];
    let last = node.segments.len() - 1;
    for (idx, segment) in node.segments.iter().enumerate() {
        if idx == last {
            crumbs.push(escape(segment));
        } else {
            crumbs.push(format!(
                "<a href=\"{}index.{ext}\">{}</a>",
                up(depth - (idx + 1)),
                escape(segment)
            ));
        }
    }
    crumbs.join(" - ")
}

fn page_start(out: &mut String, ctx: &PageContext<'_>, depth: usize, heading: &str) {
    let config = ctx.config;
    writeln!(out, "<!DOCTYPE html>").unwrap();
    writeln!(out, "<html lang=\"en\">").unwrap();
    writeln!(out, "<head>").unwrap();
    writeln!(out, "  <meta charset=\"{}\">", escape(&config.charset)).unwrap();
    writeln!(
        out,
        "  <title>{} - {}</title>",
        escape(&config.title),
        escape(heading)
    )
    .unwrap();
    writeln!(
        out,
        "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{}{STYLESHEET_NAME}\">",
        up(depth)
    )
    .unwrap();
    writeln!(out, "</head>").unwrap();
    writeln!(out, "<body>").unwrap();
    writeln!(out, "<h1 class=\"title\">{}</h1>", escape(&config.title)).unwrap();
}

fn page_end(out: &mut String) {
    writeln!(out, "<p class=\"footer\">Generated by covhtml</p>").unwrap();
    writeln!(out, "</body>").unwrap();
    writeln!(out, "</html>").unwrap();
}

/// Header table with the current view and the node's coverage summary.
fn header(out: &mut String, node: &ReportNode, ctx: &PageContext<'_>, depth: usize) {
    let config = ctx.config;
    let view = breadcrumb(node, depth, &config.html_extension);
    let s = &node.summary;

    writeln!(out, "<table class=\"headerTable\">").unwrap();
    writeln!(
        out,
        "  <tr><td class=\"headerItem\">Current view:</td><td class=\"headerValue\">{view}</td></tr>"
    )
    .unwrap();
    if let Some(ts) = ctx.timestamp {
        writeln!(
            out,
            "  <tr><td class=\"headerItem\">Date:</td><td class=\"headerValue\"><!-- timestamp -->{}<!-- /timestamp --></td></tr>",
            escape(ts)
        )
        .unwrap();
    }
    if let Some(cov) = node.coverage().filter(|c| !c.test_names.is_empty()) {
        let names: Vec<String> = cov.test_names.iter().map(|n| escape(n)).collect();
        writeln!(
            out,
            "  <tr><td class=\"headerItem\">Test:</td><td class=\"headerValue\">{}</td></tr>",
            names.join(", ")
        )
        .unwrap();
    }
    writeln!(out, "</table>").unwrap();

    writeln!(out, "<table class=\"covTable\">").unwrap();
    writeln!(
        out,
        "  <tr><th></th><th>Hit</th><th>Total</th><th>Coverage</th></tr>"
    )
    .unwrap();
    let mut row = |label: &str, hit: u64, found: u64, level: Option<Level>| {
        writeln!(
            out,
            "  <tr><td class=\"headerItem\">{label}</td><td class=\"headerCovTableEntry\">{hit}</td><td class=\"headerCovTableEntry\">{found}</td><td class=\"headerCovTableEntry{}\">{} %</td></tr>",
            level_class(level),
            format_percent(hit, found)
        )
        .unwrap();
    };
    row("Lines:", s.lines_hit, s.lines_found, node.line_level(config));
    if config.function_coverage {
        row(
            "Functions:",
            s.functions_hit,
            s.functions_found,
            node.function_level(config),
        );
    }
    if config.branch_coverage {
        row(
            "Branches:",
            s.branches_hit,
            s.branches_found,
            node.branch_level(config),
        );
    }
    writeln!(out, "</table>").unwrap();
}

fn legend(out: &mut String, config: &Config) {
    let limits = config.line_limits;
    let cmp = if config.threshold_inclusive { "&ge;" } else { "&gt;" };
    writeln!(
        out,
        "<p class=\"legend\">Rating: <span class=\"coverPerLo\">low: &lt; {med} %</span> <span class=\"coverPerMed\">medium: {cmp} {med} %</span> <span class=\"coverPerHi\">high: {cmp} {hi} %</span></p>",
        med = limits.med,
        hi = limits.hi,
    )
    .unwrap();
}

fn coverage_cells(out: &mut String, hit: u64, found: u64, level: Option<Level>, with_bar: bool) {
    let class = level_class(level);
    if with_bar {
        let width = if found == 0 {
            0
        } else {
            (hit * 100 / found) as usize
        };
        writeln!(
            out,
            "    <td class=\"coverBar\"><div class=\"bar\"><div class=\"barFill{class}\" style=\"width: {width}%\"></div></div></td>"
        )
        .unwrap();
    }
    writeln!(
        out,
        "    <td class=\"coverPer{class}\">{} %</td><td class=\"coverNum{class}\">{hit} / {found}</td>",
        format_percent(hit, found)
    )
    .unwrap();
}

/// Index page for a directory node: one row per immediate child.
pub fn index_page(node: &ReportNode, ctx: &PageContext<'_>) -> String {
    let config = ctx.config;
    let depth = node.segments.len();
    let heading = if node.segments.is_empty() {
        "top level".to_string()
    } else {
        node.display_path()
    };

    let mut out = String::new();
    page_start(&mut out, ctx, depth, &heading);
    header(&mut out, node, ctx, depth);
    if config.legend {
        legend(&mut out, config);
    }

    writeln!(out, "<table class=\"fileTable\">").unwrap();
    write!(out, "  <tr><th>Name</th><th colspan=\"3\">Line Coverage</th>").unwrap();
    if config.function_coverage {
        write!(out, "<th colspan=\"2\">Functions</th>").unwrap();
    }
    if config.branch_coverage {
        write!(out, "<th colspan=\"2\">Branches</th>").unwrap();
    }
    writeln!(out, "</tr>").unwrap();

    for child in node.sorted_children(config.sort) {
        let segment = output_segment(&child.name);
        let link = if child.is_file() {
            if config.no_source {
                None
            } else {
                Some(source_page_name(&segment, &config.html_extension))
            }
        } else {
            Some(format!("{segment}/index.{}", config.html_extension))
        };
        let label = if child.is_file() {
            escape(&child.name)
        } else {
            format!("{}/", escape(&child.name))
        };

        writeln!(out, "  <tr>").unwrap();
        match link {
            Some(link) => writeln!(
                out,
                "    <td class=\"coverFile\"><a href=\"{}\">{label}</a></td>",
                escape(&href(&link))
            )
            .unwrap(),
            None => writeln!(out, "    <td class=\"coverFile\">{label}</td>").unwrap(),
        }
        let s = &child.summary;
        coverage_cells(&mut out, s.lines_hit, s.lines_found, child.line_level(config), true);
        if config.function_coverage {
            coverage_cells(
                &mut out,
                s.functions_hit,
                s.functions_found,
                child.function_level(config),
                false,
            );
        }
        if config.branch_coverage {
            coverage_cells(
                &mut out,
                s.branches_hit,
                s.branches_found,
                child.branch_level(config),
                false,
            );
        }
        writeln!(out, "  </tr>").unwrap();
    }
    writeln!(out, "</table>").unwrap();

    page_end(&mut out);
    out
}

/// Width of the branch marker column in source pages.
const BRANCH_COLUMN: usize = 16;

/// Branch markers for one line, padded to [`BRANCH_COLUMN`]: `+` taken,
/// `-` evaluated but not taken, `#` never evaluated.
fn branch_markers(cov: &MergedFileCoverage, line: u32) -> String {
    let markers: Vec<&str> = cov
        .branches_on(line)
        .map(|b| match b.hits {
            BranchHits::NotTaken => "<span class=\"branchNoExec\">#</span>",
            BranchHits::Taken(0) => "<span class=\"branchNoCov\">-</span>",
            BranchHits::Taken(_) => "<span class=\"branchCov\">+</span>",
        })
        .collect();
    if markers.is_empty() {
        return " ".repeat(BRANCH_COLUMN);
    }
    // "[ " + one char per marker joined by spaces + " ]"
    let visible = 3 + markers.len() * 2;
    format!(
        "[ {} ]{}",
        markers.join(" "),
        " ".repeat(BRANCH_COLUMN.saturating_sub(visible))
    )
}

/// One row of the annotated source listing.
fn annotated_line(
    out: &mut String,
    cov: &MergedFileCoverage,
    line_number: u32,
    code: &str,
    config: &Config,
) {
    let branches = if config.branch_coverage {
        branch_markers(cov, line_number)
    } else {
        String::new()
    };
    let (class, count) = match cov.lines.get(&line_number) {
        Some(rec) if rec.hit_count > 0 => ("lineCov", rec.hit_count.to_string()),
        Some(_) => ("lineNoCov", "0".to_string()),
        None => ("", String::new()),
    };
    write!(
        out,
        "<a id=\"L{line_number}\"><span class=\"lineNum\">{line_number:>8}</span></a> {branches}"
    )
    .unwrap();
    if class.is_empty() {
        writeln!(out, "{count:>12} : {code}").unwrap();
    } else {
        writeln!(out, "<span class=\"{class}\">{count:>12} : {code}</span>").unwrap();
    }
}

/// Annotated source page for a file node.
pub fn source_page(node: &ReportNode, source: &SourceText, ctx: &PageContext<'_>) -> String {
    let config = ctx.config;
    let depth = node.segments.len().saturating_sub(1);
    let mut out = String::new();
    page_start(&mut out, ctx, depth, &node.display_path());
    header(&mut out, node, ctx, depth);

    let Some(cov) = node.coverage() else {
        page_end(&mut out);
        return out;
    };

    if config.function_coverage {
        let func_page = function_page_name(&output_segment(&node.name), &config.html_extension);
        writeln!(
            out,
            "<p class=\"views\"><a href=\"{}\">functions</a></p>",
            escape(&href(&func_page))
        )
        .unwrap();
    }

    match source {
        SourceText::Available(text) => {
            writeln!(out, "<pre class=\"source\">").unwrap();
            let mut source_lines = 0;
            for (idx, raw) in text.lines().enumerate() {
                source_lines = idx as u32 + 1;
                let code = escape(&expand_tabs(raw, config.num_spaces));
                annotated_line(&mut out, cov, source_lines, &code, config);
            }
            // Records past the end of the file still get a row, with no code.
            for (&line_number, _) in cov.lines.range(source_lines.saturating_add(1)..) {
                annotated_line(&mut out, cov, line_number, "", config);
            }
            writeln!(out, "</pre>").unwrap();
        }
        SourceText::Unavailable(reason) => {
            writeln!(
                out,
                "<p class=\"unavailable\">source unavailable: {}</p>",
                escape(reason)
            )
            .unwrap();
            writeln!(out, "<table class=\"lineTable\">").unwrap();
            writeln!(out, "  <tr><th>Line</th><th>Hits</th></tr>").unwrap();
            for rec in cov.lines.values() {
                let class = if rec.hit_count > 0 { "lineCov" } else { "lineNoCov" };
                writeln!(
                    out,
                    "  <tr><td class=\"lineNum\"><a id=\"L{n}\">{n}</a></td><td class=\"{class}\">{hits}</td></tr>",
                    n = rec.line_number,
                    hits = rec.hit_count
                )
                .unwrap();
            }
            writeln!(out, "</table>").unwrap();
        }
    }

    page_end(&mut out);
    out
}

/// Function list for a file node, ordered by name then start line.
pub fn function_page(node: &ReportNode, ctx: &PageContext<'_>) -> String {
    let config = ctx.config;
    let depth = node.segments.len().saturating_sub(1);
    let mut out = String::new();
    page_start(&mut out, ctx, depth, &format!("{} - functions", node.display_path()));
    header(&mut out, node, ctx, depth);

    let source_link = (!config.no_source)
        .then(|| source_page_name(&output_segment(&node.name), &config.html_extension));

    writeln!(out, "<table class=\"funcTable\">").unwrap();
    writeln!(out, "  <tr><th>Function Name</th><th>Hit count</th></tr>").unwrap();
    if let Some(cov) = node.coverage() {
        let mut funcs: Vec<_> = cov.functions.values().collect();
        funcs.sort_by(|a, b| a.name.cmp(&b.name).then(a.start_line.cmp(&b.start_line)));
        for func in funcs {
            let class = if func.hit_count > 0 { "coverFnHi" } else { "coverFnLo" };
            let name = match (&source_link, func.start_line) {
                (Some(page), Some(line)) => format!(
                    "<a href=\"{}#L{line}\">{}</a>",
                    escape(&href(page)),
                    escape(&func.name)
                ),
                _ => escape(&func.name),
            };
            writeln!(
                out,
                "  <tr><td class=\"coverFn\">{name}</td><td class=\"{class}\">{}</td></tr>",
                func.hit_count
            )
            .unwrap();
        }
    }
    writeln!(out, "</table>").unwrap();

    page_end(&mut out);
    out
}

pub fn stylesheet() -> &'static str {
    r#"body { color: #000000; background-color: #ffffff; font-family: sans-serif; }
h1.title { text-align: center; font-size: 20pt; }
a:link, a:visited { color: #284fa8; }
table.headerTable, table.covTable { margin: 0 auto 1em auto; }
td.headerItem { text-align: right; font-weight: bold; padding-right: 6px; }
td.headerValue { color: #284fa8; font-weight: bold; }
td.headerCovTableEntry, td.headerCovTableEntryHi, td.headerCovTableEntryMed,
td.headerCovTableEntryLo, td.headerCovTableEntryNone { text-align: right; padding: 0 10px; background-color: #dae7fe; }
td.headerCovTableEntryHi { background-color: #a7fc9d; }
td.headerCovTableEntryMed { background-color: #ffea20; }
td.headerCovTableEntryLo { background-color: #ff0000; }
table.fileTable, table.funcTable, table.lineTable { margin: 0 auto; border-collapse: collapse; }
table.fileTable th, table.funcTable th, table.lineTable th { background-color: #6688d4; color: #ffffff; padding: 2px 8px; }
td.coverFile, td.coverFn { padding: 2px 20px 2px 10px; background-color: #dae7fe; font-family: monospace; }
div.bar { width: 100px; height: 10px; background-color: #ff0000; border: 1px solid #000000; }
div.barFillHi, div.barFillMed, div.barFillLo, div.barFillNone { height: 10px; background-color: #a7fc9d; }
td.coverPerHi, td.coverNumHi { background-color: #a7fc9d; text-align: right; padding: 2px 8px; }
td.coverPerMed, td.coverNumMed { background-color: #ffea20; text-align: right; padding: 2px 8px; }
td.coverPerLo, td.coverNumLo { background-color: #ff0000; text-align: right; padding: 2px 8px; }
td.coverPerNone, td.coverNumNone { background-color: #dae7fe; text-align: right; padding: 2px 8px; }
td.coverFnHi { background-color: #a7fc9d; text-align: right; padding: 2px 8px; }
td.coverFnLo { background-color: #ff0000; text-align: right; padding: 2px 8px; }
span.coverPerHi { background-color: #a7fc9d; padding: 0 4px; }
span.coverPerMed { background-color: #ffea20; padding: 0 4px; }
span.coverPerLo { background-color: #ff0000; padding: 0 4px; }
p.legend, p.views { text-align: center; }
p.unavailable { text-align: center; font-weight: bold; color: #cc0000; }
pre.source { font-family: monospace; white-space: pre; }
span.lineNum { background-color: #efe383; }
span.lineCov, td.lineCov { background-color: #cad7fe; }
span.lineNoCov, td.lineNoCov { background-color: #ff6230; }
span.branchCov { background-color: #cad7fe; }
span.branchNoCov { background-color: #ff6230; }
span.branchNoExec { background-color: #ff6230; }
p.footer { text-align: center; font-size: 8pt; color: #6688d4; }
"#
}
