//! Report model: a directory tree over the merged coverage, rooted at the
//! longest common ancestor directory of all source files.
//!
//! Children are stored in canonical name order. Display ordering is chosen at
//! render time with [`ReportNode::sorted_children`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, SortKey};
use crate::model::{CoverageSummary, Level, MergedFileCoverage};

#[derive(Debug, Clone)]
pub enum NodeKind {
    File(Arc<MergedFileCoverage>),
    Directory(Vec<ReportNode>),
}

#[derive(Debug, Clone)]
pub struct ReportNode {
    /// Last path segment; empty for the root.
    pub name: String,
    /// Segments from the report root down to this node.
    pub segments: Vec<String>,
    pub summary: CoverageSummary,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct ReportTree {
    /// Common ancestor directory of every source file.
    pub root_dir: PathBuf,
    pub root: ReportNode,
}

impl ReportNode {
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    #[must_use]
    pub fn children(&self) -> &[ReportNode] {
        match &self.kind {
            NodeKind::Directory(children) => children,
            NodeKind::File(_) => &[],
        }
    }

    #[must_use]
    pub fn coverage(&self) -> Option<&MergedFileCoverage> {
        match &self.kind {
            NodeKind::File(cov) => Some(cov),
            NodeKind::Directory(_) => None,
        }
    }

    /// Slash-joined path relative to the report root.
    #[must_use]
    pub fn display_path(&self) -> String {
        self.segments.join("/")
    }

    #[must_use]
    pub fn line_level(&self, config: &Config) -> Option<Level> {
        config.line_limits.classify(
            self.summary.lines_hit,
            self.summary.lines_found,
            config.threshold_inclusive,
        )
    }

    #[must_use]
    pub fn function_level(&self, config: &Config) -> Option<Level> {
        config.function_limits.classify(
            self.summary.functions_hit,
            self.summary.functions_found,
            config.threshold_inclusive,
        )
    }

    #[must_use]
    pub fn branch_level(&self, config: &Config) -> Option<Level> {
        config.branch_limits.classify(
            self.summary.branches_hit,
            self.summary.branches_found,
            config.threshold_inclusive,
        )
    }

    /// Children in display order. Coverage orderings break ties by name.
    #[must_use]
    pub fn sorted_children(&self, key: SortKey) -> Vec<&ReportNode> {
        let mut children: Vec<&ReportNode> = self.children().iter().collect();
        let by_name = |a: &&ReportNode, b: &&ReportNode| canonical_order(a, b);
        match key {
            SortKey::Name => children.sort_by(by_name),
            SortKey::CoverageAsc => children.sort_by(|a, b| {
                a.summary
                    .line_rate()
                    .total_cmp(&b.summary.line_rate())
                    .then_with(|| by_name(a, b))
            }),
            SortKey::CoverageDesc => children.sort_by(|a, b| {
                b.summary
                    .line_rate()
                    .total_cmp(&a.summary.line_rate())
                    .then_with(|| by_name(a, b))
            }),
        }
        children
    }

    /// Every node in the subtree, depth first, parents before children.
    #[must_use]
    pub fn walk(&self) -> Vec<&ReportNode> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.walk());
        }
        out
    }
}

fn canonical_order(a: &ReportNode, b: &ReportNode) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.is_file().cmp(&b.is_file()))
}

/// Leaf summary. Function and branch counts stay zero unless enabled.
#[must_use]
pub fn summarize_file(cov: &MergedFileCoverage, config: &Config) -> CoverageSummary {
    let mut summary = CoverageSummary {
        lines_found: cov.lines.len() as u64,
        lines_hit: cov.lines.values().filter(|l| l.hit_count > 0).count() as u64,
        ..Default::default()
    };
    if config.function_coverage {
        summary.functions_found = cov.functions.len() as u64;
        summary.functions_hit = cov.functions.values().filter(|f| f.hit_count > 0).count() as u64;
    }
    if config.branch_coverage {
        summary.branches_found = cov.branches.len() as u64;
        summary.branches_hit = cov.branches.values().filter(|b| b.hits.is_hit()).count() as u64;
    }
    summary
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeMap<String, Arc<MergedFileCoverage>>,
}

impl DirBuilder {
    fn insert(&mut self, segments: &[String], cov: Arc<MergedFileCoverage>) {
        match segments {
            [file] => {
                self.files.insert(file.clone(), cov);
            }
            [dir, rest @ ..] => self.dirs.entry(dir.clone()).or_default().insert(rest, cov),
            [] => {}
        }
    }

    fn finish(self, name: String, segments: Vec<String>, config: &Config) -> ReportNode {
        let mut children = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (dir_name, dir) in self.dirs {
            let mut child_segments = segments.clone();
            child_segments.push(dir_name.clone());
            children.push(dir.finish(dir_name, child_segments, config));
        }
        for (file_name, cov) in self.files {
            let mut child_segments = segments.clone();
            child_segments.push(file_name.clone());
            children.push(ReportNode {
                name: file_name,
                segments: child_segments,
                summary: summarize_file(&cov, config),
                kind: NodeKind::File(cov),
            });
        }
        children.sort_by(canonical_order);

        ReportNode {
            name,
            segments,
            summary: children.iter().map(|c| c.summary).sum(),
            kind: NodeKind::Directory(children),
        }
    }
}

fn component_name(component: Component<'_>) -> String {
    match component {
        Component::RootDir => "/".to_string(),
        other => other.as_os_str().to_string_lossy().into_owned(),
    }
}

/// Longest common directory prefix of the given file paths.
fn common_ancestor<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<Component<'a>> {
    let mut prefix: Option<Vec<Component<'a>>> = None;
    for path in paths {
        let parent: Vec<Component<'a>> = path
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();
        prefix = Some(match prefix {
            None => parent,
            Some(current) => current
                .into_iter()
                .zip(parent)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    prefix.unwrap_or_default()
}

/// Build the report tree from merged coverage.
pub fn build(files: BTreeMap<PathBuf, MergedFileCoverage>, config: &Config) -> ReportTree {
    let (root_dir, prefix_len) = {
        let prefix = common_ancestor(files.keys().map(PathBuf::as_path));
        (prefix.iter().collect::<PathBuf>(), prefix.len())
    };

    let mut root = DirBuilder::default();
    for (path, cov) in files {
        let segments: Vec<String> = path
            .components()
            .skip(prefix_len)
            .map(component_name)
            .collect();
        root.insert(&segments, Arc::new(cov));
    }

    ReportTree {
        root_dir,
        root: root.finish(String::new(), Vec::new(), config),
    }
}
