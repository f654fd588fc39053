#![allow(dead_code)]

use std::path::{Path, PathBuf};

use covhtml::engine::Invocation;
use tempfile::TempDir;

/// A scratch workspace for one test. The caller must hold onto it to keep
/// the temp directory alive.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file below the workspace, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Absolute path of a source file inside the workspace, as it would
    /// appear on an `SF:` line.
    pub fn source(&self, relative: &str) -> String {
        self.dir.path().join(relative).display().to_string()
    }

    pub fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Invocation using `config` as the configuration file contents, so the
    /// run never picks up a `$HOME/.lcovrc`.
    pub fn invocation(&self, traces: Vec<PathBuf>, config: &str) -> Invocation {
        Invocation {
            trace_files: traces,
            output_dir: self.out(),
            config_path: Some(self.write("lcovrc", config)),
            timestamp: None,
        }
    }

    pub fn read_out(&self, relative: &str) -> String {
        std::fs::read_to_string(self.out().join(relative)).unwrap()
    }
}

/// Every file below `root` with its contents, sorted by path.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let bytes = std::fs::read(&path).unwrap();
                files.push((path.strip_prefix(root).unwrap().to_path_buf(), bytes));
            }
        }
    }
    files.sort();
    files
}
