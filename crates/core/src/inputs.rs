//! Input discovery
//!
//! Turns the paths given on the command line into a flat, ordered list of
//! files. Directories are walked; detection happens later, by content.

use crate::error::{Error, Result};
use covert_image::is_supported;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Collects input files from files and directories
pub struct InputScanner {
    paths: Vec<PathBuf>,
    include_hidden: bool,
    supported_only: bool,
}

impl InputScanner {
    /// Create a scanner over the given paths
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            include_hidden: false,
            supported_only: false,
        }
    }

    /// Whether to descend into and return dot-files found while walking
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Skip walked files whose extension is not a known image format.
    /// Paths named explicitly are always kept.
    pub fn supported_only(mut self, supported_only: bool) -> Self {
        self.supported_only = supported_only;
        self
    }

    /// Scan and return files in argument order, each directory sorted by name
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for root in &self.paths {
            if root.is_file() {
                files.push(root.clone());
                continue;
            }
            if !root.is_dir() {
                return Err(Error::file_not_found(root));
            }

            for entry in WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || self.include_hidden || !is_hidden(e.path()))
            {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                if self.supported_only {
                    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if !is_supported(name) {
                        continue;
                    }
                }

                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n != "." && n != "..")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::create_dir_all(dir.path().join(".thumbs")).unwrap();
        for name in ["b.heic", "a.png", "notes.txt", ".DS_Store", "nested/c.webp", ".thumbs/d.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        dir
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_walks_directories_sorted_without_hidden() {
        let dir = tree();
        let files = InputScanner::new([dir.path()]).scan().unwrap();
        assert_eq!(
            names(&files, dir.path()),
            vec!["a.png", "b.heic", "nested/c.webp", "notes.txt"]
        );
    }

    #[test]
    fn test_supported_only() {
        let dir = tree();
        let files = InputScanner::new([dir.path()]).supported_only(true).scan().unwrap();
        assert_eq!(names(&files, dir.path()), vec!["a.png", "b.heic", "nested/c.webp"]);
    }

    #[test]
    fn test_include_hidden() {
        let dir = tree();
        let files = InputScanner::new([dir.path()]).include_hidden(true).scan().unwrap();
        assert_eq!(files.len(), 6);
    }

    #[test]
    fn test_explicit_files_keep_argument_order() {
        let dir = tree();
        let files = InputScanner::new([dir.path().join("notes.txt"), dir.path().join("a.png")])
            .supported_only(true)
            .scan()
            .unwrap();
        assert_eq!(names(&files, dir.path()), vec!["notes.txt", "a.png"]);
    }

    #[test]
    fn test_missing_path() {
        let err = InputScanner::new(["/nonexistent/photos"]).scan().unwrap_err();
        assert_eq!(err.code, ErrorCode::FileNotFound);
    }
}
