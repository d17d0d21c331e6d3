//! Shared fixtures for integration tests
//!
//! A [`Workspace`] is a throwaway directory of text files searched through
//! the real [`LocalFileHost`].

#![allow(dead_code)]

use multiedit::{FileScope, SearchOptions, SearchRequest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace holding the given `(relative path, text)` files
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let workspace = Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        };
        for (path, text) in files {
            workspace.write(path, text);
        }
        workspace
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, text: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, text).expect("Failed to write fixture");
    }

    /// Rewrite a file but leave its modification time as it was
    pub fn rewrite_keeping_mtime(&self, relative: &str, text: &str) {
        let path = self.path(relative);
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .expect("Failed to read mtime");
        self.write(relative, text);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(modified))
            .expect("Failed to restore mtime");
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).expect("Failed to read fixture")
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.path(relative)).expect("Failed to remove fixture");
    }

    /// Request over the whole workspace with symmetric context
    pub fn request(&self, query: &str, context: usize) -> SearchRequest {
        let mut search = SearchOptions::new(query);
        search.context_before = context;
        search.context_after = context;
        SearchRequest::new(search, FileScope::new(self.root()))
    }
}

/// Assert that a file lists exactly these lines
pub fn assert_lines(text: &str, expected: &[&str]) {
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, expected, "unexpected file content:\n{}", text);
}
