//! Core data models for multiedit
//!
//! These structures describe what a search looks for, where matches live in
//! a file, and how a file's text is held while excerpts are cut out of it.
//! All line and column coordinates are 0-based unless stated otherwise.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to look for and how much surrounding text to show
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchOptions {
    /// Literal text or regular expression, depending on `is_regex`
    pub query: String,
    /// Interpret `query` as a regular expression
    pub is_regex: bool,
    /// Match case exactly (false = Unicode case folding)
    pub is_case_sensitive: bool,
    /// Only keep matches bounded by non-word characters or line edges
    pub match_whole_word: bool,
    /// Lines of context shown above each match
    pub context_before: usize,
    /// Lines of context shown below each match
    pub context_after: usize,
    /// Global match budget across all files (0 = unlimited)
    pub max_results: usize,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Short human-readable description of the active flags
    pub fn flags_label(&self) -> String {
        let mut flags = Vec::new();
        if self.is_regex {
            flags.push("regex");
        }
        if self.is_case_sensitive {
            flags.push("case-sensitive");
        }
        if self.match_whole_word {
            flags.push("whole word");
        }
        flags.join(", ")
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            is_regex: false,
            is_case_sensitive: false,
            match_whole_word: false,
            context_before: 2,
            context_after: 2,
            max_results: 10_000,
        }
    }
}

/// Replacement applied to every match line of a replace document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReplaceOptions {
    /// Substituted verbatim in literal mode; may use `$1`/`${name}` in regex mode
    pub replacement: String,
}

impl ReplaceOptions {
    pub fn new(replacement: impl Into<String>) -> Self {
        Self {
            replacement: replacement.into(),
        }
    }
}

/// Inclusive range of lines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    /// Number of lines covered (never zero)
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A located occurrence of the query, in line/byte-column coordinates
///
/// The span is half-open: `[start_line:start_col, end_line:end_col)`.
/// `is_primary` is true for the first occurrence on its line; further
/// occurrences on the same line are kept for highlighting only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSpan {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
    pub is_primary: bool,
}

impl MatchSpan {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
            is_primary: true,
        }
    }

    /// Lines touched by this span
    pub fn lines(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }

    pub fn is_empty(&self) -> bool {
        self.start_line == self.end_line && self.start_col == self.end_col
    }
}

/// Terminator of one line as read from disk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Line-addressable text of one file
///
/// Every line keeps its own terminator, so files with mixed line endings
/// are written back byte-for-byte apart from the replaced lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileContent {
    lines: Vec<String>,
    /// Parallel to `lines`; `None` only for a last line without terminator
    endings: Vec<Option<LineEnding>>,
}

impl FileContent {
    /// Split text into lines, remembering how to put it back together
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();

        for raw in text.split_inclusive('\n') {
            let (line, ending) = if let Some(line) = raw.strip_suffix("\r\n") {
                (line, Some(LineEnding::CrLf))
            } else if let Some(line) = raw.strip_suffix('\n') {
                (line, Some(LineEnding::Lf))
            } else {
                (raw, None)
            };
            lines.push(line.to_string());
            endings.push(ending);
        }

        Self { lines, endings }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Terminator of one line; `None` for an unterminated last line
    pub fn line_ending(&self, index: usize) -> Option<LineEnding> {
        self.endings.get(index).copied().flatten()
    }

    /// Replace whole lines in one pass
    ///
    /// Fails without modifying anything if any target line is out of bounds.
    /// Replaced lines keep their original terminator.
    pub fn replace_lines(&mut self, replacements: &[LineReplacement]) -> Result<(), usize> {
        if let Some(bad) = replacements.iter().find(|r| r.line >= self.lines.len()) {
            return Err(bad.line);
        }

        for replacement in replacements {
            self.lines[replacement.line] = replacement.text.clone();
        }

        Ok(())
    }

    /// Reassemble the text with each line's original terminator
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 2).sum());
        for (line, ending) in self.lines.iter().zip(&self.endings) {
            text.push_str(line);
            if let Some(ending) = ending {
                text.push_str(ending.as_str());
            }
        }
        text
    }
}

/// Full-line replacement targeting one line of a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineReplacement {
    /// 0-based target line
    pub line: usize,
    /// New line text, without terminator
    pub text: String,
}

/// Which files a search walks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileScope {
    /// Directory the walk starts from; display paths are relative to it
    pub root: PathBuf,
    /// Glob patterns to include (empty = everything)
    pub include: Vec<String>,
    /// Glob patterns to exclude
    pub exclude: Vec<String>,
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
}

impl FileScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
            max_file_size: 10 * 1024 * 1024, // 10 MB
        }
    }

    /// Path shown to the user for a file in this scope
    pub fn display_path(&self, path: &std::path::Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}
