//! Aggregate document formatting and line mapping
//!
//! All excerpts of a search are rendered into one synthetic text document.
//! The layout is fixed so that the change tracker can find the editable part
//! of each line by column offset alone:
//!
//! ```text
//! Search: "foo" (case-sensitive)
//!
//! === src/lib.rs
//!
//!     11   let a = 1;
//!     12 > let foo = 2;
//!     13   let b = 3;
//!
//! ```
//!
//! Each excerpt line is the 1-based source line number right-justified in
//! [`LINE_NUMBER_WIDTH`] columns, one space, a two-character prefix
//! ([`MATCH_PREFIX`] or [`CONTEXT_PREFIX`]) and the line text. Changing any of
//! these constants requires bumping [`LAYOUT_VERSION`].

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::excerpt::{Excerpt, ExcerptDraft, ExcerptId};
use crate::matcher::Matcher;
use crate::models::{FileContent, LineRange, ReplaceOptions, SearchOptions};

/// Version of the textual layout below
pub const LAYOUT_VERSION: u32 = 1;
/// Width of the right-justified line number column
pub const LINE_NUMBER_WIDTH: usize = 6;
/// Prefix of lines that belong to a match
pub const MATCH_PREFIX: &str = "> ";
/// Prefix of context-only lines
pub const CONTEXT_PREFIX: &str = "  ";
/// Width shared by both prefixes
pub const PREFIX_WIDTH: usize = 2;
/// Character offset where editable line content starts
pub const CONTENT_OFFSET: usize = LINE_NUMBER_WIDTH + 1 + PREFIX_WIDTH;
/// Marker in front of each file header line
pub const FILE_HEADER_MARKER: &str = "=== ";

/// Editable part of an aggregate line: everything past the fixed columns, trimmed
pub fn editable_content(line: &str) -> &str {
    line.char_indices()
        .nth(CONTENT_OFFSET)
        .map(|(idx, _)| &line[idx..])
        .unwrap_or("")
        .trim()
}

fn format_excerpt_line(source_line: usize, is_match: bool, text: &str) -> Result<String> {
    let number = (source_line + 1).to_string();
    if number.len() > LINE_NUMBER_WIDTH {
        return Err(EngineError::Layout(format!(
            "line number {} is wider than {} columns",
            number, LINE_NUMBER_WIDTH
        )));
    }

    let prefix = if is_match { MATCH_PREFIX } else { CONTEXT_PREFIX };
    Ok(format!(
        "{:>width$} {}{}",
        number,
        prefix,
        text,
        width = LINE_NUMBER_WIDTH
    ))
}

/// One file's excerpts, ready to be formatted
#[derive(Debug, Clone)]
pub struct FileExcerpts {
    pub path: PathBuf,
    pub display_path: String,
    pub content: FileContent,
    pub excerpts: Vec<ExcerptDraft>,
}

/// A mapping problem found by [`AggregateMapping::validate`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MappingViolation {
    #[error("aggregate line {line} points at unknown excerpt {id}")]
    DanglingLine { line: usize, id: ExcerptId },

    #[error("file entry {} lists unknown excerpt {id}", .path.display())]
    DanglingFileEntry { path: PathBuf, id: ExcerptId },

    #[error("excerpt {id} is not reachable from any line or file entry")]
    Orphan { id: ExcerptId },

    #[error("excerpt {id} of {} is listed under {}", .owner.display(), .listed_under.display())]
    WrongFile {
        id: ExcerptId,
        owner: PathBuf,
        listed_under: PathBuf,
    },

    #[error("excerpt {id} is missing from its file's entry")]
    Unlisted { id: ExcerptId },

    #[error("excerpt {id} is listed {count} times")]
    Duplicate { id: ExcerptId, count: usize },

    #[error("aggregate line {line} lies outside excerpt {id}")]
    LineOutsideExcerpt { line: usize, id: ExcerptId },

    #[error("excerpt {id} spans {aggregate} aggregate lines for {source_lines} source lines")]
    NotContiguous {
        id: ExcerptId,
        aggregate: usize,
        source_lines: usize,
    },
}

/// Join structure between aggregate lines, excerpt ids and files
#[derive(Debug, Clone, Default)]
pub struct AggregateMapping {
    pub(crate) line_to_excerpt: BTreeMap<usize, ExcerptId>,
    pub(crate) excerpts_by_id: HashMap<ExcerptId, Excerpt>,
    pub(crate) excerpts_by_file: HashMap<PathBuf, Vec<ExcerptId>>,
    pub(crate) file_order: Vec<PathBuf>,
    line_count: usize,
    layout_version: u32,
}

impl AggregateMapping {
    pub fn layout_version(&self) -> u32 {
        self.layout_version
    }

    /// Number of lines in the aggregate document this mapping was built for
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn excerpt_count(&self) -> usize {
        self.excerpts_by_id.len()
    }

    pub fn excerpt(&self, id: &ExcerptId) -> Option<&Excerpt> {
        self.excerpts_by_id.get(id)
    }

    /// Excerpt owning a match line (header, blank and context lines are unmapped)
    pub fn excerpt_at_line(&self, aggregate_line: usize) -> Option<&Excerpt> {
        self.line_to_excerpt
            .get(&aggregate_line)
            .and_then(|id| self.excerpts_by_id.get(id))
    }

    /// Every mapped match line with its excerpt, in aggregate order
    pub fn match_lines(&self) -> impl Iterator<Item = (usize, &Excerpt)> + '_ {
        self.line_to_excerpt
            .iter()
            .filter_map(|(line, id)| self.excerpts_by_id.get(id).map(|e| (*line, e)))
    }

    /// Files in aggregate order
    pub fn files(&self) -> &[PathBuf] {
        &self.file_order
    }

    /// Excerpts of one file in aggregate order
    pub fn excerpts_for_file<'a>(&'a self, path: &Path) -> impl Iterator<Item = &'a Excerpt> + 'a {
        self.excerpts_by_file
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(|id| self.excerpts_by_id.get(id))
    }

    /// Source file and line shown at an aggregate match line
    pub fn source_location(&self, aggregate_line: usize) -> Option<(&Path, usize)> {
        let excerpt = self.excerpt_at_line(aggregate_line)?;
        let line = excerpt.source_line_for(aggregate_line)?;
        Some((excerpt.file(), line))
    }

    /// Aggregate line showing a given source line, if any excerpt covers it
    pub fn aggregate_line(&self, path: &Path, source_line: usize) -> Option<usize> {
        self.excerpts_for_file(path)
            .find_map(|e| e.aggregate_line_for(source_line))
    }

    /// Check the registry invariants
    ///
    /// Every excerpt referenced by a line or a file entry must exist, every
    /// excerpt must be reachable, the file grouping must match each excerpt's
    /// owner exactly, and excerpts must be line-contiguous between source and
    /// aggregate.
    pub fn validate(&self) -> Vec<MappingViolation> {
        let mut violations = Vec::new();
        let mut reachable: HashSet<&ExcerptId> = HashSet::new();

        for (line, id) in &self.line_to_excerpt {
            match self.excerpts_by_id.get(id) {
                None => violations.push(MappingViolation::DanglingLine {
                    line: *line,
                    id: id.clone(),
                }),
                Some(excerpt) => {
                    reachable.insert(id);
                    if !excerpt.aggregate_range().contains(*line) {
                        violations.push(MappingViolation::LineOutsideExcerpt {
                            line: *line,
                            id: id.clone(),
                        });
                    }
                }
            }
        }

        let mut listings: HashMap<&ExcerptId, usize> = HashMap::new();
        for (path, ids) in &self.excerpts_by_file {
            for id in ids {
                *listings.entry(id).or_default() += 1;
                match self.excerpts_by_id.get(id) {
                    None => violations.push(MappingViolation::DanglingFileEntry {
                        path: path.clone(),
                        id: id.clone(),
                    }),
                    Some(excerpt) => {
                        reachable.insert(id);
                        if excerpt.file() != path {
                            violations.push(MappingViolation::WrongFile {
                                id: id.clone(),
                                owner: excerpt.file().to_path_buf(),
                                listed_under: path.clone(),
                            });
                        }
                    }
                }
            }
        }

        let mut ids: Vec<&ExcerptId> = self.excerpts_by_id.keys().collect();
        ids.sort();
        for id in ids {
            if !reachable.contains(id) {
                violations.push(MappingViolation::Orphan { id: id.clone() });
            }

            match listings.get(id).copied().unwrap_or(0) {
                1 => {}
                0 => violations.push(MappingViolation::Unlisted { id: id.clone() }),
                count => violations.push(MappingViolation::Duplicate {
                    id: id.clone(),
                    count,
                }),
            }

            let excerpt = &self.excerpts_by_id[id];
            let aggregate = excerpt.aggregate_range().len();
            let source_lines = excerpt.context_range().len();
            if aggregate != source_lines {
                violations.push(MappingViolation::NotContiguous {
                    id: id.clone(),
                    aggregate,
                    source_lines,
                });
            }
        }

        violations
    }
}

/// Output of one formatting pass
#[derive(Debug, Clone)]
pub struct FormattedAggregate {
    /// Text shown to the user (with substitutions applied for replace documents)
    pub content: String,
    /// Same layout without substitutions; the change-tracking baseline
    pub baseline: String,
    pub mapping: AggregateMapping,
}

/// Renders excerpts into an aggregate document
pub struct AggregateFormatter;

impl AggregateFormatter {
    /// Format all files' excerpts, in the given order
    ///
    /// # Algorithm
    ///
    /// 1. Header line describing the operation, then a blank line
    /// 2. Per file: `=== <path>` header, then a blank line
    /// 3. Per excerpt: one line per context-range line, then a blank line;
    ///    match lines get the replacement applied when replacing
    /// 4. Aggregate ranges are collected in a parallel list and only then
    ///    attached to the drafts, producing the final mapping
    pub fn format(
        files: Vec<FileExcerpts>,
        search: &SearchOptions,
        replace: Option<&ReplaceOptions>,
    ) -> Result<FormattedAggregate> {
        let substitution = match replace {
            Some(options) => Some((Matcher::new(search)?, options.replacement.as_str())),
            None => None,
        };

        let mut content: Vec<String> = Vec::new();
        let mut baseline: Vec<String> = Vec::new();
        let mut emit = |shown: String, original: String| {
            content.push(shown);
            baseline.push(original);
        };

        let header = Self::header(search, replace);
        emit(header.clone(), header);
        emit(String::new(), String::new());

        // Phase one: lay out text and record where each draft landed
        let mut line = 2usize;
        let mut placements: Vec<Vec<LineRange>> = Vec::with_capacity(files.len());
        let mut match_lines: Vec<(usize, usize, usize)> = Vec::new(); // (aggregate line, file idx, excerpt idx)

        for (file_idx, file) in files.iter().enumerate() {
            let header = format!("{}{}", FILE_HEADER_MARKER, file.display_path);
            emit(header.clone(), header);
            emit(String::new(), String::new());
            line += 2;

            let mut ranges = Vec::with_capacity(file.excerpts.len());
            for (excerpt_idx, draft) in file.excerpts.iter().enumerate() {
                let context = draft.context_range();
                let first = line;

                for source_line in context.start..=context.end {
                    let text = file.content.line(source_line).ok_or_else(|| {
                        EngineError::Layout(format!(
                            "{} has no line {} (excerpt {})",
                            file.display_path,
                            source_line + 1,
                            draft.id()
                        ))
                    })?;
                    let is_match = draft.is_match_line(source_line);

                    let original = format_excerpt_line(source_line, is_match, text)?;
                    let shown = match (&substitution, is_match) {
                        (Some((matcher, replacement)), true) => format_excerpt_line(
                            source_line,
                            true,
                            &matcher.replace_line(text, replacement),
                        )?,
                        _ => original.clone(),
                    };
                    emit(shown, original);

                    if is_match {
                        match_lines.push((line, file_idx, excerpt_idx));
                    }
                    line += 1;
                }

                ranges.push(LineRange::new(first, line - 1));
                emit(String::new(), String::new());
                line += 1;
            }
            placements.push(ranges);
        }

        // Phase two: finalize drafts with their aggregate ranges
        let line_count = content.len();
        let mut mapping = AggregateMapping {
            line_count,
            layout_version: LAYOUT_VERSION,
            ..AggregateMapping::default()
        };

        let mut ids_by_position: Vec<Vec<ExcerptId>> = Vec::with_capacity(files.len());
        for (file, ranges) in files.into_iter().zip(placements) {
            let mut ids = Vec::with_capacity(file.excerpts.len());
            for (draft, range) in file.excerpts.into_iter().zip(ranges) {
                let excerpt = draft.finalize(range);
                let id = excerpt.id().clone();
                mapping.excerpts_by_id.insert(id.clone(), excerpt);
                ids.push(id);
            }

            if !ids.is_empty() {
                mapping.file_order.push(file.path.clone());
                mapping
                    .excerpts_by_file
                    .entry(file.path)
                    .or_default()
                    .extend(ids.iter().cloned());
            }
            ids_by_position.push(ids);
        }

        for (aggregate_line, file_idx, excerpt_idx) in match_lines {
            let id = ids_by_position[file_idx][excerpt_idx].clone();
            mapping.line_to_excerpt.insert(aggregate_line, id);
        }

        log::debug!(
            "Formatted aggregate: {} lines, {} files, {} excerpts, {} match lines",
            line_count,
            mapping.file_order.len(),
            mapping.excerpt_count(),
            mapping.line_to_excerpt.len()
        );

        Ok(FormattedAggregate {
            content: join_lines(&content),
            baseline: join_lines(&baseline),
            mapping,
        })
    }

    fn header(search: &SearchOptions, replace: Option<&ReplaceOptions>) -> String {
        let flags = search.flags_label();
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags)
        };

        match replace {
            Some(options) => format!(
                "Replace: {:?} -> {:?}{}",
                search.query, options.replacement, flags
            ),
            None => format!("Search: {:?}{}", search.query, flags),
        }
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
