//! Excerpt construction
//!
//! Raw match spans of one file are expanded by their context lines and merged
//! into non-overlapping blocks. Building happens in two phases: the builder
//! produces [`ExcerptDraft`]s that only know their source coordinates, and the
//! aggregate formatter later finalizes each draft into an immutable
//! [`Excerpt`] once its position in the aggregate document is known.
//!
//! # Merging
//!
//! Two expanded spans are merged when the later one starts no more than one
//! line after the earlier one ends, so `[4, 6]` and `[7, 9]` become one block
//! `[4, 9]`, while `[4, 6]` and `[8, 10]` stay separate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::aggregate::LINE_NUMBER_WIDTH;
use crate::error::{EngineError, Result};
use crate::models::{FileContent, LineRange, MatchSpan};

/// Upper bound for context lines on either side of a match
pub const MAX_CONTEXT_LINES: usize = 10_000;

static EXCERPT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique excerpt identity
///
/// Built from a monotonic counter, the creation time and a random suffix.
/// The counter leads, so ids sort in creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExcerptId(String);

impl ExcerptId {
    pub fn mint() -> Self {
        let counter = EXCERPT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis().max(0);
        let random = uuid::Uuid::new_v4().as_u128() as u32;
        ExcerptId(format!("{:016x}-{:x}-{:08x}", counter, millis, random))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExcerptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source-side half of an excerpt, before it has an aggregate position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcerptDraft {
    id: ExcerptId,
    file: PathBuf,
    source_range: LineRange,
    match_ranges: Vec<LineRange>,
    context_before: usize,
    context_after: usize,
    is_match: bool,
    original_text: String,
}

impl ExcerptDraft {
    pub fn id(&self) -> &ExcerptId {
        &self.id
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// From the first match's start line to the last match's end line
    pub fn source_range(&self) -> LineRange {
        self.source_range
    }

    /// Line range of every underlying match, in order
    pub fn match_ranges(&self) -> &[LineRange] {
        &self.match_ranges
    }

    pub fn context_before(&self) -> usize {
        self.context_before
    }

    pub fn context_after(&self) -> usize {
        self.context_after
    }

    /// Every line shown for this excerpt: source range plus clamped context
    pub fn context_range(&self) -> LineRange {
        LineRange::new(
            self.source_range.start - self.context_before,
            self.source_range.end + self.context_after,
        )
    }

    pub fn is_match(&self) -> bool {
        self.is_match
    }

    /// Matched source text as it was when the excerpt was created
    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    /// Whether a source line belongs to one of the underlying matches
    pub fn is_match_line(&self, line: usize) -> bool {
        self.match_ranges.iter().any(|r| r.contains(line))
    }

    /// Same excerpt under a freshly minted id
    pub fn reissue(&self) -> Self {
        Self {
            id: ExcerptId::mint(),
            ..self.clone()
        }
    }

    /// Second phase: attach the position assigned by the formatter
    pub fn finalize(self, aggregate_range: LineRange) -> Excerpt {
        Excerpt {
            draft: self,
            aggregate_range,
        }
    }
}

/// A context-padded block of one file, placed in an aggregate document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Excerpt {
    #[serde(flatten)]
    draft: ExcerptDraft,
    aggregate_range: LineRange,
}

impl Excerpt {
    pub fn id(&self) -> &ExcerptId {
        self.draft.id()
    }

    pub fn file(&self) -> &Path {
        self.draft.file()
    }

    pub fn source_range(&self) -> LineRange {
        self.draft.source_range()
    }

    pub fn match_ranges(&self) -> &[LineRange] {
        self.draft.match_ranges()
    }

    pub fn context_range(&self) -> LineRange {
        self.draft.context_range()
    }

    pub fn context_before(&self) -> usize {
        self.draft.context_before()
    }

    pub fn context_after(&self) -> usize {
        self.draft.context_after()
    }

    pub fn is_match(&self) -> bool {
        self.draft.is_match()
    }

    pub fn original_text(&self) -> &str {
        self.draft.original_text()
    }

    pub fn is_match_line(&self, source_line: usize) -> bool {
        self.draft.is_match_line(source_line)
    }

    /// Lines this excerpt occupies in the aggregate document
    pub fn aggregate_range(&self) -> LineRange {
        self.aggregate_range
    }

    /// Source line shown at an aggregate line inside this excerpt
    pub fn source_line_for(&self, aggregate_line: usize) -> Option<usize> {
        self.aggregate_range
            .contains(aggregate_line)
            .then(|| self.context_range().start + (aggregate_line - self.aggregate_range.start))
    }

    /// Aggregate line showing a source line inside this excerpt
    pub fn aggregate_line_for(&self, source_line: usize) -> Option<usize> {
        let context = self.context_range();
        context
            .contains(source_line)
            .then(|| self.aggregate_range.start + (source_line - context.start))
    }
}

/// Expands and merges match spans into excerpts
#[derive(Debug, Clone, Copy)]
pub struct ExcerptBuilder {
    context_before: usize,
    context_after: usize,
}

impl ExcerptBuilder {
    pub fn new(context_before: usize, context_after: usize) -> Self {
        Self {
            context_before,
            context_after,
        }
    }

    /// Build the excerpts of one file
    ///
    /// Zero spans yield zero excerpts. Spans outside the file, or context
    /// values above [`MAX_CONTEXT_LINES`], fail the whole file.
    pub fn build(
        &self,
        path: &Path,
        spans: &[MatchSpan],
        content: &FileContent,
    ) -> Result<Vec<ExcerptDraft>> {
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        let construction = |message: String| EngineError::Construction {
            path: path.to_path_buf(),
            message,
        };

        if self.context_before > MAX_CONTEXT_LINES || self.context_after > MAX_CONTEXT_LINES {
            return Err(construction(format!(
                "context of {}/{} lines exceeds the maximum of {}",
                self.context_before, self.context_after, MAX_CONTEXT_LINES
            )));
        }

        let line_count = content.line_count();
        let mut ranges = Vec::with_capacity(spans.len());
        for span in spans {
            if span.start_line > span.end_line {
                return Err(construction(format!(
                    "match starts on line {} after it ends on line {}",
                    span.start_line + 1,
                    span.end_line + 1
                )));
            }
            if span.end_line >= line_count {
                return Err(construction(format!(
                    "match on line {} is outside the file ({} lines)",
                    span.end_line + 1,
                    line_count
                )));
            }
            ranges.push(span.lines());
        }

        let last_line = line_count - 1;
        if last_line.min(ranges.iter().map(|r| r.end).max().unwrap_or(0) + self.context_after) + 1
            > max_display_line()
        {
            return Err(construction(format!(
                "line numbers above {} do not fit the aggregate layout",
                max_display_line()
            )));
        }

        ranges.sort();
        ranges.dedup();

        // Expand, then merge groups whose expanded spans touch or are adjacent
        let mut groups: Vec<(LineRange, Vec<LineRange>)> = Vec::new();
        for range in ranges {
            let expanded = LineRange::new(
                range.start.saturating_sub(self.context_before),
                (range.end + self.context_after).min(last_line),
            );

            match groups.last_mut() {
                Some((current, members)) if expanded.start <= current.end + 1 => {
                    current.end = current.end.max(expanded.end);
                    members.push(range);
                }
                _ => groups.push((expanded, vec![range])),
            }
        }

        let drafts = groups
            .into_iter()
            .map(|(expanded, members)| {
                let source_range = LineRange::new(
                    members.iter().map(|r| r.start).min().unwrap_or(expanded.start),
                    members.iter().map(|r| r.end).max().unwrap_or(expanded.end),
                );
                let original_text = content.lines()[source_range.start..=source_range.end].join("\n");

                ExcerptDraft {
                    id: ExcerptId::mint(),
                    file: path.to_path_buf(),
                    source_range,
                    match_ranges: members,
                    context_before: source_range.start - expanded.start,
                    context_after: expanded.end - source_range.end,
                    is_match: true,
                    original_text,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Built {} excerpt(s) from {} span(s) in {}",
            drafts.len(),
            spans.len(),
            path.display()
        );

        Ok(drafts)
    }
}

/// Largest 1-based line number that fits the fixed line-number column
fn max_display_line() -> usize {
    10usize.pow(LINE_NUMBER_WIDTH as u32) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(lines: usize) -> FileContent {
        let text: String = (0..lines).map(|i| format!("line {}\n", i)).collect();
        FileContent::parse(&text)
    }

    fn span(line: usize) -> MatchSpan {
        MatchSpan::new(line, 0, line, 4)
    }

    fn build(before: usize, after: usize, lines: &[usize], total: usize) -> Vec<ExcerptDraft> {
        let spans: Vec<_> = lines.iter().map(|&l| span(l)).collect();
        ExcerptBuilder::new(before, after)
            .build(Path::new("a.txt"), &spans, &content(total))
            .unwrap()
    }

    #[test]
    fn test_adjacent_expanded_spans_merge() {
        let drafts = build(1, 1, &[5, 8], 20);

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].context_range(), LineRange::new(4, 9));
        assert_eq!(drafts[0].source_range(), LineRange::new(5, 8));
        assert_eq!(
            drafts[0].match_ranges(),
            &[LineRange::single(5), LineRange::single(8)]
        );
        assert!(drafts[0].is_match_line(8));
        assert!(!drafts[0].is_match_line(6));
    }

    #[test]
    fn test_one_line_gap_keeps_excerpts_apart() {
        let drafts = build(1, 1, &[5, 9], 20);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].context_range(), LineRange::new(4, 6));
        assert_eq!(drafts[1].context_range(), LineRange::new(8, 10));
    }

    #[test]
    fn test_excerpts_ordered_and_disjoint() {
        let drafts = build(2, 2, &[30, 1, 14, 15, 50, 3], 60);

        for pair in drafts.windows(2) {
            let (a, b) = (pair[0].context_range(), pair[1].context_range());
            assert!(a.end < b.start, "{:?} overlaps {:?}", a, b);
        }
        assert_eq!(drafts.first().unwrap().context_range().start, 0);
    }

    #[test]
    fn test_context_clamps_at_first_line() {
        let drafts = build(5, 0, &[0], 10);
        assert_eq!(drafts[0].context_range(), LineRange::new(0, 0));
        assert_eq!(drafts[0].context_before(), 0);
    }

    #[test]
    fn test_context_clamps_at_last_line() {
        let drafts = build(0, 5, &[9], 10);
        assert_eq!(drafts[0].context_range(), LineRange::new(9, 9));
        assert_eq!(drafts[0].context_after(), 0);
    }

    #[test]
    fn test_no_spans_no_excerpts() {
        assert!(build(2, 2, &[], 10).is_empty());
    }

    #[test]
    fn test_multiple_matches_on_one_line_collapse() {
        let spans = vec![MatchSpan::new(3, 0, 3, 2), MatchSpan::new(3, 5, 3, 7)];
        let drafts = ExcerptBuilder::new(0, 0)
            .build(Path::new("a.txt"), &spans, &content(5))
            .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].match_ranges(), &[LineRange::single(3)]);
        assert_eq!(drafts[0].original_text(), "line 3");
    }

    #[test]
    fn test_out_of_bounds_span_is_construction_error() {
        let err = ExcerptBuilder::new(1, 1)
            .build(Path::new("a.txt"), &[span(10)], &content(10))
            .unwrap_err();
        assert!(matches!(err, EngineError::Construction { .. }));
    }

    #[test]
    fn test_excessive_context_is_construction_error() {
        let err = ExcerptBuilder::new(MAX_CONTEXT_LINES + 1, 0)
            .build(Path::new("a.txt"), &[span(1)], &content(10))
            .unwrap_err();
        assert!(matches!(err, EngineError::Construction { .. }));
    }

    #[test]
    fn test_ids_unique_and_ordered_by_creation() {
        let ids: Vec<_> = (0..100).map(|_| ExcerptId::mint()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_finalized_excerpt_maps_lines_both_ways() {
        let draft = build(1, 1, &[5], 20).remove(0);
        let excerpt = draft.finalize(LineRange::new(10, 12));

        assert_eq!(excerpt.source_line_for(10), Some(4));
        assert_eq!(excerpt.source_line_for(11), Some(5));
        assert_eq!(excerpt.source_line_for(13), None);
        assert_eq!(excerpt.aggregate_line_for(6), Some(12));
        assert_eq!(excerpt.aggregate_line_for(7), None);
    }

    #[test]
    fn test_reissue_changes_only_id() {
        let draft = build(1, 1, &[5], 20).remove(0);
        let again = draft.reissue();
        assert_ne!(draft.id(), again.id());
        assert_eq!(draft.context_range(), again.context_range());
    }
}
