//! Change tracking for aggregate documents
//!
//! A [`ChangeTracker`] snapshots the editable content of every match line
//! when a document is opened, diffs later versions of the document against
//! that snapshot, and commits the resulting per-line edits to the source
//! files through a [`FileHost`].
//!
//! ```text
//! Uninitialized --initialize--> Initialized --compute_changes--> Diffed
//!                                                                  |
//!                      Discarded <--discard-- (any)     apply_changes
//!                                                                  v
//!                                            Diffed <--compute-- Applied
//! ```

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use strum::Display;

use crate::aggregate::{editable_content, AggregateMapping, MappingViolation, LAYOUT_VERSION};
use crate::error::{EngineError, Result};
use crate::host::{Cancellation, FileHost};
use crate::models::LineReplacement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrackerState {
    Uninitialized,
    Initialized,
    Diffed,
    Applied,
    Discarded,
}

/// One changed match line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineEdit {
    /// 0-based line in the aggregate document
    pub aggregate_line: usize,
    /// 0-based target line in the source file
    pub source_line: usize,
    /// Baseline content (trimmed)
    pub original: String,
    /// Edited content (trimmed)
    pub updated: String,
}

/// Pending edits of one file, in aggregate order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChanges {
    pub path: PathBuf,
    pub edits: Vec<LineEdit>,
}

/// Everything that differs from the baseline, grouped by file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub files: Vec<FileChanges>,
}

impl ChangeSet {
    /// True when no match line differs from its baseline
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn edit_count(&self) -> usize {
        self.files.iter().map(|f| f.edits.len()).sum()
    }

    pub fn for_file(&self, path: &Path) -> Option<&FileChanges> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Diff-like listing of all edits, used before asking for confirmation
    pub fn preview(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            out.push_str(&format!("--- {}\n", file.path.display()));
            for edit in &file.edits {
                out.push_str(&format!("@@ line {}\n", edit.source_line + 1));
                out.push_str(&format!("- {}\n", edit.original));
                out.push_str(&format!("+ {}\n", edit.updated));
            }
        }
        out
    }
}

/// A file whose commit was aborted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of committing a change set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Files written, in commit order
    pub succeeded: Vec<PathBuf>,
    /// Files whose commit was aborted, with the reason
    pub failed: Vec<FileFailure>,
    /// Files never touched because the commit was cancelled first
    pub not_attempted: Vec<PathBuf>,
    /// Number of lines written across all succeeded files
    pub lines_changed: usize,
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty() && !self.cancelled
    }

    /// Some files were committed and some were not
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.is_complete()
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Applied {} change(s) in {} file(s)",
            self.lines_changed,
            self.succeeded.len()
        );
        if !self.failed.is_empty() {
            summary.push_str(&format!("; {} file(s) failed", self.failed.len()));
        }
        if self.cancelled {
            summary.push_str(&format!(
                "; cancelled with {} file(s) not attempted",
                self.not_attempted.len()
            ));
        }
        summary
    }
}

/// Snapshot/diff/commit state for one aggregate document
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    state: TrackerState,
    line_count: usize,
    baseline: BTreeMap<usize, String>,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::Uninitialized,
            line_count: 0,
            baseline: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Baseline content of a tracked match line
    pub fn baseline(&self, aggregate_line: usize) -> Option<&str> {
        self.baseline.get(&aggregate_line).map(String::as_str)
    }

    /// Snapshot the editable content of every match line
    pub fn initialize(&mut self, content: &str, mapping: &AggregateMapping) -> Result<()> {
        self.expect_state(&[TrackerState::Uninitialized], "initialize")?;
        check_layout(mapping)?;

        let lines: Vec<&str> = content.lines().collect();
        if lines.len() != mapping.line_count() {
            return Err(EngineError::StructuralEdit {
                expected: mapping.line_count(),
                found: lines.len(),
            });
        }

        self.baseline = mapping
            .match_lines()
            .map(|(line, _)| (line, editable_content(lines[line]).to_string()))
            .collect();
        self.line_count = lines.len();
        self.state = TrackerState::Initialized;

        log::debug!("Change tracker initialized with {} tracked line(s)", self.baseline.len());
        Ok(())
    }

    /// Diff the current document text against the baseline
    ///
    /// Only match lines are compared. Lines added to or removed from the
    /// document make the mapping meaningless, so a changed line count fails
    /// with [`EngineError::StructuralEdit`].
    pub fn compute_changes(&mut self, current: &str, mapping: &AggregateMapping) -> Result<ChangeSet> {
        self.expect_state(
            &[TrackerState::Initialized, TrackerState::Diffed, TrackerState::Applied],
            "compute changes",
        )?;
        check_layout(mapping)?;
        if mapping.line_count() != self.line_count {
            return Err(EngineError::Layout(format!(
                "mapping covers {} lines but the tracked document has {}",
                mapping.line_count(),
                self.line_count
            )));
        }

        let lines: Vec<&str> = current.lines().collect();
        if lines.len() != self.line_count {
            return Err(EngineError::StructuralEdit {
                expected: self.line_count,
                found: lines.len(),
            });
        }

        let mut changes = ChangeSet::default();
        let mut file_index: HashMap<PathBuf, usize> = HashMap::new();

        for (line, excerpt) in mapping.match_lines() {
            let updated = editable_content(lines[line]);
            let original = self.baseline.get(&line).map(String::as_str).unwrap_or("");
            if updated == original {
                continue;
            }

            let source_line = excerpt.source_line_for(line).ok_or_else(|| {
                EngineError::Consistency(vec![MappingViolation::LineOutsideExcerpt {
                    line,
                    id: excerpt.id().clone(),
                }])
            })?;

            let idx = *file_index
                .entry(excerpt.file().to_path_buf())
                .or_insert_with(|| {
                    changes.files.push(FileChanges {
                        path: excerpt.file().to_path_buf(),
                        edits: Vec::new(),
                    });
                    changes.files.len() - 1
                });
            changes.files[idx].edits.push(LineEdit {
                aggregate_line: line,
                source_line,
                original: original.to_string(),
                updated: updated.to_string(),
            });
        }

        self.state = TrackerState::Diffed;
        log::debug!(
            "Computed {} change(s) across {} file(s)",
            changes.edit_count(),
            changes.file_count()
        );
        Ok(changes)
    }

    /// Commit a change set file by file
    ///
    /// Each file is read fresh, every target line keeps the indentation it
    /// currently has on disk, and all of the file's lines are written as one
    /// edit set. A failing file is recorded and skipped. Cancellation stops
    /// before the next file; files already written stay written.
    pub async fn apply_changes<H>(
        &mut self,
        changes: &ChangeSet,
        host: &H,
        cancel: &Cancellation,
    ) -> Result<ApplyReport>
    where
        H: FileHost + ?Sized,
    {
        self.expect_state(&[TrackerState::Diffed], "apply changes")?;

        let mut report = ApplyReport::default();
        let stopped = self.commit_files(changes, host, cancel, &mut report).await;

        if stopped {
            report.cancelled = true;
            report.not_attempted = changes
                .files
                .iter()
                .map(|f| &f.path)
                .filter(|p| {
                    !report.succeeded.contains(*p) && !report.failed.iter().any(|f| &f.path == *p)
                })
                .cloned()
                .collect();
            log::info!(
                "Apply cancelled after {} file(s); {} file(s) not attempted",
                report.succeeded.len(),
                report.not_attempted.len()
            );
        }

        self.state = TrackerState::Applied;
        Ok(report)
    }

    /// Commit files in order; returns true when cancellation stopped the loop
    ///
    /// A file whose commit has started always runs to completion, so a file
    /// on disk is never reported as not attempted.
    async fn commit_files<H>(
        &mut self,
        changes: &ChangeSet,
        host: &H,
        cancel: &Cancellation,
        report: &mut ApplyReport,
    ) -> bool
    where
        H: FileHost + ?Sized,
    {
        for file in &changes.files {
            if cancel.is_cancelled() {
                return true;
            }

            match commit_file(file, host).await {
                Ok(()) => {
                    log::debug!("Applied {} change(s) to {}", file.edits.len(), file.path.display());
                    // Committed lines become the new baseline
                    for edit in &file.edits {
                        self.baseline.insert(edit.aggregate_line, edit.updated.clone());
                    }
                    report.lines_changed += file.edits.len();
                    report.succeeded.push(file.path.clone());
                }
                Err(e) => {
                    log::error!("Failed to apply changes to {}: {:#}", file.path.display(), e);
                    report.failed.push(FileFailure {
                        path: file.path.clone(),
                        message: format!("{:#}", e),
                    });
                }
            }
        }
        false
    }

    /// Drop the snapshot; the tracker cannot be used afterwards
    pub fn discard(&mut self) {
        self.baseline.clear();
        self.state = TrackerState::Discarded;
    }

    fn expect_state(&self, allowed: &[TrackerState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }
}

fn check_layout(mapping: &AggregateMapping) -> Result<()> {
    if mapping.layout_version() != LAYOUT_VERSION {
        return Err(EngineError::Layout(format!(
            "document uses layout version {}, expected {}",
            mapping.layout_version(),
            LAYOUT_VERSION
        )));
    }
    Ok(())
}

async fn commit_file<H>(file: &FileChanges, host: &H) -> anyhow::Result<()>
where
    H: FileHost + ?Sized,
{
    let content = host.read(&file.path).await?;

    let mut replacements = Vec::with_capacity(file.edits.len());
    for edit in &file.edits {
        let current = content.line(edit.source_line).ok_or_else(|| {
            anyhow::anyhow!(
                "line {} no longer exists ({} lines on disk)",
                edit.source_line + 1,
                content.line_count()
            )
        })?;
        replacements.push(LineReplacement {
            line: edit.source_line,
            text: with_indentation(current, &edit.updated),
        });
    }

    host.write(&file.path, &replacements).await
}

/// Re-attach the leading whitespace of `current` to trimmed `content`
fn with_indentation(current: &str, content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let indent_len = current.len() - current.trim_start().len();
    format!("{}{}", &current[..indent_len], content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateFormatter, FileExcerpts, FormattedAggregate};
    use crate::excerpt::ExcerptBuilder;
    use crate::host::MemoryFileHost;
    use crate::matcher::{MatchBudget, Matcher};
    use crate::models::{FileContent, ReplaceOptions, SearchOptions};
    use async_trait::async_trait;

    fn format(
        host: &MemoryFileHost,
        paths: &[&str],
        search: &SearchOptions,
        replace: Option<&ReplaceOptions>,
    ) -> FormattedAggregate {
        let matcher = Matcher::new(search).unwrap();
        let builder = ExcerptBuilder::new(search.context_before, search.context_after);
        let files = paths
            .iter()
            .map(|p| {
                let content = FileContent::parse(&host.text(Path::new(p)).unwrap());
                let spans = matcher.scan(content.lines(), &mut MatchBudget::unlimited());
                let excerpts = builder.build(Path::new(p), &spans, &content).unwrap();
                FileExcerpts {
                    path: PathBuf::from(p),
                    display_path: p.to_string(),
                    content,
                    excerpts,
                }
            })
            .collect();
        AggregateFormatter::format(files, search, replace).unwrap()
    }

    /// Replace the editable part of one aggregate line
    fn edit_line(content: &str, line: usize, text: &str) -> String {
        content
            .lines()
            .enumerate()
            .map(|(i, l)| {
                if i == line {
                    format!("{}{}", &l[..crate::aggregate::CONTENT_OFFSET], text)
                } else {
                    l.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n"
    }

    fn search(query: &str) -> SearchOptions {
        let mut options = SearchOptions::new(query);
        options.context_before = 1;
        options.context_after = 1;
        options
    }

    #[test]
    fn test_unedited_document_has_no_changes() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "fn foo() {}\nlet x = foo();\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();
        let changes = tracker
            .compute_changes(&formatted.content, &formatted.mapping)
            .unwrap();

        assert!(changes.is_empty());
        assert_eq!(tracker.state(), TrackerState::Diffed);
    }

    #[test]
    fn test_edits_map_back_to_source_lines() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "a\nb\nfoo\nc\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();

        let match_line = formatted.mapping.match_lines().next().unwrap().0;
        let edited = edit_line(&formatted.content, match_line, "  bar  ");
        let changes = tracker.compute_changes(&edited, &formatted.mapping).unwrap();

        assert_eq!(changes.file_count(), 1);
        let edit = &changes.files[0].edits[0];
        assert_eq!(edit.source_line, 2);
        assert_eq!(edit.original, "foo");
        assert_eq!(edit.updated, "bar");
    }

    #[test]
    fn test_context_line_edits_are_ignored() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "a\nfoo\nc\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();

        // Line 4 is the context line "a"
        let edited = edit_line(&formatted.content, 4, "changed");
        let changes = tracker.compute_changes(&edited, &formatted.mapping).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_structural_edit_is_rejected() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "foo\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();

        let edited = format!("extra line\n{}", formatted.content);
        let err = tracker.compute_changes(&edited, &formatted.mapping).unwrap_err();
        assert!(matches!(err, EngineError::StructuralEdit { .. }));
    }

    #[test]
    fn test_state_machine_rejects_out_of_order_calls() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "foo\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        let err = tracker
            .compute_changes(&formatted.content, &formatted.mapping)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState { state: TrackerState::Uninitialized, .. }
        ));

        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();
        assert!(tracker.initialize(&formatted.content, &formatted.mapping).is_err());

        tracker.discard();
        assert_eq!(tracker.state(), TrackerState::Discarded);
        assert!(tracker
            .compute_changes(&formatted.content, &formatted.mapping)
            .is_err());
    }

    #[tokio::test]
    async fn test_apply_preserves_disk_indentation_and_is_idempotent() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "fn main() {\n    let foo = 1;\n}\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();

        let match_line = formatted.mapping.match_lines().next().unwrap().0;
        let edited = edit_line(&formatted.content, match_line, "let bar = 1;");
        let changes = tracker.compute_changes(&edited, &formatted.mapping).unwrap();

        let report = tracker
            .apply_changes(&changes, &host, &Cancellation::new())
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.lines_changed, 1);
        assert_eq!(
            host.text(Path::new("a.rs")).unwrap(),
            "fn main() {\n    let bar = 1;\n}\n"
        );

        let again = tracker.compute_changes(&edited, &formatted.mapping).unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_replace_baseline_commits_substitution() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "x\n  Foo and foo\ny\n");
        let replace = ReplaceOptions::new("bar");
        let formatted = format(&host, &["a.rs"], &search("foo"), Some(&replace));

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.baseline, &formatted.mapping).unwrap();
        let changes = tracker
            .compute_changes(&formatted.content, &formatted.mapping)
            .unwrap();
        assert_eq!(changes.edit_count(), 1);
        assert_eq!(changes.files[0].edits[0].updated, "bar and bar");

        tracker
            .apply_changes(&changes, &host, &Cancellation::new())
            .await
            .unwrap();
        assert_eq!(host.text(Path::new("a.rs")).unwrap(), "x\n  bar and bar\ny\n");
    }

    /// Host that refuses to write one path
    struct FailingHost {
        inner: MemoryFileHost,
        broken: PathBuf,
    }

    #[async_trait]
    impl FileHost for FailingHost {
        async fn enumerate(&self, scope: &crate::models::FileScope) -> anyhow::Result<Vec<PathBuf>> {
            self.inner.enumerate(scope).await
        }

        async fn read(&self, path: &Path) -> anyhow::Result<FileContent> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &Path, replacements: &[LineReplacement]) -> anyhow::Result<()> {
            if path == self.broken {
                anyhow::bail!("disk full");
            }
            self.inner.write(path, replacements).await
        }
    }

    #[tokio::test]
    async fn test_partial_failure_reports_each_file() {
        let inner = MemoryFileHost::new();
        inner.insert("a.rs", "foo\n");
        inner.insert("b.rs", "foo\n");
        let formatted = format(&inner, &["a.rs", "b.rs"], &search("foo"), None);
        let host = FailingHost {
            inner,
            broken: PathBuf::from("b.rs"),
        };

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();
        let mut edited = formatted.content.clone();
        for (line, _) in formatted.mapping.match_lines() {
            edited = edit_line(&edited, line, "bar");
        }
        let changes = tracker.compute_changes(&edited, &formatted.mapping).unwrap();

        let report = tracker
            .apply_changes(&changes, &host, &Cancellation::new())
            .await
            .unwrap();
        assert!(report.is_partial());
        assert_eq!(report.succeeded, vec![PathBuf::from("a.rs")]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].message.contains("disk full"));
        assert_eq!(host.inner.text(Path::new("a.rs")).unwrap(), "bar\n");
        assert_eq!(host.inner.text(Path::new("b.rs")).unwrap(), "foo\n");

        // The failed file is still pending, the committed one is not
        let remaining = tracker.compute_changes(&edited, &formatted.mapping).unwrap();
        assert_eq!(remaining.file_count(), 1);
        assert_eq!(remaining.files[0].path, PathBuf::from("b.rs"));
    }

    #[tokio::test]
    async fn test_cancelled_apply_touches_nothing() {
        let host = MemoryFileHost::new();
        host.insert("a.rs", "foo\n");
        let formatted = format(&host, &["a.rs"], &search("foo"), None);

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();
        let match_line = formatted.mapping.match_lines().next().unwrap().0;
        let edited = edit_line(&formatted.content, match_line, "bar");
        let changes = tracker.compute_changes(&edited, &formatted.mapping).unwrap();

        let cancel = Cancellation::new();
        cancel.cancel();
        let report = tracker.apply_changes(&changes, &host, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.not_attempted, vec![PathBuf::from("a.rs")]);
        assert_eq!(host.text(Path::new("a.rs")).unwrap(), "foo\n");
    }

    /// Host whose writes land on disk, then take a while to return
    struct SlowHost {
        inner: MemoryFileHost,
    }

    #[async_trait]
    impl FileHost for SlowHost {
        async fn enumerate(&self, scope: &crate::models::FileScope) -> anyhow::Result<Vec<PathBuf>> {
            self.inner.enumerate(scope).await
        }

        async fn read(&self, path: &Path) -> anyhow::Result<FileContent> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &Path, replacements: &[LineReplacement]) -> anyhow::Result<()> {
            self.inner.write(path, replacements).await?;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_write_finishes_that_file() {
        let inner = MemoryFileHost::new();
        inner.insert("a.rs", "foo\n");
        inner.insert("b.rs", "foo\n");
        let formatted = format(&inner, &["a.rs", "b.rs"], &search("foo"), None);
        let host = SlowHost { inner };

        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.content, &formatted.mapping).unwrap();
        let mut edited = formatted.content.clone();
        for (line, _) in formatted.mapping.match_lines() {
            edited = edit_line(&edited, line, "bar");
        }
        let changes = tracker.compute_changes(&edited, &formatted.mapping).unwrap();

        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let report = tracker.apply_changes(&changes, &host, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.succeeded, vec![PathBuf::from("a.rs")]);
        assert_eq!(report.not_attempted, vec![PathBuf::from("b.rs")]);
        assert_eq!(host.inner.text(Path::new("a.rs")).unwrap(), "bar\n");
        assert_eq!(host.inner.text(Path::new("b.rs")).unwrap(), "foo\n");

        // Only the untouched file is still pending
        let remaining = tracker.compute_changes(&edited, &formatted.mapping).unwrap();
        assert_eq!(remaining.file_count(), 1);
        assert_eq!(remaining.files[0].path, PathBuf::from("b.rs"));
    }

    #[test]
    fn test_preview_and_summary() {
        let changes = ChangeSet {
            files: vec![FileChanges {
                path: PathBuf::from("a.rs"),
                edits: vec![LineEdit {
                    aggregate_line: 5,
                    source_line: 9,
                    original: "foo".to_string(),
                    updated: "bar".to_string(),
                }],
            }],
        };
        assert_eq!(changes.preview(), "--- a.rs\n@@ line 10\n- foo\n+ bar\n");

        let report = ApplyReport {
            succeeded: vec![PathBuf::from("a.rs")],
            lines_changed: 1,
            ..ApplyReport::default()
        };
        assert_eq!(report.summary(), "Applied 1 change(s) in 1 file(s)");
    }

    #[test]
    fn test_with_indentation() {
        assert_eq!(with_indentation("\t  old", "new"), "\t  new");
        assert_eq!(with_indentation("old", "new"), "new");
        assert_eq!(with_indentation("    old", ""), "");
    }
}
