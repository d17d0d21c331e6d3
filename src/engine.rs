//! Search, replace and commit orchestration
//!
//! The engine drives the whole pipeline for one invocation:
//!
//! ```text
//! FileHost::enumerate -> Matcher::scan -> ExcerptBuilder::build
//!     -> AggregateFormatter::format -> AggregateMapping::validate
//!     -> DocumentRegistry::create
//! ```
//!
//! Files are scanned sequentially in enumeration order. A file that cannot be
//! read or cut into excerpts is skipped and reported; only query errors abort
//! the whole search. Cancellation is checked after the scan and before
//! formatting, and nothing is registered when it fires.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::aggregate::{AggregateFormatter, FileExcerpts};
use crate::error::{EngineError, Result};
use crate::excerpt::ExcerptBuilder;
use crate::host::{Cancellation, FileHost, NotText};
use crate::incremental::{DeltaResult, IncrementalIndex};
use crate::matcher::{normalize_host_matches, HostMatch, MatchBudget, Matcher};
use crate::models::{FileContent, FileScope, MatchSpan, ReplaceOptions, SearchOptions};
use crate::registry::{DocumentId, DocumentRegistry};
use crate::tracker::{ApplyReport, ChangeSet};

/// Everything needed to run one search or replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub search: SearchOptions,
    pub replace: Option<ReplaceOptions>,
    pub scope: FileScope,
}

impl SearchRequest {
    pub fn new(search: SearchOptions, scope: FileScope) -> Self {
        Self {
            search,
            replace: None,
            scope,
        }
    }

    pub fn with_replace(mut self, replace: ReplaceOptions) -> Self {
        self.replace = Some(replace);
        self
    }
}

/// A file left out of the result, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Counters for one search run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub files_scanned: usize,
    pub files_matched: usize,
    pub match_count: usize,
    pub excerpt_count: usize,
    /// The global match budget ran out before every file was scanned
    pub budget_exhausted: bool,
    pub skipped: Vec<SkippedFile>,
}

impl SearchReport {
    pub(crate) fn record_skip(&mut self, path: &Path, error: &EngineError) {
        log::warn!("Skipping {}: {}", path.display(), error);
        self.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason: error.to_string(),
        });
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} match(es) in {} of {} file(s)",
            self.match_count, self.files_matched, self.files_scanned
        );
        if self.budget_exhausted {
            summary.push_str(" (result limit reached)");
        }
        if !self.skipped.is_empty() {
            summary.push_str(&format!(", {} file(s) skipped", self.skipped.len()));
        }
        summary
    }
}

/// A registered document and how it was produced
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub document: DocumentId,
    pub report: SearchReport,
}

/// Result of diffing and committing a document
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub changes: ChangeSet,
    pub report: ApplyReport,
}

/// What scanning a single file produced
pub(crate) enum Scanned {
    Matched { file: FileExcerpts, matches: usize },
    NoMatch,
    NotText,
}

/// Read, match and cut one file into excerpt drafts
pub(crate) async fn scan_file<H>(
    host: &H,
    scope: &FileScope,
    path: &Path,
    matcher: &Matcher,
    builder: &ExcerptBuilder,
    budget: &mut MatchBudget,
) -> Result<Scanned>
where
    H: FileHost + ?Sized,
{
    let content = match host.read(path).await {
        Ok(content) => content,
        Err(e) if e.downcast_ref::<NotText>().is_some() => {
            log::debug!("Skipping {} (not UTF-8 text)", path.display());
            return Ok(Scanned::NotText);
        }
        Err(e) => {
            return Err(EngineError::Io {
                path: path.to_path_buf(),
                message: format!("{:#}", e),
            })
        }
    };

    let spans = matcher.scan(content.lines(), budget);
    build_file(scope, path, content, &spans, builder)
}

fn build_file(
    scope: &FileScope,
    path: &Path,
    content: FileContent,
    spans: &[MatchSpan],
    builder: &ExcerptBuilder,
) -> Result<Scanned> {
    if spans.is_empty() {
        return Ok(Scanned::NoMatch);
    }

    let excerpts = builder.build(path, spans, &content)?;
    Ok(Scanned::Matched {
        file: FileExcerpts {
            path: path.to_path_buf(),
            display_path: scope.display_path(path),
            content,
            excerpts,
        },
        matches: spans.len(),
    })
}

/// Drives searches against one file host
pub struct SearchEngine<H> {
    host: H,
}

impl<H: FileHost> SearchEngine<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Scan the request's scope and publish an aggregate document
    pub async fn run(
        &self,
        request: &SearchRequest,
        registry: &mut DocumentRegistry,
        cancel: &Cancellation,
    ) -> Result<SearchOutcome> {
        log::info!(
            "Searching for {:?} in {} (flags: [{}], context -{}/+{})",
            request.search.query,
            request.scope.root.display(),
            request.search.flags_label(),
            request.search.context_before,
            request.search.context_after
        );

        let matcher = Matcher::new(&request.search)?;
        let builder = ExcerptBuilder::new(request.search.context_before, request.search.context_after);

        let paths = self
            .host
            .enumerate(&request.scope)
            .await
            .map_err(|e| EngineError::Io {
                path: request.scope.root.clone(),
                message: format!("{:#}", e),
            })?;

        let mut budget = MatchBudget::new(request.search.max_results);
        let mut report = SearchReport::default();
        let mut files = Vec::new();

        for path in &paths {
            if budget.is_exhausted() {
                break;
            }
            report.files_scanned += 1;

            match scan_file(&self.host, &request.scope, path, &matcher, &builder, &mut budget).await {
                Ok(Scanned::Matched { file, matches }) => {
                    report.match_count += matches;
                    files.push(file);
                }
                Ok(Scanned::NoMatch) | Ok(Scanned::NotText) => {}
                Err(e) => report.record_skip(path, &e),
            }
        }

        if budget.is_exhausted() {
            report.budget_exhausted = true;
            log::info!(
                "Result limit of {} reached after {} of {} file(s)",
                request.search.max_results,
                report.files_scanned,
                paths.len()
            );
        }

        if cancel.is_cancelled() {
            log::info!("Search cancelled; discarding {} match(es)", report.match_count);
            return Err(EngineError::Cancelled);
        }

        self.publish(files, request, registry, report, cancel)
    }

    /// Publish a document from matches the host already located
    ///
    /// Each file's results are normalized into canonical spans, then go
    /// through the same excerpt/format/validate path as a regular search.
    pub async fn aggregate_host_matches(
        &self,
        request: &SearchRequest,
        matches: Vec<(PathBuf, Vec<HostMatch>)>,
        registry: &mut DocumentRegistry,
        cancel: &Cancellation,
    ) -> Result<SearchOutcome> {
        let builder = ExcerptBuilder::new(request.search.context_before, request.search.context_after);
        let mut budget = MatchBudget::new(request.search.max_results);
        let mut report = SearchReport::default();
        let mut files = Vec::new();

        for (path, host_matches) in matches {
            if budget.is_exhausted() {
                report.budget_exhausted = true;
                break;
            }
            report.files_scanned += 1;

            let spans = budget.admit(normalize_host_matches(host_matches));
            let content = match self.host.read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    let error = EngineError::Io {
                        path: path.clone(),
                        message: format!("{:#}", e),
                    };
                    report.record_skip(&path, &error);
                    continue;
                }
            };

            match build_file(&request.scope, &path, content, &spans, &builder) {
                Ok(Scanned::Matched { file, matches }) => {
                    report.match_count += matches;
                    files.push(file);
                }
                Ok(_) => {}
                Err(e) => report.record_skip(&path, &e),
            }
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.publish(files, request, registry, report, cancel)
    }

    /// Search through an incremental index, rescanning only changed files
    pub async fn run_incremental(
        &self,
        index: &mut IncrementalIndex,
        request: &SearchRequest,
        registry: &mut DocumentRegistry,
        cancel: &Cancellation,
    ) -> Result<(SearchOutcome, DeltaResult)> {
        let delta = index
            .query(&self.host, &request.search, &request.scope, cancel)
            .await?;

        let report = SearchReport {
            files_scanned: delta.files_scanned,
            match_count: delta.match_count,
            budget_exhausted: delta.budget_exhausted,
            skipped: delta.skipped.clone(),
            ..SearchReport::default()
        };

        let outcome = self.publish(index.current_files(), request, registry, report, cancel)?;
        Ok((outcome, delta))
    }

    /// Diff a document's current text and commit the changes
    pub async fn commit(
        &self,
        registry: &mut DocumentRegistry,
        id: DocumentId,
        current: &str,
        cancel: &Cancellation,
    ) -> Result<CommitOutcome> {
        let changes = registry.compute_changes(id, current)?;
        if changes.is_empty() {
            log::info!("No changes to apply for {}", id);
            return Ok(CommitOutcome {
                changes,
                report: ApplyReport::default(),
            });
        }

        let report = registry.apply_changes(id, &changes, &self.host, cancel).await?;
        if report.is_complete() {
            log::info!("{}", report.summary());
        } else {
            log::warn!("Partial application: {}", report.summary());
        }

        Ok(CommitOutcome { changes, report })
    }

    fn publish(
        &self,
        files: Vec<FileExcerpts>,
        request: &SearchRequest,
        registry: &mut DocumentRegistry,
        mut report: SearchReport,
        cancel: &Cancellation,
    ) -> Result<SearchOutcome> {
        cancel.check()?;

        report.files_matched = files.len();
        report.excerpt_count = files.iter().map(|f| f.excerpts.len()).sum();

        let formatted = AggregateFormatter::format(files, &request.search, request.replace.as_ref())?;

        let violations = formatted.mapping.validate();
        if !violations.is_empty() {
            log::error!("Aggregate mapping failed validation: {} violation(s)", violations.len());
            return Err(EngineError::Consistency(violations));
        }

        let document = registry.create(formatted, request.search.clone(), request.replace.clone())?;
        log::info!("{}: {}", document, report.summary());

        Ok(SearchOutcome { document, report })
    }
}
