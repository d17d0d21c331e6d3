//! Incremental search results
//!
//! [`IncrementalIndex`] keeps the excerpts of every matching file from the
//! previous query. File-change notifications only mark files as pending; the
//! next query with the same options rescans just those files and reports how
//! the result set moved as a list of [`FileDelta`]s.
//!
//! A query with different options, a different scope, or after the previous
//! query ran out of match budget falls back to a full rescan.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use strum::Display;

use crate::aggregate::FileExcerpts;
use crate::engine::{scan_file, Scanned, SearchReport, SkippedFile};
use crate::error::{EngineError, Result};
use crate::excerpt::ExcerptBuilder;
use crate::host::{Cancellation, FileHost, PathFilter};
use crate::matcher::{MatchBudget, Matcher};
use crate::models::{FileScope, SearchOptions};
use crate::watcher::{ChangeKind, FileChange};

/// How one file's results changed since the previous query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileDelta {
    Added,
    Modified,
    Removed,
    Unchanged,
}

/// Outcome of one incremental query
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeltaResult {
    /// Per-file deltas; unchanged files are listed too
    pub deltas: Vec<(PathBuf, FileDelta)>,
    /// Whether every file in scope was rescanned
    pub full_rescan: bool,
    pub files_scanned: usize,
    /// Matches across the whole current result set
    pub match_count: usize,
    pub budget_exhausted: bool,
    pub skipped: Vec<SkippedFile>,
}

impl DeltaResult {
    pub fn count(&self, delta: FileDelta) -> usize {
        self.deltas.iter().filter(|(_, d)| *d == delta).count()
    }

    /// Files that were added, modified or removed
    pub fn changed(&self) -> impl Iterator<Item = (&Path, FileDelta)> + '_ {
        self.deltas
            .iter()
            .filter(|(_, d)| *d != FileDelta::Unchanged)
            .map(|(p, d)| (p.as_path(), *d))
    }

    pub fn has_changes(&self) -> bool {
        self.changed().next().is_some()
    }
}

#[derive(Debug, Clone)]
struct CachedFile {
    /// blake3 hex digest of the excerpt set
    hash: String,
    matches: usize,
    excerpts: FileExcerpts,
}

/// Per-file excerpt cache for repeated queries with the same options
#[derive(Debug, Default)]
pub struct IncrementalIndex {
    key: Option<(SearchOptions, FileScope)>,
    files: BTreeMap<PathBuf, CachedFile>,
    /// Enumeration order of matching files
    order: Vec<PathBuf>,
    pending: BTreeSet<PathBuf>,
    deleted: BTreeSet<PathBuf>,
    complete: bool,
}

impl IncrementalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a file for rescanning on the next query
    pub fn notify_changed(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.deleted.remove(&path);
        self.pending.insert(path);
    }

    /// Drop a file from the results on the next query
    pub fn notify_deleted(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.pending.remove(&path);
        self.deleted.insert(path);
    }

    /// Feed a batch of debounced watcher events
    pub fn apply(&mut self, changes: &[FileChange]) {
        for change in changes {
            match change.kind {
                ChangeKind::Created | ChangeKind::Modified => self.notify_changed(&change.path),
                ChangeKind::Removed => self.notify_deleted(&change.path),
            }
        }
    }

    /// Forget everything; the next query rescans every file
    pub fn invalidate(&mut self) {
        log::debug!("Invalidating incremental cache ({} file(s))", self.files.len());
        *self = Self::default();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.deleted.len()
    }

    pub fn cached_files(&self) -> usize {
        self.files.len()
    }

    /// Current result set in enumeration order, ready to be formatted
    ///
    /// Excerpt drafts are reissued with fresh ids so that every published
    /// document gets its own identities.
    pub fn current_files(&self) -> Vec<FileExcerpts> {
        self.order
            .iter()
            .filter_map(|path| self.files.get(path))
            .map(|cached| FileExcerpts {
                excerpts: cached.excerpts.excerpts.iter().map(|d| d.reissue()).collect(),
                ..cached.excerpts.clone()
            })
            .collect()
    }

    /// Bring the cache up to date and report what moved
    pub async fn query<H>(
        &mut self,
        host: &H,
        search: &SearchOptions,
        scope: &FileScope,
        cancel: &Cancellation,
    ) -> Result<DeltaResult>
    where
        H: FileHost + ?Sized,
    {
        let matcher = Matcher::new(search)?;
        let builder = ExcerptBuilder::new(search.context_before, search.context_after);

        let same_key = self
            .key
            .as_ref()
            .is_some_and(|(s, sc)| s == search && sc == scope);

        let result = if same_key && self.complete {
            self.refresh(host, scope, &matcher, &builder, search.max_results, cancel)
                .await?
        } else {
            if self.key.is_some() {
                log::debug!("Query options changed or cache incomplete; full rescan");
            }
            self.rescan(host, search, scope, &matcher, &builder, cancel).await?
        };

        log::debug!(
            "Incremental query: {} added, {} modified, {} removed, {} unchanged",
            result.count(FileDelta::Added),
            result.count(FileDelta::Modified),
            result.count(FileDelta::Removed),
            result.count(FileDelta::Unchanged)
        );
        Ok(result)
    }

    async fn rescan<H>(
        &mut self,
        host: &H,
        search: &SearchOptions,
        scope: &FileScope,
        matcher: &Matcher,
        builder: &ExcerptBuilder,
        cancel: &Cancellation,
    ) -> Result<DeltaResult>
    where
        H: FileHost + ?Sized,
    {
        let paths = host.enumerate(scope).await.map_err(|e| EngineError::Io {
            path: scope.root.clone(),
            message: format!("{:#}", e),
        })?;

        let mut budget = MatchBudget::new(search.max_results);
        let mut report = SearchReport::default();
        let mut fresh = BTreeMap::new();
        let mut order = Vec::new();

        for path in &paths {
            if budget.is_exhausted() {
                break;
            }
            report.files_scanned += 1;

            match scan_file(host, scope, path, matcher, builder, &mut budget).await {
                Ok(Scanned::Matched { file, matches }) => {
                    let cached = CachedFile {
                        hash: hash_excerpts(&file),
                        matches,
                        excerpts: file,
                    };
                    order.push(path.clone());
                    fresh.insert(path.clone(), cached);
                }
                Ok(Scanned::NoMatch) | Ok(Scanned::NotText) => {}
                Err(e) => report.record_skip(path, &e),
            }
        }

        // Abandon the scan without touching the cache
        cancel.check()?;

        let mut deltas = Vec::new();
        for path in &order {
            let delta = match self.files.get(path) {
                None => FileDelta::Added,
                Some(old) if old.hash != fresh[path].hash => FileDelta::Modified,
                Some(_) => FileDelta::Unchanged,
            };
            deltas.push((path.clone(), delta));
        }
        for path in self.files.keys() {
            if !fresh.contains_key(path) {
                deltas.push((path.clone(), FileDelta::Removed));
            }
        }

        let budget_exhausted = budget.is_exhausted();
        if budget_exhausted {
            log::info!("Result limit reached; incremental cache marked incomplete");
        }

        self.key = Some((search.clone(), scope.clone()));
        self.files = fresh;
        self.order = order;
        self.pending.clear();
        self.deleted.clear();
        self.complete = !budget_exhausted;

        Ok(DeltaResult {
            deltas,
            full_rescan: true,
            files_scanned: report.files_scanned,
            match_count: self.match_count(),
            budget_exhausted,
            skipped: report.skipped,
        })
    }

    async fn refresh<H>(
        &mut self,
        host: &H,
        scope: &FileScope,
        matcher: &Matcher,
        builder: &ExcerptBuilder,
        max_results: usize,
        cancel: &Cancellation,
    ) -> Result<DeltaResult>
    where
        H: FileHost + ?Sized,
    {
        // Bad globs fail the whole query, not each path
        PathFilter::from_scope(scope).map_err(|e| EngineError::Io {
            path: scope.root.clone(),
            message: format!("{:#}", e),
        })?;

        let pending = std::mem::take(&mut self.pending);
        let deleted = std::mem::take(&mut self.deleted);

        // Budget left after the files that are served from cache
        let untouched: usize = self
            .files
            .iter()
            .filter(|(p, _)| !pending.contains(*p) && !deleted.contains(*p))
            .map(|(_, c)| c.matches)
            .sum();
        let mut budget = match max_results {
            0 => MatchBudget::unlimited(),
            // A complete cache always holds fewer matches than the limit
            max => MatchBudget::new(max.saturating_sub(untouched).max(1)),
        };

        let mut report = SearchReport::default();
        let mut updates: Vec<(PathBuf, Option<CachedFile>)> = Vec::new();

        for path in &deleted {
            updates.push((path.clone(), None));
        }

        for path in &pending {
            // Paths a full enumeration would not list drop out of the results
            match host.is_searchable(scope, path).await {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("{} is outside the search scope", path.display());
                    updates.push((path.clone(), None));
                    continue;
                }
                Err(e) => {
                    let error = EngineError::Io {
                        path: path.clone(),
                        message: format!("{:#}", e),
                    };
                    report.record_skip(path, &error);
                    updates.push((path.clone(), None));
                    continue;
                }
            }

            report.files_scanned += 1;
            match scan_file(host, scope, path, matcher, builder, &mut budget).await {
                Ok(Scanned::Matched { file, matches }) => updates.push((
                    path.clone(),
                    Some(CachedFile {
                        hash: hash_excerpts(&file),
                        matches,
                        excerpts: file,
                    }),
                )),
                Ok(Scanned::NoMatch) | Ok(Scanned::NotText) => updates.push((path.clone(), None)),
                Err(e) => {
                    report.record_skip(path, &e);
                    // An unreadable file drops out of the results
                    updates.push((path.clone(), None));
                }
            }
        }

        if let Err(e) = cancel.check() {
            // Keep the notifications for the next attempt
            self.pending.extend(pending);
            self.deleted.extend(deleted);
            return Err(e);
        }

        let budget_exhausted = budget.is_exhausted();
        if budget_exhausted {
            self.complete = false;
        }

        let mut changed: BTreeMap<PathBuf, FileDelta> = BTreeMap::new();
        for (path, update) in updates {
            let previous = self.files.remove(&path);
            let delta = match (previous, update) {
                (None, None) => continue,
                (Some(_), None) => FileDelta::Removed,
                (None, Some(new)) => {
                    self.files.insert(path.clone(), new);
                    FileDelta::Added
                }
                (Some(old), Some(new)) => {
                    let delta = if old.hash == new.hash {
                        FileDelta::Unchanged
                    } else {
                        FileDelta::Modified
                    };
                    self.files.insert(path.clone(), new);
                    delta
                }
            };
            changed.insert(path, delta);
        }

        self.reorder(&changed);

        let mut deltas: Vec<(PathBuf, FileDelta)> = self
            .order
            .iter()
            .map(|p| (p.clone(), changed.get(p).copied().unwrap_or(FileDelta::Unchanged)))
            .collect();
        deltas.extend(
            changed
                .iter()
                .filter(|(_, d)| **d == FileDelta::Removed)
                .map(|(p, d)| (p.clone(), *d)),
        );

        Ok(DeltaResult {
            deltas,
            full_rescan: false,
            files_scanned: report.files_scanned,
            match_count: self.match_count(),
            budget_exhausted,
            skipped: report.skipped,
        })
    }

    /// Keep `order` in sync with `files`; new files slot in by path order
    fn reorder(&mut self, changed: &BTreeMap<PathBuf, FileDelta>) {
        self.order.retain(|p| changed.get(p) != Some(&FileDelta::Removed));
        for (path, delta) in changed {
            if *delta == FileDelta::Added {
                let at = self.order.partition_point(|p| p < path);
                self.order.insert(at, path.clone());
            }
        }
    }

    fn match_count(&self) -> usize {
        self.files.values().map(|c| c.matches).sum()
    }
}

/// Content hash of a file's excerpt set: shown ranges plus their text
fn hash_excerpts(file: &FileExcerpts) -> String {
    let mut hasher = blake3::Hasher::new();
    for draft in &file.excerpts {
        let range = draft.context_range();
        hasher.update(format!("{}:{}\n", range.start, range.end).as_bytes());
        for matched in draft.match_ranges() {
            hasher.update(format!("m{}:{}\n", matched.start, matched.end).as_bytes());
        }
        for line in range.start..=range.end {
            hasher.update(file.content.line(line).unwrap_or("").as_bytes());
            hasher.update(b"\n");
        }
    }
    hasher.finalize().to_hex().to_string()
}
