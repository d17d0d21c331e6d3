//! Host environment collaborators
//!
//! The engine never touches the filesystem directly. File enumeration,
//! reading and writing go through a [`FileHost`], so the same pipeline can
//! run against the local disk ([`LocalFileHost`]) or an editor's in-memory
//! buffers ([`MemoryFileHost`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{Match, WalkBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::error::EngineError;
use crate::models::{FileContent, FileScope, LineReplacement};

/// File access provided by the host environment
#[async_trait]
pub trait FileHost: Send + Sync {
    /// List the files of a scope, in the order they should be searched
    async fn enumerate(&self, scope: &FileScope) -> Result<Vec<PathBuf>>;

    /// Read a file as line-addressable text
    async fn read(&self, path: &Path) -> Result<FileContent>;

    /// Replace whole lines of a file as one edit set and persist it
    async fn write(&self, path: &Path, replacements: &[LineReplacement]) -> Result<()>;

    /// Whether `path` is a file that `enumerate` would list for `scope`
    ///
    /// Used to vet single paths reported by a watcher without walking the
    /// whole scope again. The default only applies the scope root and globs.
    async fn is_searchable(&self, scope: &FileScope, path: &Path) -> Result<bool> {
        let filter = PathFilter::from_scope(scope)?;
        Ok(under_root(scope, path) && filter.matches(relative_to(&scope.root, path)))
    }
}

/// Raised by hosts for files that are not UTF-8 text
#[derive(thiserror::Error, Debug)]
#[error("{} is not UTF-8 text", .0.display())]
pub struct NotText(pub PathBuf);

/// Include/exclude glob filter over scope-relative paths
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include).context("Invalid include pattern")?,
            exclude: build_globset(exclude).context("Invalid exclude pattern")?,
        })
    }

    pub fn from_scope(scope: &FileScope) -> Result<Self> {
        Self::new(&scope.include, &scope.exclude)
    }

    /// Whether a path relative to the scope root passes the filter
    pub fn matches(&self, relative: &Path) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(relative) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(relative),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Bad glob: {}", pattern))?);
    }
    Ok(Some(builder.build()?))
}

/// Path relative to the scope root; a root that is itself a file maps to its name
fn relative_to<'a>(root: &Path, path: &'a Path) -> &'a Path {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel,
        _ => path.file_name().map(Path::new).unwrap_or(path),
    }
}

/// Host backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileHost;

impl LocalFileHost {
    pub fn new() -> Self {
        Self
    }

    fn walk(scope: &FileScope) -> Result<Vec<PathBuf>> {
        let filter = PathFilter::from_scope(scope)?;
        let mut files = Vec::new();

        let walker = WalkBuilder::new(&scope.root)
            .follow_links(scope.follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            if !filter.matches(relative_to(&scope.root, path)) {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                if metadata.len() > scope.max_file_size {
                    log::debug!("Skipping {} (too large: {} bytes)", path.display(), metadata.len());
                    continue;
                }
            }

            files.push(path.to_path_buf());
        }

        log::debug!("Enumerated {} file(s) under {}", files.len(), scope.root.display());
        Ok(files)
    }

    /// Apply the rules of `walk` to one path
    fn searchable(scope: &FileScope, path: &Path) -> Result<bool> {
        if !path.starts_with(&scope.root) {
            return Ok(false);
        }
        let relative = relative_to(&scope.root, path);
        if !PathFilter::from_scope(scope)?.matches(relative) {
            return Ok(false);
        }

        // Hidden files and directories are skipped by the walker
        let hidden = path
            .strip_prefix(&scope.root)
            .map(|rel| {
                rel.components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            })
            .unwrap_or(false);
        if hidden {
            return Ok(false);
        }

        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return Ok(false),
        };
        let metadata = if metadata.file_type().is_symlink() {
            if !scope.follow_symlinks {
                return Ok(false);
            }
            match std::fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(_) => return Ok(false),
            }
        } else {
            metadata
        };
        if !metadata.is_file() || metadata.len() > scope.max_file_size {
            return Ok(false);
        }

        Ok(!is_ignored(&scope.root, path))
    }
}

/// Check `.ignore` (and `.gitignore` inside a git repository) files from the
/// file's directory up to `root`; the deepest file with an opinion wins.
fn is_ignored(root: &Path, path: &Path) -> bool {
    let in_git = path.ancestors().any(|dir| dir.join(".git").exists());

    for dir in path.ancestors().skip(1) {
        if !dir.starts_with(root) {
            break;
        }
        let Some(rules) = ignore_rules(dir, in_git) else {
            continue;
        };
        match rules.matched_path_or_any_parents(path, false) {
            Match::Ignore(_) => return true,
            Match::Whitelist(_) => return false,
            Match::None => {}
        }
    }
    false
}

fn ignore_rules(dir: &Path, in_git: bool) -> Option<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);
    let mut found = false;

    // Later files take precedence, and `.ignore` overrides `.gitignore`
    let names: &[&str] = if in_git { &[".gitignore", ".ignore"] } else { &[".ignore"] };
    for name in names {
        let file = dir.join(name);
        if file.is_file() {
            if let Some(e) = builder.add(&file) {
                log::warn!("Failed to parse {}: {}", file.display(), e);
            }
            found = true;
        }
    }

    if !found {
        return None;
    }
    match builder.build() {
        Ok(rules) => Some(rules),
        Err(e) => {
            log::warn!("Failed to load ignore rules in {}: {}", dir.display(), e);
            None
        }
    }
}

#[async_trait]
impl FileHost for LocalFileHost {
    async fn enumerate(&self, scope: &FileScope) -> Result<Vec<PathBuf>> {
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || Self::walk(&scope))
            .await
            .context("File enumeration task failed")?
    }

    async fn read(&self, path: &Path) -> Result<FileContent> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let text = String::from_utf8(bytes).map_err(|_| NotText(path.to_path_buf()))?;
        Ok(FileContent::parse(&text))
    }

    /// Applies the replacements to a fresh read of the file, writes the
    /// result next to it and renames it over the original.
    async fn write(&self, path: &Path, replacements: &[LineReplacement]) -> Result<()> {
        let mut content = self.read(path).await?;
        content.replace_lines(replacements).map_err(|line| {
            anyhow::anyhow!(
                "line {} is outside {} ({} lines)",
                line + 1,
                path.display(),
                content.line_count()
            )
        })?;

        let tmp = temp_sibling(path);
        tokio::fs::write(&tmp, content.to_text())
            .await
            .with_context(|| format!("Failed to write temporary file: {}", tmp.display()))?;

        if let Ok(metadata) = tokio::fs::metadata(path).await {
            if let Err(e) = tokio::fs::set_permissions(&tmp, metadata.permissions()).await {
                log::warn!("Failed to copy permissions of {}: {}", path.display(), e);
            }
        }

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to save file: {}", path.display()));
        }

        Ok(())
    }

    async fn is_searchable(&self, scope: &FileScope, path: &Path) -> Result<bool> {
        let scope = scope.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::searchable(&scope, &path))
            .await
            .context("Path check task failed")?
    }
}

fn under_root(scope: &FileScope, path: &Path) -> bool {
    scope.root.as_os_str().is_empty() || scope.root == Path::new(".") || path.starts_with(&scope.root)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.medit-{}.tmp", name, std::process::id()))
}

/// Host over an in-memory map of path to text
#[derive(Debug, Default)]
pub struct MemoryFileHost {
    files: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemoryFileHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, String>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files().insert(path.into(), text.into());
    }

    pub fn remove(&self, path: &Path) -> Option<String> {
        self.files().remove(path)
    }

    pub fn text(&self, path: &Path) -> Option<String> {
        self.files().get(path).cloned()
    }

    fn listed(scope: &FileScope, filter: &PathFilter, path: &Path, text: &str) -> bool {
        under_root(scope, path)
            && filter.matches(relative_to(&scope.root, path))
            && text.len() as u64 <= scope.max_file_size
    }
}

#[async_trait]
impl FileHost for MemoryFileHost {
    async fn enumerate(&self, scope: &FileScope) -> Result<Vec<PathBuf>> {
        let filter = PathFilter::from_scope(scope)?;

        Ok(self
            .files()
            .iter()
            .filter(|(path, text)| Self::listed(scope, &filter, path, text))
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn is_searchable(&self, scope: &FileScope, path: &Path) -> Result<bool> {
        let filter = PathFilter::from_scope(scope)?;
        Ok(self
            .files()
            .get(path)
            .is_some_and(|text| Self::listed(scope, &filter, path, text)))
    }

    async fn read(&self, path: &Path) -> Result<FileContent> {
        self.text(path)
            .map(|text| FileContent::parse(&text))
            .with_context(|| format!("No such file: {}", path.display()))
    }

    async fn write(&self, path: &Path, replacements: &[LineReplacement]) -> Result<()> {
        let mut files = self.files();
        let text = files
            .get_mut(path)
            .with_context(|| format!("No such file: {}", path.display()))?;

        let mut content = FileContent::parse(text);
        content
            .replace_lines(replacements)
            .map_err(|line| anyhow::anyhow!("line {} is outside {}", line + 1, path.display()))?;
        *text = content.to_text();
        Ok(())
    }
}

/// Cooperative cancellation signal shared between a caller and an operation
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Withdraw a cancellation request so the token can be used again
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
    }

    /// Fail with [`EngineError::Cancelled`] once cancellation was requested
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
