//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::engine::{SearchEngine, SearchRequest};
use crate::excerpt::Excerpt;
use crate::host::{Cancellation, LocalFileHost, PathFilter};
use crate::incremental::IncrementalIndex;
use crate::models::ReplaceOptions;
use crate::output;
use crate::registry::{DocumentId, DocumentRegistry};
use crate::watcher::{self, WatchConfig};

/// medit: search many files, edit the matches as one document
#[derive(Parser, Debug)]
#[command(
    name = "medit",
    version,
    about = "Search across files and edit every match in one document",
    long_about = "medit collects every match of a query, with surrounding context, into a \
                  single aggregate document. Edit the match lines of that document and \
                  medit writes each change back to the line it came from."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Matching and scope flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct MatchArgs {
    /// Treat the query as a regular expression
    #[arg(short = 'r', long)]
    pub regex: bool,

    /// Match case exactly
    #[arg(short = 's', long)]
    pub case_sensitive: bool,

    /// Only match whole words
    #[arg(short = 'w', long)]
    pub word: bool,

    /// Lines of context after each match
    #[arg(short = 'A', long, value_name = "NUM")]
    pub after: Option<usize>,

    /// Lines of context before each match
    #[arg(short = 'B', long, value_name = "NUM")]
    pub before: Option<usize>,

    /// Lines of context on both sides
    #[arg(short = 'C', long, value_name = "NUM")]
    pub context: Option<usize>,

    /// Only search files matching these globs (repeatable)
    #[arg(short = 'g', long, value_name = "GLOB")]
    pub glob: Vec<String>,

    /// Skip files matching these globs (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Stop after this many matches across all files (0 = unlimited)
    #[arg(long, value_name = "NUM")]
    pub max_results: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the aggregate document for a query
    ///
    /// Examples:
    ///   medit search "parse_config" src/
    ///   medit search "fn \w+_test" -r -C 0
    ///   medit search TODO --json
    Search {
        /// Text (or pattern with --regex) to search for
        query: String,

        /// Directory or file to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        matching: MatchArgs,

        /// Print excerpts and counts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Preview (and optionally apply) a replacement on every match line
    ///
    /// Regex replacements may reference capture groups ($1, ${name}).
    ///
    /// Examples:
    ///   medit replace old_name new_name src/
    ///   medit replace "v(\d+)" "version $1" -r --apply
    Replace {
        /// Text (or pattern with --regex) to search for
        query: String,

        /// Replacement text
        replacement: String,

        /// Directory or file to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        matching: MatchArgs,

        /// Write the changes to disk
        #[arg(long)]
        apply: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Open the aggregate document in $VISUAL/$EDITOR and apply the edits
    ///
    /// Only match lines (marked with '>') are written back. Do not add or
    /// remove lines.
    Edit {
        /// Text (or pattern with --regex) to search for
        query: String,

        /// Directory or file to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        matching: MatchArgs,

        /// Pre-fill match lines with this replacement
        #[arg(long, value_name = "TEXT")]
        replace: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Keep a query's results up to date as files change
    Watch {
        /// Text (or pattern with --regex) to search for
        query: String,

        /// Directory to watch
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        matching: MatchArgs,

        /// Debounce delay in milliseconds (overrides config)
        #[arg(long, value_name = "MS")]
        debounce: Option<u64>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",  // Default: only warnings and errors
            1 => "info",  // -v: show info messages
            2 => "debug", // -vv: show debug messages
            _ => "trace", // -vvv: show trace messages
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        runtime.block_on(async move {
            let cancel = Cancellation::new();
            let interrupt = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        log::info!("Interrupt received, cancelling");
                        cancel.cancel();
                    }
                })
            };

            let result = self.command.run(&cancel).await;
            interrupt.abort();
            result
        })
    }
}

impl Command {
    async fn run(self, cancel: &Cancellation) -> Result<()> {
        let config = Config::load(&std::env::current_dir().context("Cannot read current directory")?)?;

        match self {
            Command::Search {
                query,
                path,
                matching,
                json,
            } => {
                let request = build_request(&config, query, &path, &matching);
                handle_search(request, json, cancel).await
            }
            Command::Replace {
                query,
                replacement,
                path,
                matching,
                apply,
                yes,
            } => {
                let request = build_request(&config, query, &path, &matching)
                    .with_replace(ReplaceOptions::new(replacement));
                handle_replace(request, apply, yes, cancel).await
            }
            Command::Edit {
                query,
                path,
                matching,
                replace,
                yes,
            } => {
                let mut request = build_request(&config, query, &path, &matching);
                if let Some(replacement) = replace {
                    request = request.with_replace(ReplaceOptions::new(replacement));
                }
                handle_edit(request, yes, cancel).await
            }
            Command::Watch {
                query,
                path,
                matching,
                debounce,
            } => {
                let request = build_request(&config, query, &path, &matching);
                let debounce_ms = debounce.unwrap_or(config.incremental_updates.debounce_delay);
                handle_watch(
                    request,
                    config.incremental_updates.enabled,
                    debounce_ms,
                    cancel,
                )
                .await
            }
        }
    }
}

/// Config defaults overridden by command-line flags
fn build_request(config: &Config, query: String, path: &Path, matching: &MatchArgs) -> SearchRequest {
    let mut search = config.search_options(query);
    search.is_regex = matching.regex;
    search.is_case_sensitive = matching.case_sensitive;
    search.match_whole_word = matching.word;
    if let Some(context) = matching.context {
        search.context_before = context;
        search.context_after = context;
    }
    if let Some(before) = matching.before {
        search.context_before = before;
    }
    if let Some(after) = matching.after {
        search.context_after = after;
    }
    if let Some(max) = matching.max_results {
        search.max_results = max;
    }

    let mut scope = config.file_scope(path);
    if !matching.glob.is_empty() {
        scope.include = matching.glob.clone();
    }
    scope.exclude.extend(matching.exclude.iter().cloned());

    SearchRequest::new(search, scope)
}

/// JSON shape of `medit search --json`
#[derive(Serialize)]
struct SearchJson<'a> {
    document: String,
    report: &'a crate::engine::SearchReport,
    files: Vec<FileJson<'a>>,
}

#[derive(Serialize)]
struct FileJson<'a> {
    path: &'a Path,
    excerpts: Vec<&'a Excerpt>,
}

/// Handle the `search` subcommand
async fn handle_search(request: SearchRequest, as_json: bool, cancel: &Cancellation) -> Result<()> {
    let engine = SearchEngine::new(LocalFileHost::new());
    let mut registry = DocumentRegistry::new();
    let outcome = engine.run(&request, &mut registry, cancel).await?;
    let document = registry
        .get(outcome.document)
        .context("Search result was not registered")?;

    if as_json {
        let files = document
            .mapping
            .files()
            .iter()
            .map(|path| FileJson {
                path,
                excerpts: document.mapping.excerpts_for_file(path).collect(),
            })
            .collect();
        let json = SearchJson {
            document: document.id.to_string(),
            report: &outcome.report,
            files,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if outcome.report.match_count == 0 {
        output::info(&format!("No matches for {:?}.", request.search.query));
        return Ok(());
    }

    output::print_aggregate(&document.content);
    report_search(&outcome.report);
    Ok(())
}

/// Handle the `replace` subcommand
async fn handle_replace(
    request: SearchRequest,
    apply: bool,
    skip_confirm: bool,
    cancel: &Cancellation,
) -> Result<()> {
    let engine = SearchEngine::new(LocalFileHost::new());
    let mut registry = DocumentRegistry::new();
    let outcome = engine.run(&request, &mut registry, cancel).await?;
    report_search(&outcome.report);

    let content = registry
        .content(outcome.document)
        .context("Replace result was not registered")?
        .to_string();
    let changes = registry.compute_changes(outcome.document, &content)?;
    if changes.is_empty() {
        output::info("Nothing to replace.");
        return Ok(());
    }

    output::print_changes(&changes);

    if !apply {
        output::info(&format!(
            "Dry run: {} change(s) in {} file(s). Re-run with --apply to write them.",
            changes.edit_count(),
            changes.file_count()
        ));
        return Ok(());
    }

    if !skip_confirm && !confirm(&format!("Apply {} change(s)?", changes.edit_count()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let report = registry
        .apply_changes(outcome.document, &changes, engine.host(), cancel)
        .await?;
    output::print_apply_report(&report);
    registry.remove(outcome.document);
    Ok(())
}

/// Handle the `edit` subcommand
async fn handle_edit(request: SearchRequest, skip_confirm: bool, cancel: &Cancellation) -> Result<()> {
    let engine = SearchEngine::new(LocalFileHost::new());
    let mut registry = DocumentRegistry::new();
    let outcome = engine.run(&request, &mut registry, cancel).await?;
    report_search(&outcome.report);

    if outcome.report.match_count == 0 {
        output::info(&format!("No matches for {:?}.", request.search.query));
        return Ok(());
    }

    let content = registry
        .content(outcome.document)
        .context("Edit result was not registered")?
        .to_string();
    let edited = edit_in_editor(&editor_command(), outcome.document, &content, cancel).await?;

    let changes = registry.compute_changes(outcome.document, &edited)?;
    if changes.is_empty() {
        output::info("No changes.");
        return Ok(());
    }

    output::print_changes(&changes);
    if !skip_confirm && !confirm(&format!("Apply {} change(s)?", changes.edit_count()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let report = registry
        .apply_changes(outcome.document, &changes, engine.host(), cancel)
        .await?;
    output::print_apply_report(&report);
    registry.remove(outcome.document);
    Ok(())
}

fn editor_command() -> String {
    std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string())
}

/// Write the document to a temporary file, open it, and read it back
///
/// Ctrl+C typed while the editor runs is meant for the editor, so any
/// cancellation raised during the session is withdrawn afterwards.
async fn edit_in_editor(
    editor: &str,
    id: DocumentId,
    content: &str,
    cancel: &Cancellation,
) -> Result<String> {
    let path = std::env::temp_dir().join(format!(
        "medit-{}-{}.txt",
        id.as_u64(),
        uuid::Uuid::new_v4().simple()
    ));
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    // Remove the temporary file however we leave this function
    let cleanup = path.clone();
    let _guard = scopeguard::guard((), move |_| {
        let _ = std::fs::remove_file(&cleanup);
    });

    let mut parts = shell_words::split(editor).context("Failed to parse $VISUAL/$EDITOR")?;
    if parts.is_empty() {
        anyhow::bail!("$VISUAL/$EDITOR is empty");
    }
    let program = parts.remove(0);

    log::info!("Opening {} with {}", path.display(), program);
    let status = tokio::process::Command::new(&program)
        .args(&parts)
        .arg(&path)
        .status()
        .await
        .with_context(|| format!("Failed to launch editor '{}'", program));
    if cancel.is_cancelled() {
        log::debug!("Ignoring interrupt received during the editor session");
        cancel.reset();
    }
    let status = status?;
    if !status.success() {
        anyhow::bail!("Editor '{}' exited with {}", program, status);
    }

    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read back {}", path.display()))
}

/// Handle the `watch` subcommand
async fn handle_watch(
    request: SearchRequest,
    incremental: bool,
    debounce_ms: u64,
    cancel: &Cancellation,
) -> Result<()> {
    let engine = SearchEngine::new(LocalFileHost::new());
    let mut registry = DocumentRegistry::new();
    let mut index = IncrementalIndex::new();

    let (first, delta) = engine
        .run_incremental(&mut index, &request, &mut registry, cancel)
        .await?;
    output::print_deltas(&delta);
    let mut current = first.document;

    let filter = PathFilter::from_scope(&request.scope)?;
    let mut handle = watcher::watch(&request.scope.root, filter, WatchConfig { debounce_ms })?;
    output::info(&format!(
        "Watching {} for changes (debounce: {}ms, Ctrl+C to stop)...",
        request.scope.root.display(),
        debounce_ms
    ));

    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = handle.next_batch() => batch,
        };
        let Some(mut changes) = batch else { break };
        changes.extend(handle.drain());
        log::debug!("Refreshing after {} changed file(s)", changes.len());

        if incremental {
            index.apply(&changes);
        } else {
            index.invalidate();
        }

        match engine
            .run_incremental(&mut index, &request, &mut registry, cancel)
            .await
        {
            Ok((outcome, delta)) => {
                registry.remove(current);
                current = outcome.document;
                output::print_deltas(&delta);
            }
            Err(e) if cancel.is_cancelled() => {
                log::debug!("Refresh interrupted: {}", e);
                break;
            }
            Err(e) => output::error(&format!("Refresh failed: {}", e)),
        }
    }

    registry.remove(current);
    println!("Watcher stopped.");
    Ok(())
}

fn report_search(report: &crate::engine::SearchReport) {
    for skipped in &report.skipped {
        log::debug!("skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    if report.budget_exhausted {
        output::warn(&format!(
            "{}. Narrow the query or raise --max-results.",
            report.summary()
        ));
    } else {
        eprintln!("{}", report.summary());
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
