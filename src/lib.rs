//! multiedit: search many files, edit the results as one document
//!
//! A query is matched across a set of files, every match is padded with
//! context lines, and all resulting excerpts are rendered into a single
//! aggregate document. Edits made to the match lines of that document are
//! mapped back to the exact file and line they came from and committed file
//! by file.
//!
//! # Architecture
//!
//! - **Matcher**: finds match spans in one file (literal or regex)
//! - **ExcerptBuilder**: expands spans by context and merges neighbours
//! - **AggregateFormatter**: renders excerpts and records the line mapping
//! - **ChangeTracker**: diffs the edited document and commits the edits
//! - **IncrementalIndex**: reuses per-file results across repeated queries
//!
//! # Example Usage
//!
//! ```no_run
//! use multiedit::{Cancellation, DocumentRegistry, FileScope, LocalFileHost, SearchEngine, SearchOptions, SearchRequest};
//!
//! # async fn run() -> multiedit::error::Result<()> {
//! let engine = SearchEngine::new(LocalFileHost::new());
//! let mut registry = DocumentRegistry::new();
//! let request = SearchRequest::new(SearchOptions::new("old_name"), FileScope::new("src"));
//! let cancel = Cancellation::new();
//!
//! let outcome = engine.run(&request, &mut registry, &cancel).await?;
//! let edited = registry.content(outcome.document).unwrap().replace("old_name", "new_name");
//! let commit = engine.commit(&mut registry, outcome.document, &edited, &cancel).await?;
//! println!("{}", commit.report.summary());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod excerpt;
pub mod host;
pub mod incremental;
pub mod matcher;
pub mod models;
pub mod output;
pub mod registry;
pub mod tracker;
pub mod watcher;

// Re-export commonly used types
pub use aggregate::{AggregateFormatter, AggregateMapping, FormattedAggregate};
pub use config::Config;
pub use engine::{SearchEngine, SearchReport, SearchRequest};
pub use error::EngineError;
pub use excerpt::{Excerpt, ExcerptBuilder, ExcerptId};
pub use host::{Cancellation, FileHost, LocalFileHost, MemoryFileHost};
pub use incremental::{DeltaResult, FileDelta, IncrementalIndex};
pub use matcher::{HostMatch, Matcher};
pub use models::{FileScope, LineRange, MatchSpan, ReplaceOptions, SearchOptions};
pub use registry::{AggregateDocument, DocumentId, DocumentRegistry};
pub use tracker::{ApplyReport, ChangeSet, ChangeTracker};
