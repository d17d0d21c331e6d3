//! Error taxonomy for the search / aggregate / commit pipeline
//!
//! Input errors abort a whole operation. Construction and I/O errors are
//! scoped to one file and end up in a report instead of aborting the batch.
//! Consistency errors mean the formatter produced a broken mapping.

use std::path::PathBuf;

use crate::aggregate::MappingViolation;
use crate::registry::DocumentId;
use crate::tracker::TrackerState;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("Search query must not be empty")]
    EmptyQuery,

    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Cannot build excerpts for {}: {message}", .path.display())]
    Construction { path: PathBuf, message: String },

    #[error("Failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Aggregate layout error: {0}")]
    Layout(String),

    #[error(
        "Aggregate document has {found} lines but {expected} were expected; only in-line edits can be committed"
    )]
    StructuralEdit { expected: usize, found: usize },

    #[error("Aggregate mapping is inconsistent ({} violation(s)): {}", .0.len(), describe_violations(.0))]
    Consistency(Vec<MappingViolation>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No aggregate document registered as {0}")]
    UnknownDocument(DocumentId),

    #[error("Change tracker cannot {operation} while {state}")]
    InvalidState {
        state: TrackerState,
        operation: &'static str,
    },
}

impl EngineError {
    /// Whether this error is scoped to a single file (the batch continues)
    pub fn is_per_file(&self) -> bool {
        matches!(self, EngineError::Construction { .. } | EngineError::Io { .. })
    }
}

fn describe_violations(violations: &[MappingViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, EngineError>;
