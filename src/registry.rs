//! Open aggregate documents
//!
//! Every search or replace produces an [`AggregateDocument`] that lives in a
//! [`DocumentRegistry`] until it is closed. The registry owns each document's
//! [`ChangeTracker`]; callers hold it by `&mut` and drive all mutation
//! through it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::aggregate::{AggregateMapping, FormattedAggregate};
use crate::error::{EngineError, Result};
use crate::host::{Cancellation, FileHost};
use crate::models::{ReplaceOptions, SearchOptions};
use crate::tracker::{ApplyReport, ChangeSet, ChangeTracker};

/// Handle of a registered aggregate document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

impl DocumentId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "medit://aggregate/{}", self.0)
    }
}

/// A published search or replace result
#[derive(Debug, Clone)]
pub struct AggregateDocument {
    pub id: DocumentId,
    /// Text as first shown to the user
    pub content: String,
    pub mapping: AggregateMapping,
    pub search: SearchOptions,
    pub replace: Option<ReplaceOptions>,
    /// Layout version the document was rendered with
    pub format_version: u32,
}

impl AggregateDocument {
    pub fn is_replace(&self) -> bool {
        self.replace.is_some()
    }
}

#[derive(Debug)]
struct Entry {
    document: AggregateDocument,
    tracker: ChangeTracker,
}

/// Process-wide set of open aggregate documents
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: BTreeMap<DocumentId, Entry>,
    next_id: u64,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formatted aggregate and snapshot its baseline
    ///
    /// Replace documents are tracked against their unsubstituted rendering,
    /// so the substitutions show up as pending changes right away.
    pub fn create(
        &mut self,
        formatted: FormattedAggregate,
        search: SearchOptions,
        replace: Option<ReplaceOptions>,
    ) -> Result<DocumentId> {
        let mut tracker = ChangeTracker::new();
        tracker.initialize(&formatted.baseline, &formatted.mapping)?;

        self.next_id += 1;
        let id = DocumentId(self.next_id);
        let format_version = formatted.mapping.layout_version();

        self.entries.insert(
            id,
            Entry {
                document: AggregateDocument {
                    id,
                    content: formatted.content,
                    mapping: formatted.mapping,
                    search,
                    replace,
                    format_version,
                },
                tracker,
            },
        );

        log::debug!("Registered {} ({} open)", id, self.entries.len());
        Ok(id)
    }

    pub fn get(&self, id: DocumentId) -> Option<&AggregateDocument> {
        self.entries.get(&id).map(|e| &e.document)
    }

    /// Text of a registered document as first rendered
    pub fn content(&self, id: DocumentId) -> Option<&str> {
        self.get(id).map(|d| d.content.as_str())
    }

    pub fn tracker(&self, id: DocumentId) -> Option<&ChangeTracker> {
        self.entries.get(&id).map(|e| &e.tracker)
    }

    /// Diff the document's current text against its baseline
    pub fn compute_changes(&mut self, id: DocumentId, current: &str) -> Result<ChangeSet> {
        let entry = self.entry_mut(id)?;
        entry.tracker.compute_changes(current, &entry.document.mapping)
    }

    /// Commit a change set previously computed for this document
    pub async fn apply_changes<H>(
        &mut self,
        id: DocumentId,
        changes: &ChangeSet,
        host: &H,
        cancel: &Cancellation,
    ) -> Result<ApplyReport>
    where
        H: FileHost + ?Sized,
    {
        let entry = self.entry_mut(id)?;
        entry.tracker.apply_changes(changes, host, cancel).await
    }

    /// Close a document, discarding its tracker
    pub fn remove(&mut self, id: DocumentId) -> Option<AggregateDocument> {
        self.entries.remove(&id).map(|mut entry| {
            entry.tracker.discard();
            log::debug!("Closed {}", id);
            entry.document
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, id: DocumentId) -> Result<&mut Entry> {
        self.entries
            .get_mut(&id)
            .ok_or(EngineError::UnknownDocument(id))
    }
}
