//! Reading and validating the document set.

use std::collections::BTreeMap;

use arbor_doc::{DocumentStore, Finding};
use tracing::{debug, warn};

use crate::domain::{TaskId, TaskRecord};
use crate::error::Result;

/// Valid documents plus what was skipped on the way.
#[derive(Debug, Default)]
pub(crate) struct DocumentSet {
    /// Records of documents that passed validation, by id.
    pub records: BTreeMap<TaskId, TaskRecord>,
    /// Number of documents skipped.
    pub skipped: usize,
    /// Human-readable warnings, each prefixed with `#id: `.
    pub warnings: Vec<String>,
}

impl DocumentSet {
    fn warn(&mut self, id: TaskId, message: impl std::fmt::Display) {
        let text = format!("#{id}: {message}");
        warn!(task_id = %id, "{message}");
        self.warnings.push(text);
    }
}

/// Scans and validates every primary document.
///
/// Blocking findings skip the document; warnings (empty body) are recorded
/// and the document is kept. Afterwards, documents whose parent has no valid
/// document are dropped too, repeatedly, so the descendants of a skipped
/// document go with it.
pub(crate) fn scan_documents(docs: &DocumentStore) -> Result<DocumentSet> {
    let mut set = DocumentSet::default();

    for id in docs.scan()? {
        let mut report = docs.inspect(id);
        if !report.is_valid() {
            let reason = report
                .first_blocking()
                .map_or_else(|| report.summary(), Finding::to_string);
            set.skipped += 1;
            set.warn(id, format_args!("invalid document skipped: {reason}"));
            continue;
        }
        for finding in report.warnings() {
            set.warn(id, finding);
        }
        if let Some(document) = report.take_document() {
            set.records
                .insert(id, TaskRecord::from_document(id, &document));
        }
    }

    loop {
        let orphans: Vec<(TaskId, TaskId)> = set
            .records
            .values()
            .filter_map(|r| r.parent.map(|p| (r.id, p)))
            .filter(|(_, parent)| !set.records.contains_key(parent))
            .collect();
        if orphans.is_empty() {
            break;
        }
        for (id, parent) in orphans {
            set.records.remove(&id);
            set.skipped += 1;
            set.warn(id, format_args!("parent #{parent} has no document"));
        }
    }

    debug!(valid = set.records.len(), skipped = set.skipped, "scanned documents");
    Ok(set)
}
