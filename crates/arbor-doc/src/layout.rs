//! On-disk layout of task documents.
//!
//! All documents live flat in one directory:
//!
//! | File | Content |
//! |------|---------|
//! | `{id}.md` | primary document (header, title, requirement) |
//! | `{id}.plan.md` | plan produced by planning |
//! | `{id}.report.md` | report of a successful run |
//! | `{id}.error.md` | error output of a failed run |
//!
//! Only names of the form `<digits>.md` count as primary documents when
//! scanning; everything else in the directory is ignored.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::atomic::write_atomic;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{TaskId, TaskStatus};
use crate::validate::{Report, validate};

const EXTENSION: &str = ".md";

/// Secondary documents attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sibling {
    /// The task's plan.
    Plan,
    /// Report written after a successful run.
    Report,
    /// Error text written after a failed run.
    Error,
}

impl Sibling {
    /// Every sibling kind.
    pub const ALL: [Self; 3] = [Self::Plan, Self::Report, Self::Error];

    /// File name suffix after the id.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Plan => ".plan.md",
            Self::Report => ".report.md",
            Self::Error => ".error.md",
        }
    }
}

/// Reads and writes task documents in a single directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory holding the documents.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the primary document for `id`.
    #[must_use]
    pub fn path(&self, id: TaskId) -> PathBuf {
        self.dir.join(format!("{id}{EXTENSION}"))
    }

    /// Path of a sibling document for `id`.
    #[must_use]
    pub fn sibling_path(&self, id: TaskId, sibling: Sibling) -> PathBuf {
        self.dir.join(format!("{id}{}", sibling.suffix()))
    }

    /// Returns `true` if the primary document exists.
    #[must_use]
    pub fn exists(&self, id: TaskId) -> bool {
        self.path(id).is_file()
    }

    /// Lists ids of all primary documents in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn scan(&self) -> Result<Vec<TaskId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(parse_primary_name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        debug!(dir = %self.dir.display(), count = ids.len(), "scanned documents");
        Ok(ids)
    }

    /// Highest id with a primary document.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn max_id(&self) -> Result<Option<TaskId>> {
        Ok(self.scan()?.last().copied())
    }

    /// Reads raw document content, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read(&self, id: TaskId) -> Result<Option<String>> {
        read_optional(&self.path(id))
    }

    /// Validates the primary document for `id`.
    ///
    /// A missing or unreadable file yields an invalid report rather than an
    /// error.
    #[must_use]
    pub fn inspect(&self, id: TaskId) -> Report {
        match std::fs::read_to_string(self.path(id)) {
            Ok(content) => validate(&content),
            Err(e) => Report::unreadable(&e),
        }
    }

    /// Loads and parses the primary document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no document, or
    /// [`Error::Invalid`] if it fails validation.
    pub fn load(&self, id: TaskId) -> Result<Document> {
        let content = self.read(id)?.ok_or(Error::NotFound(id))?;
        Document::parse(&content)
    }

    /// Writes the primary document atomically and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write(&self, id: TaskId, document: &Document) -> Result<PathBuf> {
        let path = self.path(id);
        write_atomic(&path, &document.to_string())?;
        debug!(task_id = %id, status = %document.status, "wrote document");
        Ok(path)
    }

    /// Rewrites only the status of an existing document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing, invalid, or cannot be
    /// written.
    pub fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<PathBuf> {
        let mut document = self.load(id)?;
        document.status = status;
        self.write(id, &document)
    }

    /// Reads a sibling document, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_sibling(&self, id: TaskId, sibling: Sibling) -> Result<Option<String>> {
        read_optional(&self.sibling_path(id, sibling))
    }

    /// Writes a sibling document atomically and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_sibling(&self, id: TaskId, sibling: Sibling, text: &str) -> Result<PathBuf> {
        let path = self.sibling_path(id, sibling);
        let mut contents = text.trim().to_string();
        contents.push('\n');
        write_atomic(&path, &contents)?;
        Ok(path)
    }

    /// Removes the primary document and all siblings for `id`.
    ///
    /// Returns the paths that existed and were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn remove(&self, id: TaskId) -> Result<Vec<PathBuf>> {
        let paths = std::iter::once(self.path(id))
            .chain(Sibling::ALL.into_iter().map(|s| self.sibling_path(id, s)));

        let mut removed = Vec::new();
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parses `<digits>.md` into an id.
///
/// Only the name [`DocumentStore::path`] would produce is accepted, so
/// `05.md` is not a second document for #5.
fn parse_primary_name(name: &str) -> Option<TaskId> {
    let stem = name.strip_suffix(EXTENSION)?;
    if stem.is_empty() || stem.starts_with('0') || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse::<i64>().ok().and_then(TaskId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn store() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path().join("tasks")).unwrap();
        (dir, store)
    }

    fn id(raw: i64) -> TaskId {
        TaskId::new(raw).unwrap()
    }

    #[rstest]
    #[case::plain("12.md", Some(12))]
    #[case::plan("12.plan.md", None)]
    #[case::report("3.report.md", None)]
    #[case::zero("0.md", None)]
    #[case::padded("05.md", None)]
    #[case::padded_long("0012.md", None)]
    #[case::alpha("a1.md", None)]
    #[case::signed("+4.md", None)]
    #[case::other_ext("4.txt", None)]
    #[case::bare(".md", None)]
    fn primary_name_parsing(#[case] name: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_primary_name(name).map(TaskId::get), expected);
    }

    #[test]
    fn scan_returns_sorted_primary_ids() {
        let (_dir, store) = store();
        for raw in [10, 2, 7] {
            store
                .write(id(raw), &Document::new("T", TaskStatus::Todo))
                .unwrap();
        }
        store.write_sibling(id(2), Sibling::Plan, "plan").unwrap();
        std::fs::write(store.dir().join("notes.md"), "x").unwrap();

        let ids: Vec<i64> = store.scan().unwrap().into_iter().map(TaskId::get).collect();
        assert_eq!(ids, vec![2, 7, 10]);
        assert_eq!(store.max_id().unwrap(), Some(id(10)));
    }

    #[test]
    fn scan_ignores_padded_names() {
        let (_dir, store) = store();
        store
            .write(id(5), &Document::new("T", TaskStatus::Todo))
            .unwrap();
        std::fs::copy(store.path(id(5)), store.dir().join("05.md")).unwrap();
        std::fs::copy(store.path(id(5)), store.dir().join("0050.md")).unwrap();

        assert_eq!(store.scan().unwrap(), vec![id(5)]);
        assert_eq!(store.max_id().unwrap(), Some(id(5)));
    }

    #[test]
    fn write_then_load() {
        let (_dir, store) = store();
        let doc = Document::new("Load me", TaskStatus::Planned).with_body("body");
        store.write(id(1), &doc).unwrap();

        assert_eq!(store.load(id(1)).unwrap(), doc);
        assert!(store.inspect(id(1)).is_valid());
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.load(id(4)), Err(Error::NotFound(missing)) if missing == id(4)));
        assert!(store.read(id(4)).unwrap().is_none());
        assert!(!store.inspect(id(4)).is_valid());
    }

    #[test]
    fn update_status_keeps_other_fields() {
        let (_dir, store) = store();
        let doc = Document::new("Keep", TaskStatus::Planned)
            .with_priority(3)
            .with_body("text");
        store.write(id(5), &doc).unwrap();

        store.update_status(id(5), TaskStatus::Done).unwrap();

        let loaded = store.load(id(5)).unwrap();
        assert_eq!(loaded.status, TaskStatus::Done);
        assert_eq!(loaded.priority, 3);
        assert_eq!(loaded.body, "text");
    }

    #[test]
    fn siblings_round_trip_and_remove_clears_everything() {
        let (_dir, store) = store();
        store
            .write(id(3), &Document::new("T", TaskStatus::Todo))
            .unwrap();
        store.write_sibling(id(3), Sibling::Report, "  done  ").unwrap();

        assert_eq!(
            store.read_sibling(id(3), Sibling::Report).unwrap().as_deref(),
            Some("done\n")
        );
        assert!(store.read_sibling(id(3), Sibling::Error).unwrap().is_none());

        let removed = store.remove(id(3)).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!store.exists(id(3)));
        assert!(store.remove(id(3)).unwrap().is_empty());
    }
}
