//! Parsing and rendering of task documents.
//!
//! The rendered form is:
//!
//! ```text
//! ---
//! status: todo
//! parent: 3
//! priority: 2
//! ---
//! # Title
//!
//! body
//! ```
//!
//! `parent` is omitted when absent and `priority` when zero. Rendering and
//! [`Document::parse`] are exact inverses for any document built through
//! [`Document::new`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::model::{TaskId, TaskStatus};
use crate::validate::{Finding, validate};

const DELIMITER: &str = "---";

/// A parsed task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Declared workflow status.
    pub status: TaskStatus,
    /// Parent task, if this task is a child.
    pub parent: Option<TaskId>,
    /// Scheduling priority; higher runs first among equals.
    pub priority: i64,
    /// Single-line title.
    pub title: String,
    /// Requirement text, trimmed.
    pub body: String,
}

impl Document {
    /// Creates a root document with no body and zero priority.
    ///
    /// Line breaks in `title` are folded into single spaces.
    #[must_use]
    pub fn new(title: &str, status: TaskStatus) -> Self {
        Self {
            status,
            parent: None,
            priority: 0,
            title: normalize_title(title),
            body: String::new(),
        }
    }

    /// Sets the parent task.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<Option<TaskId>>) -> Self {
        self.parent = parent.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the body, trimming surrounding whitespace.
    #[must_use]
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.trim().to_string();
        self
    }

    /// Parses a document, rejecting it on the first blocking finding.
    ///
    /// An empty body is not blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] when the header is missing or malformed,
    /// the status is missing or unknown, the parent is not positive, or the
    /// title line is missing.
    pub fn parse(content: &str) -> Result<Self> {
        let mut report = validate(content);
        if let Some(finding) = report.first_blocking() {
            return Err(Error::Invalid(finding.clone()));
        }
        report
            .take_document()
            .ok_or(Error::Invalid(Finding::MissingTitle))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{DELIMITER}")?;
        writeln!(f, "status: {}", self.status)?;
        if let Some(parent) = self.parent {
            writeln!(f, "parent: {parent}")?;
        }
        if self.priority != 0 {
            writeln!(f, "priority: {}", self.priority)?;
        }
        writeln!(f, "{DELIMITER}")?;
        writeln!(f, "# {}", self.title)?;
        if !self.body.is_empty() {
            write!(f, "\n{}\n", self.body)?;
        }
        Ok(())
    }
}

fn normalize_title(title: &str) -> String {
    title
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header fields as written, before validation.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawHeader {
    pub(crate) status: Option<String>,
    pub(crate) parent: Option<i64>,
    pub(crate) priority: Option<i64>,
}

/// A structurally split document whose fields are not yet validated.
#[derive(Debug)]
pub(crate) struct RawDocument {
    pub(crate) header: RawHeader,
    pub(crate) title: Option<String>,
    pub(crate) body: String,
}

/// Splits content into header, title and body.
///
/// Fails only on structural problems: a missing opening delimiter, an
/// unterminated header, or YAML that does not parse.
pub(crate) fn split(content: &str) -> std::result::Result<RawDocument, Finding> {
    let mut lines = content.trim().lines();

    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return Err(Finding::MissingHeader),
    }

    let mut yaml = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == DELIMITER {
            closed = true;
            break;
        }
        yaml.push(line);
    }
    if !closed {
        return Err(Finding::UnterminatedHeader);
    }

    let yaml = yaml.join("\n");
    let header = if yaml.trim().is_empty() {
        RawHeader::default()
    } else {
        serde_yaml::from_str::<RawHeader>(&yaml)
            .map_err(|e| Finding::MalformedHeader(e.to_string()))?
    };

    let rest: Vec<&str> = lines.skip_while(|line| line.trim().is_empty()).collect();
    let (title, body_lines) = match rest.split_first() {
        Some((first, tail)) => match title_text(first) {
            Some(title) => (Some(title), tail),
            None => (None, rest.as_slice()),
        },
        None => (None, rest.as_slice()),
    };

    Ok(RawDocument {
        header,
        title,
        body: body_lines.join("\n").trim().to_string(),
    })
}

/// Extracts the text of an H1 line; empty titles count as absent.
fn title_text(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let text = if trimmed == "#" {
        ""
    } else {
        trimmed.strip_prefix("# ")?
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
