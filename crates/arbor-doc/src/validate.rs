//! The document validation contract.
//!
//! A document must be readable, open with a header block that parses, declare
//! a known status, declare a positive parent if it declares one at all, and
//! carry a title line. An empty body is reported but does not block.
//!
//! Validation collects every finding it can rather than stopping at the
//! first, so a reconciliation pass can report all problems with a document
//! at once. Structural problems (no header, unterminated header, YAML that
//! does not parse) end validation early because nothing after them can be
//! trusted.

use std::fmt;

use crate::document::{Document, split};
use crate::model::{TaskId, TaskStatus};

/// A single problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    // === Blocking ===
    /// The document could not be read.
    Unreadable(String),
    /// The document does not start with a `---` line.
    MissingHeader,
    /// The header has no closing `---` line.
    UnterminatedHeader,
    /// The header is not valid YAML for the expected fields.
    MalformedHeader(String),
    /// The header has no `status` field.
    MissingStatus,
    /// The `status` field is not a known status.
    InvalidStatus(String),
    /// The `parent` field is zero or negative.
    InvalidParent(i64),
    /// No `# Title` line follows the header.
    MissingTitle,

    // === Warnings ===
    /// The body is empty.
    EmptyBody,
}

impl Finding {
    /// Returns `true` if the finding causes the document to be skipped.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::EmptyBody)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(e) => write!(f, "cannot read document: {e}"),
            Self::MissingHeader => write!(f, "missing header block (expected leading ---)"),
            Self::UnterminatedHeader => write!(f, "header block is not closed (expected ---)"),
            Self::MalformedHeader(e) => write!(f, "header does not parse: {e}"),
            Self::MissingStatus => write!(f, "status is required"),
            Self::InvalidStatus(s) => write!(f, "invalid status '{s}'"),
            Self::InvalidParent(p) => write!(f, "parent must be a positive integer, got {p}"),
            Self::MissingTitle => write!(f, "title line is required"),
            Self::EmptyBody => write!(f, "body is empty"),
        }
    }
}

/// Outcome of validating one document.
#[derive(Debug, Clone, Default)]
pub struct Report {
    findings: Vec<Finding>,
    document: Option<Document>,
}

impl Report {
    /// Builds a report for a document that could not be read.
    #[must_use]
    pub fn unreadable(error: &std::io::Error) -> Self {
        Self {
            findings: vec![Finding::Unreadable(error.to_string())],
            document: None,
        }
    }

    /// Returns `true` when no finding is blocking.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.document.is_some() && self.first_blocking().is_none()
    }

    /// All findings, blocking first in discovery order.
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// The first blocking finding, if any.
    #[must_use]
    pub fn first_blocking(&self) -> Option<&Finding> {
        self.findings.iter().find(|f| f.is_blocking())
    }

    /// Non-blocking findings.
    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.is_blocking())
    }

    /// The parsed document when the report is valid.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        if self.is_valid() {
            self.document.as_ref()
        } else {
            None
        }
    }

    /// Takes the parsed document when the report is valid.
    pub fn take_document(&mut self) -> Option<Document> {
        if self.is_valid() {
            self.document.take()
        } else {
            None
        }
    }

    /// Joins blocking findings into one line for warnings and logs.
    #[must_use]
    pub fn summary(&self) -> String {
        self.findings
            .iter()
            .filter(|f| f.is_blocking())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates document content.
#[must_use]
pub fn validate(content: &str) -> Report {
    let raw = match split(content) {
        Ok(raw) => raw,
        Err(finding) => {
            return Report {
                findings: vec![finding],
                document: None,
            };
        }
    };

    let mut findings = Vec::new();

    let status = match raw.header.status.as_deref().map(str::trim) {
        None | Some("") => {
            findings.push(Finding::MissingStatus);
            None
        }
        Some(s) => match s.parse::<TaskStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                findings.push(Finding::InvalidStatus(s.to_string()));
                None
            }
        },
    };

    let parent = match raw.header.parent {
        None => Ok(None),
        Some(p) => TaskId::new(p).map(Some).ok_or(p),
    };
    if let Err(p) = parent {
        findings.push(Finding::InvalidParent(p));
    }

    if raw.title.is_none() {
        findings.push(Finding::MissingTitle);
    }
    if raw.body.is_empty() {
        findings.push(Finding::EmptyBody);
    }

    let document = match (status, parent, raw.title) {
        (Some(status), Ok(parent), Some(title)) => Some(Document {
            status,
            parent,
            priority: raw.header.priority.unwrap_or(0),
            title,
            body: raw.body,
        }),
        _ => None,
    };

    Report { findings, document }
}
