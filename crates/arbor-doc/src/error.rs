//! Error types for arbor-doc operations.

use std::io;
use thiserror::Error;

use crate::model::TaskId;
use crate::validate::Finding;

/// The error type for document operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing a document.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The document failed validation.
    #[error("invalid document: {0}")]
    Invalid(Finding),

    /// A status string is not one of the known statuses.
    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    /// A task id is not a positive integer.
    #[error("invalid task id '{0}'")]
    InvalidId(String),

    /// No document exists for the task.
    #[error("document for task #{0} not found")]
    NotFound(TaskId),
}

/// A specialized Result type for arbor-doc operations.
pub type Result<T> = std::result::Result<T, Error>;
