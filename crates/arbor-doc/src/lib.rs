//! Task documents for arbor.
//!
//! Each task is backed by one Markdown document with a YAML header declaring
//! its status, optional parent and optional priority, followed by a single
//! `# Title` line and a free-form body. Documents are the authoritative
//! record of a task; the relational store in the `arbor` crate is derived
//! from them.
//!
//! ```
//! use arbor_doc::{Document, TaskId, TaskStatus};
//!
//! let doc = Document::new("Write the parser", TaskStatus::Todo)
//!     .with_parent(TaskId::new(3))
//!     .with_body("Parse the header first.");
//!
//! let text = doc.to_string();
//! assert_eq!(Document::parse(&text).unwrap(), doc);
//! ```

pub mod atomic;
pub mod document;
pub mod error;
pub mod layout;
pub mod model;
pub mod validate;

pub use document::Document;
pub use error::{Error, Result};
pub use layout::{DocumentStore, Sibling};
pub use model::{TaskId, TaskStatus};
pub use validate::{Finding, Report, validate};
