//! Property tests for the document format.
//!
//! Rendering a document and parsing it back must reproduce every field.

#![allow(clippy::unwrap_used)]

use arbor_doc::{Document, DocumentStore, TaskId, TaskStatus, validate};
use proptest::prelude::*;
use tempfile::TempDir;

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_title() -> impl Strategy<Value = String> {
    "[A-Za-z0-9#:,.()-][A-Za-z0-9 #:,.()-]{0,60}"
}

/// Bodies of several paragraphs, including markdown-looking lines.
fn arb_body() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z ]{0,40}",
            Just("---".to_string()),
            Just("# heading".to_string()),
            Just(String::new()),
            "- item [a-z]{1,8}",
        ],
        0..8,
    )
    .prop_map(|lines| lines.join("\n"))
}

fn arb_document() -> impl Strategy<Value = Document> {
    (
        arb_status(),
        prop::option::of(1i64..10_000),
        -5i64..20,
        arb_title(),
        arb_body(),
    )
        .prop_map(|(status, parent, priority, title, body)| {
            Document::new(&title, status)
                .with_parent(parent.and_then(TaskId::new))
                .with_priority(priority)
                .with_body(&body)
        })
        .prop_filter("title must survive normalization", |doc| !doc.title.is_empty())
}

proptest! {
    #[test]
    fn render_then_parse_is_identity(doc in arb_document()) {
        let parsed = Document::parse(&doc.to_string()).unwrap();
        prop_assert_eq!(parsed, doc);
    }

    #[test]
    fn rendered_documents_are_valid(doc in arb_document()) {
        let report = validate(&doc.to_string());
        prop_assert!(report.is_valid());
        prop_assert_eq!(report.warnings().count(), usize::from(doc.body.is_empty()));
    }

    #[test]
    fn rendering_is_stable(doc in arb_document()) {
        let once = doc.to_string();
        let twice = Document::parse(&once).unwrap().to_string();
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn store_round_trip_preserves_fields() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let id = TaskId::new(42).unwrap();
    let doc = Document::new("Persist me", TaskStatus::Failed)
        .with_parent(TaskId::new(7))
        .with_priority(4)
        .with_body("## Notes\n\nsome text");

    store.write(id, &doc).unwrap();

    assert_eq!(store.load(id).unwrap(), doc);
    assert_eq!(store.scan().unwrap(), vec![id]);
}

#[test]
fn hand_written_document_is_accepted() {
    let content = "\n\n---\nstatus: planned\npriority: 1\nextra: ignored\n---\n\n# Hand written\n\nBody text.\n\n";
    let doc = Document::parse(content).unwrap();

    assert_eq!(doc.status, TaskStatus::Planned);
    assert_eq!(doc.priority, 1);
    assert_eq!(doc.title, "Hand written");
    assert_eq!(doc.body, "Body text.");
}
