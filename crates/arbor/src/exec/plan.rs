//! Parsing of the delegate's planning reply.
//!
//! The reply carries one of two markers. `[PLANNED]` is followed by the plan
//! text. `[SPLIT]` is followed by a bullet list of children, each either
//! `- Task #N: title` (a child the delegate already knows) or `- title`;
//! indented lines under a bullet become that child's requirement.

use crate::domain::TaskId;

const SPLIT_MARKER: &str = "[SPLIT]";
const PLANNED_MARKER: &str = "[PLANNED]";

/// A child listed in a `[SPLIT]` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    /// Id named by the delegate, if any.
    pub id: Option<TaskId>,
    /// Child title.
    pub title: String,
    /// Requirement text from the indented lines, possibly empty.
    pub requirement: String,
}

/// A parsed planning reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanReply {
    /// The task is small enough; here is its plan.
    Planned(String),
    /// The task should be split into these children.
    Split(Vec<ChildSpec>),
}

/// Parses a planning reply.
///
/// The first marker in the text decides. A wrapping code fence is removed
/// first. Returns `None` for a reply with no marker, an empty plan or a
/// split with no children.
#[must_use]
pub fn parse_plan_output(output: &str) -> Option<PlanReply> {
    let text = strip_code_fence(output.trim());

    let split = text.find(SPLIT_MARKER);
    let planned = text.find(PLANNED_MARKER);
    let reply = match (split, planned) {
        (Some(s), Some(p)) if s < p => parse_split(&text[s + SPLIT_MARKER.len()..]),
        (Some(s), None) => parse_split(&text[s + SPLIT_MARKER.len()..]),
        (_, Some(p)) => PlanReply::Planned(text[p + PLANNED_MARKER.len()..].trim().to_string()),
        (None, None) => return None,
    };

    match &reply {
        PlanReply::Planned(plan) if plan.is_empty() => None,
        PlanReply::Split(children) if children.is_empty() => None,
        _ => Some(reply),
    }
}

fn strip_code_fence(text: &str) -> &str {
    if !(text.starts_with("```") && text.ends_with("```") && text.len() >= 6) {
        return text;
    }
    let inner = &text[..text.len() - 3];
    match inner.split_once('\n') {
        Some((_, rest)) => rest.trim(),
        None => text,
    }
}

fn parse_split(text: &str) -> PlanReply {
    let mut children: Vec<ChildSpec> = Vec::new();

    for line in text.lines() {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));

        match bullet {
            Some(item) if indent < 2 => {
                if let Some(child) = parse_item(item) {
                    children.push(child);
                }
            }
            _ if trimmed.is_empty() => {}
            _ => {
                if let Some(current) = children.last_mut() {
                    if !current.requirement.is_empty() {
                        current.requirement.push('\n');
                    }
                    current.requirement.push_str(trimmed);
                }
            }
        }
    }
    PlanReply::Split(children)
}

fn parse_item(item: &str) -> Option<ChildSpec> {
    let named = item
        .strip_prefix("Task")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('#'))
        .and_then(|rest| rest.split_once(':'))
        .and_then(|(id, title)| id.trim().parse::<TaskId>().ok().map(|id| (id, title)));

    let (id, title) = match named {
        Some((id, title)) => (Some(id), title.trim()),
        None => (None, item.trim()),
    };
    if title.is_empty() {
        return None;
    }
    Some(ChildSpec {
        id,
        title: title.to_string(),
        requirement: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn titles(reply: &PlanReply) -> Vec<&str> {
        match reply {
            PlanReply::Split(children) => children.iter().map(|c| c.title.as_str()).collect(),
            PlanReply::Planned(_) => Vec::new(),
        }
    }

    #[test]
    fn planned_reply() {
        let reply = parse_plan_output("[PLANNED]\n1. Read\n2. Write\n").unwrap();
        assert_eq!(reply, PlanReply::Planned("1. Read\n2. Write".to_string()));
    }

    #[test]
    fn split_reply_with_both_bullet_forms() {
        let reply = parse_plan_output(
            "[SPLIT]\n- Task #12: Lexer\n  Tokenize input.\n  Handle CRLF.\n- Parser\n",
        )
        .unwrap();

        let PlanReply::Split(children) = reply else {
            panic!("expected split");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, TaskId::new(12));
        assert_eq!(children[0].title, "Lexer");
        assert_eq!(children[0].requirement, "Tokenize input.\nHandle CRLF.");
        assert_eq!(children[1].id, None);
        assert_eq!(children[1].title, "Parser");
        assert!(children[1].requirement.is_empty());
    }

    #[test]
    fn preamble_and_code_fence_are_ignored() {
        let reply = parse_plan_output("```text\nSure, here it is.\n[SPLIT]\n- A\n- B\n```").unwrap();
        assert_eq!(titles(&reply), vec!["A", "B"]);
    }

    #[test]
    fn first_marker_wins() {
        let reply = parse_plan_output("[PLANNED]\nDo not [SPLIT] this.").unwrap();
        assert!(matches!(reply, PlanReply::Planned(_)));

        let reply = parse_plan_output("[SPLIT]\n- A\n[PLANNED] later").unwrap();
        assert!(matches!(reply, PlanReply::Split(_)));
    }

    #[rstest]
    #[case::no_marker("Here is my plan: do it")]
    #[case::empty_plan("[PLANNED]\n   ")]
    #[case::split_without_children("[SPLIT]\nnothing listed")]
    #[case::empty("")]
    fn unusable_replies(#[case] output: &str) {
        assert_eq!(parse_plan_output(output), None);
    }
}
