//! Prompt text for the execution delegate.

use std::fmt::Write as _;

use super::{ExecutionMode, ExecutionRequest};
use crate::domain::Relation;

/// Builds the prompt for the request's mode.
#[must_use]
pub fn render_prompt(request: &ExecutionRequest) -> String {
    match request.mode {
        ExecutionMode::Plan => plan_prompt(request),
        ExecutionMode::Run => run_prompt(request),
    }
}

/// Prompt asking the delegate to split the task or plan it.
#[must_use]
pub fn plan_prompt(request: &ExecutionRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Task #{}: {}\n", request.task_id, request.title);
    out.push_str("## Requirement\n\n");
    out.push_str(non_empty(&request.requirement, "(no requirement text; use the title)"));
    out.push_str("\n\n");

    write_related(&mut out, request, "Requirement");
    write_map(&mut out, request);

    out.push_str("---\n\n");
    out.push_str(
        "Decide whether this task can be done as one unit of work or must be split.\n\n\
         Reply with exactly one of the following.\n\n\
         [PLANNED]\n\
         <a step-by-step implementation plan>\n\n\
         [SPLIT]\n\
         - <child title>\n\
         \x20 <child requirement, indented>\n",
    );
    if request.at_max_depth {
        out.push_str(
            "\nThis task is at the maximum depth and cannot be split. Reply with [PLANNED].\n",
        );
    }
    out
}

/// Prompt asking the delegate to carry out the plan and report.
#[must_use]
pub fn run_prompt(request: &ExecutionRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Task #{}: {}\n", request.task_id, request.title);
    out.push_str("## Plan\n\n");
    out.push_str(non_empty(
        request.plan.as_deref().unwrap_or_default(),
        "(no plan recorded)",
    ));
    out.push_str("\n\n");
    if !request.requirement.trim().is_empty() {
        out.push_str("## Requirement\n\n");
        out.push_str(request.requirement.trim());
        out.push_str("\n\n");
    }

    write_related(&mut out, request, "Plan");
    write_map(&mut out, request);

    out.push_str("---\n\n");
    out.push_str(
        "Carry out the plan above. When you are done, reply with a report covering:\n\
         - a summary of the work done\n\
         - the files changed\n\
         - anything notable\n",
    );
    out
}

fn non_empty<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = text.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}

fn write_related(out: &mut String, request: &ExecutionRequest, label: &str) {
    if request.related.is_empty() {
        return;
    }
    out.push_str("## Related tasks\n\n");
    for related in &request.related {
        let _ = writeln!(
            out,
            "### Task #{}: {} ({})",
            related.id,
            related.title,
            relation_label(related.relation)
        );
        let _ = writeln!(out, "**{label}**: {}\n", non_empty(&related.text, "(none)"));
    }
}

fn relation_label(relation: Relation) -> &'static str {
    match relation {
        Relation::Dependency => "dependency",
        Relation::Dependent => "dependent",
        Relation::Parent => "parent",
        Relation::Child => "child",
    }
}

fn write_map(out: &mut String, request: &ExecutionRequest) {
    if request.context_map.trim().is_empty() {
        return;
    }
    out.push_str("## Task map\n\n```\n");
    out.push_str(request.context_map.trim_end());
    out.push_str("\n```\n\n");
}
