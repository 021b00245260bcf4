//! Prompt text handed to CLI agents.

use std::fmt::Write as _;

use super::AgentRequest;
use crate::workflow::{ArtifactType, StepId};

/// What each step asks the agent to do.
fn instructions(step: StepId) -> &'static str {
    match step {
        StepId::FetchIssue | StepId::FetchPatch => {
            "Restate the request below as structured data."
        }
        StepId::Classify => {
            "Classify this issue. Report its kind (bug, feature, chore or question), \
             an estimated complexity (low, medium or high) and the areas of the codebase it touches."
        }
        StepId::Plan => {
            "Explore the repository and write an implementation plan for this issue: \
             the files to change, the approach, and how to verify the result."
        }
        StepId::Implement => {
            "Implement the plan in the working directory. Make the code changes, run \
             the relevant tests, and summarize what you changed."
        }
        StepId::Review => {
            "Review the implementation against the plan. List any problems you find \
             and give an overall verdict (approve or request_changes)."
        }
        StepId::AddressReview => {
            "Work through the review below. Fix the problems it raises in the working \
             directory and report which were addressed and which were left as-is."
        }
        StepId::CodeQuality => {
            "Run the project's linters and type checkers on the changed code. Fix what \
             they report and summarize the tools run and the remaining findings."
        }
        StepId::ValidateAcceptance => {
            "Check the implementation against the acceptance criteria in the plan. \
             Report each criterion as met or unmet and give an overall verdict."
        }
        StepId::PatchPlan => {
            "The issue was already implemented once following the plan below. Plan the \
             follow-up changes the patch request asks for."
        }
        StepId::PatchImplement => {
            "Apply the patch plan in the working directory, run the relevant tests, \
             and summarize what you changed."
        }
    }
}

/// Render the prompt for one step invocation.
pub fn build_prompt(request: &AgentRequest) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "# Task: {} (issue #{})", request.step, request.issue_id);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "{}", instructions(request.step));
    if !request.description.is_empty() {
        let _ = writeln!(prompt, "\nStep description: {}", request.description);
    }

    for (artifact, value) in &request.inputs {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        let _ = writeln!(prompt, "\n## Input: {}\n\n```json\n{}\n```", artifact, body);
    }

    let _ = writeln!(prompt, "\n## Output\n");
    let _ = writeln!(prompt, "{}", output_contract(&request.produces));
    prompt
}

fn output_contract(produces: &[ArtifactType]) -> String {
    match produces {
        [] => "No structured output is required.".to_string(),
        [single] => format!(
            "Finish with a single JSON object holding the `{}` result. \
             Do not wrap it in prose after the object.",
            single
        ),
        many => {
            let keys: Vec<String> = many.iter().map(|t| format!("`{}`", t)).collect();
            format!(
                "Finish with a single JSON object with one key per result: {}.",
                keys.join(", ")
            )
        }
    }
}
