//! Shared helpers: agent output scanning and workflow ids.

/// Extract the first balanced JSON object from text that may contain other
/// content. Braces inside JSON strings are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Short random workflow id (8 hex characters).
pub fn make_workflow_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Workflow id holding the artifacts of a patch run for `workflow_id`.
pub fn patch_workflow_id(workflow_id: &str) -> String {
    if workflow_id.ends_with("-patch") {
        workflow_id.to_string()
    } else {
        format!("{workflow_id}-patch")
    }
}

/// Truncate to at most `max` characters, appending "..." when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
