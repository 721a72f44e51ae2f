//! Effective prompt construction.

use agentbridge_core::QueryContext;

/// Prepend editor context to the user's prompt.
///
/// The file path comes first, then either the selection or, without one, the
/// full file content, each fenced. Blocks are separated by blank lines. The
/// prompt is returned unchanged when the context contributes nothing.
pub fn build_prompt(prompt: &str, context: Option<&QueryContext>) -> String {
    let Some(context) = context else {
        return prompt.to_string();
    };

    let mut parts = Vec::new();

    if let Some(path) = context.path.as_deref().filter(|p| !p.is_empty()) {
        parts.push(format!("Current file: {}", path));
    }

    let selection = context
        .selection
        .as_ref()
        .and_then(|s| s.text.as_deref())
        .filter(|t| !t.is_empty());

    if let Some(text) = selection {
        parts.push(format!("Selected code:\n```\n{}\n```", text));
    } else if let Some(content) = context.content.as_deref().filter(|c| !c.is_empty()) {
        parts.push(format!("File content:\n```\n{}\n```", content));
    }

    if parts.is_empty() {
        return prompt.to_string();
    }

    format!("{}\n\n{}", parts.join("\n\n"), prompt)
}
