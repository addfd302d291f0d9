//! Tolerant extraction of an action directive from LLM output.
//!
//! Models wrap JSON in prose, code fences, or both, and occasionally emit
//! several objects. The scanner walks the text for balanced top-level
//! `{...}` spans (string- and escape-aware) and takes the first one that
//! parses to an object with a string `action` field.

use serde_json::Value;

/// A structured action proposed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDirective {
    pub action: String,
    pub arguments: Value,
    /// Conversational text the model attached alongside the action.
    pub reply: Option<String>,
}

/// Scan `text` for the first parseable action directive.
pub fn extract_action(text: &str) -> Option<ActionDirective> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = balanced_end(text, i) {
                if let Some(directive) = parse_directive(&text[i..end]) {
                    return Some(directive);
                }
            }
            // Not a directive: step past this brace so nested objects
            // still get their chance.
        }
        i += 1;
    }
    None
}

/// Byte offset one past the `}` closing the object opened at `start`,
/// or `None` when the braces never balance.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_directive(candidate: &str) -> Option<ActionDirective> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    let action = obj.get("action")?.as_str()?.trim().to_string();
    if action.is_empty() {
        return None;
    }
    let arguments = obj
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    let reply = obj
        .get("reply")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    Some(ActionDirective {
        action,
        arguments,
        reply,
    })
}
