//! Lenient JSON boundary for model output.
//!
//! Models wrap JSON in code fences, prefix it with prose or append
//! commentary. These helpers recover the first balanced JSON value and
//! return `None` instead of an error when nothing parses.

use serde_json::Value;

/// First top-level JSON object or array in `text`.
///
/// Code-fence markers are removed, scanning starts at the first `{` or
/// `[`, and brackets inside string literals are ignored while balancing.
pub fn extract_first_json(text: &str) -> Option<Value> {
    let cleaned = text.replace("```", "");
    let start = cleaned.find(['{', '['])?;
    let candidate = &cleaned[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in candidate.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return serde_json::from_str(&candidate[..idx + c.len_utf8()]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Unwrap an Ollama `/api/generate` body (`{"response": "...", ...}`).
///
/// Anything that is not such an envelope is returned unchanged.
pub fn unwrap_response_envelope(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => match map.get("response") {
            Some(Value::String(inner)) => inner.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}
