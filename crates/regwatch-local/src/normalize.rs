//! Best-effort isolation of a JSON object inside free-form oracle text.
//!
//! Oracles are asked for JSON-only answers and routinely ignore that:
//! markdown fences, citations, and prose around the object are all common.
//! This module is total: it always returns *a* string for the next stage
//! to attempt, never an error.

/// Pick the best single JSON-looking candidate substring.
///
/// Priority:
/// 1. content of a ```json fenced block
/// 2. content of any fenced block
/// 3. first balanced `{...}` span (string/escape aware)
/// 4. the trimmed input, unchanged
pub fn extract_json_candidate(text: &str) -> String {
    if let Some(inner) = fenced_block(text, "```json") {
        return inner;
    }
    if let Some(inner) = fenced_block(text, "```") {
        return inner;
    }
    if let Some(span) = balanced_object_span(text) {
        return span.trim().to_string();
    }
    text.trim().to_string()
}

fn fenced_block(text: &str, opener: &str) -> Option<String> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    // Skip the remainder of the fence line (e.g. "```json\n").
    let rest = match rest.find('\n') {
        Some(nl) if opener == "```json" || rest[..nl].trim().is_empty() => &rest[nl + 1..],
        _ => rest,
    };
    let end = rest.find("```")?;
    let inner = rest[..end].trim();
    (!inner.is_empty()).then(|| inner.to_string())
}

/// Find the first balanced brace-delimited span, honoring JSON string
/// literals and escapes so braces inside values do not unbalance the scan.
pub(crate) fn balanced_object_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let open = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
