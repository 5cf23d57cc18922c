//! Extraction of a JSON object from decorated scoring-service output.
//!
//! Models wrap JSON in prose, markdown fences, or apologies. This module
//! pulls out the first top-level balanced `{...}` span and nothing more;
//! whether the span is *valid* JSON is the caller's problem.

/// No top-level balanced `{...}` span exists in the text.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("no JSON object found in response text")]
pub struct NoJsonFound;

/// Return the first top-level balanced `{...}` span in `text`.
///
/// Brace depth is tracked outside string literals only, and string literals
/// honor backslash escapes, so `{"a": "}"}` and `{"a": "\" {"}` both come
/// back whole. An opener that never balances is skipped and the scan resumes
/// at the next `{`.
pub fn extract_json_object(text: &str) -> Result<&str, NoJsonFound> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('{') {
        let start = search_from + rel;
        if let Some(len) = balanced_span_len(&text[start..]) {
            return Ok(&text[start..start + len]);
        }
        search_from = start + 1;
    }
    Err(NoJsonFound)
}

/// Byte length of the balanced span starting at the `{` at offset 0, or
/// `None` if the input ends before the braces balance.
fn balanced_span_len(s: &str) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    // '}' is a single byte
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
