//! Extraction of the JSON payload from raw model output.

/// Strip a surrounding markdown code fence (```json or ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line.
    match body.split_once('\n') {
        Some((info, payload)) if !info.trim_start().starts_with(['{', '[']) => payload.trim(),
        _ => body.trim(),
    }
}
