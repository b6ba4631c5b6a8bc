/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a model reply.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Slice out the outermost `{ ... }` span of a reply that wraps its JSON in
/// prose ("Sure! Here is the result: {...}"). Returns `None` when the reply
/// has no brace pair.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_multibyte_chars() {
        let text = "Müller Straße";
        let truncated = truncate_to_char_boundary(text, 2);
        assert_eq!(truncated, "M");
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn truncate_within_bounds_is_identity() {
        assert_eq!(truncate_to_char_boundary("Hello", 100), "Hello");
    }

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  {}  "), "{}");
    }

    #[test]
    fn extracts_object_from_prose() {
        let reply = "Here you go: {\"action\": \"accept\"} hope that helps";
        assert_eq!(extract_json_object(reply), Some("{\"action\": \"accept\"}"));
    }

    #[test]
    fn no_object_in_plain_text() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
