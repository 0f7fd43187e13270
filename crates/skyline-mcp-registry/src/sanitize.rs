//! Tool-name sanitisation.
//!
//! Clients address tools by name, so names must stay within the safe
//! character set `[a-zA-Z0-9_-]` and a reasonable length.

use sha2::{Digest, Sha256};

/// Maximum length of a tool name.
const MAX_TOOL_NAME_LEN: usize = 64;

/// Map an arbitrary identifier into the tool-name character set.
///
/// Invalid characters become underscores, runs of underscores collapse, and
/// over-long names are truncated with a short hash suffix so distinct inputs
/// stay distinct.
pub fn sanitize_tool_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    let name = if trimmed.is_empty() {
        "tool".to_string()
    } else {
        trimmed.to_string()
    };
    if name.len() <= MAX_TOOL_NAME_LEN {
        return name;
    }
    let suffix = short_hash(raw);
    let keep = MAX_TOOL_NAME_LEN - suffix.len() - 1;
    let head: String = name.chars().take(keep).collect();
    format!("{head}_{suffix}")
}

/// First six hex characters of the SHA-256 of the input.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest
        .iter()
        .take(3)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Derive a tool name from an API name and an operation identifier.
pub fn tool_name(api_name: &str, operation_id: &str) -> String {
    sanitize_tool_name(&format!("{api_name}_{operation_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("listPets", "listPets")]
    #[case("get /pets/{id}", "get_pets_id")]
    #[case("a..b::c", "a_b_c")]
    #[case("__wrapped__", "wrapped")]
    fn sanitizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_tool_name(input), expected);
    }

    #[test]
    fn long_names_get_hash_suffix() {
        let long = "x".repeat(200);
        let name = sanitize_tool_name(&long);
        assert!(name.len() <= MAX_TOOL_NAME_LEN);
        assert_ne!(name, sanitize_tool_name(&"y".repeat(200)));
    }

    #[test]
    fn tool_name_joins_api_and_id() {
        assert_eq!(tool_name("petstore", "listPets"), "petstore_listPets");
    }

    #[test]
    fn short_hash_is_stable() {
        assert_eq!(short_hash("abc"), short_hash("abc"));
        assert_eq!(short_hash("abc").len(), 6);
    }
}
