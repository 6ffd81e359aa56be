//! Identifier sanitizer
//!
//! Turns arbitrary CSV header text into valid, unique staging-table column
//! identifiers. Deterministic; never yields a duplicate within one header.

/// Maximum identifier length accepted by the target schema.
pub const MAX_IDENTIFIER_LEN: usize = 30;

/// Sanitize one raw header into a schema-safe identifier, unique against
/// `used`.
///
/// Uppercases, collapses every run of non-alphanumeric characters into a
/// single underscore, strips leading/trailing underscores, prefixes `C_`
/// when the result is empty or does not start with a letter, truncates to
/// [`MAX_IDENTIFIER_LEN`], and appends `_01`, `_02`, ... on collision.
pub fn sanitize_identifier(raw: &str, used: &[String]) -> String {
    let upper = raw.trim().to_uppercase();

    let mut s = String::with_capacity(upper.len());
    let mut last_was_sep = false;
    for ch in upper.chars() {
        if ch.is_ascii_alphanumeric() {
            s.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            s.push('_');
            last_was_sep = true;
        }
    }
    let mut s = s.trim_matches('_').to_string();

    if s.is_empty() || !s.starts_with(|c: char| c.is_ascii_alphabetic()) {
        s = format!("C_{}", s);
    }

    s.truncate(MAX_IDENTIFIER_LEN);
    if s == "C_" {
        s = "C_COL".to_string();
    }

    let base = s.clone();
    let mut i = 1;
    while used.iter().any(|u| u == &s) {
        let suffix = format!("_{:02}", i);
        let keep = MAX_IDENTIFIER_LEN - suffix.len();
        s = format!("{}{}", &base[..base.len().min(keep)], suffix);
        i += 1;
    }

    s
}

/// Sanitize a whole header, producing one unique identifier per column.
pub fn sanitize_header(header: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(header.len());
    for raw in header {
        let name = sanitize_identifier(raw, &out);
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(raw: &str) -> String {
        sanitize_identifier(raw, &[])
    }

    #[test]
    fn test_basic_uppercase_and_separators() {
        assert_eq!(one("a-b"), "A_B");
        assert_eq!(one("  charging id  "), "CHARGING_ID");
        assert_eq!(one("a--//b"), "A_B");
    }

    #[test]
    fn test_leading_trailing_underscores_stripped() {
        assert_eq!(one("__x__"), "X");
        assert_eq!(one("-x-"), "X");
    }

    #[test]
    fn test_non_letter_start_prefixed() {
        assert_eq!(one("1x"), "C_1X");
        assert_eq!(one("9"), "C_9");
    }

    #[test]
    fn test_empty_becomes_placeholder() {
        assert_eq!(one(""), "C_COL");
        assert_eq!(one("---"), "C_COL");
    }

    #[test]
    fn test_truncation() {
        let long = "X".repeat(50);
        assert_eq!(one(&long).len(), MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn test_collision_suffix() {
        let used = vec!["A_B".to_string()];
        assert_eq!(sanitize_identifier("A-B", &used), "A_B_01");

        let used = vec!["A_B".to_string(), "A_B_01".to_string()];
        assert_eq!(sanitize_identifier("A.B", &used), "A_B_02");
    }

    #[test]
    fn test_collision_suffix_respects_limit() {
        let long = "X".repeat(40);
        let first = one(&long);
        let second = sanitize_identifier(&long, std::slice::from_ref(&first));
        assert_eq!(second.len(), MAX_IDENTIFIER_LEN);
        assert!(second.ends_with("_01"));
    }

    #[test]
    fn test_header_scenario() {
        let header: Vec<String> = ["A-B", "A_B", "1x"].iter().map(|s| s.to_string()).collect();
        let out = sanitize_header(&header);
        assert_eq!(out[0], "A_B");
        assert_eq!(out[1], "A_B_01");
        assert_eq!(out[2], "C_1X");
        assert!(out.iter().all(|c| c.len() <= MAX_IDENTIFIER_LEN));
        let unique: std::collections::HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), out.len());
    }
}
