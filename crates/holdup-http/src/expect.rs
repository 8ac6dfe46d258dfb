//! Response expectation helpers: body excerpts, JSON paths, header
//! expressions.

use serde_json::Value;

/// Longest body excerpt embedded in error details.
pub const BODY_EXCERPT_LIMIT: usize = 50;

/// Truncate `body` to at most `limit` characters, ellipsized.
///
/// Cuts on character boundaries so multi-byte content never produces a
/// broken excerpt.
pub fn truncate_body(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }

    let keep = if limit > 3 { limit - 3 } else { limit };
    let truncated: String = body.chars().take(keep).collect();
    format!("{truncated}...")
}

/// Whether `path` resolves to an existing value in `body` parsed as JSON.
///
/// Paths are dot-separated object keys with numeric segments indexing
/// arrays, e.g. `status.ready` or `items.0.name`. An unparseable body or
/// a dangling path both count as "does not match".
pub fn json_path_exists(body: &str, path: &str) -> bool {
    let Ok(root) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    if path.is_empty() {
        return false;
    }

    let mut current = &root;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return false,
            },
            Value::Array(items) => {
                match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
            _ => return false,
        }
    }
    true
}

/// A parsed `expectHeader` expression: `Name` (presence) or
/// `Name=regex` (presence and value match).
#[derive(Debug, PartialEq, Eq)]
pub struct HeaderExpectation<'a> {
    pub name: &'a str,
    pub value_pattern: Option<&'a str>,
}

impl<'a> HeaderExpectation<'a> {
    pub fn parse(expression: &'a str) -> Self {
        match expression.split_once('=') {
            Some((name, pattern)) => Self {
                name,
                value_pattern: Some(pattern),
            },
            None => Self {
                name: expression,
                value_pattern: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(truncate_body("ok", 50), "ok");
        assert_eq!(truncate_body("", 50), "");
    }

    #[test]
    fn long_bodies_are_ellipsized_within_limit() {
        let body = "a".repeat(80);
        let excerpt = truncate_body(&body, 50);
        assert_eq!(excerpt.len(), 50);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "é".repeat(60);
        let excerpt = truncate_body(&body, 50);
        assert_eq!(excerpt.chars().count(), 50);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn json_path_resolves_nested_objects() {
        let body = r#"{"status":{"ready":true}}"#;
        assert!(json_path_exists(body, "status"));
        assert!(json_path_exists(body, "status.ready"));
        assert!(!json_path_exists(body, "status.missing"));
    }

    #[test]
    fn json_path_indexes_arrays() {
        let body = r#"{"items":[{"name":"a"},{"name":"b"}]}"#;
        assert!(json_path_exists(body, "items.0.name"));
        assert!(json_path_exists(body, "items.1"));
        assert!(!json_path_exists(body, "items.2"));
        assert!(!json_path_exists(body, "items.x"));
    }

    #[test]
    fn json_path_rejects_invalid_bodies() {
        assert!(!json_path_exists("<html>", "status"));
        assert!(!json_path_exists(r#"{"a":1}"#, ""));
    }

    #[test]
    fn header_expression_presence_only() {
        let parsed = HeaderExpectation::parse("Content-Type");
        assert_eq!(parsed.name, "Content-Type");
        assert_eq!(parsed.value_pattern, None);
    }

    #[test]
    fn header_expression_with_value_pattern() {
        let parsed = HeaderExpectation::parse("Content-Type=application/(json|xml)");
        assert_eq!(parsed.name, "Content-Type");
        assert_eq!(parsed.value_pattern, Some("application/(json|xml)"));
    }

    #[test]
    fn header_expression_splits_on_first_equals() {
        let parsed = HeaderExpectation::parse("X-Token=a=b");
        assert_eq!(parsed.name, "X-Token");
        assert_eq!(parsed.value_pattern, Some("a=b"));
    }
}
