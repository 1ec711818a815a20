//! Ordered pattern matching with named capture groups

use std::collections::HashMap;

use regex::Regex;

/// Capture groups every transaction pattern must define
pub const REQUIRED_FIELDS: [&str; 4] = ["type", "value", "place", "account"];

/// A pattern paired with the value it stands for
#[derive(Debug)]
pub struct Rule<V> {
    pub pattern: Regex,
    pub value: V,
}

impl<V> Rule<V> {
    pub fn new(pattern: Regex, value: V) -> Self {
        Self { pattern, value }
    }
}

/// First rule, in list order, whose pattern matches `text`
///
/// List order is priority: more specific patterns must come before the
/// broader ones they overlap with.
pub fn first_match<'a, V>(rules: &'a [Rule<V>], text: &str) -> Option<&'a Rule<V>> {
    rules.iter().find(|rule| rule.pattern.is_match(text))
}

/// Named groups captured by `pattern` on its first match in `text`
///
/// Groups that did not take part in the match are left out.
pub fn extract_fields(pattern: &Regex, text: &str) -> HashMap<String, String> {
    let Some(captures) = pattern.captures(text) else {
        return HashMap::new();
    };

    pattern
        .capture_names()
        .flatten()
        .filter_map(|name| {
            captures
                .name(name)
                .map(|m| (name.to_string(), m.as_str().to_string()))
        })
        .collect()
}

/// Required fields absent from `fields`, in [`REQUIRED_FIELDS`] order
pub fn missing_fields(fields: &HashMap<String, String>) -> Vec<String> {
    REQUIRED_FIELDS
        .iter()
        .filter(|field| !fields.contains_key(**field))
        .map(|field| field.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<Rule<&'static str>> {
        vec![
            Rule::new(Regex::new(r"paid (?P<value>\d+) at (?P<place>\w+)").unwrap(), "specific"),
            Rule::new(Regex::new(r"paid (?P<value>\d+)").unwrap(), "general"),
        ]
    }

    #[test]
    fn test_first_match_respects_order() {
        let rules = rules();

        assert_eq!(first_match(&rules, "paid 10 at shop").map(|r| r.value), Some("specific"));
        assert_eq!(first_match(&rules, "paid 10").map(|r| r.value), Some("general"));
        assert!(first_match(&rules, "refund 10").is_none());
    }

    #[test]
    fn test_extract_fields() {
        let rules = rules();
        let fields = extract_fields(&rules[0].pattern, "we paid 10 at shop today");

        assert_eq!(fields.get("value").map(String::as_str), Some("10"));
        assert_eq!(fields.get("place").map(String::as_str), Some("shop"));
    }

    #[test]
    fn test_extract_fields_skips_unmatched_optional_group() {
        let pattern = Regex::new(r"paid (?P<value>\d+)(?: at (?P<place>\w+))?").unwrap();
        let fields = extract_fields(&pattern, "paid 10");

        assert_eq!(fields.len(), 1);
        assert!(!fields.contains_key("place"));
    }

    #[test]
    fn test_missing_fields() {
        let rules = rules();
        let fields = extract_fields(&rules[0].pattern, "paid 10 at shop");

        assert_eq!(missing_fields(&fields), vec!["type", "account"]);
    }
}
