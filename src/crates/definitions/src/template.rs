//! URL template placeholders
//!
//! Templates look like `/dna/intent/api/{version}/site/{site_id}`. The
//! `{version}` placeholder is bound from connection configuration; every
//! other placeholder names a path parameter.

use regex::Regex;
use std::sync::OnceLock;

/// Placeholder bound from the connection's API version rather than arguments
pub const VERSION_PLACEHOLDER: &str = "version";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Parameter names referenced by a template, excluding `{version}`
pub fn path_parameters(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for captures in placeholder_pattern().captures_iter(template) {
        let name = &captures[1];
        if name != VERSION_PLACEHOLDER && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace each `{name}` in one path segment using `lookup`
///
/// Returns the names `lookup` could not resolve.
pub fn substitute_segment<F>(segment: &str, mut lookup: F) -> (String, Vec<String>)
where
    F: FnMut(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    let rendered = placeholder_pattern()
        .replace_all(segment, |captures: &regex::Captures<'_>| {
            let name = &captures[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        })
        .into_owned();
    (rendered, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parameters() {
        assert_eq!(
            path_parameters("/dna/intent/api/{version}/site/{site_id}/device/{device_id}"),
            vec!["site_id".to_string(), "device_id".to_string()]
        );
        assert!(path_parameters("/dna/intent/api/v1/tag").is_empty());
    }

    #[test]
    fn test_path_parameters_deduplicates() {
        assert_eq!(path_parameters("/a/{id}/b/{id}"), vec!["id".to_string()]);
    }

    #[test]
    fn test_substitute_segment() {
        let (rendered, missing) = substitute_segment("{id}.json", |name| {
            (name == "id").then(|| "42".to_string())
        });
        assert_eq!(rendered, "42.json");
        assert!(missing.is_empty());

        let (_, missing) = substitute_segment("{other}", |_| None);
        assert_eq!(missing, vec!["other".to_string()]);
    }
}
