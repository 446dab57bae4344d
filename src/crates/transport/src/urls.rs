//! Request URL assembly

use definitions::template::{substitute_segment, VERSION_PLACEHOLDER};
use definitions::{scalar_to_string, ModuleError, Result};
use serde_json::{Map, Value};
use url::Url;

/// Join a URL template onto `base`, binding placeholders and query values
///
/// Each template segment is percent-encoded after substitution, so path
/// values containing `/` stay within their segment. Array query values are
/// sent as repeated keys.
pub fn build_url(
    base: &Url,
    template: &str,
    version: &str,
    path: &Map<String, Value>,
    query: &Map<String, Value>,
) -> Result<Url> {
    let (template_path, template_query) = match template.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (template, None),
    };

    let mut segments = Vec::new();
    let mut missing = Vec::new();
    for segment in template_path.split('/').filter(|s| !s.is_empty()) {
        let (rendered, unresolved) = substitute_segment(segment, |name| {
            if name == VERSION_PLACEHOLDER {
                Some(version.to_string())
            } else {
                path.get(name).map(scalar_to_string)
            }
        });
        missing.extend(unresolved);
        segments.push(rendered);
    }
    if !missing.is_empty() {
        return Err(ModuleError::missing_required(template, &missing));
    }

    let mut url = base.clone();
    {
        let mut path_segments = url
            .path_segments_mut()
            .map_err(|_| ModuleError::transport(format!("cannot use {} as a base URL", base)))?;
        path_segments.pop_if_empty();
        path_segments.extend(segments.iter());
    }

    if let Some(raw) = template_query {
        url.set_query(Some(raw));
    }
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.append_pair(name, &scalar_to_string(item));
                    }
                }
                other => {
                    pairs.append_pair(name, &scalar_to_string(other));
                }
            }
        }
    }

    Ok(url)
}

/// Resolve a controller-supplied URL, which may be absolute or base-relative
pub fn resolve(base: &Url, location: &str) -> Result<Url> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Url::parse(location)
            .map_err(|e| ModuleError::transport(format!("invalid URL {}: {}", location, e)));
    }
    build_url(base, location, "", &Map::new(), &Map::new())
}
