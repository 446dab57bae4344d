//! Error chain rendering
//!
//! HTTP client errors wrap their interesting cause several levels deep
//! ("error sending request" → "connection refused"). Results handed back to
//! operators carry a single line, so chains are flattened here.

use std::error::Error as StdError;

/// Render an error and all of its sources on one line, separated by `: `
///
/// Consecutive duplicate messages are collapsed.
pub fn describe_chain(error: &dyn StdError) -> String {
    let mut parts: Vec<String> = vec![error.to_string()];
    let mut current = error.source();

    while let Some(source) = current {
        let message = source.to_string();
        if parts.last() != Some(&message) {
            parts.push(message);
        }
        current = source.source();
    }

    parts.join(": ")
}
