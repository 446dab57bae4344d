//! Logging helpers
//!
//! Request/response traces end up both in `tracing` output and, with
//! `debug` enabled, in task results that operators paste into tickets.
//! Everything passes through [`redact`] first.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

fn redaction_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)(x-auth-token)(\s*[:=]\s*)[^\s,;}]+", "$1$2[REDACTED]"),
            (r"(?i)(authorization\s*[:=]\s*)(basic|bearer)\s+\S+", "$1$2 [REDACTED]"),
            (r#"(?i)("(?:token|password|secret)"\s*:\s*)"[^"]*""#, "$1\"[REDACTED]\""),
            (r"(?i)\b(password|passwd|secret)(\s*[:=]\s*)[^\s,;}]+", "$1$2[REDACTED]"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Scrub credentials from a string destined for logs or diagnostics
///
/// ```rust
/// use tooling::logging::redact;
///
/// let line = r#"POST /auth/token -> 200 {"Token":"eyJhbGciOi"}"#;
/// let clean = redact(line);
/// assert!(clean.contains("[REDACTED]"));
/// assert!(!clean.contains("eyJhbGciOi"));
/// ```
pub fn redact(input: &str) -> String {
    let mut result = input.to_string();
    for (re, replacement) in redaction_rules() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Truncate a body for a diagnostic line, marking the cut
pub fn truncate_for_log(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let kept: String = body.chars().take(limit).collect();
    format!("{}... ({} bytes total)", kept, body.len())
}

/// Format duration in human-readable form
///
/// ```rust
/// use tooling::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", micros / 1000)
    } else if micros < 60_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else {
        let seconds = micros / 1_000_000;
        format!("{}m{}s", seconds / 60, seconds % 60)
    }
}
