//! Prefixed environment variable access

use crate::{Result, ToolingError};
use std::collections::HashMap;
use std::str::FromStr;

/// Build a prefixed environment variable name
///
/// ```rust
/// use tooling::config::build_env_key;
///
/// assert_eq!(build_env_key("NETCTL_", "poll_interval"), "NETCTL_POLL_INTERVAL");
/// ```
pub fn build_env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}

/// Parse a boolean the way operators tend to write them
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A source of prefixed configuration variables
///
/// Backed either by the process environment or by an explicit map, which
/// keeps tests independent of global state.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    overrides: Option<HashMap<String, String>>,
}

impl EnvSource {
    /// Read from the process environment
    pub fn process(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: None,
        }
    }

    /// Read from the given pairs only; keys are full variable names
    pub fn from_pairs<I, K, V>(prefix: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            overrides: Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// The prefix applied to every name
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Raw string value for `name`, if set
    pub fn string(&self, name: &str) -> Result<Option<String>> {
        let key = build_env_key(&self.prefix, name);

        if let Some(map) = &self.overrides {
            return Ok(map.get(&key).cloned());
        }

        match std::env::var(&key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ToolingError::InvalidValue {
                key,
                reason: "contains invalid UTF-8".to_string(),
            }),
        }
    }

    /// Parsed value for `name`, if set
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(name)? {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ToolingError::InvalidValue {
                    key: build_env_key(&self.prefix, name),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Boolean value for `name`, if set
    pub fn flag(&self, name: &str) -> Result<Option<bool>> {
        match self.string(name)? {
            Some(raw) => parse_flag(&raw).map(Some).ok_or_else(|| {
                ToolingError::InvalidValue {
                    key: build_env_key(&self.prefix, name),
                    reason: format!("'{}' is not a boolean", raw),
                }
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> EnvSource {
        EnvSource::from_pairs(
            "NETCTL_",
            [
                ("NETCTL_HOST", "dnac.example.net"),
                ("NETCTL_PORT", "8443"),
                ("NETCTL_BAD_PORT", "eighty"),
                ("NETCTL_VERIFY", "off"),
                ("NETCTL_DEBUG", "maybe"),
            ],
        )
    }

    #[test]
    fn test_build_env_key() {
        assert_eq!(build_env_key("NETCTL_", "host"), "NETCTL_HOST");
        assert_eq!(build_env_key("", "debug"), "DEBUG");
    }

    #[test]
    fn test_parse_flag() {
        for (raw, expected) in [
            ("true", true),
            ("YES", true),
            ("1", true),
            ("On", true),
            ("false", false),
            ("no", false),
            ("0", false),
            (" off ", false),
        ] {
            assert_eq!(parse_flag(raw), Some(expected), "value: {}", raw);
        }
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_string_lookup() {
        let env = source();
        assert_eq!(
            env.string("host").unwrap(),
            Some("dnac.example.net".to_string())
        );
        assert_eq!(env.string("username").unwrap(), None);
    }

    #[test]
    fn test_parse_lookup() {
        let env = source();
        assert_eq!(env.parse::<u16>("port").unwrap(), Some(8443));
        assert_eq!(env.parse::<u16>("missing").unwrap(), None);

        let err = env.parse::<u16>("bad_port").unwrap_err();
        assert!(err.to_string().contains("NETCTL_BAD_PORT"));
    }

    #[test]
    fn test_flag_lookup() {
        let env = source();
        assert_eq!(env.flag("verify").unwrap(), Some(false));
        assert!(env.flag("debug").is_err());
        assert_eq!(env.flag("missing").unwrap(), None);
    }

    #[test]
    fn test_process_source_missing_var() {
        let env = EnvSource::process("NETCTL_TEST_UNSET_12345_");
        assert_eq!(env.string("anything").unwrap(), None);
    }
}
