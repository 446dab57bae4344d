//! Connection configuration
//!
//! Loaded from a JSON/YAML document, from `NETCTL_*` environment variables,
//! or built in code. Durations are whole seconds, matching how operators
//! write them in inventories.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tooling::async_utils::retry::RetryPolicy;
use tooling::config::EnvSource;
use tooling::ToolingError;
use url::Url;

/// Default prefix for environment variables
pub const ENV_PREFIX: &str = "NETCTL_";

/// Errors raised while loading or checking configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Env(#[from] ToolingError),

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
}

impl From<ConfigError> for definitions::ModuleError {
    fn from(err: ConfigError) -> Self {
        definitions::ModuleError::transport(format!("connection configuration: {}", err))
    }
}

/// Everything needed to reach and authenticate against one controller
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host name or address; may carry a scheme and port (`http://127.0.0.1:8080`)
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Verify the controller's TLS certificate
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Value bound to `{version}` in URL templates
    #[serde(default = "default_version")]
    pub version: String,

    /// Copy redacted request/response traces into task diagnostics
    #[serde(default)]
    pub debug: bool,

    /// Per-task deadline in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between long-running task polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Ceiling in seconds for polling one long-running task
    #[serde(default = "default_poll_deadline")]
    pub poll_deadline: u64,

    #[serde(default = "default_auth_path")]
    pub auth_path: String,

    /// Body field (or header) carrying the issued token
    #[serde(default = "default_token_field")]
    pub token_field: String,

    /// Seconds after which a cached token is refreshed before use
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Re-read after an update and fail on remaining differences
    #[serde(default = "default_true")]
    pub verify_writes: bool,

    /// Status template for `taskId` responses without a URL
    #[serde(default = "default_task_status_path")]
    pub task_status_path: String,

    /// Status template for `executionId` responses without a URL
    #[serde(default = "default_execution_status_path")]
    pub execution_status_path: String,
}

fn default_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_deadline() -> u64 {
    600
}

fn default_auth_path() -> String {
    "/dna/system/api/v1/auth/token".to_string()
}

fn default_token_field() -> String {
    "Token".to_string()
}

fn default_token_ttl() -> u64 {
    3300
}

fn default_user_agent() -> String {
    format!("netctl/{}", tooling::version())
}

fn default_task_status_path() -> String {
    "/dna/intent/api/v1/task/{id}".to_string()
}

fn default_execution_status_path() -> String {
    "/dna/platform/management/business-api/v1/execution-status/{id}".to_string()
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("verify", &self.verify)
            .field("version", &self.version)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// Configuration with defaults for everything but the essentials
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: password.into(),
            verify: true,
            version: default_version(),
            debug: false,
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            poll_interval: default_poll_interval(),
            poll_deadline: default_poll_deadline(),
            auth_path: default_auth_path(),
            token_field: default_token_field(),
            token_ttl: default_token_ttl(),
            user_agent: default_user_agent(),
            verify_writes: true,
            task_status_path: default_task_status_path(),
            execution_status_path: default_execution_status_path(),
        }
    }

    /// Load from `NETCTL_*` process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_source(&EnvSource::process(ENV_PREFIX))
    }

    /// Load from an explicit environment source
    ///
    /// `host` is mandatory; everything else falls back to defaults.
    pub fn from_env_source(env: &EnvSource) -> Result<Self, ConfigError> {
        let host = env.string("host")?.ok_or(ConfigError::Missing("host"))?;
        let mut config = Self::new(
            host,
            env.string("username")?.unwrap_or_default(),
            env.string("password")?.unwrap_or_default(),
        );

        if let Some(port) = env.parse("port")? {
            config.port = port;
        }
        if let Some(verify) = env.flag("verify")? {
            config.verify = verify;
        }
        if let Some(version) = env.string("version")? {
            config.version = version;
        }
        if let Some(debug) = env.flag("debug")? {
            config.debug = debug;
        }
        if let Some(timeout) = env.parse("timeout")? {
            config.timeout = timeout;
        }
        if let Some(max_retries) = env.parse("max_retries")? {
            config.max_retries = max_retries;
        }
        if let Some(interval) = env.parse("poll_interval")? {
            config.poll_interval = interval;
        }
        if let Some(deadline) = env.parse("poll_deadline")? {
            config.poll_deadline = deadline;
        }
        if let Some(path) = env.string("auth_path")? {
            config.auth_path = path;
        }
        if let Some(field) = env.string("token_field")? {
            config.token_field = field;
        }
        if let Some(ttl) = env.parse("token_ttl")? {
            config.token_ttl = ttl;
        }
        if let Some(agent) = env.string("user_agent")? {
            config.user_agent = agent;
        }
        if let Some(verify_writes) = env.flag("verify_writes")? {
            config.verify_writes = verify_writes;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON or YAML file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let read_error = |reason: String| ConfigError::Read {
            path: path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| read_error(e.to_string()))?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| read_error(e.to_string()))?
            }
            _ => serde_json::from_str(&content).map_err(|e| read_error(e.to_string()))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval must be at least one second".to_string(),
            ));
        }
        self.base_url()?;
        Ok(())
    }

    /// Controller root URL
    ///
    /// A bare host becomes `https://host:port`. A host that already carries
    /// a scheme is used as given, including its port.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let host = self.host.trim().trim_end_matches('/');
        let raw = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}:{}", host, self.port)
        };
        Url::parse(&raw).map_err(|e| ConfigError::Invalid(format!("host {}: {}", self.host, e)))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn poll_deadline_duration(&self) -> Duration {
        Duration::from_secs(self.poll_deadline)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_ttl)
    }

    /// Backoff for transient failures, capped by `max_retries`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("dnac.example.com", "admin", "secret");

        assert_eq!(config.port, 443);
        assert!(config.verify);
        assert_eq!(config.task_timeout(), Duration::from_secs(600));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.poll_interval_duration(), Duration::from_secs(2));
        assert_eq!(config.poll_deadline_duration(), Duration::from_secs(600));
        assert_eq!(config.token_field, "Token");
        assert!(config.verify_writes);
    }

    #[test]
    fn test_base_url() {
        let config = ConnectionConfig::new("dnac.example.com", "admin", "secret");
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://dnac.example.com/"
        );

        let mut custom = config.clone();
        custom.port = 8443;
        assert_eq!(
            custom.base_url().unwrap().as_str(),
            "https://dnac.example.com:8443/"
        );

        let explicit = ConnectionConfig::new("http://127.0.0.1:9000/", "a", "b");
        assert_eq!(explicit.base_url().unwrap().as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_from_env_source() {
        let env = EnvSource::from_pairs(
            ENV_PREFIX,
            [
                ("NETCTL_HOST", "10.0.0.1"),
                ("NETCTL_USERNAME", "admin"),
                ("NETCTL_PASSWORD", "pw"),
                ("NETCTL_PORT", "8443"),
                ("NETCTL_VERIFY", "no"),
                ("NETCTL_DEBUG", "on"),
                ("NETCTL_POLL_INTERVAL", "5"),
            ],
        );

        let config = ConnectionConfig::from_env_source(&env).unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 8443);
        assert!(!config.verify);
        assert!(config.debug);
        assert_eq!(config.poll_interval, 5);
        assert_eq!(config.timeout, 600);
    }

    #[test]
    fn test_from_env_requires_host() {
        let env = EnvSource::from_pairs(ENV_PREFIX, [("NETCTL_USERNAME", "admin")]);
        assert!(matches!(
            ConnectionConfig::from_env_source(&env),
            Err(ConfigError::Missing("host"))
        ));
    }

    #[test]
    fn test_from_env_rejects_bad_number() {
        let env = EnvSource::from_pairs(
            ENV_PREFIX,
            [("NETCTL_HOST", "h"), ("NETCTL_PORT", "https")],
        );
        assert!(matches!(
            ConnectionConfig::from_env_source(&env),
            Err(ConfigError::Env(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = ConnectionConfig::new("h", "u", "p");
        assert!(config.validate().is_ok());

        config.poll_interval = 0;
        assert!(config.validate().is_err());

        config.poll_interval = 2;
        config.port = 0;
        assert!(config.validate().is_err());

        let empty = ConnectionConfig::new("  ", "u", "p");
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "host: dnac.example.com\nusername: admin\npassword: pw\nversion: v2\nverify: false").unwrap();

        let config = ConnectionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.version, "v2");
        assert!(!config.verify);
        assert_eq!(config.port, 443);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::new("h", "admin", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("admin"));
    }
}
