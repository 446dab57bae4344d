//! Configuration loading helpers
//!
//! Connection settings can come from the process environment under a common
//! prefix. `EnvSource` reads them with typed accessors and reports malformed
//! values as errors instead of silently falling back to defaults.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::config::EnvSource;
//!
//! let env = EnvSource::process("NETCTL_");
//! let host = env.string("host")?;          // NETCTL_HOST
//! let port: Option<u16> = env.parse("port")?;
//! let verify = env.flag("verify")?.unwrap_or(true);
//! ```

mod env;

pub use env::{build_env_key, parse_flag, EnvSource};
