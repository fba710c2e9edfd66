//! Configuration loading and validation.
//!
//! The service reads its YAML configuration exactly once at startup.
//! The raw file schema is deserialized into [`Config`] and validated
//! into a [`RuntimeConfig`]; nothing downstream ever re-reads the file
//! or re-checks a parameter.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use hyper::header::HeaderName;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default socket address the service binds to.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8100";

/// Default header carrying the trusted client identity.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-real-ip";

/// Raw configuration as deserialized from the YAML file.
///
/// The `rate_limit` block is required in full: admission parameters have
/// no assumed defaults, so a missing field is a load error rather than a
/// silently chosen limit.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Socket address the service listens on (default `"127.0.0.1:8100"`).
    #[serde(default)]
    pub listen: Option<String>,
    /// Header whose value identifies the client (default `"x-real-ip"`).
    /// The value is treated as an opaque, trusted string.
    #[serde(default)]
    pub identity_header: Option<String>,
    /// Admission parameters. All fields required.
    pub rate_limit: RateLimitSettings,
}

/// Per-client admission parameters, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSettings {
    /// Tokens regenerated per second for each client bucket. Must be > 0.
    pub refill_per_second: f64,
    /// Maximum burst size (bucket capacity). Must be >= 1.
    pub burst: u32,
    /// Interval between sweeper passes, in milliseconds. Must be > 0.
    pub sweep_interval_ms: u64,
    /// Idle time after which a visitor is evicted, in milliseconds.
    /// Must be > 0.
    pub stale_expiry_ms: u64,
    /// When `false`, the limiter is bypassed and every request forwards.
    pub active: bool,
}

impl RateLimitSettings {
    /// Interval between sweeper passes.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Idle time after which a visitor is evicted.
    pub fn stale_expiry(&self) -> Duration {
        Duration::from_millis(self.stale_expiry_ms)
    }
}

/// Fully validated, ready-to-use configuration.
///
/// Created once at startup. The admission parameters themselves are
/// validated by [`crate::AdmissionGate::new`], which owns the limiter's
/// construction contract.
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Socket address the service binds to.
    pub listen: SocketAddr,
    /// Validated identity header name.
    pub identity_header: HeaderName,
    /// Admission parameters.
    pub rate_limit: RateLimitSettings,
}

impl Config {
    /// Loads configuration from a YAML file at the given path.
    ///
    /// Returns an [`Error::Config`] if the file cannot be opened or its
    /// contents fail YAML deserialization.
    pub fn load_from_file(file_path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let contents = std::fs::read_to_string(file_path).map_err(|e| {
            Error::Config(format!(
                "failed to open {}: {e}",
                file_path.as_ref().display()
            ))
        })?;

        Self::from_yaml(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    /// Validates addresses and names, producing a [`RuntimeConfig`].
    pub fn into_runtime(self) -> Result<RuntimeConfig> {
        let listen_str = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        let listen = listen_str.parse::<SocketAddr>().map_err(|e| {
            Error::Config(format!("invalid listen address \"{listen_str}\": {e}"))
        })?;

        let header_str = self
            .identity_header
            .as_deref()
            .unwrap_or(DEFAULT_IDENTITY_HEADER);
        let identity_header = HeaderName::from_bytes(header_str.as_bytes()).map_err(|e| {
            Error::Config(format!("invalid identity header \"{header_str}\": {e}"))
        })?;

        Ok(RuntimeConfig {
            listen,
            identity_header,
            rate_limit: self.rate_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
listen: "0.0.0.0:9090"
identity_header: "x-client-id"
rate_limit:
  refill_per_second: 2.0
  burst: 3
  sweep_interval_ms: 1000
  stale_expiry_ms: 2000
  active: true
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(FULL_CONFIG).expect("config should parse");

        assert_eq!(config.listen, Some("0.0.0.0:9090".into()));
        assert_eq!(config.identity_header, Some("x-client-id".into()));
        assert_eq!(
            config.rate_limit,
            RateLimitSettings {
                refill_per_second: 2.0,
                burst: 3,
                sweep_interval_ms: 1000,
                stale_expiry_ms: 2000,
                active: true,
            }
        );
    }

    #[test]
    fn loads_shipped_config_file() {
        let config = Config::load_from_file("./Turnstile.yml")
            .expect("Turnstile.yml should be loadable");
        let rt = config.into_runtime().expect("shipped config must be valid");

        assert!(rt.rate_limit.active);
        assert_eq!(rt.identity_header.as_str(), "x-real-ip");
    }

    #[test]
    fn missing_rate_limit_field_is_an_error() {
        let err = Config::from_yaml("listen: \"127.0.0.1:8100\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_admission_parameter_is_an_error() {
        // burst omitted: no default may be assumed.
        let partial = r#"
rate_limit:
  refill_per_second: 2.0
  sweep_interval_ms: 1000
  stale_expiry_ms: 2000
  active: true
"#;
        assert!(Config::from_yaml(partial).is_err());
    }

    #[test]
    fn into_runtime_defaults_listen_and_header() {
        let config = Config::from_yaml(
            r#"
rate_limit:
  refill_per_second: 1.0
  burst: 1
  sweep_interval_ms: 1000
  stale_expiry_ms: 2000
  active: false
"#,
        )
        .unwrap();

        let rt = config.into_runtime().unwrap();
        assert_eq!(rt.listen, DEFAULT_LISTEN_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(rt.identity_header.as_str(), DEFAULT_IDENTITY_HEADER);
    }

    #[test]
    fn into_runtime_rejects_invalid_listen_address() {
        let mut config = Config::from_yaml(FULL_CONFIG).unwrap();
        config.listen = Some("not-an-address".into());
        assert!(matches!(config.into_runtime(), Err(Error::Config(_))));
    }

    #[test]
    fn into_runtime_rejects_invalid_header_name() {
        let mut config = Config::from_yaml(FULL_CONFIG).unwrap();
        config.identity_header = Some("bad header name".into());
        assert!(matches!(config.into_runtime(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load_from_file("./does-not-exist.yml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
