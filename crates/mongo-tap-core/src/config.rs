//! Configuration types for the sniffing proxy.
//!
//! Configuration is loaded from YAML files and validated before use.
//! Every field has a default, so the proxy also runs with no config file
//! at all (CLI flags override whatever was loaded).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// TCP listener configuration.
    #[serde(default)]
    pub listen: ListenConfig,

    /// Upstream MongoDB server configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Wire-parser configuration.
    #[serde(default)]
    pub sniffer: SnifferConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TCP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Address to bind to. A leading-colon form like ":7017" binds all
    /// interfaces.
    #[serde(default = "default_listen_address")]
    pub address: String,

    /// Maximum number of concurrent client connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream MongoDB server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Address of the real MongoDB server.
    ///
    /// Supports environment variable expansion: "${MONGO_ADDR}"
    #[serde(default = "default_upstream_address")]
    pub address: String,

    /// Upstream dial timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Wire-parser configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnifferConfig {
    /// Ceiling on a single wire frame, header included.
    ///
    /// Defaults to MongoDB's maxMessageSizeBytes (48 MiB). A frame
    /// advertising a larger length terminates that direction's parser.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Capacity of each parser's byte queue, in read-sized chunks.
    ///
    /// When the queue is full the forwarder drops observation chunks
    /// rather than stalling the proxied stream.
    #[serde(default = "default_queue_chunks")]
    pub queue_chunks: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format (for production).
    #[serde(default)]
    pub json: bool,
}

// Default value functions

fn default_listen_address() -> String {
    ":7017".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_upstream_address() -> String {
    "127.0.0.1:27017".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_frame_size() -> usize {
    48 * 1024 * 1024
}

fn default_queue_chunks() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            queue_chunks: default_queue_chunks(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable
/// `VAR_NAME`. If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

/// Normalize a listen/upstream address: expand env vars and turn the
/// leading-colon form ":7017" into "0.0.0.0:7017".
fn normalize_address(address: &str) -> String {
    let expanded = expand_env_vars(address);
    if expanded.starts_with(':') {
        format!("0.0.0.0{expanded}")
    } else {
        expanded
    }
}

/// Split a normalized address into host and port.
fn parse_address(address: &str) -> ConfigResult<(String, u16)> {
    let parts: Vec<&str> = address.rsplitn(2, ':').collect();
    if parts.len() != 2 || parts[1].is_empty() {
        return Err(ConfigError::InvalidAddress(address.to_string()));
    }
    let port: u16 = parts[0]
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(address.to_string()))?;
    Ok((parts[1].to_string(), port))
}

impl ListenConfig {
    /// Get the address to bind, normalized and env-expanded.
    #[must_use]
    pub fn bind_address(&self) -> String {
        normalize_address(&self.address)
    }
}

impl UpstreamConfig {
    /// Get the upstream address, normalized and env-expanded.
    #[must_use]
    pub fn dial_address(&self) -> String {
        normalize_address(&self.address)
    }

    /// Upstream dial timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// Configuration loading and validation

impl ProxyConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation check fails.
    pub fn validate(&self) -> ConfigResult<()> {
        parse_address(&self.listen.bind_address())?;
        parse_address(&self.upstream.dial_address())?;

        // A ceiling below one header cannot frame anything.
        const MIN_FRAME_SIZE: usize = 16;
        if self.sniffer.max_frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::InvalidFrameSize {
                got: self.sniffer.max_frame_size,
                min: MIN_FRAME_SIZE,
            });
        }

        if self.sniffer.queue_chunks == 0 {
            return Err(ConfigError::InvalidQueueDepth);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ProxyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen.address, ":7017");
        assert_eq!(config.upstream.address, "127.0.0.1:27017");
        assert_eq!(config.sniffer.max_frame_size, 48 * 1024 * 1024);
    }

    #[test]
    fn test_leading_colon_bind_address() {
        let config = ListenConfig {
            address: ":7017".to_string(),
            max_connections: 1,
        };
        assert_eq!(config.bind_address(), "0.0.0.0:7017");
    }

    #[test]
    fn test_from_yaml_string() {
        let yaml = r"
listen:
  address: '127.0.0.1:7018'
upstream:
  address: 'mongo.internal:27017'
  connect_timeout_ms: 500
";
        let config = ProxyConfig::from_str(yaml).unwrap();
        assert_eq!(config.listen.address, "127.0.0.1:7018");
        assert_eq!(config.upstream.address, "mongo.internal:27017");
        assert_eq!(config.upstream.connect_timeout(), Duration::from_millis(500));
        // Untouched sections keep their defaults.
        assert_eq!(config.sniffer.queue_chunks, 256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_listen_address() {
        let yaml = r"
listen:
  address: 'no-port-here'
";
        let result = ProxyConfig::from_str(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_zero_queue_depth_rejected() {
        let yaml = r"
sniffer:
  queue_chunks: 0
";
        let result = ProxyConfig::from_str(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidQueueDepth)));
    }

    #[test]
    fn test_tiny_frame_ceiling_rejected() {
        let yaml = r"
sniffer:
  max_frame_size: 8
";
        let result = ProxyConfig::from_str(yaml);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidFrameSize { got: 8, .. })
        ));
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("TEST_MONGO_TAP_UPSTREAM", "10.0.0.5:27017");
        let config = UpstreamConfig {
            address: "${TEST_MONGO_TAP_UPSTREAM}".to_string(),
            connect_timeout_ms: 1000,
        };
        assert_eq!(config.dial_address(), "10.0.0.5:27017");
        std::env::remove_var("TEST_MONGO_TAP_UPSTREAM");
    }

    #[test]
    fn test_env_var_expansion_missing_var() {
        let config = UpstreamConfig {
            address: "${NONEXISTENT_MONGO_TAP_VAR}".to_string(),
            connect_timeout_ms: 1000,
        };
        assert_eq!(config.dial_address(), "");
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("127.0.0.1:27017").unwrap(),
            ("127.0.0.1".to_string(), 27017)
        );
        assert!(parse_address("127.0.0.1").is_err());
        assert!(parse_address(":7017").is_err());
        assert!(parse_address("host:notaport").is_err());
    }
}
