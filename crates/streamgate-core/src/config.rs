//! streamgate.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. Lambda functions are configured through
//! environment variables, which are applied on top of the file with
//! [`GateConfig::apply_env`].

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_CONFIG_PATH: &str = "STREAMGATE_CONFIG";
pub const ENV_STREAMING_ROUTES: &str = "STREAMGATE_STREAMING_ROUTES";
pub const ENV_FALLBACK: &str = "STREAMGATE_FALLBACK";
pub const ENV_CHANNEL_CAPACITY: &str = "STREAMGATE_CHANNEL_CAPACITY";
pub const ENV_LOG_FORMAT: &str = "STREAMGATE_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "STREAMGATE_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidEnv { key: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub streaming: StreamingConfig,
    pub log: LogConfig,
    pub local: LocalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Re-run a request on the buffered path when streaming fails before
    /// the first byte was sent.
    pub fallback_to_buffered: bool,
    /// Frames the output channel holds before writers wait.
    pub channel_capacity: usize,
    /// Requests matching any of these rules take the streaming path.
    pub routes: Vec<RouteConfig>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            fallback_to_buffered: true,
            channel_capacity: 16,
            routes: vec![RouteConfig::new("POST", "/chat")],
        }
    }
}

/// A `(method, path substring)` pair selecting the streaming path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub method: String,
    pub path_contains: String,
}

impl RouteConfig {
    pub fn new(method: impl Into<String>, path_contains: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path_contains: path_contains.into(),
        }
    }
}

impl FromStr for RouteConfig {
    type Err = String;

    /// Parses `METHOD:/segment`, e.g. `POST:/chat`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, path) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected METHOD:/path, got {s:?}"))?;
        if method.is_empty() || path.is_empty() {
            return Err(format!("expected METHOD:/path, got {s:?}"));
        }
        Ok(Self::new(method, path))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info,streamgate=debug".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub port: u16,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { port: 9000 }
    }
}

impl GateConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path` (or defaults) and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        base.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_STREAMING_ROUTES) {
            self.streaming.routes = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<RouteConfig>())
                .collect::<Result<_, _>>()
                .map_err(|reason| invalid_env(ENV_STREAMING_ROUTES, reason))?;
        }
        if let Some(raw) = lookup(ENV_FALLBACK) {
            self.streaming.fallback_to_buffered = parse_bool(&raw)
                .ok_or_else(|| invalid_env(ENV_FALLBACK, format!("not a boolean: {raw:?}")))?;
        }
        if let Some(raw) = lookup(ENV_CHANNEL_CAPACITY) {
            self.streaming.channel_capacity = raw
                .trim()
                .parse()
                .map_err(|e| invalid_env(ENV_CHANNEL_CAPACITY, format!("{e}")))?;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            self.log.format = raw
                .parse()
                .map_err(|reason| invalid_env(ENV_LOG_FORMAT, reason))?;
        }
        if let Some(raw) = lookup(ENV_LOG_LEVEL) {
            self.log.level = raw;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "streaming.channel_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid_env(key: &str, reason: String) -> ConfigError {
    ConfigError::InvalidEnv {
        key: key.to_string(),
        reason,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = GateConfig::default();
        assert_eq!(config.streaming.routes, vec![RouteConfig::new("POST", "/chat")]);
        assert!(config.streaming.fallback_to_buffered);
        assert_eq!(config.streaming.channel_capacity, 16);
        assert_eq!(config.log.format, LogFormat::Text);
        assert_eq!(config.local.port, 9000);
    }

    #[test]
    fn parse_empty_uses_defaults() {
        let config = GateConfig::from_toml_str("").unwrap();
        assert_eq!(config, GateConfig::default());
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[streaming]
fallback_to_buffered = false
channel_capacity = 4

[[streaming.routes]]
method = "POST"
path_contains = "/generate"

[log]
format = "json"

[local]
port = 8080
"#;
        let config = GateConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(
            config.streaming.routes,
            vec![RouteConfig::new("POST", "/generate")]
        );
        assert!(!config.streaming.fallback_to_buffered);
        assert_eq!(config.streaming.channel_capacity, 4);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.local.port, 8080);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = GateConfig::from_toml_str("[streaming]\nchannel_capacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = GateConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("/chat"));
        assert_eq!(GateConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[local]\nport = 7000").unwrap();

        let config = GateConfig::from_file(file.path()).unwrap();
        assert_eq!(config.local.port, 7000);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let err = GateConfig::from_file(Path::new("/nonexistent/streamgate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn env_overrides() {
        let config = GateConfig::default()
            .apply_env(env(&[
                (ENV_STREAMING_ROUTES, "post:/chat, GET:/events"),
                (ENV_FALLBACK, "off"),
                (ENV_CHANNEL_CAPACITY, "32"),
                (ENV_LOG_FORMAT, "JSON"),
                (ENV_LOG_LEVEL, "warn"),
            ]))
            .unwrap();

        assert_eq!(
            config.streaming.routes,
            vec![RouteConfig::new("POST", "/chat"), RouteConfig::new("GET", "/events")]
        );
        assert!(!config.streaming.fallback_to_buffered);
        assert_eq!(config.streaming.channel_capacity, 32);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn empty_routes_env_disables_streaming() {
        let config = GateConfig::default()
            .apply_env(env(&[(ENV_STREAMING_ROUTES, "")]))
            .unwrap();
        assert!(config.streaming.routes.is_empty());
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let err = GateConfig::default()
            .apply_env(env(&[(ENV_STREAMING_ROUTES, "POST")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == ENV_STREAMING_ROUTES)
        );

        let err = GateConfig::default()
            .apply_env(env(&[(ENV_FALLBACK, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == ENV_FALLBACK));

        let err = GateConfig::default()
            .apply_env(env(&[(ENV_CHANNEL_CAPACITY, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
