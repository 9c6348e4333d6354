//! Configuration sections. Everything here is fixed once the process starts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Whether error detail is echoed to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    #[default]
    Development,
    Production,
}

impl RuntimeMode {
    pub fn is_development(self) -> bool {
        self == RuntimeMode::Development
    }
}

impl FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeMode::Development),
            "production" | "prod" => Ok(RuntimeMode::Production),
            other => Err(format!("unknown runtime mode: {other}")),
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Development => write!(f, "development"),
            RuntimeMode::Production => write!(f, "production"),
        }
    }
}

/// Log line format for the console layer.
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
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "combined" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Default: 3000
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    #[serde(default)]
    pub mode: RuntimeMode,

    /// Largest accepted request body in MiB.
    /// Default: 500
    #[serde(default = "ServerConfig::default_max_body_mb")]
    pub max_body_mb: u64,
}

impl ServerConfig {
    fn default_port() -> u16 {
        3000
    }

    fn default_max_body_mb() -> u64 {
        500
    }

    pub fn max_body_bytes(&self) -> usize {
        usize::try_from(self.max_body_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            mode: RuntimeMode::default(),
            max_body_mb: Self::default_max_body_mb(),
        }
    }
}

/// Artifact storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage directory.
    /// Default: ./cache
    #[serde(default = "CacheConfig::default_dir")]
    pub dir: PathBuf,

    /// Size ceiling in MB. Reported against actual usage at startup, never
    /// enforced.
    /// Default: 5120
    #[serde(default = "CacheConfig::default_max_size_mb")]
    pub max_size_mb: u64,

    /// "flat" or "sharded".
    #[serde(default = "CacheConfig::default_layout")]
    pub layout: String,

    #[serde(default)]
    pub read_only: bool,
}

impl CacheConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("cache")
    }

    fn default_max_size_mb() -> u64 {
        5120
    }

    fn default_layout() -> String {
        "flat".to_string()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            max_size_mb: Self::default_max_size_mb(),
            layout: Self::default_layout(),
            read_only: false,
        }
    }
}

/// Shared bearer secret and team allow-list.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// With no token configured every authenticated request is rejected.
    #[serde(default)]
    pub token: Option<String>,

    /// Empty means any team (or none) is accepted.
    #[serde(default)]
    pub allowed_teams: Vec<String>,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("allowed_teams", &self.allowed_teams)
            .finish()
    }
}

/// Logging and telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "info,turbocache=debug".
    /// Default: info
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// OTLP gRPC endpoint. Unset disables OpenTelemetry export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
            otlp_endpoint: None,
        }
    }
}
