//! Configuration loading for turbocache.
//!
//! Configuration is read once at startup and never changes afterwards. The
//! resulting `TurboConfig` is passed explicitly to the components that need
//! it; nothing reads configuration from globals.
//!
//! # Usage
//!
//! ```rust,no_run
//! use turboconf::TurboConfig;
//!
//! let config = TurboConfig::load().expect("Failed to load config");
//!
//! println!("Cache dir: {}", config.cache.dir.display());
//! println!("HTTP port: {}", config.server.port);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/turbocache/config.toml` (system)
//! 2. `~/.config/turbocache/config.toml` (user)
//! 3. `./turbocache.toml` (local override, or the `--config` path)
//! 4. Environment variables (`TURBOCACHE_*`, plus `PORT`, `CACHE_DIR`,
//!    `MAX_CACHE_SIZE`, `TURBO_TOKEN`, `ALLOWED_TEAMS`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! port = 3000
//! mode = "production"
//!
//! [cache]
//! dir = "/var/cache/turbocache"
//! max_size_mb = 5120
//!
//! [security]
//! token = "change-me"
//! allowed_teams = ["team_a", "team_b"]
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use settings::{CacheConfig, LogFormat, LoggingConfig, RuntimeMode, SecurityConfig, ServerConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Complete turbocache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TurboConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TurboConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/turbocache/config.toml`
    /// 3. `~/.config/turbocache/config.toml`
    /// 4. `./turbocache.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./turbocache.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = TurboConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to a TOML string. The bearer token is redacted.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# turbocache configuration\n\n");

        output.push_str("[server]\n");
        output.push_str(&format!("port = {}\n", self.server.port));
        output.push_str(&format!("mode = {}\n", quoted(&self.server.mode.to_string())));
        output.push_str(&format!("max_body_mb = {}\n", self.server.max_body_mb));

        output.push_str("\n[cache]\n");
        output.push_str(&format!("dir = {}\n", quoted(&self.cache.dir.display().to_string())));
        output.push_str(&format!("max_size_mb = {}\n", self.cache.max_size_mb));
        output.push_str(&format!("layout = {}\n", quoted(&self.cache.layout)));
        output.push_str(&format!("read_only = {}\n", self.cache.read_only));

        output.push_str("\n[security]\n");
        match self.security.token {
            Some(_) => output.push_str("token = \"<redacted>\"\n"),
            None => output.push_str("# token is not set; all artifact requests will be rejected\n"),
        }
        let teams: Vec<String> = self
            .security
            .allowed_teams
            .iter()
            .map(|t| quoted(t))
            .collect();
        output.push_str(&format!("allowed_teams = [{}]\n", teams.join(", ")));

        output.push_str("\n[logging]\n");
        output.push_str(&format!("level = {}\n", quoted(&self.logging.level)));
        output.push_str(&format!("format = {}\n", quoted(&self.logging.format.to_string())));
        if let Some(endpoint) = &self.logging.otlp_endpoint {
            output.push_str(&format!("otlp_endpoint = {}\n", quoted(endpoint)));
        }

        output
    }
}

/// Render `s` as a TOML string literal, escaped.
fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}
