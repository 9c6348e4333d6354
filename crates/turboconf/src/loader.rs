//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, TurboConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/turbocache/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("turbocache/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("turbocache.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and apply the values it sets onto `config`.
pub fn apply_file(config: &mut TurboConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Apply the keys present in a TOML document; absent keys keep their value.
pub(crate) fn apply_toml(
    config: &mut TurboConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let invalid = |key: &str, message: String| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("{message} (in {})", path.display()),
    };

    if let Some(server) = table.get("server").and_then(|v| v.as_table()) {
        if let Some(v) = server.get("port").and_then(|v| v.as_integer()) {
            config.server.port =
                u16::try_from(v).map_err(|_| invalid("server.port", format!("{v} is not a port")))?;
        }
        if let Some(v) = server.get("mode").and_then(|v| v.as_str()) {
            config.server.mode = v.parse().map_err(|e| invalid("server.mode", e))?;
        }
        if let Some(v) = server.get("max_body_mb").and_then(|v| v.as_integer()) {
            config.server.max_body_mb = u64::try_from(v)
                .map_err(|_| invalid("server.max_body_mb", format!("{v} is negative")))?;
        }
    }

    if let Some(cache) = table.get("cache").and_then(|v| v.as_table()) {
        if let Some(v) = cache.get("dir").and_then(|v| v.as_str()) {
            config.cache.dir = expand_path(v);
        }
        if let Some(v) = cache.get("max_size_mb").and_then(|v| v.as_integer()) {
            config.cache.max_size_mb = u64::try_from(v)
                .map_err(|_| invalid("cache.max_size_mb", format!("{v} is negative")))?;
        }
        if let Some(v) = cache.get("layout").and_then(|v| v.as_str()) {
            config.cache.layout = v.to_string();
        }
        if let Some(v) = cache.get("read_only").and_then(|v| v.as_bool()) {
            config.cache.read_only = v;
        }
    }

    if let Some(security) = table.get("security").and_then(|v| v.as_table()) {
        if let Some(v) = security.get("token").and_then(|v| v.as_str()) {
            config.security.token = non_empty(v);
        }
        if let Some(teams) = security.get("allowed_teams") {
            config.security.allowed_teams = match teams {
                toml::Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(non_empty)
                    .collect(),
                toml::Value::String(list) => parse_team_list(list),
                _ => {
                    return Err(invalid(
                        "security.allowed_teams",
                        "expected an array or comma separated string".to_string(),
                    ))
                }
            };
        }
    }

    if let Some(logging) = table.get("logging").and_then(|v| v.as_table()) {
        if let Some(v) = logging.get("level").and_then(|v| v.as_str()) {
            config.logging.level = v.to_string();
        }
        if let Some(v) = logging.get("format").and_then(|v| v.as_str()) {
            config.logging.format = v.parse().map_err(|e| invalid("logging.format", e))?;
        }
        if let Some(v) = logging.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.logging.otlp_endpoint = non_empty(v);
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut TurboConfig, sources: &mut ConfigSources) {
    apply_env_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides read through `lookup`.
///
/// Where a variable has an unprefixed alias, the prefixed name is checked
/// last and wins. Values that fail to parse are ignored and not recorded
/// in `sources`.
pub fn apply_env_overrides_from<F>(config: &mut TurboConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied: Vec<&str> = Vec::new();

    // Server
    for key in ["PORT", "TURBOCACHE_PORT"] {
        if let Some(port) = lookup(key).and_then(|v| v.parse().ok()) {
            config.server.port = port;
            applied.push(key);
        }
    }
    if let Some(mode) = lookup("TURBOCACHE_MODE").and_then(|v| v.parse().ok()) {
        config.server.mode = mode;
        applied.push("TURBOCACHE_MODE");
    }
    if let Some(mb) = lookup("TURBOCACHE_MAX_BODY_MB").and_then(|v| v.parse().ok()) {
        config.server.max_body_mb = mb;
        applied.push("TURBOCACHE_MAX_BODY_MB");
    }

    // Cache
    for key in ["CACHE_DIR", "TURBOCACHE_CACHE_DIR"] {
        if let Some(dir) = lookup(key) {
            config.cache.dir = expand_path(&dir);
            applied.push(key);
        }
    }
    for key in ["MAX_CACHE_SIZE", "TURBOCACHE_MAX_CACHE_SIZE"] {
        if let Some(mb) = lookup(key).and_then(|v| v.parse().ok()) {
            config.cache.max_size_mb = mb;
            applied.push(key);
        }
    }
    if let Some(layout) = lookup("TURBOCACHE_LAYOUT") {
        config.cache.layout = layout;
        applied.push("TURBOCACHE_LAYOUT");
    }
    if let Some(v) = lookup("TURBOCACHE_READ_ONLY") {
        config.cache.read_only = v.eq_ignore_ascii_case("true") || v == "1";
        applied.push("TURBOCACHE_READ_ONLY");
    }

    // Security
    for key in ["TURBO_TOKEN", "TURBOCACHE_TOKEN"] {
        if let Some(token) = lookup(key) {
            config.security.token = non_empty(&token);
            applied.push(key);
        }
    }
    for key in ["ALLOWED_TEAMS", "TURBOCACHE_ALLOWED_TEAMS"] {
        if let Some(teams) = lookup(key) {
            config.security.allowed_teams = parse_team_list(&teams);
            applied.push(key);
        }
    }

    // Logging
    for key in ["RUST_LOG", "TURBOCACHE_LOG_LEVEL"] {
        if let Some(level) = lookup(key) {
            config.logging.level = level;
            applied.push(key);
        }
    }
    if let Some(format) = lookup("TURBOCACHE_LOG_FORMAT").and_then(|v| v.parse().ok()) {
        config.logging.format = format;
        applied.push("TURBOCACHE_LOG_FORMAT");
    }
    for key in ["OTEL_EXPORTER_OTLP_ENDPOINT", "TURBOCACHE_OTLP_ENDPOINT"] {
        if let Some(endpoint) = lookup(key) {
            config.logging.otlp_endpoint = non_empty(&endpoint);
            applied.push(key);
        }
    }

    sources
        .env_overrides
        .extend(applied.into_iter().map(str::to_string));
}

/// Split a comma separated team list, trimming and dropping empty entries.
pub fn parse_team_list(list: &str) -> Vec<String> {
    list.split(',').filter_map(non_empty).collect()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
