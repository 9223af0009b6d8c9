//! Server settings.
//!
//! Precedence, lowest first: `blogcache.toml` in the working directory,
//! an explicit file, then `BLOGCACHE__*` environment variables with `__`
//! between levels (`BLOGCACHE__SERVER__PORT=9000`,
//! `BLOGCACHE__CACHE__MEMORY__MAX_ENTRIES=200`).

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use blogcache_core::CacheSettings;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_BASENAME: &str = "blogcache";
const ENV_PREFIX: &str = "BLOGCACHE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub content: ContentSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Run cleanup, popular refresh and metrics flush in the background.
    pub background_tasks: bool,
    /// Warm categories and the first list page at startup.
    pub warm_on_start: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            background_tasks: true,
            warm_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for the durable tier. In-memory when unset.
    pub durable_dir: Option<PathBuf>,
    /// Byte quota for the durable tier.
    pub durable_quota_bytes: Option<usize>,
    /// Byte quota for the session tier.
    pub session_quota_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Directory of `*.json` post files. Warmup and refetch are disabled
    /// when unset.
    pub posts_dir: Option<PathBuf>,
}

impl Settings {
    pub fn socket_addr(&self) -> Result<SocketAddr, LoadError> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|e| LoadError::invalid("server.host", format!("{e}")))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.server.port == 0 {
            return Err(LoadError::invalid("server.port", "must be greater than zero"));
        }
        self.socket_addr()?;
        self.cache
            .validate()
            .map_err(|e| LoadError::invalid("cache", e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Loads settings from files and the environment.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.socket_addr().unwrap().port(), 8080);
        assert!(settings.storage.durable_dir.is_none());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[storage]
durable_dir = "/var/lib/blogcache"

[cache.memory]
max_entries = 20
default_ttl_ms = 1000

[cache.invalidation]
batch_size = 10
"#
        )
        .unwrap();

        let settings = load(Some(file.path())).unwrap();

        assert_eq!(settings.server.port, 9090);
        assert_eq!(
            settings.storage.durable_dir.as_deref(),
            Some(Path::new("/var/lib/blogcache"))
        );
        assert_eq!(settings.cache.memory.max_entries, 20);
        assert_eq!(settings.cache.invalidation.batch_size, 10);
        assert_eq!(settings.cache.invalidation.batch_delay_ms, 1_000);
        assert_eq!(settings.cache.durable.max_entries, 100);
    }

    #[test]
    fn test_invalid_cache_settings_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cache.session]\nmax_entries = 0\ndefault_ttl_ms = 10").unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, LoadError::Invalid { key: "cache", .. }));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = load(Some(Path::new("/nonexistent/blogcache.toml")));
        assert!(matches!(result, Err(LoadError::Build(_))));
    }
}
