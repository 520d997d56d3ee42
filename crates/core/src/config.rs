use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    /// Quiet window before the session mirror is flushed to storage. Rapid
    /// mutations inside the window coalesce into a single write.
    pub debounce_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub debounce_ms: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://farebid.db?mode=rwc".to_string(),
                // One session: the startup read plus the persister's flushes.
                max_connections: 2,
                timeout_secs: 30,
            },
            persistence: PersistenceConfig { debounce_ms: 500 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("farebid.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(persistence) = patch.persistence {
            if let Some(debounce_ms) = persistence.debounce_ms {
                self.persistence.debounce_ms = debounce_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FAREBID_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FAREBID_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FAREBID_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FAREBID_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FAREBID_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FAREBID_PERSIST_DEBOUNCE_MS") {
            self.persistence.debounce_ms = parse_u64("FAREBID_PERSIST_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = read_env("FAREBID_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("FAREBID_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(debounce_ms) = overrides.debounce_ms {
            self.persistence.debounce_ms = debounce_ms;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.persistence.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "persistence.debounce_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    persistence: Option<PersistencePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PersistencePatch {
    debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let default = PathBuf::from("farebid.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    // `load` reads the process environment, so every test that calls it
    // shares this lock with the test that mutates FAREBID_* variables.
    fn env_guard() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(Mutex::default).lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[test]
    fn defaults_are_valid() {
        let _guard = env_guard();
        let config = AppConfig::load(LoadOptions::default()).expect("load defaults");
        assert_eq!(config.persistence.debounce_ms, 500);
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn malformed_env_override_is_rejected() {
        let _guard = env_guard();
        std::env::set_var("FAREBID_DATABASE_MAX_CONNECTIONS", "abc");
        let result = AppConfig::load(LoadOptions::default());
        std::env::remove_var("FAREBID_DATABASE_MAX_CONNECTIONS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvOverride { ref key, ref value })
                if key == "FAREBID_DATABASE_MAX_CONNECTIONS" && value == "abc"
        ));
    }

    #[test]
    fn toml_file_patches_defaults() {
        let _guard = env_guard();
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\n\n[persistence]\ndebounce_ms = 300\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n"
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.persistence.debounce_ms, 300);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.database.timeout_secs, 30);
    }

    #[test]
    fn explicitly_named_missing_file_is_a_read_error() {
        let _guard = env_guard();
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: false,
            ..LoadOptions::default()
        });
        // The explicit path is honored even without require_file.
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn zero_debounce_fails_validation() {
        let _guard = env_guard();
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { debounce_ms: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn log_format_parses_known_values_only() {
        assert_eq!("json".parse::<LogFormat>().expect("json"), LogFormat::Json);
        assert!("verbose".parse::<LogFormat>().is_err());
    }
}
