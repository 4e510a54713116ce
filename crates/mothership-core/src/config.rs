//! Monitor configuration: defaults, YAML file loading and validation.
//!
//! Precedence is defaults < config file < command-line overrides applied by
//! the binaries. An explicitly named config file must be readable; the
//! default location is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default database file name inside the data directory.
pub const DEFAULT_DB_FILE: &str = "mothership.db";

/// Default listen address for node error reports.
pub const DEFAULT_INGEST_BIND: &str = "0.0.0.0:4801";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0}")]
    Invalid(String),
    #[error("failed to resolve HOME")]
    NoHome,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub ingest: IngestConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub bind: String,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval_ms: u64,
    pub max_jitter_ms: u64,
    /// Cap on how far the timer backs off while refreshes go undrained.
    pub max_backoff_ms: u64,
    pub parallel: bool,
}

impl Config {
    pub fn default_from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_default();
        let data_dir = if home.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&home)
                .join(".local")
                .join("share")
                .join("mothership")
        };
        Self {
            global: GlobalConfig { data_dir },
            database: DatabaseConfig {
                path: None,
                busy_timeout_ms: 5000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "console".to_string(),
                file: None,
            },
            ingest: IngestConfig {
                bind: DEFAULT_INGEST_BIND.to_string(),
                read_timeout_ms: 250,
            },
            refresh: RefreshConfig {
                interval_ms: 2_000,
                max_jitter_ms: 250,
                max_backoff_ms: 2_000,
                parallel: false,
            },
        }
    }

    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }
        self.global.data_dir.join(DEFAULT_DB_FILE)
    }

    /// Log file used when the terminal is owned by the monitor UI.
    pub fn log_file_path(&self) -> PathBuf {
        if let Some(path) = &self.logging.file {
            return path.clone();
        }
        self.global.data_dir.join("mothership.log")
    }

    pub fn ingest_read_timeout(&self) -> Duration {
        Duration::from_millis(self.ingest.read_timeout_ms)
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.global.data_dir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.to_lowercase().trim() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "logging.level must be one of trace, debug, info, warn, error".into(),
                ))
            }
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "logging.format must be one of console, json".into(),
                ))
            }
        }
        if self.ingest.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("ingest.bind is required".into()));
        }
        if self.ingest.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ingest.read_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.refresh.interval_ms < 100 {
            return Err(ConfigError::Invalid(
                "refresh.interval_ms must be at least 100".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    global: PartialGlobalConfig,
    #[serde(default)]
    database: PartialDatabaseConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
    #[serde(default)]
    ingest: PartialIngestConfig,
    #[serde(default)]
    refresh: PartialRefreshConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialGlobalConfig {
    #[serde(default)]
    data_dir: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialDatabaseConfig {
    #[serde(default)]
    path: String,
    #[serde(default)]
    busy_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    file: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialIngestConfig {
    #[serde(default)]
    bind: String,
    #[serde(default)]
    read_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialRefreshConfig {
    #[serde(default)]
    interval_ms: u64,
    #[serde(default)]
    max_jitter_ms: Option<u64>,
    #[serde(default)]
    max_backoff_ms: Option<u64>,
    #[serde(default)]
    parallel: Option<bool>,
}

/// Load config: defaults, then the explicit file (hard error if unreadable)
/// or the default location (silently skipped when missing).
pub fn load_config(config_file: Option<&Path>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let mut cfg = Config::default_from_env();

    let explicit = config_file
        .filter(|path| !path.as_os_str().is_empty())
        .map(Path::to_path_buf);

    let (path_to_try, required) = match explicit {
        Some(path) => (Some(path), true),
        None => (default_config_path(), false),
    };

    let Some(path) = path_to_try else {
        return Ok((cfg, None));
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            apply_yaml(&mut cfg, &text)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            Ok((cfg, Some(path)))
        }
        Err(source) if required => Err(ConfigError::Read { path, source }),
        Err(_) => Ok((cfg, None)),
    }
}

/// Overlay a YAML document onto `cfg`; empty or zero fields keep their current values.
pub fn apply_yaml(cfg: &mut Config, text: &str) -> Result<(), ConfigError> {
    let partial: PartialConfig = if text.trim().is_empty() {
        PartialConfig::default()
    } else {
        serde_yaml::from_str(text)?
    };
    apply_partial(cfg, partial)
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("mothership").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(
                PathBuf::from(home)
                    .join(".config")
                    .join("mothership")
                    .join("config.yaml"),
            );
        }
    }
    None
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) -> Result<(), ConfigError> {
    if !partial.global.data_dir.trim().is_empty() {
        cfg.global.data_dir = expand_tilde(partial.global.data_dir.trim())?;
    }
    if !partial.database.path.trim().is_empty() {
        cfg.database.path = Some(expand_tilde(partial.database.path.trim())?);
    }
    if partial.database.busy_timeout_ms > 0 {
        cfg.database.busy_timeout_ms = partial.database.busy_timeout_ms;
    }
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = partial.logging.format.trim().to_string();
    }
    if !partial.logging.file.trim().is_empty() {
        cfg.logging.file = Some(expand_tilde(partial.logging.file.trim())?);
    }
    if !partial.ingest.bind.trim().is_empty() {
        cfg.ingest.bind = partial.ingest.bind.trim().to_string();
    }
    if partial.ingest.read_timeout_ms > 0 {
        cfg.ingest.read_timeout_ms = partial.ingest.read_timeout_ms;
    }
    if partial.refresh.interval_ms > 0 {
        cfg.refresh.interval_ms = partial.refresh.interval_ms;
    }
    if let Some(jitter) = partial.refresh.max_jitter_ms {
        cfg.refresh.max_jitter_ms = jitter;
    }
    if let Some(backoff) = partial.refresh.max_backoff_ms {
        cfg.refresh.max_backoff_ms = backoff;
    }
    if let Some(parallel) = partial.refresh.parallel {
        cfg.refresh.parallel = parallel;
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(input: &str) -> Result<PathBuf, ConfigError> {
    if input == "~" {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        return Ok(PathBuf::from(home));
    }
    if let Some(rest) = input.strip_prefix("~/") {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        return Ok(PathBuf::from(home).join(rest));
    }
    Ok(PathBuf::from(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default_from_env();
        assert!(cfg.validate().is_ok(), "default config must validate");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.ingest.bind, DEFAULT_INGEST_BIND);
    }

    #[test]
    fn database_path_derived_from_data_dir() {
        let mut cfg = Config::default_from_env();
        cfg.global.data_dir = PathBuf::from("/var/lib/rig");
        assert_eq!(
            cfg.database_path(),
            PathBuf::from("/var/lib/rig/mothership.db")
        );
        cfg.database.path = Some(PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn yaml_overlays_only_present_fields() {
        let mut cfg = Config::default_from_env();
        let yaml = "database:\n  path: /srv/mothership.db\nrefresh:\n  interval_ms: 500\n  parallel: true\nlogging:\n  format: json\n";
        if let Err(err) = apply_yaml(&mut cfg, yaml) {
            panic!("apply yaml: {err}");
        }
        assert_eq!(
            cfg.database.path,
            Some(PathBuf::from("/srv/mothership.db"))
        );
        assert_eq!(cfg.refresh.interval_ms, 500);
        assert!(cfg.refresh.parallel);
        assert_eq!(cfg.refresh.max_backoff_ms, 2_000);
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut cfg = Config::default_from_env();
        cfg.logging.level = "bogus".into();
        let err = match cfg.validate() {
            Ok(()) => panic!("expected error"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("logging.level"), "err={err}");
    }

    #[test]
    fn validate_rejects_fast_refresh() {
        let mut cfg = Config::default_from_env();
        cfg.refresh.interval_ms = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => panic!("tempdir: {err}"),
        };
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => panic!("tempdir: {err}"),
        };
        let path = dir.path().join("config.yaml");
        if let Err(err) = std::fs::write(&path, "ingest:\n  bind: 127.0.0.1:9000\n") {
            panic!("write config: {err}");
        }
        let (cfg, used) = match load_config(Some(&path)) {
            Ok(value) => value,
            Err(err) => panic!("load config: {err}"),
        };
        assert_eq!(used, Some(path));
        assert_eq!(cfg.ingest.bind, "127.0.0.1:9000");
    }
}
