//! INI configuration file and storage layout.
//!
//! The file lives at `<config dir>/smartfetch/config.ini`:
//!
//! ```ini
//! [storage]
//! data_dir = /home/user/.local/share/smartfetch
//!
//! [update]
//! now_workers = 3
//! smart_workers = 2
//! smart_period_secs = 900
//! post_fetch_pause_ms = 200
//!
//! [network]
//! timeout_secs = 30
//!
//! [telemetry]
//! interval_secs = 900
//!
//! [engine]
//! relative_age = since_stored
//!
//! [logging]
//! level = info
//! directory = /home/user/.local/share/smartfetch/logs
//! ```
//!
//! Missing files and keys fall back to defaults; unknown keys are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::engine::{EngineConfig, RelativeAgeBasis};

pub const DEFAULT_NOW_WORKERS: usize = 3;
pub const DEFAULT_SMART_WORKERS: usize = 2;
pub const DEFAULT_SMART_PERIOD_SECS: u64 = 15 * 60;
pub const DEFAULT_POST_FETCH_PAUSE_MS: u64 = 200;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 15 * 60;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `<config dir>/smartfetch`.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartfetch")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// `<data dir>/smartfetch`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartfetch")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettings {
    pub now_workers: usize,
    pub smart_workers: usize,
    pub smart_period_secs: u64,
    pub post_fetch_pause_ms: u64,
}

impl UpdateSettings {
    pub fn smart_period(&self) -> Duration {
        Duration::from_secs(self.smart_period_secs)
    }

    pub fn post_fetch_pause(&self) -> Duration {
        Duration::from_millis(self.post_fetch_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub interval_secs: u64,
}

impl TelemetrySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    /// Daily-rolling log files are written here when set.
    pub directory: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub storage: StorageSettings,
    pub update: UpdateSettings,
    pub network: NetworkSettings,
    pub telemetry: TelemetrySettings,
    pub engine: EngineConfig,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            storage: StorageSettings {
                data_dir: default_data_dir(),
            },
            update: UpdateSettings {
                now_workers: DEFAULT_NOW_WORKERS,
                smart_workers: DEFAULT_SMART_WORKERS,
                smart_period_secs: DEFAULT_SMART_PERIOD_SECS,
                post_fetch_pause_ms: DEFAULT_POST_FETCH_PAUSE_MS,
            },
            network: NetworkSettings {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            telemetry: TelemetrySettings {
                interval_secs: DEFAULT_TELEMETRY_INTERVAL_SECS,
            },
            engine: EngineConfig::default(),
            logging: LoggingSettings {
                level: DEFAULT_LOG_LEVEL.to_string(),
                directory: None,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(config_file_path())
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::default();
        if !path.exists() {
            return Ok(config);
        }

        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Write to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(config_file_path())
    }

    /// Write every setting to `path`, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(io_err)
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(&self.storage.data_dir)
    }
}

/// Every settable key, addressed as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    StorageDataDir,
    UpdateNowWorkers,
    UpdateSmartWorkers,
    UpdateSmartPeriodSecs,
    UpdatePostFetchPauseMs,
    NetworkTimeoutSecs,
    TelemetryIntervalSecs,
    EngineRelativeAge,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::StorageDataDir,
            ConfigKey::UpdateNowWorkers,
            ConfigKey::UpdateSmartWorkers,
            ConfigKey::UpdateSmartPeriodSecs,
            ConfigKey::UpdatePostFetchPauseMs,
            ConfigKey::NetworkTimeoutSecs,
            ConfigKey::TelemetryIntervalSecs,
            ConfigKey::EngineRelativeAge,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]
    }

    pub fn section(self) -> &'static str {
        match self {
            ConfigKey::StorageDataDir => "storage",
            ConfigKey::UpdateNowWorkers
            | ConfigKey::UpdateSmartWorkers
            | ConfigKey::UpdateSmartPeriodSecs
            | ConfigKey::UpdatePostFetchPauseMs => "update",
            ConfigKey::NetworkTimeoutSecs => "network",
            ConfigKey::TelemetryIntervalSecs => "telemetry",
            ConfigKey::EngineRelativeAge => "engine",
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(self) -> &'static str {
        match self {
            ConfigKey::StorageDataDir => "data_dir",
            ConfigKey::UpdateNowWorkers => "now_workers",
            ConfigKey::UpdateSmartWorkers => "smart_workers",
            ConfigKey::UpdateSmartPeriodSecs => "smart_period_secs",
            ConfigKey::UpdatePostFetchPauseMs => "post_fetch_pause_ms",
            ConfigKey::NetworkTimeoutSecs => "timeout_secs",
            ConfigKey::TelemetryIntervalSecs => "interval_secs",
            ConfigKey::EngineRelativeAge => "relative_age",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    pub fn name(self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value rendered as text; empty when unset.
    pub fn get(self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::StorageDataDir => config.storage.data_dir.display().to_string(),
            ConfigKey::UpdateNowWorkers => config.update.now_workers.to_string(),
            ConfigKey::UpdateSmartWorkers => config.update.smart_workers.to_string(),
            ConfigKey::UpdateSmartPeriodSecs => config.update.smart_period_secs.to_string(),
            ConfigKey::UpdatePostFetchPauseMs => config.update.post_fetch_pause_ms.to_string(),
            ConfigKey::NetworkTimeoutSecs => config.network.timeout_secs.to_string(),
            ConfigKey::TelemetryIntervalSecs => config.telemetry.interval_secs.to_string(),
            ConfigKey::EngineRelativeAge => config.engine.relative_age.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse `value` and store it in `config`.
    pub fn set(self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::StorageDataDir => config.storage.data_dir = self.path(value)?,
            ConfigKey::UpdateNowWorkers => config.update.now_workers = self.positive(value)?,
            ConfigKey::UpdateSmartWorkers => config.update.smart_workers = self.positive(value)?,
            ConfigKey::UpdateSmartPeriodSecs => {
                config.update.smart_period_secs = self.positive(value)?
            }
            ConfigKey::UpdatePostFetchPauseMs => {
                config.update.post_fetch_pause_ms = self.number(value)?
            }
            ConfigKey::NetworkTimeoutSecs => config.network.timeout_secs = self.positive(value)?,
            ConfigKey::TelemetryIntervalSecs => {
                config.telemetry.interval_secs = self.positive(value)?
            }
            ConfigKey::EngineRelativeAge => {
                config.engine.relative_age = value
                    .parse::<RelativeAgeBasis>()
                    .map_err(|_| self.invalid(value))?
            }
            ConfigKey::LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value));
                }
                config.logging.level = value.to_string();
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
        }
        Ok(())
    }

    fn invalid(self, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
        }
    }

    fn number<T: FromStr>(self, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| self.invalid(value))
    }

    fn positive<T: FromStr + PartialOrd + Default>(self, value: &str) -> Result<T, ConfigError> {
        let n: T = self.number(value)?;
        if n > T::default() {
            Ok(n)
        } else {
            Err(self.invalid(value))
        }
    }

    fn path(self, value: &str) -> Result<PathBuf, ConfigError> {
        if value.is_empty() {
            Err(self.invalid(value))
        } else {
            Ok(PathBuf::from(value))
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Where each store lives under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database shared by all record caches.
    pub fn cache_db(&self) -> PathBuf {
        self.root.join("cache.db")
    }

    /// Root of the file caches.
    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn stats_db(&self) -> PathBuf {
        self.root.join("stats.db")
    }

    pub fn registry_db(&self) -> PathBuf {
        self.root.join("registry.db")
    }

    /// Transient bodies of big resources being fetched.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }
}
