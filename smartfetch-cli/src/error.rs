//! CLI error type.

use std::fmt;

use smartfetch::cache::CacheError;
use smartfetch::config::ConfigError;
use smartfetch::logging::LoggingError;
use smartfetch::proxy::FetchError;
use smartfetch::registry::RegistryError;
use smartfetch::stats::StatsError;
use smartfetch::SyncError;

/// Errors surfaced to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing configuration.
    Config(String),
    /// Invalid command-line argument.
    Argument(String),
    Logging(LoggingError),
    Registry(RegistryError),
    Stats(StatsError),
    Cache(CacheError),
    Proxy(FetchError),
    Sync(SyncError),
    /// Runtime or signal setup failed.
    Runtime(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Argument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Registry(e) => write!(f, "Registry error: {}", e),
            CliError::Stats(e) => write!(f, "Statistics error: {}", e),
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::Proxy(e) => write!(f, "Proxy error: {}", e),
            CliError::Sync(e) => write!(f, "Update failed: {}", e),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        CliError::Registry(e)
    }
}

impl From<StatsError> for CliError {
    fn from(e: StatsError) -> Self {
        CliError::Stats(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}

impl From<FetchError> for CliError {
    fn from(e: FetchError) -> Self {
        CliError::Proxy(e)
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Cache(e) => CliError::Cache(e),
            SyncError::Registry(e) => CliError::Registry(e),
            other => CliError::Sync(other),
        }
    }
}
