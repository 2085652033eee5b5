//! Shared setup for commands that touch the stores.

use std::sync::Arc;

use smartfetch::config::ConfigFile;
use smartfetch::events::EventSink;
use smartfetch::logging::{init_logging, LoggingGuard};
use smartfetch::{Sensors, SyncService};
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Loads configuration, installs logging and owns the tokio runtime.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _log_guard: LoggingGuard,
}

impl CliRunner {
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load().unwrap_or_default();
        let log_guard = init_logging(&config.logging)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::Runtime(format!("Failed to start runtime: {}", e)))?;
        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = smartfetch::VERSION,
            command,
            data_dir = %self.config.storage.data_dir.display(),
            "SmartFetch starting"
        );
    }

    pub fn open_service(
        &self,
        sensors: Sensors,
        events: Arc<dyn EventSink>,
    ) -> Result<SyncService, CliError> {
        Ok(SyncService::open(
            &self.config,
            sensors,
            events,
            self.runtime.handle().clone(),
        )?)
    }
}
