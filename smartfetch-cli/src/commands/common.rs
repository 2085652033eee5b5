//! Arguments shared across commands.

use clap::Args;
use smartfetch::cache::CacheSpec;
use smartfetch::link::LinkClass;
use smartfetch::proxy::ProxySpec;
use smartfetch::sensors::PowerState;
use smartfetch::Sensors;

use crate::error::CliError;

/// Device state to assume; the CLI has no sensors of its own.
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Current link: wifi, mobile-fast, mobile-slow, none or unknown
    #[arg(long, default_value = "wifi")]
    pub link: String,

    /// Treat the device as running on battery
    #[arg(long)]
    pub unplugged: bool,

    /// Report a low battery
    #[arg(long)]
    pub battery_low: bool,

    /// Report the screen as off
    #[arg(long)]
    pub screen_off: bool,
}

impl DeviceArgs {
    pub fn sensors(&self) -> Result<Sensors, CliError> {
        let link: LinkClass = self
            .link
            .parse()
            .map_err(|e| CliError::Argument(format!("{}", e)))?;
        Ok(Sensors::fixed(
            link,
            PowerState {
                connected: !self.unplugged,
                low: self.battery_low,
            },
            !self.screen_off,
        ))
    }
}

/// Where resources are cached and fetched from.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Resource manager name
    pub manager: String,

    /// Origin authority, e.g. https://origin.example
    #[arg(long)]
    pub proxy: String,

    /// Cache as method:name (record or file); defaults to record:<manager>
    #[arg(long)]
    pub cache: Option<String>,
}

impl TargetArgs {
    pub fn cache_spec(&self) -> Result<CacheSpec, CliError> {
        parse_cache(self.cache.as_deref(), &self.manager)
    }

    pub fn proxy_spec(&self) -> Result<ProxySpec, CliError> {
        self.proxy
            .parse()
            .map_err(|e| CliError::Argument(format!("proxy '{}': {}", self.proxy, e)))
    }
}

/// Parse `method:name`, falling back to `record:<manager>`.
pub fn parse_cache(spec: Option<&str>, manager: &str) -> Result<CacheSpec, CliError> {
    match spec {
        Some(s) => s
            .parse()
            .map_err(|e| CliError::Argument(format!("cache '{}': {}", s, e))),
        None => CacheSpec::record(manager).map_err(CliError::from),
    }
}

/// Render a millisecond duration with the largest whole unit.
pub fn format_duration_ms(ms: i64) -> String {
    const UNITS: [(i64, &str); 4] = [(86_400_000, "d"), (3_600_000, "h"), (60_000, "m"), (1_000, "s")];
    for (size, unit) in UNITS {
        if ms >= size && ms % size == 0 {
            return format!("{}{}", ms / size, unit);
        }
    }
    format!("{}ms", ms)
}
