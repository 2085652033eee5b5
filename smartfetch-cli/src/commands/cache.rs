//! Cache management commands.

use std::sync::Arc;

use clap::Subcommand;
use smartfetch::cache::CacheProvider;
use smartfetch::clock::Clock;
use smartfetch::events::LogSink;
use smartfetch::resource::ResourceUri;
use smartfetch::Sensors;

use super::common::{format_duration_ms, parse_cache};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove expired and superseded candidates
    Maintain {
        /// Cache as method:name
        cache: String,
    },
    /// Remove every candidate of a cache
    Clear {
        /// Cache as method:name
        cache: String,
    },
    /// List stored candidates for one resource
    Inspect {
        /// Cache as method:name
        cache: String,
        /// Resource path
        uri: String,
    },
}

pub fn run(action: CacheAction) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    let service = runner.open_service(Sensors::default(), Arc::new(LogSink))?;

    match action {
        CacheAction::Maintain { cache } => {
            let spec = parse_cache(Some(cache.as_str()), "")?;
            let mut provider = service.open_cache(&spec)?;
            let report = provider.do_extensive_work()?;
            provider.close()?;
            println!("{}: {}", spec, report);
        }
        CacheAction::Clear { cache } => {
            let spec = parse_cache(Some(cache.as_str()), "")?;
            println!("Clearing cache {}", spec);
            let mut provider = service.open_cache(&spec)?;
            provider.clear_cache()?;
            provider.close()?;
            println!("Done.");
        }
        CacheAction::Inspect { cache, uri } => {
            let spec = parse_cache(Some(cache.as_str()), "")?;
            let uri = ResourceUri::new(&uri).map_err(|e| CliError::Argument(e.to_string()))?;
            let mut provider = service.open_cache(&spec)?;
            let now = service.context().clock.now_ms();

            let candidates = provider.candidates(&uri)?;
            println!("{} in {}", uri, spec);
            println!("  Best status: {}", provider.caching_status(&uri)?);
            println!("  Timestamp:   {}", provider.timestamp(&uri)?);
            println!("  Outdated:    {}", provider.is_outdated(&uri)?);
            println!("  Candidates:  {}", candidates.len());
            for c in candidates {
                let age = format_duration_ms(((now - c.timestamp) / 1000 * 1000).max(0));
                let state = if c.is_live(now) { "live" } else { "expired" };
                println!("    {:<8} stored {} ago, {}", c.status.to_string(), age, state);
            }
            provider.close()?;
        }
    }
    Ok(())
}
