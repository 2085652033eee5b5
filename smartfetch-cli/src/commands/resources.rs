//! Managed-resource registration commands.

use std::sync::Arc;

use clap::Args;
use smartfetch::clock::SECOND_MS;
use smartfetch::events::LogSink;
use smartfetch::resource::{ResourceConfig, ResourceUri};
use smartfetch::Sensors;

use super::common::format_duration_ms;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `register`.
#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// Resource manager name
    pub manager: String,

    /// Resource path on the origin, e.g. /feeds/today
    pub uri: String,

    /// Priority; lower values are fetched first
    #[arg(long, default_value_t = 0)]
    pub priority: i32,

    /// Seconds after which a stored copy counts as outdated
    #[arg(long, default_value_t = 3600)]
    pub interval: i64,

    /// Seconds a stored copy stays usable
    #[arg(long, default_value_t = 86400)]
    pub lifespan: i64,

    /// Prefer fetching on fast links only
    #[arg(long)]
    pub connection_decisive: bool,

    /// Stream the body to a file instead of memory
    #[arg(long)]
    pub big: bool,
}

pub fn run_register(args: RegisterArgs) -> Result<(), CliError> {
    let uri = parse_uri(&args.uri)?;
    if args.interval <= 0 || args.lifespan <= 0 {
        return Err(CliError::Argument(
            "--interval and --lifespan must be positive".to_string(),
        ));
    }
    let config = ResourceConfig::new(
        args.priority,
        args.interval * SECOND_MS,
        args.lifespan * SECOND_MS,
        args.connection_decisive,
    );

    let runner = CliRunner::new()?;
    let service = runner.open_service(Sensors::default(), Arc::new(LogSink))?;
    service
        .registry()
        .register(&args.manager, &uri, &config, args.big)?;

    println!(
        "Registered {} for '{}' (priority {}, every {}, kept {}{})",
        uri,
        args.manager,
        config.priority(),
        format_duration_ms(config.update_interval_ms()),
        format_duration_ms(config.cache_lifespan_ms()),
        if args.big { ", big" } else { "" }
    );
    Ok(())
}

pub fn run_unregister(manager: &str, uri: &str) -> Result<(), CliError> {
    let uri = parse_uri(uri)?;
    let runner = CliRunner::new()?;
    let service = runner.open_service(Sensors::default(), Arc::new(LogSink))?;
    if service.registry().unregister(manager, &uri)? {
        println!("Unregistered {} from '{}'", uri, manager);
    } else {
        println!("{} is not registered for '{}'", uri, manager);
    }
    Ok(())
}

pub fn run_list(manager: Option<&str>) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    let service = runner.open_service(Sensors::default(), Arc::new(LogSink))?;
    let registry = service.registry();

    let managers = match manager {
        Some(m) => vec![m.to_string()],
        None => registry.managers()?,
    };
    if managers.is_empty() {
        println!("No resources registered.");
        return Ok(());
    }

    for manager in managers {
        let resources = registry.resources(&manager)?;
        println!("[{}] {} resource(s)", manager, resources.len());
        for r in resources {
            println!(
                "  {:<40} prio {:>3}  every {:>5}  kept {:>5}{}{}",
                r.uri.as_str(),
                r.config.priority(),
                format_duration_ms(r.config.update_interval_ms()),
                format_duration_ms(r.config.cache_lifespan_ms()),
                if r.config.connection_decisive() { "  link-decisive" } else { "" },
                if r.big { "  big" } else { "" }
            );
        }
    }
    Ok(())
}

fn parse_uri(uri: &str) -> Result<ResourceUri, CliError> {
    ResourceUri::new(uri).map_err(|e| CliError::Argument(e.to_string()))
}
