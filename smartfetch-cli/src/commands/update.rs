//! Update commands: one-shot wakeups and the smart-mode daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;

use super::common::{DeviceArgs, TargetArgs};
use crate::error::CliError;
use crate::printer::{print_report, EventPrinter};
use crate::runner::CliRunner;

/// Arguments for `update-now` and `update-smart`.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub device: DeviceArgs,
}

/// Arguments for `daemon`.
#[derive(Debug, Args)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Seconds between smart wakeups (default from config)
    #[arg(long)]
    pub period: Option<u64>,

    /// Do not record telemetry samples
    #[arg(long)]
    pub no_telemetry: bool,
}

pub fn run_now(args: UpdateArgs) -> Result<(), CliError> {
    run_once(args, false)
}

pub fn run_smart(args: UpdateArgs) -> Result<(), CliError> {
    run_once(args, true)
}

fn run_once(args: UpdateArgs, smart: bool) -> Result<(), CliError> {
    let cache = args.target.cache_spec()?;
    let proxy = args.target.proxy_spec()?;
    let runner = CliRunner::new()?;
    runner.log_startup(if smart { "update-smart" } else { "update-now" });

    let service = runner.open_service(args.device.sensors()?, Arc::new(EventPrinter::new()))?;
    let manager = &args.target.manager;
    let report = if smart {
        service.update_smart_once(manager, &cache, &proxy)?
    } else {
        service.update_now(manager, &cache, &proxy)?
    };
    print_report(&report);
    Ok(())
}

pub fn run_daemon(args: DaemonArgs) -> Result<(), CliError> {
    let cache = args.target.cache_spec()?;
    let proxy = args.target.proxy_spec()?;
    let runner = CliRunner::new()?;
    runner.log_startup("daemon");

    let service = runner.open_service(args.device.sensors()?, Arc::new(EventPrinter::new()))?;
    let period = args
        .period
        .map(Duration::from_secs)
        .unwrap_or_else(|| runner.config().update.smart_period());

    println!("SmartFetch daemon v{}", smartfetch::VERSION);
    println!("=======================");
    println!();
    println!("Manager: {}", args.target.manager);
    println!("Cache:   {}", cache);
    println!("Origin:  {}", proxy);
    println!("Period:  {}s", period.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;

    service.activate_smart(&args.target.manager, Some(period), cache, &proxy)?;
    if !args.no_telemetry {
        service.start_telemetry();
    }

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    service.deactivate_smart(&args.target.manager);
    service.shutdown();
    println!("{}", style("Stopped.").dim());
    Ok(())
}
