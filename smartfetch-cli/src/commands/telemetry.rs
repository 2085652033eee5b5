//! Telemetry commands.

use std::sync::Arc;

use clap::Subcommand;
use smartfetch::events::LogSink;
use smartfetch::stats::{StatsMatrix, DAY_ANY, REQUIRED_ENTRIES};
use smartfetch::Sensors;

use super::common::DeviceArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Telemetry subcommands.
#[derive(Debug, Subcommand)]
pub enum TelemetryAction {
    /// Record one link/screen sample and rebuild profiles if stale
    Tick {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Record that the application is in use now
    AppInUse,
    /// Rebuild the day x hour profiles immediately
    Rebuild,
    /// Show the aggregated profiles
    Show,
}

pub fn run(action: TelemetryAction) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    let sensors = match &action {
        TelemetryAction::Tick { device } => device.sensors()?,
        _ => Sensors::default(),
    };
    let service = runner.open_service(sensors, Arc::new(LogSink))?;
    let collector = service.collector();

    match action {
        TelemetryAction::Tick { .. } => match collector.tick()? {
            Some(report) => println!(
                "Sample recorded; profiles rebuilt ({} rows, {} raw rows purged)",
                report.rows_written, report.raw_purged
            ),
            None => println!("Sample recorded."),
        },
        TelemetryAction::AppInUse => {
            collector.mark_app_in_use()?;
            println!("App-in-use sample recorded.");
        }
        TelemetryAction::Rebuild => {
            let report = collector.force_rebuild()?;
            println!(
                "Rebuilt {} rows in {} ms ({} raw rows purged)",
                report.rows_written, report.duration_ms, report.raw_purged
            );
        }
        TelemetryAction::Show => {
            let (links, uses) = service.stats().raw_counts()?;
            println!("Raw samples: {} link, {} app-in-use", links, uses);
            let matrix = StatsMatrix::load(service.stats())?;
            print_matrix(&matrix);
        }
    }
    Ok(())
}

fn print_matrix(matrix: &StatsMatrix) {
    println!(
        "Profiles: {} speed / {} usage entries ({} required)",
        matrix.speed_entries(),
        matrix.usage_entries(),
        REQUIRED_ENTRIES
    );
    if matrix.speed_entries() == 0 {
        println!("No profiles yet. Run 'smartfetch telemetry rebuild'.");
        return;
    }

    println!();
    print!("hour ");
    for name in DAY_NAMES {
        print!(" {:>7}", name);
    }
    println!(" {:>7}", "any");

    for hour in 0..24 {
        print!("{:>4} ", hour);
        for day in (1..=7).chain(std::iter::once(DAY_ANY)) {
            match (matrix.speed(day, hour), matrix.usage(day, hour)) {
                (Some(speed), Some(usage)) => print!(" {:>3}/{:<3}", speed, usage),
                _ => print!(" {:>7}", "-"),
            }
        }
        println!();
    }
    println!();
    println!("Cells are speed/usage.");
}
