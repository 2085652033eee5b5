//! Terminal rendering of update events.

use std::collections::HashMap;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use smartfetch::events::{EventSink, SyncEvent};
use smartfetch::UpdateReport;

const BAR_TEMPLATE: &str = "{spinner} {msg:30!} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}";

/// Prints terminal events and draws one progress bar per download.
pub struct EventPrinter {
    bars: MultiProgress,
    active: Mutex<HashMap<String, ProgressBar>>,
}

impl EventPrinter {
    pub fn new() -> Self {
        Self {
            bars: MultiProgress::new(),
            active: Mutex::new(HashMap::new()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn take_bar(&self, uri: &str) -> Option<ProgressBar> {
        self.active.lock().remove(uri)
    }

    fn println(&self, line: String) {
        if self.bars.println(&line).is_err() {
            println!("{}", line);
        }
    }
}

impl EventSink for EventPrinter {
    fn emit(&self, event: SyncEvent) {
        match event {
            SyncEvent::Progress {
                uri,
                bytes_read,
                bytes_total,
                ..
            } => {
                let mut active = self.active.lock();
                let bar = active.entry(uri.clone()).or_insert_with(|| {
                    let bar = self.bars.add(ProgressBar::new(0));
                    bar.set_style(Self::bar_style());
                    bar.set_message(uri);
                    bar
                });
                if bytes_total >= 0 {
                    bar.set_length(bytes_total as u64);
                }
                bar.set_position(bytes_read);
            }
            SyncEvent::Updated { manager, uri } => {
                if let Some(bar) = self.take_bar(&uri) {
                    bar.finish_and_clear();
                }
                self.println(format!("{} {} {}", style("✓").green(), manager, uri));
            }
            SyncEvent::Error {
                manager,
                uri,
                message,
            } => {
                if let Some(bar) = uri.as_deref().and_then(|u| self.take_bar(u)) {
                    bar.abandon();
                }
                let target = uri.unwrap_or_else(|| "(wakeup)".to_string());
                self.println(format!(
                    "{} {} {}: {}",
                    style("✗").red(),
                    manager,
                    target,
                    style(message).red()
                ));
            }
        }
    }
}

/// Print the summary line of one wakeup.
pub fn print_report(report: &UpdateReport) {
    println!();
    println!("{}", style(format!("{} update: {}", report.mode, report.manager)).bold());
    println!("  Registered:   {}", report.considered);
    println!("  Selected:     {}", report.selected);
    println!("  Updated:      {}", report.updated);
    println!("  Not modified: {}", report.not_modified);
    println!("  Failed:       {}", report.failed);
    println!("  Duration:     {} ms", report.duration_ms);
}
