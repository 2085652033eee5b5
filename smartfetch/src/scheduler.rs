//! Periodic wakeups.
//!
//! The [`SmartScheduler`] keeps at most one smart-mode schedule per
//! manager plus one telemetry loop, each as a tokio task driven by a
//! [`WakeupSource`]. Wakeups call into blocking code (SQLite, blocking
//! HTTP, worker threads), so every tick is handed to `spawn_blocking`
//! and awaited before the next tick is taken; a slow wakeup delays the
//! schedule instead of overlapping with itself.
//!
//! Each manager also owns a run gate that outlives its schedules. A wakeup
//! holds the gate for its whole blocking run, so a schedule installed by
//! re-activation waits for the replaced schedule's in-flight wakeup.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = SmartScheduler::new(ctx, tokio::runtime::Handle::current());
//! scheduler.activate_smart("news", Duration::from_secs(900), cache, proxies);
//! scheduler.start_telemetry(Duration::from_secs(900), collector);
//! // ...
//! scheduler.shutdown();
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Mutex as RunGate;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheSpec;
use crate::coordinator::{SyncContext, UpdateCoordinator};
use crate::proxy::ProxyFactory;
use crate::stats::TelemetryCollector;

/// Source of wakeup instants.
pub trait WakeupSource: Send {
    /// Resolves when the next wakeup is due.
    fn next_wakeup(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Fixed-period wakeups; the first one is immediate.
pub struct IntervalWakeup {
    interval: Interval,
}

impl IntervalWakeup {
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl WakeupSource for IntervalWakeup {
    fn next_wakeup(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.interval.tick().await;
        })
    }
}

struct Scheduled {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Scheduled {
    fn stop(self) {
        self.cancel.cancel();
        drop(self.task);
    }
}

/// Smart-mode and telemetry schedules on a tokio runtime.
pub struct SmartScheduler {
    ctx: SyncContext,
    runtime: Handle,
    root: CancellationToken,
    jobs: Mutex<HashMap<String, Scheduled>>,
    gates: Mutex<HashMap<String, Arc<RunGate<()>>>>,
    telemetry: Mutex<Option<Scheduled>>,
}

impl SmartScheduler {
    pub fn new(ctx: SyncContext, runtime: Handle) -> Self {
        Self {
            ctx,
            runtime,
            root: CancellationToken::new(),
            jobs: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            telemetry: Mutex::new(None),
        }
    }

    /// Run smart wakeups for `manager` every `period`, replacing any
    /// existing schedule for it.
    pub fn activate_smart(
        &self,
        manager: &str,
        period: Duration,
        cache: CacheSpec,
        proxies: Arc<dyn ProxyFactory>,
    ) {
        let wakeups = interval_on(&self.runtime, period);
        self.activate_with(manager, wakeups, cache, proxies);
        info!(manager, period_secs = period.as_secs(), "Smart updates activated");
    }

    /// Like [`activate_smart`](Self::activate_smart) with a custom wakeup source.
    pub fn activate_with(
        &self,
        manager: &str,
        mut wakeups: Box<dyn WakeupSource>,
        cache: CacheSpec,
        proxies: Arc<dyn ProxyFactory>,
    ) {
        let cancel = self.root.child_token();
        let ctx = self.ctx.clone();
        let name = manager.to_string();
        let token = cancel.clone();
        let gate = self.gate(manager);

        let task = self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = wakeups.next_wakeup() => {
                        let _running = tokio::select! {
                            biased;

                            _ = token.cancelled() => break,
                            guard = gate.lock() => guard,
                        };
                        let coordinator = UpdateCoordinator::new(ctx.clone())
                            .with_cancellation(token.child_token());
                        let manager = name.clone();
                        let cache = cache.clone();
                        let proxies = proxies.clone();
                        let wakeup = tokio::task::spawn_blocking(move || {
                            // Failures are already reported as events.
                            let _ = coordinator.update_smart(&manager, &cache, proxies.as_ref());
                        });
                        if let Err(e) = wakeup.await {
                            warn!(manager = %name, error = %e, "Smart wakeup task failed");
                        }
                    }
                }
            }
            debug!(manager = %name, "Smart schedule stopped");
        });

        if let Some(previous) = self
            .jobs
            .lock()
            .insert(manager.to_string(), Scheduled { cancel, task })
        {
            debug!(manager, "Replacing existing smart schedule");
            previous.stop();
        }
    }

    fn gate(&self, manager: &str) -> Arc<RunGate<()>> {
        self.gates
            .lock()
            .entry(manager.to_string())
            .or_insert_with(|| Arc::new(RunGate::new(())))
            .clone()
    }

    /// Stop smart wakeups for `manager`. Returns whether one was active.
    pub fn deactivate_smart(&self, manager: &str) -> bool {
        match self.jobs.lock().remove(manager) {
            Some(job) => {
                job.stop();
                info!(manager, "Smart updates deactivated");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, manager: &str) -> bool {
        self.jobs
            .lock()
            .get(manager)
            .is_some_and(|job| !job.task.is_finished())
    }

    pub fn active_managers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Tick `collector` every `period`, replacing a running telemetry loop.
    pub fn start_telemetry(&self, period: Duration, collector: Arc<TelemetryCollector>) {
        let wakeups = interval_on(&self.runtime, period);
        self.start_telemetry_with(wakeups, collector);
    }

    pub fn start_telemetry_with(
        &self,
        mut wakeups: Box<dyn WakeupSource>,
        collector: Arc<TelemetryCollector>,
    ) {
        let cancel = self.root.child_token();
        let token = cancel.clone();
        let task = self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = wakeups.next_wakeup() => {
                        let collector = collector.clone();
                        match tokio::task::spawn_blocking(move || collector.tick()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => warn!(error = %e, "Telemetry tick failed"),
                            Err(e) => warn!(error = %e, "Telemetry task failed"),
                        }
                    }
                }
            }
            debug!("Telemetry loop stopped");
        });

        if let Some(previous) = self.telemetry.lock().replace(Scheduled { cancel, task }) {
            previous.stop();
        }
    }

    pub fn telemetry_running(&self) -> bool {
        self.telemetry
            .lock()
            .as_ref()
            .is_some_and(|t| !t.task.is_finished())
    }

    /// Cancel every schedule. In-flight wakeups stop taking new resources.
    ///
    /// Schedules added afterwards are cancelled immediately.
    pub fn shutdown(&self) {
        self.root.cancel();
        for (_, job) in self.jobs.lock().drain() {
            job.stop();
        }
        if let Some(telemetry) = self.telemetry.lock().take() {
            telemetry.stop();
        }
        info!("Scheduler shut down");
    }
}

impl Drop for SmartScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// `tokio::time::interval` needs a runtime context.
fn interval_on(runtime: &Handle, period: Duration) -> Box<dyn WakeupSource> {
    let _guard = runtime.enter();
    Box::new(IntervalWakeup::new(period))
}
