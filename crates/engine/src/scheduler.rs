// In crates/engine/src/scheduler.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;

use crate::{CycleReport, Monitor};

/// Where the scheduler currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// What a force-check request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// The scheduler was idle; a cycle starts immediately.
    Started,
    /// A cycle is already in flight; exactly one follow-up cycle is queued.
    Coalesced,
}

/// Counters and summary from the most recent completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub finished_at: DateTime<Utc>,
    pub checked: usize,
    pub triggered: usize,
    pub failures: usize,
}

/// Snapshot of the scheduler for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub state: SchedulerState,
    pub cycles_completed: u64,
    pub alerts_total: u64,
    pub last_cycle: Option<CycleSummary>,
}

/// Shared handle for poking and observing the scheduler from the outside
/// (the web server holds one).
pub struct SchedulerHandle {
    force: Notify,
    running: AtomicBool,
    cycles_completed: AtomicU64,
    alerts_total: AtomicU64,
    last_cycle: std::sync::Mutex<Option<CycleSummary>>,
}

impl SchedulerHandle {
    /// A fresh handle, idle with zeroed counters. [`Scheduler::new`] creates
    /// one and hands it back alongside the scheduler.
    pub fn new() -> Self {
        Self {
            force: Notify::new(),
            running: AtomicBool::new(false),
            cycles_completed: AtomicU64::new(0),
            alerts_total: AtomicU64::new(0),
            last_cycle: std::sync::Mutex::new(None),
        }
    }

    /// Requests an immediate cycle.
    ///
    /// `Notify` stores at most one permit, so any number of requests made
    /// while a cycle is in flight collapse into exactly one follow-up run.
    pub fn force_check(&self) -> TriggerOutcome {
        let in_flight = self.running.load(Ordering::SeqCst);
        self.force.notify_one();
        if in_flight {
            TriggerOutcome::Coalesced
        } else {
            TriggerOutcome::Started
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let last_cycle = self
            .last_cycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        SchedulerSnapshot {
            state: self.state(),
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            alerts_total: self.alerts_total.load(Ordering::SeqCst),
            last_cycle,
        }
    }

    fn record_cycle(&self, report: &CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        self.alerts_total
            .fetch_add(report.triggered() as u64, Ordering::SeqCst);
        let summary = CycleSummary {
            finished_at: report.finished_at,
            checked: report.checked(),
            triggered: report.triggered(),
            failures: report.failures(),
        };
        *self
            .last_cycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(summary);
    }
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the monitor: one cycle per poll interval, plus forced cycles on
/// demand, never more than one cycle in flight.
pub struct Scheduler {
    monitor: Monitor,
    poll_interval: Duration,
    handle: Arc<SchedulerHandle>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        monitor: Monitor,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, Arc<SchedulerHandle>) {
        let handle = Arc::new(SchedulerHandle::new());
        let scheduler = Self {
            monitor,
            poll_interval,
            handle: Arc::clone(&handle),
            shutdown,
        };
        (scheduler, handle)
    }

    /// Runs until shutdown is signalled. The first cycle starts immediately.
    ///
    /// Shutdown drains: an in-flight cycle finishes (and its state lands in
    /// the store) before the loop exits. The binary puts a grace timeout
    /// around this task for the pathological case of a hung cycle.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.poll_interval.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.handle.force.notified() => {
                    tracing::info!("forced cycle requested");
                    // The next scheduled run counts from now, so a forced
                    // cycle does not bunch up with an imminent tick.
                    ticker.reset();
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.handle.running.store(true, Ordering::SeqCst);
            let result = self.monitor.run_cycle().await;
            self.handle.running.store(false, Ordering::SeqCst);

            match result {
                Ok(report) => self.handle.record_cycle(&report),
                Err(e) => tracing::error!(error = %e, "monitor cycle failed"),
            }

            // Honor a shutdown that arrived while the cycle was in flight.
            if *self.shutdown.borrow() {
                break;
            }
        }

        tracing::info!("scheduler drained and stopped");
    }
}
