//! Shared health counters for the /health endpoint.
//! Updated by the watcher's cycle, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cycle bookkeeping. All timestamps are unix nanoseconds, 0 = never.
#[derive(Default)]
pub struct HealthState {
    pub cycles_completed: AtomicU64,
    pub cycles_skipped: AtomicU64,
    pub last_cycle_started_ns: AtomicU64,
    pub last_cycle_finished_ns: AtomicU64,
    /// New filings found by the most recent completed cycle.
    pub last_cycle_new_filings: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub notify_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle_started(&self, now_ns: u64) {
        self.last_cycle_started_ns.store(now_ns, Ordering::Relaxed);
    }

    pub fn cycle_finished(&self, now_ns: u64, new_filings: u64) {
        self.last_cycle_finished_ns.store(now_ns, Ordering::Relaxed);
        self.last_cycle_new_filings.store(new_filings, Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notify_failures(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped.load(Ordering::Relaxed)
    }

    pub fn last_cycle_started_ns(&self) -> u64 {
        self.last_cycle_started_ns.load(Ordering::Relaxed)
    }

    pub fn last_cycle_finished_ns(&self) -> u64 {
        self.last_cycle_finished_ns.load(Ordering::Relaxed)
    }

    pub fn last_cycle_new_filings(&self) -> u64 {
        self.last_cycle_new_filings.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn notify_failures(&self) -> u64 {
        self.notify_failures.load(Ordering::Relaxed)
    }
}
