use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::FilingSource;
use crate::identity::filing_id;
use crate::notifier::Notifier;
use crate::state::StateStore;
use crate::types::{Filing, FilingWithSymbol};

/// Knobs of the reconciliation loop, split out of [`Config`] so tests can
/// build a watcher without env parsing.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub symbols: Vec<String>,
    pub limit: usize,
    pub check_interval: Duration,
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
}

impl WatcherSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            symbols: cfg.symbols.clone(),
            limit: cfg.filings_limit,
            check_interval: cfg.check_interval(),
            fetch_timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            notify_timeout: Duration::from_secs(cfg.notify_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Nothing new this cycle; the notifier was not called.
    NotNeeded,
    Delivered,
    Failed,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Symbols whose fetch succeeded (including empty results).
    pub symbols_checked: usize,
    /// Symbols whose fetch failed or timed out; their state is untouched.
    pub symbols_failed: Vec<String>,
    pub new_filings: usize,
    pub notification: NotificationStatus,
    /// Shutdown was requested and the remaining symbols were not checked.
    pub interrupted: bool,
}

impl Default for CycleReport {
    fn default() -> Self {
        Self {
            symbols_checked: 0,
            symbols_failed: Vec::new(),
            new_filings: 0,
            notification: NotificationStatus::NotNeeded,
            interrupted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was already running; this request did nothing.
    Skipped,
}

/// Clears the in-progress flag however the cycle ends, including when its
/// future is dropped mid-await.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Runs check cycles: fetch each symbol, diff against persisted identities,
/// persist the new snapshot, then notify once with everything new.
///
/// Symbols are processed one at a time. At most one cycle runs at once; a
/// cycle requested while another is in flight is skipped.
pub struct Watcher {
    settings: WatcherSettings,
    store: StateStore,
    source: Arc<dyn FilingSource>,
    notifier: Arc<dyn Notifier>,
    cycle_running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    /// Set once state could not be persisted; the watcher does not recover.
    halt_reason: OnceLock<String>,
    health: Arc<HealthState>,
    fetch_latency: Arc<LatencyStats>,
}

impl Watcher {
    pub fn new(
        settings: WatcherSettings,
        store: StateStore,
        source: Arc<dyn FilingSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            store,
            source,
            notifier,
            cycle_running: AtomicBool::new(false),
            shutdown_tx,
            halt_reason: OnceLock::new(),
            health: Arc::new(HealthState::new()),
            fetch_latency: Arc::new(LatencyStats::new()),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn symbols(&self) -> &[String] {
        &self.settings.symbols
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn fetch_latency(&self) -> &Arc<LatencyStats> {
        &self.fetch_latency
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::Acquire)
    }

    /// Asks the timer loop to stop and any in-flight cycle to stop before its
    /// next symbol.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Drives cycles on the configured interval until [`Watcher::shutdown`].
    /// The first cycle runs immediately. Returns an error only when state
    /// could not be persisted.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.settings.check_interval);
        // A cycle that overruns the interval delays the next one instead of
        // triggering a burst of catch-up cycles.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            symbols = %self.settings.symbols.join(", "),
            interval_secs = self.settings.check_interval.as_secs(),
            limit = self.settings.limit,
            "Starting SEC filings watcher",
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => {}
            }
            if self.is_shutting_down() {
                if let Some(reason) = self.halt_reason.get() {
                    error!("Watcher halted after a check failed to persist state");
                    return Err(AppError::Persist(reason.clone()));
                }
                info!("Watcher stopped");
                return Ok(());
            }

            if let Err(e) = self.run_cycle().await {
                error!("Check cycle failed, stopping watcher: {e}");
                return Err(e);
            }
        }
    }

    /// Runs one full pass over all symbols, unless one is already running.
    ///
    /// A persistence failure halts the watcher whoever started the cycle:
    /// the timer loop ends with that error.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous check cycle still running, skipping this one");
            self.health.inc_cycles_skipped();
            return Ok(CycleOutcome::Skipped);
        }
        let _guard = CycleGuard(&self.cycle_running);

        let started = Instant::now();
        self.health.cycle_started(now_ns());
        info!("Checking for new SEC filings...");

        let report = match self.check_all_symbols().await {
            Ok(r) => r,
            Err(e) => {
                if let AppError::Persist(reason) = &e {
                    let _ = self.halt_reason.set(reason.clone());
                    self.shutdown();
                }
                return Err(e);
            }
        };

        self.health.cycle_finished(now_ns(), report.new_filings as u64);
        info!(
            checked = report.symbols_checked,
            failed = report.symbols_failed.len(),
            new = report.new_filings,
            notification = ?report.notification,
            interrupted = report.interrupted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Check completed: {} symbol(s) checked, {} failed, {} new filing(s)",
            report.symbols_checked,
            report.symbols_failed.len(),
            report.new_filings,
        );
        Ok(CycleOutcome::Completed(report))
    }

    async fn check_all_symbols(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut batch: Vec<FilingWithSymbol> = Vec::new();

        for symbol in &self.settings.symbols {
            // Safe point: every earlier symbol is fully persisted.
            if self.is_shutting_down() {
                warn!(symbol = %symbol, "Shutdown requested, abandoning remaining symbols");
                report.interrupted = true;
                break;
            }

            let filings = match self.fetch(symbol).await {
                Ok(f) => f,
                Err(e) => {
                    error!(symbol = %symbol, "[{symbol}] Error fetching filings, skipping: {e}");
                    self.health.inc_fetch_failures();
                    report.symbols_failed.push(symbol.clone());
                    continue;
                }
            };
            report.symbols_checked += 1;

            if filings.is_empty() {
                warn!(symbol = %symbol, "[{symbol}] No filings found in API response");
                continue;
            }

            let current_ids: Vec<String> = filings.iter().map(filing_id).collect();
            let new_ids = self.store.find_new_filings(symbol, &current_ids);
            let batch_len_before = batch.len();
            if !new_ids.is_empty() {
                collect_new(symbol, filings, &current_ids, &new_ids, &mut batch);
            }

            if let Err(e) = self.store.update_symbol_state(symbol, &current_ids) {
                error!(symbol = %symbol, "[{symbol}] Failed to persist state: {e}");
                // This symbol's filings stay unrecorded and will be found again,
                // so only the already-committed symbols are announced.
                batch.truncate(batch_len_before);
                if !batch.is_empty() {
                    self.deliver(&batch).await;
                }
                return Err(e);
            }
        }

        report.new_filings = batch.len();
        if !batch.is_empty() {
            report.notification = if self.deliver(&batch).await {
                NotificationStatus::Delivered
            } else {
                NotificationStatus::Failed
            };
        }
        Ok(report)
    }

    async fn fetch(&self, symbol: &str) -> Result<Vec<Filing>> {
        let started = Instant::now();
        let result = match timeout(
            self.settings.fetch_timeout,
            self.source.fetch(symbol, self.settings.limit),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(AppError::Timeout(self.settings.fetch_timeout.as_secs())),
        };
        self.fetch_latency.record(started.elapsed());
        result
    }

    /// Sends the batch. Failures are logged and counted, never returned:
    /// state has already advanced and must not be rolled back.
    async fn deliver(&self, batch: &[FilingWithSymbol]) -> bool {
        let result = match timeout(self.settings.notify_timeout, self.notifier.notify(batch)).await
        {
            Ok(r) => r,
            Err(_) => Err(AppError::Timeout(self.settings.notify_timeout.as_secs())),
        };
        match result {
            Ok(()) => {
                info!(filings = batch.len(), "Notification sent");
                true
            }
            Err(e) => {
                error!(filings = batch.len(), "Failed to send notification: {e}");
                self.health.inc_notify_failures();
                false
            }
        }
    }
}

/// Appends the fetched filings whose identity is new, tagged with `symbol`,
/// in fetch order.
fn collect_new(
    symbol: &str,
    filings: Vec<Filing>,
    current_ids: &[String],
    new_ids: &[String],
    batch: &mut Vec<FilingWithSymbol>,
) {
    let new_set: HashSet<&str> = new_ids.iter().map(String::as_str).collect();
    for (filing, id) in filings.into_iter().zip(current_ids) {
        if !new_set.contains(id.as_str()) {
            continue;
        }
        info!(
            symbol = %symbol,
            form_type = %filing.form_type,
            filed = %filing.filed,
            "[{symbol}] New filing: {} - Filed: {}{}",
            filing.form_type,
            filing.filed,
            filing.owner().map(|o| format!(" ({o})")).unwrap_or_default(),
        );
        batch.push(FilingWithSymbol {
            symbol: symbol.to_string(),
            filing,
        });
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
