// In crates/engine/tests/cycle.rs
//
// Drives the monitor and scheduler against in-memory doubles: a map-backed
// store, a scripted price source and a recording notifier. Each test stages
// a price path and asserts what was persisted, mailed and reported.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use api_client::PriceSource;
use core_types::{
    AlertState, Direction, LogEntry, LogKind, NotifyOutcome, PricePoint, Symbol, WatchItem,
};
use database::{Store, SymbolStatus};
use engine::{Monitor, MonitorConfig, Scheduler, SymbolOutcome, TriggerOutcome};
use notifier::Notifier;
use tokio::sync::watch;

// --- Test doubles ---

#[derive(Default)]
struct MemoryStore {
    items: Mutex<BTreeMap<String, WatchItem>>,
    prices: Mutex<HashMap<String, Vec<PricePoint>>>,
    states: Mutex<HashMap<String, AlertState>>,
    logs: Mutex<Vec<(String, LogKind, String)>>,
    notifies: Mutex<Vec<(String, NotifyOutcome)>>,
    fail_state_for: Mutex<HashSet<String>>,
}

impl MemoryStore {
    fn with_item(self, item: WatchItem) -> Self {
        self.items
            .lock()
            .unwrap()
            .insert(item.symbol.to_string(), item);
        self
    }

    fn with_prices(self, symbol: &str, points: Vec<PricePoint>) -> Self {
        self.prices.lock().unwrap().insert(symbol.to_string(), points);
        self
    }

    fn with_state(self, symbol: &str, state: AlertState) -> Self {
        self.states.lock().unwrap().insert(symbol.to_string(), state);
        self
    }

    fn failing_state_writes(self, symbol: &str) -> Self {
        self.fail_state_for.lock().unwrap().insert(symbol.to_string());
        self
    }

    fn state_of(&self, symbol: &str) -> AlertState {
        self.states
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or_default()
    }

    fn price_count(&self, symbol: &str) -> usize {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .map_or(0, Vec::len)
    }

    fn log_kinds(&self, symbol: &str) -> Vec<LogKind> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| s == symbol)
            .map(|(_, kind, _)| *kind)
            .collect()
    }
}

fn simulated_failure() -> database::Error {
    database::Error::Corrupt {
        column: "alert_state",
        value: "simulated write failure".to_string(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn tracked_symbols(&self) -> database::Result<Vec<WatchItem>> {
        Ok(self.items.lock().unwrap().values().cloned().collect())
    }

    async fn watch_item(&self, symbol: &Symbol) -> database::Result<Option<WatchItem>> {
        Ok(self.items.lock().unwrap().get(symbol.as_str()).cloned())
    }

    async fn upsert_watch(&self, item: &WatchItem) -> database::Result<WatchItem> {
        self.items
            .lock()
            .unwrap()
            .insert(item.symbol.to_string(), item.clone());
        Ok(item.clone())
    }

    async fn remove_watch(&self, symbol: &Symbol) -> database::Result<bool> {
        let removed = self.items.lock().unwrap().remove(symbol.as_str()).is_some();
        self.prices.lock().unwrap().remove(symbol.as_str());
        self.states.lock().unwrap().remove(symbol.as_str());
        Ok(removed)
    }

    async fn price_history(
        &self,
        symbol: &Symbol,
        window: u32,
    ) -> database::Result<Vec<PricePoint>> {
        let prices = self.prices.lock().unwrap();
        let series = prices.get(symbol.as_str()).cloned().unwrap_or_default();
        let skip = series.len().saturating_sub(window as usize);
        Ok(series[skip..].to_vec())
    }

    async fn append_price(&self, symbol: &Symbol, point: &PricePoint) -> database::Result<()> {
        let mut prices = self.prices.lock().unwrap();
        let series = prices.entry(symbol.to_string()).or_default();
        match series.iter_mut().find(|p| p.timestamp == point.timestamp) {
            Some(existing) => existing.price = point.price,
            None => series.push(*point),
        }
        Ok(())
    }

    async fn append_prices(&self, symbol: &Symbol, points: &[PricePoint]) -> database::Result<()> {
        for point in points {
            self.append_price(symbol, point).await?;
        }
        Ok(())
    }

    async fn alert_state(&self, symbol: &Symbol) -> database::Result<AlertState> {
        Ok(self.state_of(symbol.as_str()))
    }

    async fn set_alert_state(&self, symbol: &Symbol, state: &AlertState) -> database::Result<()> {
        if self.fail_state_for.lock().unwrap().contains(symbol.as_str()) {
            return Err(simulated_failure());
        }
        self.states
            .lock()
            .unwrap()
            .insert(symbol.to_string(), *state);
        Ok(())
    }

    async fn record_check(
        &self,
        symbol: &Symbol,
        price: f64,
        at: DateTime<Utc>,
    ) -> database::Result<()> {
        if let Some(item) = self.items.lock().unwrap().get_mut(symbol.as_str()) {
            item.last_price = Some(price);
            item.last_checked = Some(at);
        }
        Ok(())
    }

    async fn record_notify(
        &self,
        symbol: &Symbol,
        outcome: &NotifyOutcome,
    ) -> database::Result<()> {
        self.notifies
            .lock()
            .unwrap()
            .push((symbol.to_string(), outcome.clone()));
        Ok(())
    }

    async fn add_log(
        &self,
        symbol: &Symbol,
        kind: LogKind,
        message: &str,
    ) -> database::Result<()> {
        self.logs
            .lock()
            .unwrap()
            .push((symbol.to_string(), kind, message.to_string()));
        Ok(())
    }

    async fn recent_logs(&self, limit: u32) -> database::Result<Vec<LogEntry>> {
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .rev()
            .take(limit as usize)
            .enumerate()
            .map(|(i, (symbol, kind, message))| LogEntry {
                id: i as i64,
                timestamp: Utc::now(),
                symbol: Symbol::parse(symbol).unwrap(),
                kind: *kind,
                message: message.clone(),
            })
            .collect())
    }

    async fn status(&self) -> database::Result<Vec<SymbolStatus>> {
        let items = self.items.lock().unwrap();
        Ok(items
            .values()
            .map(|item| {
                let state = self.state_of(item.symbol.as_str());
                SymbolStatus {
                    symbol: item.symbol.clone(),
                    enabled: item.enabled,
                    dma_period: item.dma_period,
                    displacement: item.displacement,
                    alert_threshold_pct: item.alert_threshold_pct,
                    last_price: item.last_price,
                    last_checked: item.last_checked,
                    last_direction: state.last_direction,
                    last_alert_at: state.last_alert_at,
                    last_notify_ok: None,
                    last_notify_at: None,
                    last_notify_error: None,
                }
            })
            .collect())
    }
}

#[derive(Default)]
struct ScriptedSource {
    series: Mutex<HashMap<String, Vec<PricePoint>>>,
    latest: Mutex<HashMap<String, VecDeque<PricePoint>>>,
    fail: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    series_calls: AtomicUsize,
    latest_calls: AtomicUsize,
}

impl ScriptedSource {
    fn with_series(self, symbol: &str, points: Vec<PricePoint>) -> Self {
        self.series.lock().unwrap().insert(symbol.to_string(), points);
        self
    }

    fn with_latest(self, symbol: &str, points: Vec<PricePoint>) -> Self {
        self.latest
            .lock()
            .unwrap()
            .insert(symbol.to_string(), points.into());
        self
    }

    fn failing(self, symbol: &str) -> Self {
        self.fail.lock().unwrap().insert(symbol.to_string());
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_latest(&self, symbol: &Symbol) -> api_client::Result<PricePoint> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.lock().unwrap().contains(symbol.as_str()) {
            return Err(api_client::Error::RateLimited);
        }
        self.latest
            .lock()
            .unwrap()
            .get_mut(symbol.as_str())
            .and_then(VecDeque::pop_front)
            .ok_or(api_client::Error::EmptySeries)
    }

    async fn fetch_series(&self, symbol: &Symbol, bars: u32) -> api_client::Result<Vec<PricePoint>> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.lock().unwrap().contains(symbol.as_str()) {
            return Err(api_client::Error::RateLimited);
        }
        let series = self
            .series
            .lock()
            .unwrap()
            .get(symbol.as_str())
            .cloned()
            .unwrap_or_default();
        let skip = series.len().saturating_sub(bars as usize);
        Ok(series[skip..].to_vec())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, subject)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        _text_body: &str,
        _html_body: &str,
    ) -> notifier::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            let err = "not-an-address".parse::<lettre::Address>().unwrap_err();
            return Err(notifier::Error::Address(err));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

// --- Helpers ---

fn bar(day: u32, price: f64) -> PricePoint {
    PricePoint {
        timestamp: Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap(),
        price,
    }
}

fn bars(prices: &[(u32, f64)]) -> Vec<PricePoint> {
    prices.iter().map(|&(day, price)| bar(day, price)).collect()
}

fn watch(symbol: &str, period: u32, threshold_pct: f64) -> WatchItem {
    WatchItem {
        symbol: Symbol::parse(symbol).unwrap(),
        dma_period: period,
        displacement: 0,
        alert_threshold_pct: threshold_pct,
        enabled: true,
        last_price: None,
        last_checked: None,
        created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
    }
}

fn monitor(
    store: Arc<MemoryStore>,
    source: Arc<ScriptedSource>,
    notifier: Arc<RecordingNotifier>,
) -> Monitor {
    Monitor::new(
        store,
        source,
        notifier,
        MonitorConfig {
            mail_to: "me@example.com".to_string(),
            chart_url: None,
            symbol_pacing: Duration::ZERO,
            warmup_bars: 5,
        },
    )
}

// --- Monitor cycle behavior ---

#[tokio::test]
async fn crossing_fires_once_then_stays_quiet() {
    let store = Arc::new(
        MemoryStore::default()
            .with_item(watch("ACME", 3, 0.0))
            .with_prices("ACME", bars(&[(1, 10.0), (2, 10.0), (3, 10.0)])),
    );
    let source = Arc::new(ScriptedSource::default().with_latest(
        "ACME",
        bars(&[(4, 12.0), (5, 8.0), (6, 8.0)]),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source, notifier.clone());

    let first = monitor.run_cycle().await.unwrap();
    assert_eq!(
        first.outcomes[0].1,
        SymbolOutcome::Triggered {
            direction: Direction::Above,
            notified: true
        }
    );

    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(
        second.outcomes[0].1,
        SymbolOutcome::Triggered {
            direction: Direction::Below,
            notified: true
        }
    );

    // Still below on the third bar: no transition, no mail.
    let third = monitor.run_cycle().await.unwrap();
    assert_eq!(third.outcomes[0].1, SymbolOutcome::NoChange);

    let subjects = notifier.subjects();
    assert_eq!(
        subjects,
        vec![
            "ALERT: ACME crossed above 3 DMA".to_string(),
            "ALERT: ACME crossed below 3 DMA".to_string(),
        ]
    );
    assert_eq!(store.state_of("ACME").last_direction, Direction::Below);
    assert!(store.state_of("ACME").last_alert_at.is_some());
}

#[tokio::test]
async fn fresh_symbol_warms_up_with_one_series_fetch() {
    let store = Arc::new(MemoryStore::default().with_item(watch("NEWB", 3, 0.0)));
    let source = Arc::new(ScriptedSource::default().with_series(
        "NEWB",
        bars(&[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0)]),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source.clone(), notifier.clone());

    let report = monitor.run_cycle().await.unwrap();

    // 5 is above the mean of (3, 4, 5): the very first evaluation may alert.
    assert_eq!(
        report.outcomes[0].1,
        SymbolOutcome::Triggered {
            direction: Direction::Above,
            notified: true
        }
    );
    assert_eq!(store.price_count("NEWB"), 5);
    assert_eq!(source.series_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn thin_series_is_skipped_not_failed() {
    let store = Arc::new(MemoryStore::default().with_item(watch("THIN", 3, 0.0)));
    let source = Arc::new(
        ScriptedSource::default().with_series("THIN", bars(&[(1, 10.0), (2, 11.0)])),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source, notifier.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(
        report.outcomes[0].1,
        SymbolOutcome::Skipped {
            required: 3,
            available: 2
        }
    );
    assert!(notifier.subjects().is_empty());
    assert_eq!(store.state_of("THIN"), AlertState::default());
    // The partial history was still persisted for the next cycle.
    assert_eq!(store.price_count("THIN"), 2);
}

#[tokio::test]
async fn fetch_failure_is_contained_to_its_symbol() {
    let store = Arc::new(
        MemoryStore::default()
            .with_item(watch("BAD", 3, 0.0))
            .with_prices("BAD", bars(&[(1, 10.0), (2, 10.0), (3, 10.0)]))
            .with_item(watch("GOOD", 3, 0.0))
            .with_prices("GOOD", bars(&[(1, 10.0), (2, 10.0), (3, 10.0)])),
    );
    let source = Arc::new(
        ScriptedSource::default()
            .failing("BAD")
            .with_latest("GOOD", bars(&[(4, 12.0)])),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source, notifier.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert!(matches!(
        report.outcomes[0].1,
        SymbolOutcome::FetchFailed(_)
    ));
    assert!(matches!(
        report.outcomes[1].1,
        SymbolOutcome::Triggered { .. }
    ));
    assert_eq!(notifier.subjects().len(), 1);
    assert!(notifier.subjects()[0].contains("GOOD"));
    assert_eq!(store.state_of("BAD"), AlertState::default());
}

#[tokio::test]
async fn store_failure_cannot_block_other_symbols() {
    let mut store = MemoryStore::default();
    for symbol in ["AAA", "BBB", "CCC"] {
        store = store
            .with_item(watch(symbol, 3, 0.0))
            .with_prices(symbol, bars(&[(1, 10.0), (2, 10.0), (3, 10.0)]));
    }
    let store = Arc::new(store.failing_state_writes("BBB"));
    let mut source = ScriptedSource::default();
    for symbol in ["AAA", "BBB", "CCC"] {
        source = source.with_latest(symbol, bars(&[(4, 12.0)]));
    }
    let source = Arc::new(source);
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source, notifier.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert!(matches!(
        report.outcomes[0].1,
        SymbolOutcome::Triggered { .. }
    ));
    assert!(matches!(report.outcomes[1].1, SymbolOutcome::StoreFailed(_)));
    assert!(matches!(
        report.outcomes[2].1,
        SymbolOutcome::Triggered { .. }
    ));
    assert_eq!(report.failures(), 1);

    // State persists before mail goes out, so the symbol whose state write
    // failed must not have been mailed about.
    let subjects = notifier.subjects();
    assert_eq!(subjects.len(), 2);
    assert!(subjects[0].contains("AAA"));
    assert!(subjects[1].contains("CCC"));
}

#[tokio::test]
async fn mail_failure_still_persists_the_transition() {
    let store = Arc::new(
        MemoryStore::default()
            .with_item(watch("ACME", 3, 0.0))
            .with_prices("ACME", bars(&[(1, 10.0), (2, 10.0), (3, 10.0)])),
    );
    let source = Arc::new(
        ScriptedSource::default().with_latest("ACME", bars(&[(4, 12.0), (5, 13.0)])),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    notifier.fail.store(true, Ordering::SeqCst);
    let monitor = monitor(store.clone(), source, notifier.clone());

    let first = monitor.run_cycle().await.unwrap();
    assert_eq!(
        first.outcomes[0].1,
        SymbolOutcome::Triggered {
            direction: Direction::Above,
            notified: false
        }
    );

    // The failed delivery was recorded, and the transition stuck.
    let notifies = store.notifies.lock().unwrap().clone();
    assert_eq!(notifies.len(), 1);
    assert!(!notifies[0].1.ok);
    assert!(notifies[0].1.detail.is_some());
    assert_eq!(store.state_of("ACME").last_direction, Direction::Above);
    assert_eq!(
        store.log_kinds("ACME"),
        vec![LogKind::Alert, LogKind::NotifyFailure]
    );

    // Next bar stays above: the alert does not re-fire just because the
    // mail never went out.
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.outcomes[0].1, SymbolOutcome::NoChange);
}

#[tokio::test]
async fn weak_cross_updates_state_without_mail() {
    let store = Arc::new(
        MemoryStore::default()
            .with_item(watch("ACME", 3, 5.0))
            .with_prices("ACME", bars(&[(1, 100.0), (2, 100.0), (3, 100.0)]))
            .with_state(
                "ACME",
                AlertState {
                    last_direction: Direction::Below,
                    last_alert_at: None,
                },
            ),
    );
    let source = Arc::new(ScriptedSource::default().with_latest("ACME", bars(&[(4, 101.0)])));
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source, notifier.clone());

    let report = monitor.run_cycle().await.unwrap();

    // 101 against a ~100.33 average is a 0.66% move, inside the 5% band.
    assert_eq!(
        report.outcomes[0].1,
        SymbolOutcome::WeakCross(Direction::Above)
    );
    assert!(notifier.subjects().is_empty());
    let state = store.state_of("ACME");
    assert_eq!(state.last_direction, Direction::Above);
    assert_eq!(state.last_alert_at, None);
}

#[tokio::test]
async fn disabled_symbols_are_not_checked() {
    let mut item = watch("OFF", 3, 0.0);
    item.enabled = false;
    let store = Arc::new(
        MemoryStore::default()
            .with_item(item)
            .with_prices("OFF", bars(&[(1, 10.0), (2, 10.0), (3, 10.0)])),
    );
    let source = Arc::new(ScriptedSource::default().with_latest("OFF", bars(&[(4, 12.0)])));
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), source.clone(), notifier.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.outcomes[0].1, SymbolOutcome::Disabled);
    assert_eq!(report.checked(), 0);
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 0);
    assert!(notifier.subjects().is_empty());
}

#[tokio::test]
async fn empty_watchlist_cycle_is_a_noop() {
    let store = Arc::new(MemoryStore::default());
    let source = Arc::new(ScriptedSource::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store, source, notifier);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.checked(), 0);
    assert_eq!(report.triggered(), 0);
}

// --- Scheduler behavior ---

fn scheduler_fixture(
    delay: Option<Duration>,
) -> (Arc<MemoryStore>, Arc<RecordingNotifier>, Monitor) {
    let store = Arc::new(
        MemoryStore::default()
            .with_item(watch("ACME", 3, 0.0))
            .with_prices("ACME", bars(&[(1, 10.0), (2, 10.0), (3, 10.0)])),
    );
    let mut source = ScriptedSource::default().with_latest(
        "ACME",
        bars(&[(4, 12.0), (5, 8.0), (6, 8.0), (7, 8.0)]),
    );
    if let Some(delay) = delay {
        source = source.slow(delay);
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), Arc::new(source), notifier.clone());
    (store, notifier, monitor)
}

#[tokio::test]
async fn force_check_while_idle_starts_a_cycle() {
    let (_store, _notifier, monitor) = scheduler_fixture(None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, handle) = Scheduler::new(monitor, Duration::from_secs(3600), shutdown_rx);
    let task = tokio::spawn(scheduler.run());

    // The first cycle runs immediately on startup.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot().cycles_completed, 1);

    let outcome = handle.force_check();
    assert_eq!(outcome, TriggerOutcome::Started);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot().cycles_completed, 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn forced_checks_during_a_cycle_coalesce_into_one() {
    let (_store, _notifier, monitor) = scheduler_fixture(Some(Duration::from_millis(200)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, handle) = Scheduler::new(monitor, Duration::from_secs(3600), shutdown_rx);
    let task = tokio::spawn(scheduler.run());

    // Land inside the first (slow) cycle, then hammer the force endpoint.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcomes = [
        handle.force_check(),
        handle.force_check(),
        handle.force_check(),
    ];
    assert_eq!(
        outcomes,
        [
            TriggerOutcome::Coalesced,
            TriggerOutcome::Coalesced,
            TriggerOutcome::Coalesced
        ]
    );

    // First cycle plus exactly one coalesced follow-up.
    tokio::time::sleep(Duration::from_millis(650)).await;
    assert_eq!(handle.snapshot().cycles_completed, 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_the_inflight_cycle() {
    let (store, notifier, monitor) = scheduler_fixture(Some(Duration::from_millis(200)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, handle) = Scheduler::new(monitor, Duration::from_secs(3600), shutdown_rx);
    let task = tokio::spawn(scheduler.run());

    // Signal shutdown while the first cycle is still fetching.
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("scheduler should drain promptly")
        .unwrap();

    // The in-flight cycle ran to completion: its alert was evaluated,
    // persisted and mailed before the loop exited.
    assert_eq!(handle.snapshot().cycles_completed, 1);
    assert_eq!(store.state_of("ACME").last_direction, Direction::Above);
    assert_eq!(notifier.subjects().len(), 1);
}
