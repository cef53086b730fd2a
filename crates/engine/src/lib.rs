// In crates/engine/src/lib.rs

pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use api_client::PriceSource;
use core_types::{Direction, LogKind, NotifyOutcome, Symbol, WatchItem};
use database::Store;
use notifier::{AlertMail, Notifier};
use signal::{DmaOutcome, Evaluation};

pub use scheduler::{
    CycleSummary, Scheduler, SchedulerHandle, SchedulerSnapshot, SchedulerState, TriggerOutcome,
};

/// Tuning for one monitor instance, distilled from the settings by the
/// binary so this crate never reads configuration itself.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Recipient for alert mail.
    pub mail_to: String,
    /// Chart link template; `{symbol}` is replaced per alert.
    pub chart_url: Option<String>,
    /// Pause between symbols inside one cycle, for provider rate limits.
    pub symbol_pacing: Duration,
    /// How many bars a warmup fetch requests for a thin symbol.
    pub warmup_bars: u32,
}

/// The per-symbol monitor: fetches prices, maintains history, evaluates the
/// displaced average and dispatches alerts. One `run_cycle` walks the whole
/// watchlist; failures stay contained to the symbol that caused them.
pub struct Monitor {
    store: Arc<dyn Store>,
    source: Arc<dyn PriceSource>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
}

/// What happened to a single symbol during one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    /// A cross fired. `notified` is false when mail delivery failed; the
    /// state transition is persisted either way.
    Triggered {
        direction: Direction,
        notified: bool,
    },
    /// The side changed but stayed inside the noise threshold.
    WeakCross(Direction),
    /// The price landed exactly on the average.
    WentFlat,
    NoChange,
    /// Not enough stored bars yet, even after a warmup fetch.
    Skipped { required: u32, available: u32 },
    InvalidConfig(String),
    FetchFailed(String),
    StoreFailed(String),
    Disabled,
}

/// Summary of one full pass over the watchlist.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<(Symbol, SymbolOutcome)>,
}

impl CycleReport {
    /// Symbols actually evaluated (disabled ones excluded).
    pub fn checked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, SymbolOutcome::Disabled))
            .count()
    }

    pub fn triggered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SymbolOutcome::Triggered { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| {
                matches!(
                    o,
                    SymbolOutcome::FetchFailed(_)
                        | SymbolOutcome::StoreFailed(_)
                        | SymbolOutcome::InvalidConfig(_)
                )
            })
            .count()
    }
}

/// Internal error carrier so `?` works across the two fallible backends
/// inside `try_check`. Never leaves this crate; `check_symbol` flattens it
/// into a [`SymbolOutcome`].
enum CheckError {
    Fetch(api_client::Error),
    Store(database::Error),
}

impl From<api_client::Error> for CheckError {
    fn from(e: api_client::Error) -> Self {
        CheckError::Fetch(e)
    }
}

impl From<database::Error> for CheckError {
    fn from(e: database::Error) -> Self {
        CheckError::Store(e)
    }
}

impl Monitor {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn PriceSource>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            config,
        }
    }

    /// Runs one full pass over the watchlist, pacing requests to stay under
    /// the market data provider's rate limit.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let started_at = Utc::now();
        tracing::info!("--- monitor cycle start ---");

        let items = self.store.tracked_symbols().await?;
        if items.is_empty() {
            tracing::info!("watchlist is empty, nothing to check");
        }

        let mut outcomes = Vec::with_capacity(items.len());
        let mut paced = false;
        for item in items {
            if !item.enabled {
                tracing::debug!(symbol = %item.symbol, "skipping disabled symbol");
                outcomes.push((item.symbol.clone(), SymbolOutcome::Disabled));
                continue;
            }
            if paced {
                tokio::time::sleep(self.config.symbol_pacing).await;
            }
            paced = true;

            tracing::info!(symbol = %item.symbol, "checking");
            let outcome = self.check_symbol(&item).await;
            outcomes.push((item.symbol.clone(), outcome));
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        tracing::info!(
            checked = report.checked(),
            triggered = report.triggered(),
            failures = report.failures(),
            "--- monitor cycle end ---"
        );
        Ok(report)
    }

    /// Checks one symbol, absorbing its failures so the rest of the cycle
    /// keeps going.
    pub async fn check_symbol(&self, item: &WatchItem) -> SymbolOutcome {
        match self.try_check(item).await {
            Ok(outcome) => outcome,
            Err(CheckError::Fetch(e)) => {
                tracing::warn!(symbol = %item.symbol, error = %e, "market data fetch failed");
                SymbolOutcome::FetchFailed(e.to_string())
            }
            Err(CheckError::Store(e)) => {
                tracing::error!(symbol = %item.symbol, error = %e, "store operation failed");
                SymbolOutcome::StoreFailed(e.to_string())
            }
        }
    }

    async fn try_check(&self, item: &WatchItem) -> Result<SymbolOutcome, CheckError> {
        if item.dma_period == 0 {
            return Ok(SymbolOutcome::InvalidConfig(
                "dma_period must be at least 1".to_string(),
            ));
        }
        let required = item.required_history();
        let window = required.max(self.config.warmup_bars);

        // --- 1. Refresh stored history ---
        let stored = self.store.price_history(&item.symbol, window).await?;
        let history = if (stored.len() as u32) < required {
            // Fresh or thin symbol: backfill a whole window in one request
            // instead of trickling in one bar per cycle.
            let series = self.source.fetch_series(&item.symbol, window).await?;
            self.store.append_prices(&item.symbol, &series).await?;
            self.store.price_history(&item.symbol, window).await?
        } else {
            let latest = self.source.fetch_latest(&item.symbol).await?;
            self.store.append_price(&item.symbol, &latest).await?;
            self.store.price_history(&item.symbol, window).await?
        };

        let Some(newest) = history.last().copied() else {
            return Ok(SymbolOutcome::Skipped {
                required,
                available: 0,
            });
        };
        self.store
            .record_check(&item.symbol, newest.price, Utc::now())
            .await?;

        // --- 2. Compute the displaced average for the newest bar ---
        let dma = match signal::compute(&history, item.dma_period, item.displacement) {
            Ok(DmaOutcome::Series(points)) => match points.last() {
                Some(point) => point.value,
                None => {
                    return Ok(SymbolOutcome::Skipped {
                        required,
                        available: history.len() as u32,
                    });
                }
            },
            Ok(DmaOutcome::InsufficientHistory {
                required,
                available,
            }) => {
                tracing::info!(symbol = %item.symbol, required, available, "not enough history yet");
                return Ok(SymbolOutcome::Skipped {
                    required,
                    available,
                });
            }
            Err(signal::Error::InvalidPeriod) => {
                return Ok(SymbolOutcome::InvalidConfig(
                    "dma_period must be at least 1".to_string(),
                ));
            }
        };

        // --- 3. Evaluate, persist, then notify ---
        // The state write happens before the mail goes out: a crash or a
        // mail failure must never lead to the same cross firing twice.
        let state = self.store.alert_state(&item.symbol).await?;
        let now = Utc::now();
        match signal::evaluate(item, newest.price, dma, &state, now) {
            Evaluation::Trigger {
                direction,
                state: next,
            } => {
                self.store.set_alert_state(&item.symbol, &next).await?;
                let notified = self
                    .send_alert(item, direction, newest.price, dma, now)
                    .await;
                Ok(SymbolOutcome::Triggered {
                    direction,
                    notified,
                })
            }
            Evaluation::WeakCross {
                direction,
                state: next,
            } => {
                tracing::info!(
                    symbol = %item.symbol,
                    %direction,
                    price = newest.price,
                    dma,
                    "cross too weak, updating state only"
                );
                self.store.set_alert_state(&item.symbol, &next).await?;
                Ok(SymbolOutcome::WeakCross(direction))
            }
            Evaluation::WentFlat { state: next } => {
                self.store.set_alert_state(&item.symbol, &next).await?;
                Ok(SymbolOutcome::WentFlat)
            }
            Evaluation::NoChange => Ok(SymbolOutcome::NoChange),
        }
    }

    /// Renders and sends the alert mail, recording how it went. Only
    /// transport problems are reported to the caller via the return value;
    /// bookkeeping failures are logged and swallowed because the alert
    /// itself already happened.
    async fn send_alert(
        &self,
        item: &WatchItem,
        direction: Direction,
        price: f64,
        dma: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let chart_url = self
            .config
            .chart_url
            .as_ref()
            .map(|template| template.replace("{symbol}", item.symbol.as_str()));
        let mail = AlertMail {
            symbol: &item.symbol,
            direction,
            price,
            dma,
            period: item.dma_period,
            at: now,
            chart_url: chart_url.as_deref(),
        };
        let subject = mail.subject();
        tracing::warn!(symbol = %item.symbol, %direction, price, dma, "TRIGGER: {subject}");

        let alert_line = format!("{subject} (price ${price:.2}, DMA ${dma:.2})");
        if let Err(e) = self
            .store
            .add_log(&item.symbol, LogKind::Alert, &alert_line)
            .await
        {
            tracing::warn!(symbol = %item.symbol, error = %e, "failed to append activity log");
        }

        let sent = self
            .notifier
            .send(
                &self.config.mail_to,
                &subject,
                &mail.text_body(),
                &mail.html_body(),
            )
            .await;

        let (ok, detail) = match &sent {
            Ok(()) => (true, None),
            Err(e) => {
                tracing::error!(symbol = %item.symbol, error = %e, "alert mail failed");
                (false, Some(e.to_string()))
            }
        };
        let outcome = NotifyOutcome {
            ok,
            detail: detail.clone(),
            at: now,
        };
        if let Err(e) = self.store.record_notify(&item.symbol, &outcome).await {
            tracing::warn!(symbol = %item.symbol, error = %e, "failed to record notify outcome");
        }
        if let Some(err) = detail {
            let line = format!("mail delivery failed: {err}");
            if let Err(e) = self
                .store
                .add_log(&item.symbol, LogKind::NotifyFailure, &line)
                .await
            {
                tracing::warn!(symbol = %item.symbol, error = %e, "failed to append activity log");
            }
        }
        ok
    }
}
