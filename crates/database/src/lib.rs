// In crates/database/src/lib.rs

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use app_config::types::DatabaseSettings;
use core_types::{AlertState, LogEntry, LogKind, NotifyOutcome, PricePoint, Symbol, WatchItem};

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::SymbolStatus;

use types::{LogRow, PriceRow, StateRow, StatusRow, WatchRow};

/// The persistence interface the rest of the application is written
/// against. The engine and the web server only ever see this trait, which
/// keeps both of them testable with an in-memory stand-in.
#[async_trait]
pub trait Store: Send + Sync {
    /// All watchlist entries, enabled or not, ordered by symbol.
    async fn tracked_symbols(&self) -> Result<Vec<WatchItem>>;

    /// A single watchlist entry, if the symbol is tracked.
    async fn watch_item(&self, symbol: &Symbol) -> Result<Option<WatchItem>>;

    /// Inserts or reconfigures a watchlist entry. Runtime bookkeeping
    /// (`last_price`, `last_checked`, `created_at`) survives a reconfigure;
    /// only the tuning fields are replaced. Returns the stored row.
    async fn upsert_watch(&self, item: &WatchItem) -> Result<WatchItem>;

    /// Removes a symbol and everything recorded about it. Returns whether
    /// the symbol was tracked at all.
    async fn remove_watch(&self, symbol: &Symbol) -> Result<bool>;

    /// The newest `window` price bars for a symbol, ordered oldest first.
    async fn price_history(&self, symbol: &Symbol, window: u32) -> Result<Vec<PricePoint>>;

    /// Records one price bar, replacing the close if the bar already exists,
    /// then prunes history beyond the configured retention.
    async fn append_price(&self, symbol: &Symbol, point: &PricePoint) -> Result<()>;

    /// Records a batch of price bars in one transaction, then prunes.
    async fn append_prices(&self, symbol: &Symbol, points: &[PricePoint]) -> Result<()>;

    /// The alert bookkeeping for a symbol; the default state if none was
    /// ever recorded.
    async fn alert_state(&self, symbol: &Symbol) -> Result<AlertState>;

    /// Replaces the alert bookkeeping for a symbol.
    async fn set_alert_state(&self, symbol: &Symbol, state: &AlertState) -> Result<()>;

    /// Stamps the watchlist row with the price and time of the latest check.
    async fn record_check(&self, symbol: &Symbol, price: f64, at: DateTime<Utc>) -> Result<()>;

    /// Records how the latest notification attempt went.
    async fn record_notify(&self, symbol: &Symbol, outcome: &NotifyOutcome) -> Result<()>;

    /// Appends a line to the activity log.
    async fn add_log(&self, symbol: &Symbol, kind: LogKind, message: &str) -> Result<()>;

    /// The newest `limit` activity log lines, newest first.
    async fn recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>>;

    /// A status row per tracked symbol: configuration joined with check and
    /// notification bookkeeping.
    async fn status(&self) -> Result<Vec<SymbolStatus>>;
}

/// SQLite-backed [`Store`] built on a `sqlx` connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    history_retention: u32,
}

/// Establishes a connection pool to the SQLite database and runs migrations.
///
/// The parent directory of the database file is created if it does not
/// exist, so a fresh checkout can start with nothing but a config file.
///
/// # Arguments
///
/// * `settings`: The database configuration settings.
pub async fn connect(settings: &DatabaseSettings) -> Result<SqliteStore> {
    ensure_sqlite_dir(&settings.url)?;

    let options = SqliteConnectOptions::from_str(&settings.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run database migrations. This ensures the database schema is up-to-date.
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(Error::from)?;

    Ok(SqliteStore {
        pool,
        history_retention: settings.history_retention,
    })
}

/// Opens a fresh in-memory database with the schema applied.
///
/// The pool is capped at a single connection: every new in-memory SQLite
/// connection starts from an empty database, so a second connection would
/// not see the schema.
pub async fn connect_in_memory(history_retention: u32) -> Result<SqliteStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(Error::from)?;

    Ok(SqliteStore {
        pool,
        history_retention,
    })
}

fn ensure_sqlite_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl SqliteStore {
    /// Drops price bars older than the newest `history_retention` for one
    /// symbol. Runs inside the caller's transaction when appending batches.
    async fn prune_history<'e, E>(&self, executor: E, symbol: &Symbol) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            DELETE FROM price_history
            WHERE symbol = ?1
              AND ts NOT IN (
                  SELECT ts FROM price_history
                  WHERE symbol = ?1
                  ORDER BY ts DESC
                  LIMIT ?2
              )
            "#,
        )
        .bind(symbol.as_str())
        .bind(self.history_retention as i64)
        .execute(executor)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn tracked_symbols(&self) -> Result<Vec<WatchItem>> {
        let rows = sqlx::query_as::<_, WatchRow>(
            r#"
            SELECT symbol, dma_period, displacement, alert_threshold, enabled,
                   last_price, last_checked, created_at
            FROM watch_list
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        rows.into_iter().map(WatchRow::into_item).collect()
    }

    async fn watch_item(&self, symbol: &Symbol) -> Result<Option<WatchItem>> {
        let row = sqlx::query_as::<_, WatchRow>(
            r#"
            SELECT symbol, dma_period, displacement, alert_threshold, enabled,
                   last_price, last_checked, created_at
            FROM watch_list
            WHERE symbol = ?1
            "#,
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        row.map(WatchRow::into_item).transpose()
    }

    async fn upsert_watch(&self, item: &WatchItem) -> Result<WatchItem> {
        // Reconfiguring an existing symbol must not reset what has already
        // been observed for it, so only the tuning columns are updated.
        sqlx::query(
            r#"
            INSERT INTO watch_list
                (symbol, dma_period, displacement, alert_threshold, enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (symbol) DO UPDATE SET
                dma_period = excluded.dma_period,
                displacement = excluded.displacement,
                alert_threshold = excluded.alert_threshold,
                enabled = excluded.enabled
            "#,
        )
        .bind(item.symbol.as_str())
        .bind(item.dma_period as i64)
        .bind(item.displacement as i64)
        .bind(item.alert_threshold_pct)
        .bind(item.enabled)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        match self.watch_item(&item.symbol).await? {
            Some(stored) => Ok(stored),
            None => Err(Error::Corrupt {
                column: "symbol",
                value: item.symbol.to_string(),
            }),
        }
    }

    async fn remove_watch(&self, symbol: &Symbol) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::OperationFailed)?;

        let removed = sqlx::query("DELETE FROM watch_list WHERE symbol = ?1")
            .bind(symbol.as_str())
            .execute(&mut *tx)
            .await
            .map_err(Error::OperationFailed)?
            .rows_affected()
            > 0;
        sqlx::query("DELETE FROM price_history WHERE symbol = ?1")
            .bind(symbol.as_str())
            .execute(&mut *tx)
            .await
            .map_err(Error::OperationFailed)?;
        sqlx::query("DELETE FROM alert_state WHERE symbol = ?1")
            .bind(symbol.as_str())
            .execute(&mut *tx)
            .await
            .map_err(Error::OperationFailed)?;

        tx.commit().await.map_err(Error::OperationFailed)?;
        Ok(removed)
    }

    async fn price_history(&self, symbol: &Symbol, window: u32) -> Result<Vec<PricePoint>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT ts, price FROM price_history
            WHERE symbol = ?1
            ORDER BY ts DESC
            LIMIT ?2
            "#,
        )
        .bind(symbol.as_str())
        .bind(window as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        // The query walks newest-to-oldest to apply the window; flip it back.
        let mut points: Vec<PricePoint> = rows.into_iter().map(PricePoint::from).collect();
        points.reverse();
        Ok(points)
    }

    async fn append_price(&self, symbol: &Symbol, point: &PricePoint) -> Result<()> {
        // The newest bar may be revised while the market is open, so a
        // duplicate timestamp replaces the close instead of failing.
        sqlx::query(
            r#"
            INSERT INTO price_history (symbol, ts, price)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (symbol, ts) DO UPDATE SET price = excluded.price
            "#,
        )
        .bind(symbol.as_str())
        .bind(point.timestamp)
        .bind(point.price)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        self.prune_history(&self.pool, symbol).await
    }

    async fn append_prices(&self, symbol: &Symbol, points: &[PricePoint]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::OperationFailed)?;

        for point in points {
            sqlx::query(
                r#"
                INSERT INTO price_history (symbol, ts, price)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (symbol, ts) DO UPDATE SET price = excluded.price
                "#,
            )
            .bind(symbol.as_str())
            .bind(point.timestamp)
            .bind(point.price)
            .execute(&mut *tx)
            .await
            .map_err(Error::OperationFailed)?;
        }
        self.prune_history(&mut *tx, symbol).await?;

        tx.commit().await.map_err(Error::OperationFailed)?;
        Ok(())
    }

    async fn alert_state(&self, symbol: &Symbol) -> Result<AlertState> {
        let row = sqlx::query_as::<_, StateRow>(
            r#"
            SELECT last_direction, last_alert_at FROM alert_state
            WHERE symbol = ?1
            "#,
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        match row {
            Some(row) => Ok(AlertState {
                last_direction: types::parse_direction(&row.last_direction)?,
                last_alert_at: row.last_alert_at,
            }),
            None => Ok(AlertState::default()),
        }
    }

    async fn set_alert_state(&self, symbol: &Symbol, state: &AlertState) -> Result<()> {
        // Notification bookkeeping lives in the same row but is written by
        // `record_notify`; the update list deliberately leaves it alone.
        sqlx::query(
            r#"
            INSERT INTO alert_state (symbol, last_direction, last_alert_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (symbol) DO UPDATE SET
                last_direction = excluded.last_direction,
                last_alert_at = excluded.last_alert_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(symbol.as_str())
        .bind(state.last_direction.as_str())
        .bind(state.last_alert_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(())
    }

    async fn record_check(&self, symbol: &Symbol, price: f64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE watch_list SET last_price = ?2, last_checked = ?3
            WHERE symbol = ?1
            "#,
        )
        .bind(symbol.as_str())
        .bind(price)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(())
    }

    async fn record_notify(&self, symbol: &Symbol, outcome: &NotifyOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_state (symbol, last_notify_ok, last_notify_at, last_notify_error, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (symbol) DO UPDATE SET
                last_notify_ok = excluded.last_notify_ok,
                last_notify_at = excluded.last_notify_at,
                last_notify_error = excluded.last_notify_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(symbol.as_str())
        .bind(outcome.ok)
        .bind(outcome.at)
        .bind(outcome.detail.as_deref())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(())
    }

    async fn add_log(&self, symbol: &Symbol, kind: LogKind, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_log (ts, symbol, kind, message)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(Utc::now())
        .bind(symbol.as_str())
        .bind(kind.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(())
    }

    async fn recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, ts, symbol, kind, message FROM alert_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        rows.into_iter().map(LogRow::into_entry).collect()
    }

    async fn status(&self) -> Result<Vec<SymbolStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT w.symbol, w.enabled, w.dma_period, w.displacement, w.alert_threshold,
                   w.last_price, w.last_checked,
                   s.last_direction, s.last_alert_at,
                   s.last_notify_ok, s.last_notify_at, s.last_notify_error
            FROM watch_list w
            LEFT JOIN alert_state s ON s.symbol = w.symbol
            ORDER BY w.symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        rows.into_iter().map(StatusRow::into_status).collect()
    }
}
