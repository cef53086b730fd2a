// In crates/app-config/src/types.rs

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the HTTP API server.
    pub server: ServerSettings,
    /// Settings for the database connection.
    pub database: DatabaseSettings,
    /// Settings for the Twelve Data market data API.
    pub twelvedata: TwelveDataSettings,
    /// Settings for the polling loop.
    pub monitor: MonitorSettings,
    /// Settings for outgoing alert mail.
    pub smtp: SmtpSettings,
    /// Settings guarding privileged endpoints.
    pub admin: AdminSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    /// The connection URL for the SQLite database, e.g. `sqlite://data/monitor.db`.
    pub url: String,
    /// How many price bars to keep per symbol. Must stay comfortably above
    /// the largest `period + displacement` in the watchlist.
    #[serde(default = "default_history_retention")]
    pub history_retention: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TwelveDataSettings {
    /// The API key for Twelve Data.
    pub api_key: String,
    /// The REST base URL for Twelve Data.
    #[serde(default = "default_twelvedata_base_url")]
    pub base_url: String,
    /// Bar interval requested from the time series endpoint.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// How many bars a warmup fetch asks for.
    #[serde(default = "default_outputsize")]
    pub outputsize: u32,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MonitorSettings {
    /// Seconds between scheduled polling cycles.
    pub poll_interval_secs: u64,
    /// Pause between symbols inside one cycle, to stay under the market
    /// data provider's rate limit.
    #[serde(default = "default_symbol_pacing_ms")]
    pub symbol_pacing_ms: u64,
    /// How long shutdown waits for an in-flight cycle before giving up.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address on outgoing alerts.
    pub from: String,
    /// Recipient address for alerts.
    pub to: String,
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional chart link template embedded in alert mail. `{symbol}` is
    /// replaced with the ticker.
    #[serde(default)]
    pub chart_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AdminSettings {
    /// Shared secret required by the force-check endpoint.
    pub token: String,
}

impl Settings {
    /// Checks the invariants the rest of the application assumes. Returns
    /// the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_secs == 0 {
            return Err(invalid(
                "monitor.poll_interval_secs",
                "must be at least 1 second",
            ));
        }
        if self.twelvedata.api_key.trim().is_empty() {
            return Err(invalid("twelvedata.api_key", "must not be empty"));
        }
        if self.twelvedata.outputsize == 0 {
            return Err(invalid("twelvedata.outputsize", "must be at least 1"));
        }
        if self.database.history_retention < 2 {
            return Err(invalid(
                "database.history_retention",
                "must keep at least 2 bars",
            ));
        }
        if self.admin.token.trim().is_empty() {
            return Err(invalid("admin.token", "must not be empty"));
        }
        if self.smtp.host.trim().is_empty() {
            return Err(invalid("smtp.host", "must not be empty"));
        }
        if self.smtp.from.trim().is_empty() {
            return Err(invalid("smtp.from", "must not be empty"));
        }
        if self.smtp.to.trim().is_empty() {
            return Err(invalid("smtp.to", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> Error {
    Error::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Helper functions for serde defaults
fn default_history_retention() -> u32 {
    500
}
fn default_twelvedata_base_url() -> String {
    "https://api.twelvedata.com".to_string()
}
fn default_interval() -> String {
    "1day".to_string()
}
fn default_outputsize() -> u32 {
    30
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_symbol_pacing_ms() -> u64 {
    10_000
}
fn default_shutdown_grace_secs() -> u64 {
    30
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_timeout_secs() -> u64 {
    15
}
