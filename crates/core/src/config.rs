//! Layered configuration for the RiskGate server.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults (the documented rule parameters)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `RG_`, nested with `__`)
//!
//! All durations are declared in the unit their field name carries
//! (`_ms` / `_s`); accessor methods convert to `std::time::Duration`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

// ── Default value functions ────────────────────────────────────────────

/// Default listening port.
fn default_port() -> u16 {
    11_111
}

/// Default shutdown/poll tick: 100 ms.
fn default_tick_ms() -> u64 {
    100
}

/// Default per-message frame cap: 1 GiB.
fn default_max_frame_bytes() -> usize {
    1 << 30
}

/// Default post-reject moratorium stamp: 60 s.
fn default_moratorium_s() -> u64 {
    60
}

/// Default new-order moratorium timeout: 1 s.
fn default_order_timeout_ms() -> u64 {
    1_000
}

/// Default price-deviation window: 3 h.
fn default_price_timeframe_s() -> u64 {
    3 * 3_600
}

/// Default price deviation band: 5 %.
fn default_price_deviation() -> f64 {
    0.05
}

/// Default bad-trade window: 60 s.
fn default_bad_trades_timeframe_s() -> u64 {
    60
}

/// Default bad-trade count threshold.
fn default_bad_trades_max_count() -> usize {
    5
}

/// Default drawdown window: 24 h.
fn default_drawdown_window_s() -> u64 {
    24 * 3_600
}

/// Default drawdown limit.
fn default_drawdown_limit() -> f64 {
    100.0
}

/// Default journal retention: 24 h.
fn default_journal_retention_s() -> u64 {
    24 * 3_600
}

// ── Configuration structs ──────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// TCP listener settings.
    pub server: ServerConfig,
    /// Settings shared by every order-check rule.
    pub check: CheckConfig,
    /// New-order moratorium rule.
    pub moratorium: MoratoriumConfig,
    /// Price-deviation rule.
    pub price_check: PriceCheckConfig,
    /// Sequence-of-bad-trades rule.
    pub bad_trades: BadTradesConfig,
    /// Trailing-drawdown rule.
    pub drawdown: DrawdownConfig,
    /// Durable journal.
    pub journal: JournalConfig,
    /// Logging output mode.
    pub logging: LoggingConfig,
}

/// TCP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listening port; overridable on the command line.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Poll granularity for shutdown-aware blocking loops.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Maximum bytes of one unfinished wire message; oversize kills the
    /// connection.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl ServerConfig {
    /// Poll granularity as a duration.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Settings shared by every order-check rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    /// Moratorium stamped on the investor after any rejection, in seconds.
    #[serde(default = "default_moratorium_s")]
    pub moratorium_s: u64,
}

impl CheckConfig {
    /// Post-reject moratorium as a duration.
    pub fn moratorium(&self) -> Duration {
        Duration::from_secs(self.moratorium_s)
    }
}

/// New-order moratorium rule parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct MoratoriumConfig {
    /// Minimum spacing between orders per (investor, symbol), in ms.
    #[serde(default = "default_order_timeout_ms")]
    pub timeout_ms: u64,
}

impl MoratoriumConfig {
    /// Minimum order spacing as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Price-deviation rule parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceCheckConfig {
    /// Trailing average window, in seconds.
    #[serde(default = "default_price_timeframe_s")]
    pub timeframe_s: u64,
    /// Allowed deviation from the trailing average (0.05 = 5 %).
    #[serde(default = "default_price_deviation")]
    pub deviation: f64,
}

impl PriceCheckConfig {
    /// Trailing average window as a duration.
    pub fn timeframe(&self) -> Duration {
        Duration::from_secs(self.timeframe_s)
    }
}

/// Sequence-of-bad-trades rule parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct BadTradesConfig {
    /// Window over which bad pairs are counted, in seconds.
    #[serde(default = "default_bad_trades_timeframe_s")]
    pub timeframe_s: u64,
    /// Rejection fires when the bad-pair count strictly exceeds this.
    #[serde(default = "default_bad_trades_max_count")]
    pub max_count: usize,
}

impl BadTradesConfig {
    /// Counting window as a duration.
    pub fn timeframe(&self) -> Duration {
        Duration::from_secs(self.timeframe_s)
    }
}

/// Trailing-drawdown rule parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DrawdownConfig {
    /// PnL high-water window, in seconds.
    #[serde(default = "default_drawdown_window_s")]
    pub window_s: u64,
    /// Rejection fires when drawdown strictly exceeds this.
    #[serde(default = "default_drawdown_limit")]
    pub limit: f64,
}

impl DrawdownConfig {
    /// High-water window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_s)
    }
}

/// Durable journal settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// Journal directory; empty derives `./<program>.data` at startup.
    #[serde(default)]
    pub dir: String,
    /// How long rotated files are retained before deletion, in seconds.
    #[serde(default = "default_journal_retention_s")]
    pub retention_s: u64,
}

impl JournalConfig {
    /// Retention horizon as a duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_s)
    }

    /// Resolve the journal directory for the given program name.
    pub fn resolve_dir(&self, program: &str) -> PathBuf {
        if self.dir.is_empty() {
            PathBuf::from(format!("./{}.data", program))
        } else {
            PathBuf::from(&self.dir)
        }
    }
}

/// Logging output mode.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `true` emits JSON lines; `false` emits human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults.
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment variable overrides with prefix `RG_` and `__` as the
    ///    nesting separator (e.g. `RG_DRAWDOWN__LIMIT=250`).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            .set_default("server.port", default_port() as i64)?
            .set_default("server.tick_ms", default_tick_ms() as i64)?
            .set_default("server.max_frame_bytes", default_max_frame_bytes() as i64)?
            .set_default("check.moratorium_s", default_moratorium_s() as i64)?
            .set_default("moratorium.timeout_ms", default_order_timeout_ms() as i64)?
            .set_default("price_check.timeframe_s", default_price_timeframe_s() as i64)?
            .set_default("price_check.deviation", default_price_deviation())?
            .set_default(
                "bad_trades.timeframe_s",
                default_bad_trades_timeframe_s() as i64,
            )?
            .set_default(
                "bad_trades.max_count",
                default_bad_trades_max_count() as i64,
            )?
            .set_default("drawdown.window_s", default_drawdown_window_s() as i64)?
            .set_default("drawdown.limit", default_drawdown_limit())?
            .set_default("journal.dir", "")?
            .set_default(
                "journal.retention_s",
                default_journal_retention_s() as i64,
            )?
            .set_default("logging.json", false)?;

        // ── Layer 2: TOML file ─────────────────────────────────────
        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (RG_ prefix) ────────────────
        // The prefix separator is set explicitly to `_`; with only the
        // nesting separator configured, `RG_DRAWDOWN__LIMIT` would be
        // matched against prefix `rg__` instead of `rg_`.
        builder = builder.add_source(
            Environment::with_prefix("RG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration invariants.
    fn validate(&self) -> Result<()> {
        if self.server.tick_ms == 0 {
            bail!("server.tick_ms must be positive");
        }
        if !(self.price_check.deviation > 0.0) {
            bail!("price_check.deviation must be positive");
        }
        if self.drawdown.limit < 0.0 {
            bail!("drawdown.limit must not be negative");
        }
        Ok(())
    }
}
