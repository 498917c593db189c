//! # rg-rules
//!
//! The four risk rules gating order flow. Each rule is an
//! [`OrderCheck`](rg_engine::OrderCheck) implementation; rules that consume
//! market data subscribe their ingestion to the engine's event bus at
//! construction, so dropping a rule cleanly unsubscribes it.

pub mod bad_trades;
pub mod drawdown;
pub mod moratorium;
pub mod price_check;

pub use bad_trades::SeqBadTrades;
pub use drawdown::TrailingDrawdown;
pub use moratorium::NewOrderMoratorium;
pub use price_check::PriceCheck;
