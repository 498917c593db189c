//! Core types for the RiskGate server.
//!
//! Identifiers are opaque strings exactly as they arrive on the wire;
//! prices and quantities are plain `f64`, and timestamps carry millisecond
//! wall-clock resolution.

pub mod event;
pub mod ids;
pub mod side;
pub mod timestamp;

pub use event::{Order, Quote, Trade};
pub use ids::{OrderId, Symbol, TradeId, UserId};
pub use side::{OrderKind, Side};
pub use timestamp::Timestamp;

/// Price as a 64-bit float, exactly as decoded from the wire.
pub type Price = f64;

/// Quantity as a 64-bit float.
pub type Qty = f64;
