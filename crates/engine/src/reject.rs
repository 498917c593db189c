//! Rejection taxonomy.
//!
//! A rejection is not an operational error: rules return it to decline the
//! order under evaluation, and the engine converts exactly one rejection
//! per order into a `reject=<reason>` attribute on the echoed message.

use std::time::Duration;

use rg_core::types::{Price, Symbol};
use thiserror::Error;

/// Reason an order was declined. The display form is the wire text.
#[derive(Debug, Clone, Error)]
pub enum RejectReason {
    /// A new order arrived inside the per-(investor, symbol) spacing
    /// window; carries the remaining wait.
    #[error("NewOrderMoratorium, {remaining:?}")]
    NewOrderMoratorium { remaining: Duration },
    /// A limit order referenced a symbol with no quote history.
    #[error("InstrumentNotFound, {symbol}")]
    InstrumentNotFound { symbol: Symbol },
    /// A limit order priced outside the deviation band around the trailing
    /// average; carries that average.
    #[error("PriceCheck, {average}")]
    PriceCheck { average: Price },
    /// Too many consecutive loss-making trade pairs; carries the count.
    #[error("SeqBadTrades, {count}")]
    SeqBadTrades { count: usize },
    /// Trailing drawdown above the configured limit; carries the drawdown.
    #[error("TrailingDrawdown, {drawdown}")]
    TrailingDrawdown { drawdown: Price },
}

/// A rule's verdict against the current order.
///
/// Every rejection carries the moratorium duration the engine stamps on
/// the investor record after declining the order.
#[derive(Debug, Clone)]
pub struct Reject {
    /// Why the order was declined.
    pub reason: RejectReason,
    /// Post-reject cool-off recorded against the investor.
    pub moratorium: Duration,
}

impl Reject {
    /// Couple a reason with the rule's configured moratorium.
    pub fn new(reason: RejectReason, moratorium: Duration) -> Self {
        Self { reason, moratorium }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moratorium_wire_text() {
        let r = RejectReason::NewOrderMoratorium {
            remaining: Duration::from_millis(500),
        };
        assert_eq!(r.to_string(), "NewOrderMoratorium, 500ms");
    }

    #[test]
    fn price_check_wire_text() {
        let r = RejectReason::PriceCheck { average: 100.0 };
        assert_eq!(r.to_string(), "PriceCheck, 100");
    }

    #[test]
    fn instrument_not_found_wire_text() {
        let r = RejectReason::InstrumentNotFound {
            symbol: Symbol::new("Y"),
        };
        assert_eq!(r.to_string(), "InstrumentNotFound, Y");
    }

    #[test]
    fn seq_bad_trades_wire_text() {
        let r = RejectReason::SeqBadTrades { count: 6 };
        assert_eq!(r.to_string(), "SeqBadTrades, 6");
    }

    #[test]
    fn drawdown_wire_text() {
        let r = RejectReason::TrailingDrawdown { drawdown: 200.0 };
        assert_eq!(r.to_string(), "TrailingDrawdown, 200");
    }
}
