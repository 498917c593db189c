//! Price-deviation check against a trailing per-symbol average.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use rg_core::config::{CheckConfig, PriceCheckConfig};
use rg_core::sync::emplace;
use rg_core::types::{Order, OrderKind, Price, Quote, Side, Symbol};
use rg_core::window::MovingSum;
use rg_engine::{EventBus, OrderCheck, Reject, RejectReason, Subscription};

/// Rejects limit orders priced outside a deviation band around the
/// trailing average of quotes for the symbol.
///
/// Market orders bypass the rule unconditionally. A limit order for a
/// symbol that has never quoted is rejected as unknown. When the average
/// is zero the sell band collapses to `price < 0` and never rejects.
pub struct PriceCheck {
    timeframe: Duration,
    deviation: f64,
    moratorium: Duration,
    instruments: RwLock<HashMap<Symbol, Arc<MovingSum<Price>>>>,
    _quotes: Subscription<Quote>,
}

impl PriceCheck {
    /// Build the rule and subscribe its quote ingestion to the bus.
    pub fn subscribe(bus: &EventBus, cfg: &PriceCheckConfig, check: &CheckConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let quotes = bus.quotes.subscribe(move |quote| {
                if let Some(rule) = weak.upgrade() {
                    rule.on_quote(quote);
                }
            });
            Self {
                timeframe: cfg.timeframe(),
                deviation: cfg.deviation,
                moratorium: check.moratorium(),
                instruments: RwLock::new(HashMap::new()),
                _quotes: quotes,
            }
        })
    }

    fn on_quote(&self, quote: &Quote) {
        let (window, _) = emplace(&self.instruments, &quote.symbol, || {
            Arc::new(MovingSum::new(self.timeframe))
        });
        window.insert(quote.time, quote.price);
    }

    #[cfg(test)]
    fn window(&self, symbol: &Symbol) -> Option<Arc<MovingSum<Price>>> {
        self.instruments.read().get(symbol).cloned()
    }
}

impl OrderCheck for PriceCheck {
    fn name(&self) -> &str {
        "price_check"
    }

    fn check(&self, order: &Order) -> Result<(), Reject> {
        if order.kind != OrderKind::Limit {
            return Ok(());
        }

        let window = self
            .instruments
            .read()
            .get(&order.symbol)
            .cloned()
            .ok_or_else(|| {
                Reject::new(
                    RejectReason::InstrumentNotFound {
                        symbol: order.symbol.clone(),
                    },
                    self.moratorium,
                )
            })?;

        let average = window.average_at(order.time);
        let outside = match order.side {
            Side::Buy => order.price > average * (1.0 + self.deviation),
            Side::Sell => order.price < average * (1.0 - self.deviation),
        };

        if outside {
            return Err(Reject::new(
                RejectReason::PriceCheck { average },
                self.moratorium,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rg_core::types::{OrderId, Timestamp, UserId};

    use super::*;

    const HOUR: i64 = 3_600_000;

    fn bus_and_rule() -> (Arc<EventBus>, Arc<PriceCheck>) {
        let bus = Arc::new(EventBus::default());
        let rule = PriceCheck::subscribe(
            &bus,
            &PriceCheckConfig {
                timeframe_s: 3 * 3_600,
                deviation: 0.05,
            },
            &CheckConfig { moratorium_s: 60 },
        );
        (bus, rule)
    }

    fn quote(symbol: &str, price: Price, at_ms: i64) -> Quote {
        Quote {
            symbol: Symbol::new(symbol),
            price,
            time: Timestamp::from_millis(at_ms),
        }
    }

    fn order(symbol: &str, kind: OrderKind, side: Side, price: Price, at_ms: i64) -> Order {
        Order {
            order_id: OrderId::new("O"),
            user_id: UserId::new("U"),
            kind,
            symbol: Symbol::new(symbol),
            side,
            price,
            qty: 1.0,
            time: Timestamp::from_millis(at_ms),
        }
    }

    fn feed_flat_quotes(bus: &EventBus) {
        for i in 0..3 {
            bus.quotes.publish(&quote("X", 100.0, i * HOUR));
        }
    }

    #[test]
    fn buy_above_band_rejected_with_average() {
        let (bus, rule) = bus_and_rule();
        feed_flat_quotes(&bus);
        let err = rule
            .check(&order("X", OrderKind::Limit, Side::Buy, 106.0, 2 * HOUR))
            .unwrap_err();
        match err.reason {
            RejectReason::PriceCheck { average } => assert_eq!(average, 100.0),
            other => panic!("unexpected reason: {other}"),
        }
    }

    #[test]
    fn buy_inside_band_accepted() {
        let (bus, rule) = bus_and_rule();
        feed_flat_quotes(&bus);
        assert!(rule
            .check(&order("X", OrderKind::Limit, Side::Buy, 104.0, 2 * HOUR))
            .is_ok());
    }

    #[test]
    fn sell_below_band_rejected() {
        let (bus, rule) = bus_and_rule();
        feed_flat_quotes(&bus);
        assert!(rule
            .check(&order("X", OrderKind::Limit, Side::Sell, 94.0, 2 * HOUR))
            .is_err());
        assert!(rule
            .check(&order("X", OrderKind::Limit, Side::Sell, 96.0, 2 * HOUR))
            .is_ok());
    }

    #[test]
    fn market_order_bypasses() {
        let (bus, rule) = bus_and_rule();
        feed_flat_quotes(&bus);
        assert!(rule
            .check(&order("X", OrderKind::Market, Side::Buy, 999.0, 2 * HOUR))
            .is_ok());
    }

    #[test]
    fn unknown_instrument_rejected() {
        let (_bus, rule) = bus_and_rule();
        let err = rule
            .check(&order("Y", OrderKind::Limit, Side::Buy, 50.0, 0))
            .unwrap_err();
        assert!(matches!(
            err.reason,
            RejectReason::InstrumentNotFound { .. }
        ));
    }

    #[test]
    fn market_order_for_unknown_instrument_accepted() {
        let (_bus, rule) = bus_and_rule();
        assert!(rule
            .check(&order("Y", OrderKind::Market, Side::Buy, 50.0, 0))
            .is_ok());
    }

    #[test]
    fn zero_average_never_rejects_sells() {
        let (bus, rule) = bus_and_rule();
        bus.quotes.publish(&quote("X", 0.0, 0));
        assert!(rule
            .check(&order("X", OrderKind::Limit, Side::Sell, 10.0, 0))
            .is_ok());
        // The buy side still rejects anything above zero.
        assert!(rule
            .check(&order("X", OrderKind::Limit, Side::Buy, 10.0, 0))
            .is_err());
    }

    #[test]
    fn average_slides_with_the_window() {
        let (bus, rule) = bus_and_rule();
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.quotes.publish(&quote("X", 200.0, 4 * HOUR));
        // The t=0 quote fell out of the 3h window on insertion.
        let window = rule.window(&Symbol::new("X")).unwrap();
        assert_eq!(window.average_at(Timestamp::from_millis(4 * HOUR)), 200.0);
        assert!(rule
            .check(&order("X", OrderKind::Limit, Side::Buy, 206.0, 4 * HOUR))
            .is_ok());
    }

    #[test]
    fn dropping_the_rule_unsubscribes() {
        let (bus, rule) = bus_and_rule();
        assert_eq!(bus.quotes.live_count(&()), 1);
        drop(rule);
        assert_eq!(bus.quotes.live_count(&()), 0);
    }
}
