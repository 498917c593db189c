//! Trailing drawdown: 24 h PnL high-water mark minus current PnL, per
//! investor.
//!
//! Each investor holds lazily-created positions. A position accumulates
//! signed trades in a moving window and marks them against the latest
//! quote; the investor's PnL is the sum of position yields, and its
//! high-water mark over the window yields the drawdown. Quote fan-out to
//! investors holding a symbol goes through a symbol-keyed callback
//! registry, so the secondary index never extends investor lifetimes.

use std::collections::HashMap;
use std::ops::{AddAssign, SubAssign};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use ordered_float::OrderedFloat;
use parking_lot::{Mutex, RwLock};

use rg_core::config::{CheckConfig, DrawdownConfig};
use rg_core::sync::emplace;
use rg_core::types::{Order, Price, Qty, Quote, Side, Symbol, Timestamp, Trade, UserId};
use rg_core::window::{MovingMinMax, MovingSum};
use rg_engine::{CallbackRegistry, EventBus, OrderCheck, Reject, RejectReason, Subscription};

/// Last quote for a symbol: price and its time.
type PriceTime = (Price, Timestamp);

/// A trade with its quantity signed by side: positive buys, negative sells.
#[derive(Debug, Clone, Copy, Default)]
struct SignedTrade {
    price: Price,
    qty: Qty,
}

impl From<&Trade> for SignedTrade {
    fn from(trade: &Trade) -> Self {
        let qty = match trade.side {
            Side::Buy => trade.qty,
            Side::Sell => -trade.qty,
        };
        Self {
            price: trade.price,
            qty,
        }
    }
}

/// Running totals over a position's windowed trades.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PositionYield {
    /// Σ price · signed_qty.
    notional: Price,
    /// Σ signed_qty.
    qty: Qty,
}

impl AddAssign<&SignedTrade> for PositionYield {
    fn add_assign(&mut self, trade: &SignedTrade) {
        self.notional += trade.price * trade.qty;
        self.qty += trade.qty;
    }
}

impl SubAssign<&SignedTrade> for PositionYield {
    fn sub_assign(&mut self, trade: &SignedTrade) {
        self.notional -= trade.price * trade.qty;
        self.qty -= trade.qty;
    }
}

impl PositionYield {
    /// Mark-to-market yield: `mark · Σqty − Σnotional`.
    fn yield_at(&self, mark: Price) -> Price {
        mark * self.qty - self.notional
    }
}

/// `f64` stored as bits so the check path reads without locking.
struct AtomicPrice(AtomicU64);

impl AtomicPrice {
    fn new(value: Price) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn store(&self, value: Price) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> Price {
        Price::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// One investor's exposure in one symbol.
struct Position {
    /// Latest mark for the symbol; zero price until the first quote.
    last_price: PriceTime,
    /// Signed trades inside the PnL window.
    trades: MovingSum<SignedTrade, PositionYield>,
    /// Yield at the last recompute.
    yield_value: Price,
    /// Keyed quote registration; dropping the position unregisters it.
    _quotes: Subscription<Quote>,
}

impl Position {
    fn new(last_price: PriceTime, frame: Duration, quotes: Subscription<Quote>) -> Self {
        Self {
            last_price,
            trades: MovingSum::new(frame),
            yield_value: 0.0,
            _quotes: quotes,
        }
    }
}

struct InvestorState {
    /// Cumulative PnL: the sum of position yields.
    pnl: Price,
    /// Monotone high-water clock; advanced only by quotes.
    latest_time: Timestamp,
    /// PnL samples inside the window, for the high-water mark.
    pnl_highs: MovingMinMax<OrderedFloat<Price>>,
    positions: HashMap<Symbol, Position>,
}

/// Per-investor drawdown state. Only the quote/trade path takes the inner
/// lock; order checks read the precomputed drawdown atomically.
struct Investor {
    state: Mutex<InvestorState>,
    drawdown: AtomicPrice,
}

impl Investor {
    fn new(window: Duration) -> Self {
        Self {
            state: Mutex::new(InvestorState {
                pnl: 0.0,
                latest_time: Timestamp::EPOCH,
                pnl_highs: MovingMinMax::new(window),
                positions: HashMap::new(),
            }),
            drawdown: AtomicPrice::new(0.0),
        }
    }

    fn apply_quote(&self, quote: &Quote) {
        let mut guard = self.state.lock();
        let InvestorState {
            pnl,
            latest_time,
            pnl_highs,
            positions,
        } = &mut *guard;

        let Some(position) = positions.get_mut(&quote.symbol) else {
            return;
        };
        if *latest_time < quote.time {
            *latest_time = quote.time;
        }
        if quote.time >= position.last_price.1 {
            position.last_price = (quote.price, quote.time);
        }
        recompute_pnl(position, pnl, *latest_time, pnl_highs, &self.drawdown);
    }

    fn apply_trade(&self, symbol: &Symbol, trade: &Trade) {
        let mut guard = self.state.lock();
        let InvestorState {
            pnl,
            latest_time,
            pnl_highs,
            positions,
        } = &mut *guard;

        let Some(position) = positions.get_mut(symbol) else {
            return;
        };
        // Without a mark the yield is undefined; ignore the trade.
        if position.last_price.0 == 0.0 {
            return;
        }
        position.trades.insert(trade.time, SignedTrade::from(trade));
        recompute_pnl(position, pnl, *latest_time, pnl_highs, &self.drawdown);
    }
}

/// Fold the position's new yield into the investor PnL and refresh the
/// drawdown against the windowed high-water mark.
fn recompute_pnl(
    position: &mut Position,
    pnl: &mut Price,
    latest_time: Timestamp,
    pnl_highs: &mut MovingMinMax<OrderedFloat<Price>>,
    drawdown: &AtomicPrice,
) {
    let new_yield = position
        .trades
        .sum_at(latest_time)
        .yield_at(position.last_price.0);
    *pnl += new_yield - position.yield_value;
    position.yield_value = new_yield;

    // The current sample participates in the high-water mark, which keeps
    // the drawdown non-negative.
    pnl_highs.insert(latest_time, OrderedFloat(*pnl));
    let high = pnl_highs
        .max_at(latest_time)
        .map(|v| v.0)
        .unwrap_or(*pnl);
    drawdown.store(high - *pnl);
}

/// Rejects orders from investors whose trailing drawdown exceeds the
/// configured limit.
pub struct TrailingDrawdown {
    window: Duration,
    limit: Price,
    moratorium: Duration,
    investors: RwLock<HashMap<UserId, Arc<Investor>>>,
    /// symbol → subgroup of investors holding a position in it.
    quote_index: CallbackRegistry<Quote, Symbol>,
    last_prices: DashMap<Symbol, PriceTime>,
    _quotes: Subscription<Quote>,
    _trades: Subscription<Trade>,
}

impl TrailingDrawdown {
    /// Build the rule and subscribe its ingestion to the bus.
    pub fn subscribe(bus: &EventBus, cfg: &DrawdownConfig, check: &CheckConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let quotes = {
                let weak = weak.clone();
                bus.quotes.subscribe(move |quote| {
                    if let Some(rule) = weak.upgrade() {
                        rule.on_quote(quote);
                    }
                })
            };
            let trades = {
                let weak = weak.clone();
                bus.trades.subscribe(move |trade| {
                    if let Some(rule) = weak.upgrade() {
                        rule.on_trade(trade);
                    }
                })
            };
            Self {
                window: cfg.window(),
                limit: cfg.limit,
                moratorium: check.moratorium(),
                investors: RwLock::new(HashMap::new()),
                quote_index: CallbackRegistry::new(),
                last_prices: DashMap::new(),
                _quotes: quotes,
                _trades: trades,
            }
        })
    }

    fn on_quote(&self, quote: &Quote) {
        if !self.update_last_price(quote) {
            return;
        }
        self.quote_index.publish_keyed(&quote.symbol, quote);
    }

    /// Refresh the per-symbol mark; stale quotes are dropped entirely.
    fn update_last_price(&self, quote: &Quote) -> bool {
        match self.last_prices.entry(quote.symbol.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                if quote.time < e.get().1 {
                    return false;
                }
                e.insert((quote.price, quote.time));
                true
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert((quote.price, quote.time));
                true
            }
        }
    }

    fn on_trade(&self, trade: &Trade) {
        let investor = self.investor(&trade.user_id);
        self.ensure_position(&investor, &trade.symbol);
        investor.apply_trade(&trade.symbol, trade);
    }

    fn investor(&self, id: &UserId) -> Arc<Investor> {
        emplace(&self.investors, id, || Arc::new(Investor::new(self.window))).0
    }

    /// Create the investor's position in `symbol` if absent, registering it
    /// in the symbol-keyed quote index.
    fn ensure_position(&self, investor: &Arc<Investor>, symbol: &Symbol) {
        let mut state = investor.state.lock();
        if state.positions.contains_key(symbol) {
            return;
        }

        let last = self
            .last_prices
            .get(symbol)
            .map(|e| *e.value())
            .unwrap_or((0.0, Timestamp::EPOCH));
        let weak = Arc::downgrade(investor);
        let subscription = self.quote_index.subscribe_keyed(symbol.clone(), move |quote| {
            if let Some(investor) = weak.upgrade() {
                investor.apply_quote(quote);
            }
        });
        state.positions.insert(
            symbol.clone(),
            Position::new(last, self.window, subscription),
        );
    }
}

impl OrderCheck for TrailingDrawdown {
    fn name(&self) -> &str {
        "trailing_drawdown"
    }

    fn check(&self, order: &Order) -> Result<(), Reject> {
        let Some(investor) = self.investors.read().get(&order.user_id).cloned() else {
            return Ok(());
        };

        let drawdown = investor.drawdown.load();
        if drawdown > self.limit {
            return Err(Reject::new(
                RejectReason::TrailingDrawdown { drawdown },
                self.moratorium,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rg_core::types::{OrderId, OrderKind, TradeId};

    use super::*;

    fn bus_and_rule(limit: f64) -> (Arc<EventBus>, Arc<TrailingDrawdown>) {
        let bus = Arc::new(EventBus::default());
        let rule = TrailingDrawdown::subscribe(
            &bus,
            &DrawdownConfig {
                window_s: 24 * 3_600,
                limit,
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

    fn trade(user: &str, symbol: &str, side: Side, price: Price, qty: Qty, at_ms: i64) -> Trade {
        Trade {
            trade_id: TradeId::new("T"),
            user_id: UserId::new(user),
            symbol: Symbol::new(symbol),
            side,
            price,
            qty,
            time: Timestamp::from_millis(at_ms),
        }
    }

    fn order(user: &str, at_ms: i64) -> Order {
        Order {
            order_id: OrderId::new("O"),
            user_id: UserId::new(user),
            kind: OrderKind::Limit,
            symbol: Symbol::new("X"),
            side: Side::Buy,
            price: 100.0,
            qty: 1.0,
            time: Timestamp::from_millis(at_ms),
        }
    }

    fn drawdown_of(rule: &TrailingDrawdown, user: &str) -> Price {
        rule.investors
            .read()
            .get(&UserId::new(user))
            .expect("investor exists")
            .drawdown
            .load()
    }

    #[test]
    fn unknown_investor_passes() {
        let (_bus, rule) = bus_and_rule(100.0);
        assert!(rule.check(&order("U", 0)).is_ok());
    }

    #[test]
    fn swing_through_high_water_trips_the_limit() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 100));
        // Mark to 110: pnl = +100.
        bus.quotes.publish(&quote("X", 110.0, 200));
        assert_eq!(drawdown_of(&rule, "U"), 0.0);
        assert!(rule.check(&order("U", 300)).is_ok());

        // Mark to 90: pnl = -100, high water 100 → drawdown 200.
        bus.quotes.publish(&quote("X", 90.0, 300));
        assert_eq!(drawdown_of(&rule, "U"), 200.0);
        let err = rule.check(&order("U", 400)).unwrap_err();
        match err.reason {
            RejectReason::TrailingDrawdown { drawdown } => assert_eq!(drawdown, 200.0),
            other => panic!("unexpected reason: {other}"),
        }
    }

    #[test]
    fn drawdown_never_negative() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 100));
        // Rising marks keep making new highs; the drawdown stays at zero.
        for (i, px) in [105.0, 120.0, 150.0].iter().enumerate() {
            bus.quotes.publish(&quote("X", *px, 200 + i as i64 * 100));
            assert_eq!(drawdown_of(&rule, "U"), 0.0);
        }
    }

    #[test]
    fn trade_before_first_quote_is_ignored() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 100));
        // The investor exists, but no position was marked: a crash in the
        // price would otherwise register as pnl.
        bus.quotes.publish(&quote("X", 1.0, 200));
        assert_eq!(drawdown_of(&rule, "U"), 0.0);
        assert!(rule.check(&order("U", 300)).is_ok());
    }

    #[test]
    fn stale_quote_is_dropped() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 1_000));
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 1_100));
        bus.quotes.publish(&quote("X", 110.0, 1_200));
        let before = drawdown_of(&rule, "U");
        // Older than the current mark: ignored entirely.
        bus.quotes.publish(&quote("X", 1.0, 500));
        assert_eq!(drawdown_of(&rule, "U"), before);
    }

    #[test]
    fn short_position_profits_from_falling_marks() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.trades
            .publish(&trade("U", "X", Side::Sell, 100.0, 10.0, 100));
        bus.quotes.publish(&quote("X", 90.0, 200));
        // Short 10 @ 100 marked at 90: pnl = +100, no drawdown.
        assert_eq!(drawdown_of(&rule, "U"), 0.0);
        // Squeeze to 120: pnl = -200, high 100 → drawdown 300.
        bus.quotes.publish(&quote("X", 120.0, 300));
        assert_eq!(drawdown_of(&rule, "U"), 300.0);
        assert!(rule.check(&order("U", 400)).is_err());
    }

    #[test]
    fn pnl_sums_across_symbols() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.quotes.publish(&quote("Y", 50.0, 0));
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 100));
        bus.trades
            .publish(&trade("U", "Y", Side::Buy, 50.0, 10.0, 100));
        // X drops 5 (−50), Y rises 20 (+200): net +150 from a high of +200
        // (Y's rise lands first, then X's drop).
        bus.quotes.publish(&quote("Y", 70.0, 200));
        bus.quotes.publish(&quote("X", 95.0, 300));
        assert_eq!(drawdown_of(&rule, "U"), 50.0);
    }

    #[test]
    fn investors_marked_independently() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.trades
            .publish(&trade("U1", "X", Side::Buy, 100.0, 10.0, 100));
        bus.trades
            .publish(&trade("U2", "X", Side::Buy, 100.0, 1.0, 100));
        bus.quotes.publish(&quote("X", 110.0, 200));
        bus.quotes.publish(&quote("X", 80.0, 300));
        // U1: high +100 → −200, drawdown 300. U2: high +10 → −20, drawdown 30.
        assert_eq!(drawdown_of(&rule, "U1"), 300.0);
        assert_eq!(drawdown_of(&rule, "U2"), 30.0);
        assert!(rule.check(&order("U1", 400)).is_err());
        assert!(rule.check(&order("U2", 400)).is_ok());
    }

    #[test]
    fn quote_for_unheld_symbol_does_not_touch_investor() {
        let (bus, rule) = bus_and_rule(100.0);
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 100));
        bus.quotes.publish(&quote("Y", 1.0, 200));
        assert_eq!(drawdown_of(&rule, "U"), 0.0);
        assert_eq!(rule.quote_index.live_count(&Symbol::new("X")), 1);
        assert_eq!(rule.quote_index.live_count(&Symbol::new("Y")), 0);
    }

    #[test]
    fn position_created_with_current_mark() {
        let (bus, rule) = bus_and_rule(100.0);
        // The quote precedes the first trade; the position opens marked.
        bus.quotes.publish(&quote("X", 100.0, 0));
        bus.trades
            .publish(&trade("U", "X", Side::Buy, 100.0, 10.0, 100));
        bus.quotes.publish(&quote("X", 90.0, 200));
        // pnl −100 from a high of 0 → drawdown 100 (not above the limit).
        assert_eq!(drawdown_of(&rule, "U"), 100.0);
        assert!(rule.check(&order("U", 300)).is_ok());
    }
}
