//! Sequence-of-bad-trades detection per (symbol, investor).
//!
//! Trades are grouped into runs of consecutive same-side executions. When
//! a run closes (the side flips), its average price is compared with the
//! average of the previous opposite-side run: buying above the prior sell
//! average, or selling below the prior buy average, marks the completed
//! pair as loss-making. Orders are rejected while the count of loss-making
//! pairs inside the window exceeds the threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use rg_core::config::{BadTradesConfig, CheckConfig};
use rg_core::sync::emplace;
use rg_core::types::{Order, Price, Side, Symbol, Timestamp, Trade, UserId};
use rg_core::window::{MovingSum, MovingWindow};
use rg_engine::{EventBus, OrderCheck, Reject, RejectReason, Subscription};

/// State of the trade-run machine for one (symbol, investor).
struct TradeRun {
    /// Side of the currently open run.
    side: Side,
    /// Time of the latest trade in the open run.
    time: Timestamp,
    /// Prices of the open run.
    prices: MovingSum<Price>,
    /// Average of the previous opposite-side run; zero until two runs
    /// have completed.
    prev_avg: Price,
    /// One flag per loss-making pair, stamped with the closing run's last
    /// trade time. `keep = 0`: expired flags are forgotten entirely.
    bad_flags: MovingWindow<u8>,
}

impl TradeRun {
    fn new(frame: Duration) -> Self {
        Self {
            side: Side::Buy,
            time: Timestamp::EPOCH,
            prices: MovingSum::new(frame),
            prev_avg: 0.0,
            bad_flags: MovingWindow::with_keep(frame, 0),
        }
    }

    fn on_trade(&mut self, trade: &Trade) {
        if trade.side == self.side {
            self.time = trade.time;
            self.prices.insert(trade.time, trade.price);
            return;
        }

        // The run closes: score it against the previous opposite run.
        let average = self.prices.average_at(trade.time);
        if is_loss_making(self.side, average, self.prev_avg) {
            self.bad_flags.insert(self.time, 1);
        }
        self.prices.clear();
        self.prev_avg = average;

        self.side = trade.side;
        self.time = trade.time;
        self.prices.insert(trade.time, trade.price);
    }

    /// Loss-making pairs inside the window at `at`, counting the open run
    /// as if it closed now at its own average.
    fn bad_count(&self, at: Timestamp) -> usize {
        let n = self.bad_flags.len_at(at);
        if is_loss_making(self.side, self.prices.average(), self.prev_avg) {
            n + 1
        } else {
            n
        }
    }
}

/// A completed pair is loss-making when the closing run's average is worse
/// than the prior opposite run's: bought higher, or sold lower. Averages
/// of zero mean a side has not completed yet and never count.
fn is_loss_making(side: Side, average: Price, prev_avg: Price) -> bool {
    if prev_avg == 0.0 || average == 0.0 {
        return false;
    }
    match side {
        Side::Buy => average > prev_avg,
        Side::Sell => average < prev_avg,
    }
}

/// Rejects orders for investors on a streak of loss-making round trips.
pub struct SeqBadTrades {
    timeframe: Duration,
    max_count: usize,
    moratorium: Duration,
    runs: RwLock<HashMap<(Symbol, UserId), Arc<Mutex<TradeRun>>>>,
    _trades: Subscription<Trade>,
}

impl SeqBadTrades {
    /// Build the rule and subscribe its trade ingestion to the bus.
    pub fn subscribe(bus: &EventBus, cfg: &BadTradesConfig, check: &CheckConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let trades = bus.trades.subscribe(move |trade| {
                if let Some(rule) = weak.upgrade() {
                    rule.on_trade(trade);
                }
            });
            Self {
                timeframe: cfg.timeframe(),
                max_count: cfg.max_count,
                moratorium: check.moratorium(),
                runs: RwLock::new(HashMap::new()),
                _trades: trades,
            }
        })
    }

    fn on_trade(&self, trade: &Trade) {
        let key = (trade.symbol.clone(), trade.user_id.clone());
        let (run, _) = emplace(&self.runs, &key, || {
            Arc::new(Mutex::new(TradeRun::new(self.timeframe)))
        });
        run.lock().on_trade(trade);
    }
}

impl OrderCheck for SeqBadTrades {
    fn name(&self) -> &str {
        "seq_bad_trades"
    }

    fn check(&self, order: &Order) -> Result<(), Reject> {
        let key = (order.symbol.clone(), order.user_id.clone());
        let Some(run) = self.runs.read().get(&key).cloned() else {
            return Ok(());
        };

        let count = run.lock().bad_count(order.time);
        if count > self.max_count {
            return Err(Reject::new(
                RejectReason::SeqBadTrades { count },
                self.moratorium,
            ));
        }
        Ok(())
    }
}
