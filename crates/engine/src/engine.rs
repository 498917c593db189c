//! The evaluation engine.
//!
//! [`RiskEngine::handle`] is the single entry point for every decoded
//! message, whether it arrived over a live connection or from journal
//! replay. Quotes and trades are parsed once and published to the event
//! bus; orders run through the registered checks and are echoed back,
//! annotated with a rejection when any check declines them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use rg_core::message::Message;
use rg_core::sync::emplace;
use rg_core::types::event::{KIND_ORDER, KIND_QUOTE, KIND_TRADE};
use rg_core::types::{Order, Quote, Timestamp, Trade, UserId};

use crate::registry::CallbackRegistry;
use crate::reject::Reject;

/// The quote and trade streams rules subscribe their ingestion to.
#[derive(Default)]
pub struct EventBus {
    /// Market data ticks.
    pub quotes: CallbackRegistry<Quote>,
    /// Executed trades.
    pub trades: CallbackRegistry<Trade>,
}

/// Trait for a pre-trade order check.
///
/// Implementations inspect the order against their streamed state and
/// return `Ok(())` to pass it along or `Err(Reject)` to decline it.
pub trait OrderCheck: Send + Sync {
    /// Name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Evaluate the order against this check.
    fn check(&self, order: &Order) -> Result<(), Reject>;
}

/// Per-investor record kept by the engine.
///
/// The moratorium stamp is written on every rejection. It is not consulted
/// on the order path; see DESIGN.md for the recorded decision.
#[derive(Default)]
pub struct InvestorRecord {
    moratorium_until: Mutex<Timestamp>,
}

impl InvestorRecord {
    /// Latest moratorium deadline stamped for this investor.
    pub fn moratorium_until(&self) -> Timestamp {
        *self.moratorium_until.lock()
    }

    fn stamp_moratorium(&self, until: Timestamp) {
        *self.moratorium_until.lock() = until;
    }
}

/// Registers checks, fans events out, and gates orders.
#[derive(Default)]
pub struct RiskEngine {
    bus: EventBus,
    checks: RwLock<Vec<Arc<dyn OrderCheck>>>,
    investors: RwLock<HashMap<UserId, Arc<InvestorRecord>>>,
}

impl RiskEngine {
    /// Create an engine with no checks registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The event streams rules subscribe to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Append an order check. Checks run in registration order.
    pub fn add_check(&self, check: Arc<dyn OrderCheck>) {
        self.checks.write().push(check);
    }

    /// Number of registered checks.
    pub fn check_count(&self) -> usize {
        self.checks.read().len()
    }

    /// Per-investor record, created lazily.
    pub fn investor(&self, id: &UserId) -> Arc<InvestorRecord> {
        emplace(&self.investors, id, || Arc::new(InvestorRecord::default())).0
    }

    /// Process one decoded message.
    ///
    /// Quotes and trades produce no response; orders are echoed, with
    /// `reject=<reason>` appended when declined. Replay callers discard
    /// the returned message.
    pub fn handle(&self, msg: &Message) -> Option<Message> {
        match msg.kind() {
            KIND_QUOTE => {
                self.bus.quotes.publish(&Quote::from_message(msg));
                None
            }
            KIND_TRADE => {
                self.bus.trades.publish(&Trade::from_message(msg));
                None
            }
            KIND_ORDER => Some(self.check_order(msg)),
            other => {
                tracing::debug!(kind = other, "ignoring unknown message kind");
                None
            }
        }
    }

    fn check_order(&self, msg: &Message) -> Message {
        let order = Order::from_message(msg);
        let investor = self.investor(&order.user_id);

        let checks: Vec<Arc<dyn OrderCheck>> = self.checks.read().clone();
        for check in checks {
            if let Err(reject) = check.check(&order) {
                investor.stamp_moratorium(Timestamp::now() + reject.moratorium);
                tracing::info!(
                    order_id = %order.order_id,
                    user_id = %order.user_id,
                    symbol = %order.symbol,
                    rule = check.name(),
                    reason = %reject.reason,
                    "order rejected"
                );
                return msg.with_attr("reject", reject.reason.to_string());
            }
        }

        tracing::debug!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            symbol = %order.symbol,
            "order accepted"
        );
        msg.clone()
    }
}
