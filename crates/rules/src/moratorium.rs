//! New-order moratorium: a minimum spacing between orders per
//! (investor, symbol).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use rg_core::config::{CheckConfig, MoratoriumConfig};
use rg_core::sync::emplace;
use rg_core::types::{Order, Symbol, Timestamp, UserId};
use rg_engine::{OrderCheck, Reject, RejectReason};

/// Rejects an order arriving inside the spacing window after the previous
/// order for the same (investor, symbol).
///
/// Out-of-order orders (older than the stored stamp) are accepted without
/// updating the stamp, so journal replay is idempotent. A rejected order
/// also leaves the stamp unchanged.
pub struct NewOrderMoratorium {
    timeout: Duration,
    moratorium: Duration,
    last_order: RwLock<HashMap<(UserId, Symbol), Arc<Mutex<Timestamp>>>>,
}

impl NewOrderMoratorium {
    /// Build the rule from configuration.
    pub fn new(cfg: &MoratoriumConfig, check: &CheckConfig) -> Arc<Self> {
        Arc::new(Self {
            timeout: cfg.timeout(),
            moratorium: check.moratorium(),
            last_order: RwLock::new(HashMap::new()),
        })
    }
}

impl OrderCheck for NewOrderMoratorium {
    fn name(&self) -> &str {
        "new_order_moratorium"
    }

    fn check(&self, order: &Order) -> Result<(), Reject> {
        let key = (order.user_id.clone(), order.symbol.clone());
        let (entry, created) = emplace(&self.last_order, &key, || {
            Arc::new(Mutex::new(order.time))
        });
        if created {
            return Ok(());
        }

        let mut last = entry.lock();
        if *last > order.time {
            return Ok(());
        }

        let deadline = *last + self.timeout;
        if deadline > order.time {
            return Err(Reject::new(
                RejectReason::NewOrderMoratorium {
                    remaining: deadline - order.time,
                },
                self.moratorium,
            ));
        }

        *last = order.time;
        Ok(())
    }
}
