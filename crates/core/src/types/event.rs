//! Market events: quotes, trades, and order requests.
//!
//! Events are parsed leniently from attribute messages: a missing or
//! malformed attribute yields the field's default value rather than an
//! error. The framing layer is responsible for protocol-level validation;
//! by the time a message reaches the engine it is gated only by the rules.

use crate::message::Message;

use super::ids::{OrderId, Symbol, TradeId, UserId};
use super::side::{OrderKind, Side};
use super::timestamp::Timestamp;
use super::{Price, Qty};

/// Message kind tag for quotes.
pub const KIND_QUOTE: &str = "Quote";
/// Message kind tag for trades.
pub const KIND_TRADE: &str = "Trade";
/// Message kind tag for orders.
pub const KIND_ORDER: &str = "Order";

/// A market data tick for one instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: Price,
    pub time: Timestamp,
}

impl Quote {
    /// Parse from a message; missing attributes default.
    pub fn from_message(msg: &Message) -> Self {
        Self {
            symbol: msg.parsed_or_default("symbol"),
            price: msg.parsed_or_default("price"),
            time: msg.parsed_or_default("time"),
        }
    }
}

/// An executed trade attributed to an investor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trade {
    pub trade_id: TradeId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub time: Timestamp,
}

impl Trade {
    /// Parse from a message; missing attributes default.
    pub fn from_message(msg: &Message) -> Self {
        Self {
            trade_id: msg.parsed_or_default("trade_id"),
            user_id: msg.parsed_or_default("user_id"),
            symbol: msg.parsed_or_default("symbol"),
            side: msg.parsed_or_default("side"),
            price: msg.parsed_or_default("price"),
            qty: msg.parsed_or_default("qty"),
            time: msg.parsed_or_default("time"),
        }
    }
}

/// An order request awaiting the verdict of the risk rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub kind: OrderKind,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub time: Timestamp,
}

impl Order {
    /// Parse from a message; missing attributes default.
    pub fn from_message(msg: &Message) -> Self {
        Self {
            order_id: msg.parsed_or_default("order_id"),
            user_id: msg.parsed_or_default("user_id"),
            kind: msg.parsed_or_default("type"),
            symbol: msg.parsed_or_default("symbol"),
            side: msg.parsed_or_default("side"),
            price: msg.parsed_or_default("price"),
            qty: msg.parsed_or_default("qty"),
            time: msg.parsed_or_default("time"),
        }
    }
}
