//! Journal line format.
//!
//! One record per line: `<Kind>|key1=val1|key2=val2|...`, `\n`-terminated.
//! Attribute order follows the fixed per-kind schema, so encoding needs no
//! lookup; values never contain `|` or newlines because the wire codec
//! forbids the delimiter bytes.

use rg_core::message::Message;
use rg_core::types::event::{KIND_QUOTE, KIND_TRADE};
use rg_core::types::{Quote, Trade};

/// Encode a quote in schema order.
pub fn encode_quote(quote: &Quote) -> String {
    format!(
        "{}|symbol={}|price={}|time={}",
        KIND_QUOTE, quote.symbol, quote.price, quote.time
    )
}

/// Encode a trade in schema order.
pub fn encode_trade(trade: &Trade) -> String {
    format!(
        "{}|trade_id={}|user_id={}|symbol={}|side={}|price={}|qty={}|time={}",
        KIND_TRADE,
        trade.trade_id,
        trade.user_id,
        trade.symbol,
        trade.side,
        trade.price,
        trade.qty,
        trade.time
    )
}

/// Decode one journal line into a message.
///
/// Returns `None` for lines that are too short to carry a kind tag plus at
/// least one attribute; callers skip those with a warning.
pub fn decode_line(line: &str) -> Option<Message> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for field in line.split('|') {
        match field.split_once('=') {
            Some((key, value)) => attrs.push((key.to_string(), value.to_string())),
            None => attrs.push((field.to_string(), String::new())),
        }
    }
    if attrs.len() < 2 {
        return None;
    }
    Some(Message::new(attrs))
}
