//! Order side and order kind with their single-token wire encodings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side of a trade or order. Encoded as `B` / `S` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy / long.
    Buy,
    /// Sell / short.
    Sell,
}

impl Default for Side {
    fn default() -> Self {
        Side::Buy
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("B"),
            Side::Sell => f.write_str("S"),
        }
    }
}

/// Failed to parse a [`Side`] token.
#[derive(Debug, Clone, Error)]
#[error("invalid side token: {0:?}")]
pub struct ParseSideError(String);

impl FromStr for Side {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "B" => Ok(Side::Buy),
            "S" => Ok(Side::Sell),
            other => Err(ParseSideError(other.to_string())),
        }
    }
}

/// Order kind. Encoded as `0` (market) / `1` (limit) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fills at the best available price; bypasses price deviation checks.
    Market,
    /// Limit order with a client-specified price.
    Limit,
}

impl Default for OrderKind {
    fn default() -> Self {
        OrderKind::Market
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => f.write_str("0"),
            OrderKind::Limit => f.write_str("1"),
        }
    }
}

/// Failed to parse an [`OrderKind`] token.
#[derive(Debug, Clone, Error)]
#[error("invalid order type token: {0:?}")]
pub struct ParseOrderKindError(String);

impl FromStr for OrderKind {
    type Err = ParseOrderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(OrderKind::Market),
            "1" => Ok(OrderKind::Limit),
            other => Err(ParseOrderKindError(other.to_string())),
        }
    }
}
