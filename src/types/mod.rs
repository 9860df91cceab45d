//! Normalized book types shared by every component.
//!
//! - [`messages`] - Inbound raw message shapes and Kraken frame normalization
//! - [`PriceLevel`] / [`BookState`] - The canonical, immutable book state

pub mod messages;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use messages::{BookMessage, BookUpdate, DeltaMessage, RawLevel, SnapshotMessage};

/// Price of a level.
///
/// Using an exact decimal instead of floating point for:
/// - Exact equality when a delta addresses an existing level
/// - `Ord` + `Hash` that agree with equality, so prices are safe map keys
pub type Price = Decimal;

/// Total resting quantity at a price level.
pub type Size = Decimal;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest, best = highest price
    Bid,
    /// Resting sell interest, best = lowest price
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => f.write_str("bid"),
            Side::Ask => f.write_str("ask"),
        }
    }
}

/// One aggregated price level.
///
/// `size` is always positive while the level is part of a [`BookState`];
/// a zero size means "absent" and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price
    pub price: Price,
    /// Total resting size at `price`
    pub size: Size,
}

impl PriceLevel {
    /// Create a new level
    #[must_use]
    pub const fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// Canonical book state produced by the merge engine.
///
/// Asks are strictly ascending by price and bids strictly descending, so
/// index 0 of each side is the best level. A `BookState` is never edited
/// after it has been produced; every update yields a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookState {
    /// Bid levels, best (highest) first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<PriceLevel>,
    /// Processing time of the message that produced this state
    pub timestamp: TimestampMs,
}

impl BookState {
    /// Create an empty book stamped at `timestamp`
    #[must_use]
    pub fn empty(timestamp: TimestampMs) -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp,
        }
    }

    /// Levels of one side, best first
    #[must_use]
    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Get the best bid
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    /// Get the best ask
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Get the spread (best ask - best bid)
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Get the mid price; `None` if a side is empty or the sum overflows
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        bid.price.checked_add(ask.price)?.checked_div(Decimal::TWO)
    }

    /// Size resting at `price` on `side`, if the level exists
    #[must_use]
    pub fn size_at(&self, side: Side, price: Price) -> Option<Size> {
        let levels = self.side(side);
        // Both sides are sorted, so a binary search in the side's own order works.
        let found = match side {
            Side::Ask => levels.binary_search_by(|l| l.price.cmp(&price)),
            Side::Bid => levels.binary_search_by(|l| price.cmp(&l.price)),
        };
        found.ok().map(|idx| levels[idx].size)
    }

    /// Check if both sides are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Number of levels as `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }
}
