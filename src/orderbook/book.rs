//! Snapshot/delta merge engine.
//!
//! Every operation is a pure function of the previous [`BookState`] and one
//! raw message. Sides are rebuilt through a `BTreeMap` keyed by exact decimal
//! price, which gives:
//!
//! - Exact price matching for upserts and removals
//! - Sorted, duplicate-free output without a separate sort pass
//! - Cheap truncation to the best `depth` levels from either end

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::Error;
use crate::types::messages::{BookMessage, DeltaMessage, RawLevel, SnapshotMessage};
use crate::types::{BookState, Price, PriceLevel, Side, Size, TimestampMs};

/// Current wall-clock time in milliseconds since Unix epoch
pub fn current_timestamp_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or_default()
}

/// Depth-bounded merge engine.
///
/// Holds only its depth setting; it never retains a book between calls.
///
/// # Example
///
/// ```rust
/// use depth_explorer::orderbook::LevelBook;
/// use depth_explorer::types::{DeltaMessage, RawLevel, SnapshotMessage};
///
/// let engine = LevelBook::new(25);
/// let book = engine
///     .apply_snapshot(None, &SnapshotMessage {
///         asks: Some(vec![RawLevel::new("100", "5")]),
///         bids: None,
///     })
///     .unwrap();
///
/// let book = engine
///     .apply_deltas(&book, &DeltaMessage {
///         asks: Some(vec![RawLevel::new("100", "0")]),
///         bids: None,
///     })
///     .unwrap();
/// assert!(book.asks.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelBook {
    depth: usize,
}

impl LevelBook {
    /// Create a merge engine that keeps `depth` levels per side after deltas
    #[must_use]
    pub const fn new(depth: usize) -> Self {
        Self { depth }
    }

    /// Get the configured depth
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Apply either kind of message.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedLevel`] if any token fails validation
    /// - [`Error::MissingSnapshot`] for a delta with no previous book
    pub fn apply(
        &self,
        previous: Option<&BookState>,
        message: &BookMessage,
    ) -> Result<BookState, Error> {
        self.apply_at(previous, message, current_timestamp_ms())
    }

    /// [`LevelBook::apply`] with an explicit processing timestamp
    pub fn apply_at(
        &self,
        previous: Option<&BookState>,
        message: &BookMessage,
        timestamp: TimestampMs,
    ) -> Result<BookState, Error> {
        match message {
            BookMessage::Snapshot(snapshot) => self.apply_snapshot_at(previous, snapshot, timestamp),
            BookMessage::Delta(delta) => match previous {
                Some(previous) => self.apply_deltas_at(previous, delta, timestamp),
                None => {
                    warn!("Delta received before the initial snapshot, dropping");
                    Err(Error::MissingSnapshot)
                }
            },
        }
    }

    /// Replace the sides present in `raw`, carrying the others over.
    ///
    /// Levels with a zero size are discarded. Snapshot sides are not
    /// truncated; the exchange already bounds them to the subscribed depth.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedLevel`] if any token fails validation; no
    /// side is applied in that case.
    pub fn apply_snapshot(
        &self,
        previous: Option<&BookState>,
        raw: &SnapshotMessage,
    ) -> Result<BookState, Error> {
        self.apply_snapshot_at(previous, raw, current_timestamp_ms())
    }

    /// [`LevelBook::apply_snapshot`] with an explicit processing timestamp
    pub fn apply_snapshot_at(
        &self,
        previous: Option<&BookState>,
        raw: &SnapshotMessage,
        timestamp: TimestampMs,
    ) -> Result<BookState, Error> {
        // Validate both sides before touching either.
        let asks = parse_side(Side::Ask, raw.asks.as_deref())?;
        let bids = parse_side(Side::Bid, raw.bids.as_deref())?;

        let asks = match asks {
            Some(levels) => collect_side(Side::Ask, levels.into_iter().collect(), usize::MAX),
            None => carried(previous, Side::Ask),
        };
        let bids = match bids {
            Some(levels) => collect_side(Side::Bid, levels.into_iter().collect(), usize::MAX),
            None => carried(previous, Side::Bid),
        };

        debug!(asks = asks.len(), bids = bids.len(), timestamp, "Applied book snapshot");

        Ok(BookState {
            bids,
            asks,
            timestamp,
        })
    }

    /// Upsert/remove levels on top of `previous`, then keep the best `depth`.
    ///
    /// A size of zero removes the level at that exact price (no-op if
    /// absent); any other size replaces the level's total size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedLevel`] if any token fails validation; no
    /// side is applied in that case.
    pub fn apply_deltas(&self, previous: &BookState, raw: &DeltaMessage) -> Result<BookState, Error> {
        self.apply_deltas_at(previous, raw, current_timestamp_ms())
    }

    /// [`LevelBook::apply_deltas`] with an explicit processing timestamp
    pub fn apply_deltas_at(
        &self,
        previous: &BookState,
        raw: &DeltaMessage,
        timestamp: TimestampMs,
    ) -> Result<BookState, Error> {
        let ask_updates = parse_side(Side::Ask, raw.asks.as_deref())?;
        let bid_updates = parse_side(Side::Bid, raw.bids.as_deref())?;

        let asks = match ask_updates {
            Some(updates) => merge_side(Side::Ask, &previous.asks, updates, self.depth),
            None => previous.asks.clone(),
        };
        let bids = match bid_updates {
            Some(updates) => merge_side(Side::Bid, &previous.bids, updates, self.depth),
            None => previous.bids.clone(),
        };

        debug!(asks = asks.len(), bids = bids.len(), timestamp, "Applied book deltas");

        Ok(BookState {
            bids,
            asks,
            timestamp,
        })
    }
}

impl Default for LevelBook {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DEPTH)
    }
}

fn carried(previous: Option<&BookState>, side: Side) -> Vec<PriceLevel> {
    previous
        .map(|book| book.side(side).to_vec())
        .unwrap_or_default()
}

/// Parse every tuple of one side, or fail on the first bad token.
fn parse_side(side: Side, levels: Option<&[RawLevel]>) -> Result<Option<Vec<(Price, Size)>>, Error> {
    let Some(levels) = levels else {
        return Ok(None);
    };
    levels
        .iter()
        .map(|level| Ok((parse_token(side, &level.price)?, parse_token(side, &level.size)?)))
        .collect::<Result<Vec<_>, Error>>()
        .map(Some)
}

/// Parse one price or size token.
///
/// Only plain `digits[.digits]` is accepted, and the value must fit a
/// `Decimal` without rounding, so distinct wire prices never collapse into
/// one level.
fn parse_token(side: Side, token: &str) -> Result<Decimal, Error> {
    let reject = |reason: String| {
        warn!(%side, token, %reason, "Rejecting book message with malformed level");
        Error::MalformedLevel {
            side,
            token: token.to_string(),
            reason,
        }
    };

    if token.strip_prefix('-').is_some_and(is_plain_decimal) {
        return Err(reject("negative value".to_string()));
    }
    if !is_plain_decimal(token) {
        return Err(reject("not a plain decimal".to_string()));
    }
    Decimal::from_str_exact(token).map_err(|e| reject(e.to_string()))
}

fn is_plain_decimal(token: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match token.split_once('.') {
        Some((int, frac)) => digits(int) && digits(frac),
        None => digits(token),
    }
}

fn merge_side(
    side: Side,
    existing: &[PriceLevel],
    updates: Vec<(Price, Size)>,
    depth: usize,
) -> Vec<PriceLevel> {
    let mut book: BTreeMap<Price, Size> = existing.iter().map(|l| (l.price, l.size)).collect();

    for (price, size) in updates {
        if size.is_zero() {
            book.remove(&price);
        } else {
            book.insert(price, size);
        }
    }

    collect_side(side, book, depth)
}

/// Emit a side best-first, dropping empty levels and everything past `limit`.
fn collect_side(side: Side, book: BTreeMap<Price, Size>, limit: usize) -> Vec<PriceLevel> {
    let levels = book
        .into_iter()
        .filter(|(_, size)| !size.is_zero())
        .map(|(price, size)| PriceLevel::new(price, size));

    match side {
        Side::Ask => levels.take(limit).collect(),
        Side::Bid => {
            let mut bids: Vec<PriceLevel> = levels.collect();
            bids.reverse();
            bids.truncate(limit);
            bids
        }
    }
}
