//! Liquidity wall detection with hysteresis.
//!
//! A *wall* is a level whose resting size reaches the side's threshold.
//! Each side uses two thresholds:
//!
//! - **create**: the configured threshold; a level must reach it to become a wall
//! - **remove**: 80% of the configured threshold; a wall must fall below it to stop being one
//!
//! A level hovering between the two therefore keeps its current status
//! instead of emitting alternating created/removed events on every tick.

use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::types::{BookState, Price, PriceLevel, Side, Size, TimestampMs};

/// Ratio of the remove threshold to the create threshold
const REMOVE_RATIO: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

/// Kind of liquidity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityEventKind {
    /// A level became a wall
    WallCreated,
    /// A wall fell below the remove threshold (or vanished)
    WallRemoved,
}

/// A detected wall transition.
///
/// Carries no identity; the downstream event store assigns ids, dedupes
/// and bounds retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityEvent {
    /// Timestamp of the book state the transition was observed in
    pub timestamp: TimestampMs,
    /// Book side
    pub side: Side,
    /// Transition kind
    #[serde(rename = "type")]
    pub kind: LiquidityEventKind,
    /// Level price
    pub price: Price,
    /// Size observed at transition time (0 if the level vanished)
    pub size: Size,
    /// Create threshold in force for the side
    pub threshold: Decimal,
}

/// Per-side create thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    ask: Decimal,
    bid: Decimal,
}

impl Thresholds {
    /// Create thresholds for both sides
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreshold`] if either value is not positive.
    pub fn new(ask: Decimal, bid: Decimal) -> Result<Self, Error> {
        for value in [ask, bid] {
            if value <= Decimal::ZERO {
                return Err(Error::InvalidThreshold(value));
            }
        }
        Ok(Self { ask, bid })
    }

    /// Create threshold for `side`
    pub fn create(&self, side: Side) -> Decimal {
        match side {
            Side::Ask => self.ask,
            Side::Bid => self.bid,
        }
    }

    /// Remove threshold for `side` (80% of create)
    pub fn remove(&self, side: Side) -> Decimal {
        self.create(side) * REMOVE_RATIO
    }
}

/// Wall detector.
///
/// The only state it keeps is its hysteresis memory: whether each level seen
/// in the last compared book is currently a wall. Feed it consecutive book
/// states; the `previous` of one call should be the `current` of the last.
///
/// # Example
///
/// ```rust
/// use depth_explorer::events::{LiquidityEventKind, Thresholds, WallDetector};
/// use depth_explorer::types::{BookState, PriceLevel};
/// use rust_decimal::Decimal;
///
/// let thresholds = Thresholds::new(Decimal::from(10), Decimal::from(10)).unwrap();
/// let mut detector = WallDetector::new(thresholds);
///
/// let mut book = BookState::empty(1);
/// book.asks.push(PriceLevel::new(Decimal::from(100), Decimal::from(12)));
///
/// let events = detector.compare(None, &book);
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].kind, LiquidityEventKind::WallCreated);
/// ```
#[derive(Debug, Clone)]
pub struct WallDetector {
    thresholds: Thresholds,
    ask_walls: FxHashMap<Price, bool>,
    bid_walls: FxHashMap<Price, bool>,
}

impl WallDetector {
    /// Create a detector with no memory
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ask_walls: FxHashMap::default(),
            bid_walls: FxHashMap::default(),
        }
    }

    /// Get the thresholds
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Replace the thresholds; applies from the next comparison
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    /// Forget every remembered wall
    pub fn reset(&mut self) {
        self.ask_walls.clear();
        self.bid_walls.clear();
    }

    /// Whether the level at `price` is currently flagged as a wall
    pub fn is_wall(&self, side: Side, price: Price) -> bool {
        self.memory(side).get(&price).copied().unwrap_or(false)
    }

    /// Compare two consecutive states and emit wall transitions.
    ///
    /// With no `previous`, every level at or above the create threshold is
    /// reported as created. Asks are evaluated before bids; within a side,
    /// levels of `previous` come first (in book order), then levels that
    /// only appear in `current`.
    pub fn compare(&mut self, previous: Option<&BookState>, current: &BookState) -> Vec<LiquidityEvent> {
        let mut events = Vec::new();
        for side in [Side::Ask, Side::Bid] {
            let prev_levels = previous.map(|book| book.side(side));
            self.compare_side(side, prev_levels, current.side(side), current.timestamp, &mut events);
        }
        if !events.is_empty() {
            debug!(count = events.len(), timestamp = current.timestamp, "Detected wall transitions");
        }
        events
    }

    fn compare_side(
        &mut self,
        side: Side,
        previous: Option<&[PriceLevel]>,
        current: &[PriceLevel],
        timestamp: TimestampMs,
        events: &mut Vec<LiquidityEvent>,
    ) {
        let create = self.thresholds.create(side);
        let remove = self.thresholds.remove(side);
        let memory = self.memory(side);

        let event = |kind, level: PriceLevel| LiquidityEvent {
            timestamp,
            side,
            kind,
            price: level.price,
            size: level.size,
            threshold: create,
        };

        let mut next: FxHashMap<Price, bool> =
            FxHashMap::with_capacity_and_hasher(current.len(), Default::default());

        let known: FxHashSet<Price> = match previous {
            None => FxHashSet::default(),
            Some(previous) => {
                let curr_sizes: FxHashMap<Price, Size> =
                    current.iter().map(|l| (l.price, l.size)).collect();

                for level in previous {
                    let curr_size = curr_sizes.get(&level.price).copied();
                    let observed = PriceLevel::new(level.price, curr_size.unwrap_or(Decimal::ZERO));
                    // Without memory of this level, seed its status from the previous size.
                    let was_wall = memory
                        .get(&level.price)
                        .copied()
                        .unwrap_or(level.size >= remove);

                    let is_wall = if !was_wall && observed.size >= create {
                        events.push(event(LiquidityEventKind::WallCreated, observed));
                        true
                    } else if was_wall && observed.size < remove {
                        events.push(event(LiquidityEventKind::WallRemoved, observed));
                        false
                    } else {
                        was_wall
                    };

                    if curr_size.is_some() {
                        next.insert(level.price, is_wall);
                    }
                }

                previous.iter().map(|l| l.price).collect()
            }
        };

        for level in current.iter().filter(|l| !known.contains(&l.price)) {
            let is_wall = level.size >= create;
            if is_wall {
                events.push(event(LiquidityEventKind::WallCreated, *level));
            }
            next.insert(level.price, is_wall);
        }

        *self.memory_mut(side) = next;
    }

    fn memory(&self, side: Side) -> &FxHashMap<Price, bool> {
        match side {
            Side::Ask => &self.ask_walls,
            Side::Bid => &self.bid_walls,
        }
    }

    fn memory_mut(&mut self, side: Side) -> &mut FxHashMap<Price, bool> {
        match side {
            Side::Ask => &mut self.ask_walls,
            Side::Bid => &mut self.bid_walls,
        }
    }
}
